use super::*;

/// Connection security options for SSH establishment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSecurityOptions {
    /// Server host key verification method.
    pub server_check: ServerCheckMethod,
}

impl Default for ConnectionSecurityOptions {
    fn default() -> Self {
        Self::accept_any_host_key()
    }
}

impl ConnectionSecurityOptions {
    /// Accepts whatever host key the server presents.
    ///
    /// Provisioning targets are frequently fresh machines whose keys are not
    /// yet known, so this is the default.
    pub fn accept_any_host_key() -> Self {
        Self {
            server_check: ServerCheckMethod::NoCheck,
        }
    }

    /// Verifies the host key against `~/.ssh/known_hosts`.
    pub fn known_hosts() -> Self {
        Self {
            server_check: ServerCheckMethod::DefaultKnownHostsFile,
        }
    }

    /// Verifies the host key against a specific known-hosts file.
    pub fn known_hosts_file(path: impl Into<String>) -> Self {
        Self {
            server_check: ServerCheckMethod::KnownHostsFile(path.into()),
        }
    }

    pub(super) fn client_config(&self) -> Config {
        Config {
            keepalive_interval: Some(config::KEEPALIVE_INTERVAL),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionSecurityOptions;
    use async_ssh2_tokio::ServerCheckMethod;

    #[test]
    fn default_security_options_accept_any_host_key() {
        let options = ConnectionSecurityOptions::default();
        assert!(matches!(options.server_check, ServerCheckMethod::NoCheck));
    }

    #[test]
    fn known_hosts_profile_checks_default_file() {
        let options = ConnectionSecurityOptions::known_hosts();
        assert!(matches!(
            options.server_check,
            ServerCheckMethod::DefaultKnownHostsFile
        ));
    }

    #[test]
    fn known_hosts_file_profile_keeps_path() {
        let options = ConnectionSecurityOptions::known_hosts_file("/etc/ssh/ssh_known_hosts");
        assert!(matches!(
            options.server_check,
            ServerCheckMethod::KnownHostsFile(ref path) if path == "/etc/ssh/ssh_known_hosts"
        ));
    }

    #[test]
    fn client_config_keeps_connections_alive() {
        let config = ConnectionSecurityOptions::default().client_config();
        assert_eq!(config.keepalive_interval, Some(crate::config::KEEPALIVE_INTERVAL));
    }
}

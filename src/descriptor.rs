//! Resolved connection and file descriptors.
//!
//! The infrastructure tool resolves its configuration into these value types
//! before calling into the pool or the file operations. Nothing here touches
//! the network.

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{DEFAULT_PERMISSIONS, DEFAULT_PORT};
use crate::error::RemoteError;

static OCTAL_MODE: Lazy<Regex> = Lazy::new(|| match Regex::new(r"^[0-7]{3,4}$") {
    Ok(regex) => regex,
    Err(err) => panic!("invalid OCTAL_MODE regex: {err}"),
});

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Credentials offered to the remote host.
///
/// Every supplied credential becomes an alternative authentication method;
/// they are tried in field order and the first that succeeds wins.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuthMaterial {
    /// Password for the remote user.
    #[serde(default)]
    pub password: Option<String>,

    /// Private key in OpenSSH or PEM form.
    #[serde(default)]
    pub private_key: Option<String>,

    /// Local path of a private key file.
    #[serde(default)]
    pub private_key_path: Option<String>,

    /// Name of a local environment variable holding a private key.
    #[serde(default)]
    pub private_key_env_var: Option<String>,

    /// Passphrase for whichever private key is supplied.
    #[serde(default)]
    pub private_key_pass: Option<String>,

    /// Authenticate through the SSH agent at `SSH_AUTH_SOCK`.
    #[serde(default)]
    pub agent: bool,
}

impl AuthMaterial {
    /// Whether at least one authentication method is configured.
    pub fn is_empty(&self) -> bool {
        self.password.is_none()
            && self.private_key.is_none()
            && self.private_key_path.is_none()
            && self.private_key_env_var.is_none()
            && !self.agent
    }
}

/// A fully resolved remote connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionDescriptor {
    /// Remote host name or address.
    pub host: String,

    /// SSH port, 22 unless stated.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Remote login user.
    pub user: String,

    #[serde(flatten)]
    pub auth: AuthMaterial,

    /// Run file operations through `sudo`.
    #[serde(default)]
    pub sudo: bool,

    /// Connect timeout in milliseconds. Zero disables the timeout.
    #[serde(default)]
    pub timeout_ms: u64,
}

impl ConnectionDescriptor {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            auth: AuthMaterial::default(),
            sudo: false,
            timeout_ms: 0,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.auth.password = Some(password.into());
        self
    }

    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.auth.private_key = Some(key.into());
        self
    }

    pub fn with_private_key_path(mut self, path: impl Into<String>) -> Self {
        self.auth.private_key_path = Some(path.into());
        self
    }

    pub fn with_agent(mut self, agent: bool) -> Self {
        self.auth.agent = agent;
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Connect timeout, or `None` when connecting may take as long as it takes.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// `host:port`, the form used for dialing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks the mandatory fields before any network activity.
    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.host.trim().is_empty() {
            return Err(RemoteError::ConfigurationInvalid(
                "connection host is required".to_string(),
            ));
        }
        if self.user.trim().is_empty() {
            return Err(RemoteError::ConfigurationInvalid(
                "connection user is required".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(RemoteError::ConfigurationInvalid(
                "connection port must be between 1 and 65535".to_string(),
            ));
        }
        if self.auth.is_empty() {
            return Err(RemoteError::ConfigurationInvalid(format!(
                "no authentication method configured for {}@{}",
                self.user, self.host
            )));
        }
        Ok(())
    }

    /// The pooling key for this descriptor.
    ///
    /// `sudo` and the connect timeout are per-operation settings and do not
    /// take part.
    pub fn identity(&self) -> ConnectionIdentity {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, self.auth.password.as_deref());
        hash_field(&mut hasher, self.auth.private_key.as_deref());
        hash_field(&mut hasher, self.auth.private_key_path.as_deref());
        hash_field(&mut hasher, self.auth.private_key_env_var.as_deref());
        hash_field(&mut hasher, self.auth.private_key_pass.as_deref());
        hasher.update([u8::from(self.auth.agent)]);

        ConnectionIdentity {
            host: self.host.clone(),
            user: self.user.clone(),
            port: self.port,
            credentials_hash: hasher.finalize().into(),
        }
    }
}

/// Length-prefixed so that adjacent fields cannot run into each other.
fn hash_field(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update([1u8]);
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

/// Deterministic key under which a connection is pooled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    host: String,
    user: String,
    port: u16,

    /// SHA-256 over the credentials, so secrets are never kept in the key.
    credentials_hash: [u8; 32],
}

impl ConnectionIdentity {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// File mode in octal form, e.g. `0644`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Permissions(String);

impl Permissions {
    pub fn new(mode: impl Into<String>) -> Result<Self, RemoteError> {
        let mode = mode.into();
        if !OCTAL_MODE.is_match(&mode) {
            return Err(RemoteError::ConfigurationInvalid(format!(
                "permissions must be a 3 or 4 digit octal string, got '{mode}'"
            )));
        }
        Ok(Self(mode))
    }

    /// Normalizes `stat -c %a` output: newlines are dropped and short modes
    /// gain one leading zero (`644` becomes `0644`).
    pub fn from_stat_output(output: &str) -> String {
        let mode = output.replace('\n', "");
        if !mode.is_empty() && mode.len() < 4 {
            format!("0{mode}")
        } else {
            mode
        }
    }

    /// Renders raw mode bits the way SFTP reports them, e.g. `0644`.
    pub fn from_mode_bits(mode: u32) -> String {
        format!("{:04o}", mode & 0o7777)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The mode with exactly four digits.
    pub fn four_digit(&self) -> String {
        if self.0.len() == 3 {
            format!("0{}", self.0)
        } else {
            self.0.clone()
        }
    }

    fn is_valid(&self) -> bool {
        OCTAL_MODE.is_match(&self.0)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self(DEFAULT_PERMISSIONS.to_string())
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Desired owner or group of a file.
///
/// A numeric id and a symbolic name are mutually exclusive; [`Ownership::Unset`]
/// leaves the remote value untouched.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    #[default]
    Unset,
    Numeric(u32),
    Named(String),
}

impl Ownership {
    /// Builds an ownership from the id/name attribute pair of a declaration.
    ///
    /// `what` names the attribute pair in error messages (`owner`, `group`).
    /// Empty strings count as absent.
    pub fn from_fields(
        what: &str,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self, RemoteError> {
        let id = id.filter(|value| !value.is_empty());
        let name = name.filter(|value| !value.is_empty());
        match (id, name) {
            (Some(_), Some(_)) => Err(RemoteError::ConfigurationInvalid(format!(
                "{what} and {what}_name are mutually exclusive"
            ))),
            (Some(id), None) => id.trim().parse::<u32>().map(Ownership::Numeric).map_err(|_| {
                RemoteError::ConfigurationInvalid(format!(
                    "{what} must be a numeric id, got '{id}'"
                ))
            }),
            (None, Some(name)) => Ok(Ownership::Named(name.to_string())),
            (None, None) => Ok(Ownership::Unset),
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, Ownership::Unset)
    }

    /// Argument handed to `chown`/`chgrp`, if a change is requested.
    pub fn argument(&self) -> Option<String> {
        match self {
            Ownership::Unset => None,
            Ownership::Numeric(id) => Some(id.to_string()),
            Ownership::Named(name) => Some(name.clone()),
        }
    }
}

/// A fully resolved managed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileDescriptor {
    /// Absolute path on the remote host.
    pub path: String,

    /// Desired content. Absent on read-only lookups.
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub permissions: Permissions,

    #[serde(default)]
    pub owner: Ownership,

    #[serde(default)]
    pub group: Ownership,
}

impl FileDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            permissions: Permissions::default(),
            owner: Ownership::Unset,
            group: Ownership::Unset,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_owner(mut self, owner: Ownership) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_group(mut self, group: Ownership) -> Self {
        self.group = group;
        self
    }

    pub fn validate(&self) -> Result<(), RemoteError> {
        validate_path(&self.path)?;
        if !self.permissions.is_valid() {
            return Err(RemoteError::ConfigurationInvalid(format!(
                "permissions must be a 3 or 4 digit octal string, got '{}'",
                self.permissions
            )));
        }
        Ok(())
    }
}

/// Rejects a blank remote path. An empty path would otherwise resolve to
/// the login directory on the remote side.
pub fn validate_path(path: &str) -> Result<(), RemoteError> {
    if path.trim().is_empty() {
        return Err(RemoteError::ConfigurationInvalid(
            "file path is required".to_string(),
        ));
    }
    Ok(())
}

use super::*;

use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;

use super::channel::ChannelIo;

/// Dials SSH sessions with `async-ssh2-tokio`.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    security_options: ConnectionSecurityOptions,
}

impl SshConnector {
    pub fn new(security_options: ConnectionSecurityOptions) -> Self {
        Self { security_options }
    }

    /// Authentication methods in the order they are attempted.
    fn auth_methods(
        descriptor: &ConnectionDescriptor,
    ) -> Result<Vec<(&'static str, AuthMethod)>, TransportError> {
        let auth = &descriptor.auth;
        let passphrase = auth.private_key_pass.as_deref();
        let mut methods = Vec::new();

        if let Some(password) = auth.password.as_deref() {
            methods.push(("password", AuthMethod::with_password(password)));
        }
        if let Some(key) = auth.private_key.as_deref() {
            methods.push(("private key", AuthMethod::with_key(key, passphrase)));
        }
        if let Some(path) = auth.private_key_path.as_deref() {
            methods.push(("private key file", AuthMethod::with_key_file(path, passphrase)));
        }
        if let Some(var) = auth.private_key_env_var.as_deref() {
            let key = std::env::var(var)
                .ok()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    TransportError::Protocol(format!(
                        "couldn't read private key from environment variable {var}"
                    ))
                })?;
            methods.push((
                "private key env var",
                AuthMethod::with_key(&key, passphrase),
            ));
        }
        if auth.agent {
            methods.push(("agent", Self::agent_method()?));
        }
        Ok(methods)
    }

    #[cfg(unix)]
    fn agent_method() -> Result<AuthMethod, TransportError> {
        Ok(AuthMethod::with_agent())
    }

    #[cfg(not(unix))]
    fn agent_method() -> Result<AuthMethod, TransportError> {
        Err(TransportError::Protocol(
            "SSH agent authentication is not supported on this platform".to_string(),
        ))
    }

    async fn dial(&self, descriptor: &ConnectionDescriptor) -> Result<SshSession, TransportError> {
        let addr = descriptor.identity().to_string();
        let mut last_error = None;

        for (name, method) in Self::auth_methods(descriptor)? {
            debug!("{} trying {} authentication", addr, name);
            match Client::connect_with_config(
                (descriptor.host.clone(), descriptor.port),
                &descriptor.user,
                method,
                self.security_options.server_check.clone(),
                self.security_options.client_config(),
            )
            .await
            {
                Ok(client) => {
                    debug!("{} connected using {} authentication", addr, name);
                    return Ok(SshSession {
                        client,
                        addr,
                    });
                }
                Err(err) => {
                    debug!("{} {} authentication failed: {}", addr, name, err);
                    last_error = Some(TransportError::from(err));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::Protocol("no authentication method configured".to_string())
        }))
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<SshSession, TransportError> {
        match descriptor.connect_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.dial(descriptor))
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => self.dial(descriptor).await,
        }
    }
}

/// A live SSH connection.
pub struct SshSession {
    client: Client,
    addr: String,
}

impl SshSession {
    /// Checks if the underlying SSH connection is still active.
    pub fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }
}

/// Reads a command channel until the server closes it.
async fn collect_output(channel: &mut impl ChannelIo) -> CommandOutput {
    let mut output = CommandOutput::default();
    while let Some(msg) = channel.recv().await {
        match msg {
            ChannelMsg::Data { ref data } => output.stdout.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                output.stderr.extend_from_slice(data)
            }
            ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
            _ => {}
        }
    }
    output
}

/// Writes `content` and closes the writer from a task of its own, so a
/// chatty command cannot fill the window while input is still going out.
fn feed_stdin<W>(mut writer: W, content: Vec<u8>) -> JoinHandle<std::io::Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        writer.write_all(&content).await?;
        writer.shutdown().await
    })
}

/// Decides what a stdin write error means once the command has finished.
fn settle_stdin(
    addr: &str,
    output: CommandOutput,
    fed: std::io::Result<()>,
) -> Result<CommandOutput, TransportError> {
    match fed {
        Ok(()) => Ok(output),
        // A failing command usually closes its input early; its exit status
        // says more than the broken pipe does.
        Err(err) if !output.success() => {
            debug!("{} stdin not fully written: {}", addr, err);
            Ok(output)
        }
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, TransportError> {
        trace!("{} exec: {}", self.addr, command);
        let mut channel = self.client.get_channel().await?;
        channel.start(command).await?;

        let feeder = stdin.map(|content| feed_stdin(Box::pin(channel.make_writer()), content));

        let output = collect_output(&mut channel).await;
        trace!(
            "{} exit status {:?} for: {}",
            self.addr, output.exit_status, command
        );

        match feeder {
            Some(feeder) => {
                let fed = feeder.await.map_err(|err| {
                    TransportError::Protocol(format!("stdin feeder failed: {err}"))
                })?;
                settle_stdin(&self.addr, output, fed)
            }
            None => Ok(output),
        }
    }

    async fn copy(
        &self,
        content: &[u8],
        path: &str,
        permissions: &Permissions,
    ) -> Result<(), TransportError> {
        trace!("{} copy {} bytes to {}", self.addr, content.len(), path);
        let mut channel = self.client.get_channel().await?;
        scp::send(&mut channel, content, path, permissions).await
    }

    async fn open_transfer(&self) -> Result<Box<dyn FileTransfer>, TransportError> {
        let channel = self.client.get_channel().await?;
        Ok(Box::new(SftpTransfer::open(channel).await?))
    }

    async fn close(&self) -> Result<(), TransportError> {
        debug!("Safely closing SSH connection to {}...", self.addr);
        if !self.is_connected() {
            debug!("Connection {} already disconnected, skipping", self.addr);
            return Ok(());
        }
        self.client.disconnect().await?;
        debug!("SSH connection to {} safely closed", self.addr);
        Ok(())
    }
}

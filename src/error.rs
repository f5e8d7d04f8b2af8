//! Error types for pooled SSH connections and remote file operations.
//!
//! Transport libraries report failures through [`TransportError`]. The pool
//! and the file operations wrap those into [`RemoteError`], whose
//! [`ErrorKind`] tells a caller how to react (fail fast, retry, or ignore).

use std::fmt;

use thiserror::Error;

/// Coarse classification of a [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or contradictory descriptor fields. Never retried.
    ConfigurationInvalid,
    /// Dial or authentication failure. The caller may retry the acquire.
    ConnectionFailed,
    /// The transport did not close cleanly. Reported, never fatal.
    ConnectionCloseFailed,
    /// Release without a matching acquire.
    PoolInvariantViolated,
    /// A shell command exited non-zero or its pipe broke.
    RemoteCommandFailed,
    /// Reading remote content or metadata failed.
    RemoteReadFailed,
    /// Writing remote content failed.
    RemoteWriteFailed,
    /// The addressed path does not exist.
    RemoteNotFound,
}

/// Failures surfaced by the SSH, SCP and SFTP layers.
#[derive(Error, Debug)]
pub enum TransportError {
    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    Russh(#[from] russh::Error),

    /// An error occurred in the SFTP subsystem.
    #[error("sftp error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side reported that the path does not exist.
    #[error("file does not exist")]
    NotFound,

    /// The remote process finished with a non-zero status.
    #[error("process exited with status {0}")]
    ExitStatus(u32),

    /// The remote process finished without reporting a status.
    #[error("process exited without an exit status")]
    MissingExitStatus,

    /// Connection establishment exceeded the configured timeout.
    #[error("connection timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The channel closed before the exchange completed.
    #[error("channel closed unexpectedly")]
    ChannelClosed,

    /// The peer answered outside the expected protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether this error means the remote path is absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            TransportError::NotFound => true,
            TransportError::Sftp(russh_sftp::client::error::Error::Status(status)) => {
                status.status_code == russh_sftp::protocol::StatusCode::NoSuchFile
            }
            TransportError::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// A shell command that failed, with everything needed to diagnose it.
#[derive(Debug)]
pub struct CommandFailure {
    pub command: String,
    pub source: TransportError,
    pub stderr: String,
}

impl CommandFailure {
    pub fn new(command: impl Into<String>, source: TransportError, stderr: &[u8]) -> Self {
        Self {
            command: command.into(),
            source,
            stderr: String::from_utf8_lossy(stderr).into_owned(),
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}`\n  {}\n  {}",
            self.command,
            self.source,
            self.stderr.trim_end_matches('\n')
        )
    }
}

impl std::error::Error for CommandFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Underlying reason for a failed read or write.
#[derive(Error, Debug)]
pub enum Cause {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Command(#[from] CommandFailure),
}

/// Errors returned by the connection pool and the remote file operations.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The connection or file descriptor is incomplete or contradictory.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Dialing or authenticating against the remote host failed.
    #[error("couldn't establish a connection to the remote server '{addr}': {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: TransportError,
    },

    /// Closing a released connection failed.
    #[error("couldn't close the connection to '{addr}': {source}")]
    ConnectionCloseFailed {
        addr: String,
        #[source]
        source: TransportError,
    },

    /// The pool's reference counting was misused.
    #[error("connection pool invariant violated: {0}")]
    PoolInvariantViolated(String),

    /// A remote shell command failed.
    #[error("{0}")]
    RemoteCommandFailed(#[from] CommandFailure),

    #[error("unable to read {path}: {cause}")]
    RemoteReadFailed {
        path: String,
        #[source]
        cause: Cause,
    },

    #[error("unable to write {path}: {cause}")]
    RemoteWriteFailed {
        path: String,
        #[source]
        cause: Cause,
    },

    /// The path does not exist on the remote host.
    #[error("{0}")]
    RemoteNotFound(String),
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::ConfigurationInvalid(_) => ErrorKind::ConfigurationInvalid,
            RemoteError::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            RemoteError::ConnectionCloseFailed { .. } => ErrorKind::ConnectionCloseFailed,
            RemoteError::PoolInvariantViolated(_) => ErrorKind::PoolInvariantViolated,
            RemoteError::RemoteCommandFailed(_) => ErrorKind::RemoteCommandFailed,
            RemoteError::RemoteReadFailed { .. } => ErrorKind::RemoteReadFailed,
            RemoteError::RemoteWriteFailed { .. } => ErrorKind::RemoteWriteFailed,
            RemoteError::RemoteNotFound(_) => ErrorKind::RemoteNotFound,
        }
    }

    pub(crate) fn read_failed(path: &str, cause: impl Into<Cause>) -> Self {
        RemoteError::RemoteReadFailed {
            path: path.to_string(),
            cause: cause.into(),
        }
    }

    pub(crate) fn write_failed(path: &str, cause: impl Into<Cause>) -> Self {
        RemoteError::RemoteWriteFailed {
            path: path.to_string(),
            cause: cause.into(),
        }
    }
}

//! SSH connection management and remote transport primitives.
//!
//! This module provides the connection pool and the transport seams the
//! remote file operations are written against. A [`Connector`] dials and
//! authenticates; the resulting [`RemoteSession`] opens command channels,
//! bulk-copy channels and file-transfer channels on one live connection.
//!
//! # Main Components
//!
//! - [`ConnectionPool`] - Reference-counted pool with a per-connection admission gate
//! - [`SshConnector`] / [`SshSession`] - The SSH transport built on `async-ssh2-tokio`
//! - [`ConnectionSecurityOptions`] - Host key verification policy
//! - [`CommandOutput`] - Captured result of a remote command

use std::collections::HashMap;
use std::sync::Arc;

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, trace, warn};
use russh::ChannelMsg;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, Semaphore};

use crate::config::{self, PoolConfig};
use crate::descriptor::{ConnectionDescriptor, ConnectionIdentity, Permissions};
use crate::error::{RemoteError, TransportError};

pub use client::{SshConnector, SshSession};
pub use manager::ConnectionPool;
pub use security::ConnectionSecurityOptions;
pub use transfer::SftpTransfer;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the channel closed without reporting a status.
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Metadata reported by the file-transfer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Raw mode bits, possibly including the file type.
    pub mode: u32,
    pub size: u64,
}

/// Dials and authenticates remote sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: RemoteSession;

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self::Session, TransportError>;
}

/// One authenticated transport connection to a remote host.
///
/// Every method opens its own channel, so a session may be used by several
/// callers at once.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Runs `command` on a fresh command channel.
    ///
    /// When `stdin` is given it is streamed into the command and the input is
    /// closed afterwards. A non-zero exit is reported in the output, not as
    /// an error.
    async fn exec(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, TransportError>;

    /// Creates or overwrites `path` over the bulk-copy protocol.
    async fn copy(
        &self,
        content: &[u8],
        path: &str,
        permissions: &Permissions,
    ) -> Result<(), TransportError>;

    /// Opens a file-transfer channel.
    async fn open_transfer(&self) -> Result<Box<dyn FileTransfer>, TransportError>;

    /// Closes the underlying connection.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A file-transfer channel. Callers close it once they are done with it.
#[async_trait]
pub trait FileTransfer: Send {
    async fn stat(&mut self, path: &str) -> Result<FileStat, TransportError>;

    async fn read(&mut self, path: &str) -> Result<Vec<u8>, TransportError>;

    async fn remove(&mut self, path: &str) -> Result<(), TransportError>;

    /// Ends the file-transfer session and releases its channel.
    async fn close(&mut self) -> Result<(), TransportError>;
}

mod channel;
mod client;
mod manager;
mod scp;
mod security;
mod transfer;

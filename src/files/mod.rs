//! Remote file operations over one pooled session.
//!
//! Every operation takes a [`Strategy`]. [`Strategy::Direct`] moves content
//! over the file-transfer and bulk-copy channels. [`Strategy::Shell`] runs
//! privileged shell commands and pipes content through their standard
//! streams. Mode and ownership changes always run as shell commands, with
//! the escalation prefix only under [`Strategy::Shell`].
//!
//! Nothing here retries, and a multi-step sequence that fails part way leaves
//! the remote file in whatever state the completed steps produced.

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::descriptor::{Ownership, Permissions};
use crate::error::{CommandFailure, RemoteError, TransportError};
use crate::session::{CommandOutput, RemoteSession};

mod command;
mod direct;
mod shell;

/// How a file operation reaches the remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// File-transfer channel for reads, bulk copy for writes.
    Direct,
    /// Shell commands run through the escalation command.
    Shell,
}

impl Strategy {
    pub fn from_elevated(elevated: bool) -> Self {
        if elevated {
            Strategy::Shell
        } else {
            Strategy::Direct
        }
    }

    pub fn is_elevated(self) -> bool {
        self == Strategy::Shell
    }
}

/// A single `stat` field reported by [`RemoteFileOps::stat_attribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatField {
    OwnerId,
    GroupId,
    OwnerName,
    GroupName,
}

impl StatField {
    /// The `stat -c` format letter.
    pub fn format(self) -> char {
        match self {
            StatField::OwnerId => 'u',
            StatField::GroupId => 'g',
            StatField::OwnerName => 'U',
            StatField::GroupName => 'G',
        }
    }
}

/// File operations bound to one acquired session.
pub struct RemoteFileOps<'a, S: RemoteSession + ?Sized> {
    session: &'a S,
}

impl<'a, S: RemoteSession + ?Sized> RemoteFileOps<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self { session }
    }

    /// Whether a regular file exists at `path`.
    ///
    /// An absent file is `Ok(false)` under both strategies.
    pub async fn exists(&self, path: &str, strategy: Strategy) -> Result<bool, RemoteError> {
        match strategy {
            Strategy::Direct => self.direct_exists(path).await,
            Strategy::Shell => self.shell_exists(path).await,
        }
    }

    /// Reads the whole file.
    pub async fn read(&self, path: &str, strategy: Strategy) -> Result<String, RemoteError> {
        match strategy {
            Strategy::Direct => self.direct_read(path).await,
            Strategy::Shell => self.shell_read(path).await,
        }
    }

    /// Creates or overwrites `path` with `content`.
    ///
    /// Under [`Strategy::Direct`] the mode is applied at creation time.
    /// Callers that need the mode enforced on an existing file follow up
    /// with [`RemoteFileOps::chmod`].
    pub async fn write(
        &self,
        content: &str,
        path: &str,
        permissions: &Permissions,
        strategy: Strategy,
    ) -> Result<(), RemoteError> {
        match strategy {
            Strategy::Direct => self.direct_write(content, path, permissions).await,
            Strategy::Shell => self.shell_write(content, path).await,
        }
    }

    /// The file mode as a four digit octal string, e.g. `0644`.
    pub async fn read_permissions(
        &self,
        path: &str,
        strategy: Strategy,
    ) -> Result<String, RemoteError> {
        match strategy {
            Strategy::Direct => self.direct_read_permissions(path).await,
            Strategy::Shell => self.shell_read_permissions(path).await,
        }
    }

    pub async fn delete(&self, path: &str, strategy: Strategy) -> Result<(), RemoteError> {
        match strategy {
            Strategy::Direct => self.direct_delete(path).await,
            Strategy::Shell => self.shell_delete(path).await,
        }
    }

    pub async fn chmod(
        &self,
        path: &str,
        permissions: &Permissions,
        strategy: Strategy,
    ) -> Result<(), RemoteError> {
        let command = command::chmod(permissions.as_str(), path, strategy.is_elevated());
        self.run(&command, None).await?;
        Ok(())
    }

    /// Changes the owner. [`Ownership::Unset`] runs nothing.
    pub async fn chown(
        &self,
        path: &str,
        owner: &Ownership,
        strategy: Strategy,
    ) -> Result<(), RemoteError> {
        let Some(owner) = owner.argument() else {
            return Ok(());
        };
        let command = command::chown(&owner, path, strategy.is_elevated());
        self.run(&command, None).await?;
        Ok(())
    }

    /// Changes the group. [`Ownership::Unset`] runs nothing.
    pub async fn chgrp(
        &self,
        path: &str,
        group: &Ownership,
        strategy: Strategy,
    ) -> Result<(), RemoteError> {
        let Some(group) = group.argument() else {
            return Ok(());
        };
        let command = command::chgrp(&group, path, strategy.is_elevated());
        self.run(&command, None).await?;
        Ok(())
    }

    /// Reports one `stat` field with surrounding whitespace removed.
    pub async fn stat_attribute(
        &self,
        path: &str,
        field: StatField,
        strategy: Strategy,
    ) -> Result<String, RemoteError> {
        let command = command::stat(field, path, strategy.is_elevated());
        let output = self.run(&command, None).await?;
        Ok(output.stdout_lossy().trim().to_string())
    }

    /// Runs `command` and treats anything but exit status 0 as failure.
    async fn run(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, CommandFailure> {
        trace!("running: {}", command);
        let output = self
            .session
            .exec(command, stdin)
            .await
            .map_err(|err| CommandFailure::new(command, err, &[]))?;
        match output.exit_status {
            Some(0) => Ok(output),
            Some(status) => Err(CommandFailure::new(
                command,
                TransportError::ExitStatus(status),
                &output.stderr,
            )),
            None => Err(CommandFailure::new(
                command,
                TransportError::MissingExitStatus,
                &output.stderr,
            )),
        }
    }
}

/// File content must be UTF-8; anything else fails the read rather than
/// coming back altered.
fn decode(path: &str, content: Vec<u8>) -> Result<String, RemoteError> {
    String::from_utf8(content).map_err(|err| {
        RemoteError::read_failed(
            path,
            TransportError::Protocol(format!("file content is not valid UTF-8: {err}")),
        )
    })
}

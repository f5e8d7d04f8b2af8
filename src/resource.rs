//! Managed file flows, one pooled session per call.
//!
//! Each flow resolves its connection, acquires a session from the
//! [`ConnectionPool`], runs the file operations and releases the session.
//! A failing release never replaces the flow's own result: it is logged and
//! handed back on [`Outcome::close_error`].

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::descriptor::{
    ConnectionDescriptor, FileDescriptor, Ownership, Permissions, validate_path,
};
use crate::error::{ErrorKind, RemoteError, TransportError};
use crate::files::{RemoteFileOps, StatField, Strategy};
use crate::session::{ConnectionPool, Connector, SshConnector};

/// The stable `host:port:path` identifier of a managed file.
pub fn resource_id(connection: &ConnectionDescriptor, path: &str) -> String {
    format!("{}:{}:{}", connection.host, connection.port, path)
}

/// Provider-level settings shared by every resource.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderDefaults {
    /// Connection used by resources that declare none.
    #[serde(default)]
    pub connection: Option<ConnectionDescriptor>,
}

impl ProviderDefaults {
    pub fn new(connection: Option<ConnectionDescriptor>) -> Self {
        Self { connection }
    }

    /// The resource's own connection, or the provider default.
    pub fn resolve<'a>(
        &'a self,
        connection: Option<&'a ConnectionDescriptor>,
    ) -> Result<&'a ConnectionDescriptor, RemoteError> {
        connection.or(self.connection.as_ref()).ok_or_else(|| {
            RemoteError::ConfigurationInvalid(
                "resource does not have a connection configured".to_string(),
            )
        })
    }
}

/// Observed state of a managed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileState {
    pub id: String,
    #[serde(flatten)]
    pub file: FileDescriptor,
}

/// Everything known about an unmanaged remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileSnapshot {
    pub id: String,
    pub path: String,
    pub content: String,
    pub permissions: String,
    /// Numeric owner id.
    pub owner: String,
    pub owner_name: String,
    /// Numeric group id.
    pub group: String,
    pub group_name: String,
}

/// A completed flow and the outcome of releasing its session.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    /// Set when the session could not be released or closed cleanly.
    pub close_error: Option<RemoteError>,
}

impl<T> Outcome<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}

/// A failed flow, with the step that failed.
#[derive(Debug)]
pub struct ResourceError {
    context: Option<&'static str>,
    source: RemoteError,
}

impl ResourceError {
    fn with_context(context: &'static str) -> impl FnOnce(RemoteError) -> Self {
        move |source| Self {
            context: Some(context),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// The failed step, e.g. `unable to create remote file`.
    pub fn context(&self) -> Option<&str> {
        self.context
    }

    pub fn remote_error(&self) -> &RemoteError {
        &self.source
    }
}

impl From<RemoteError> for ResourceError {
    fn from(source: RemoteError) -> Self {
        Self {
            context: None,
            source,
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.context {
            Some(context) => write!(f, "{}: {}", context, self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Create, read, update and delete flows for managed files.
pub struct FileResource<'p, C: Connector = SshConnector> {
    pool: &'p ConnectionPool<C>,
    defaults: &'p ProviderDefaults,
}

impl<'p, C: Connector> FileResource<'p, C> {
    pub fn new(pool: &'p ConnectionPool<C>, defaults: &'p ProviderDefaults) -> Self {
        Self { pool, defaults }
    }

    /// Writes the file, then applies mode, group and owner in that order.
    pub async fn create(
        &self,
        connection: Option<&ConnectionDescriptor>,
        file: &FileDescriptor,
    ) -> Result<Outcome<FileState>, ResourceError> {
        file.validate()?;
        let content = file.content.as_deref().ok_or_else(|| {
            RemoteError::ConfigurationInvalid("file content is required".to_string())
        })?;
        let connection = self.defaults.resolve(connection)?;
        debug!("writing {} on {}", file.path, connection.identity());

        let session = self.open(connection).await?;
        let result = Self::apply(session.as_ref(), connection, file, content).await;
        self.finish(connection, result).await
    }

    /// Rewrites the file. Same steps as [`FileResource::create`].
    pub async fn update(
        &self,
        connection: Option<&ConnectionDescriptor>,
        file: &FileDescriptor,
    ) -> Result<Outcome<FileState>, ResourceError> {
        self.create(connection, file).await
    }

    /// Reads the current state back.
    ///
    /// `Ok(None)` value means the file is gone and should be dropped from
    /// state. Owner and group are only read back when `file` declares them,
    /// in the same form (id or name) as declared.
    pub async fn read(
        &self,
        connection: Option<&ConnectionDescriptor>,
        file: &FileDescriptor,
    ) -> Result<Outcome<Option<FileState>>, ResourceError> {
        validate_path(&file.path)?;
        let connection = self.defaults.resolve(connection)?;
        let session = self.open(connection).await?;
        let result = Self::observe(session.as_ref(), connection, file).await;
        self.finish(connection, result).await
    }

    /// Removes the file if it is present.
    pub async fn delete(
        &self,
        connection: Option<&ConnectionDescriptor>,
        path: &str,
    ) -> Result<Outcome<()>, ResourceError> {
        validate_path(path)?;
        let connection = self.defaults.resolve(connection)?;
        let session = self.open(connection).await?;
        let result = Self::remove(session.as_ref(), connection, path).await;
        self.finish(connection, result).await
    }

    /// Reads a file that is not managed here. A missing file is an error.
    pub async fn inspect(
        &self,
        connection: Option<&ConnectionDescriptor>,
        path: &str,
    ) -> Result<Outcome<FileSnapshot>, ResourceError> {
        validate_path(path)?;
        let connection = self.defaults.resolve(connection)?;
        let session = self.open(connection).await?;
        let result = Self::snapshot(session.as_ref(), connection, path).await;
        self.finish(connection, result).await
    }

    async fn open(
        &self,
        connection: &ConnectionDescriptor,
    ) -> Result<Arc<C::Session>, ResourceError> {
        self.pool
            .acquire(connection)
            .await
            .map_err(ResourceError::with_context("unable to open remote client"))
    }

    async fn finish<T>(
        &self,
        connection: &ConnectionDescriptor,
        result: Result<T, ResourceError>,
    ) -> Result<Outcome<T>, ResourceError> {
        let close_error = match self.pool.release(connection).await {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    "unable to close remote client {}: {}",
                    connection.identity(),
                    err
                );
                Some(err)
            }
        };
        result.map(|value| Outcome { value, close_error })
    }

    async fn apply(
        session: &C::Session,
        connection: &ConnectionDescriptor,
        file: &FileDescriptor,
        content: &str,
    ) -> Result<FileState, ResourceError> {
        let ops = RemoteFileOps::new(session);
        let strategy = Strategy::from_elevated(connection.sudo);
        let path = file.path.as_str();

        ops.write(content, path, &file.permissions, strategy)
            .await
            .map_err(ResourceError::with_context("unable to create remote file"))?;
        ops.chmod(path, &file.permissions, strategy)
            .await
            .map_err(ResourceError::with_context("unable to update remote file"))?;
        ops.chgrp(path, &file.group, strategy)
            .await
            .map_err(ResourceError::with_context("unable to change group of remote file"))?;
        ops.chown(path, &file.owner, strategy)
            .await
            .map_err(ResourceError::with_context("unable to change owner of remote file"))?;

        Ok(FileState {
            id: resource_id(connection, path),
            file: file.clone(),
        })
    }

    async fn observe(
        session: &C::Session,
        connection: &ConnectionDescriptor,
        file: &FileDescriptor,
    ) -> Result<Option<FileState>, ResourceError> {
        let ops = RemoteFileOps::new(session);
        let strategy = Strategy::from_elevated(connection.sudo);
        let path = file.path.as_str();

        let exists = ops
            .exists(path, strategy)
            .await
            .map_err(ResourceError::with_context("unable to check if remote file exists"))?;
        if !exists {
            debug!("{} is gone from {}", path, connection.identity());
            return Ok(None);
        }

        let read = ResourceError::with_context("unable to read from remote");
        let observed = async {
            let content = ops.read(path, strategy).await?;
            let mode = ops.read_permissions(path, strategy).await?;
            let permissions = Permissions::new(mode.as_str()).map_err(|_| {
                RemoteError::read_failed(
                    path,
                    TransportError::Protocol(format!("unexpected file mode '{mode}'")),
                )
            })?;
            let owner = Self::read_ownership(
                &ops,
                path,
                &file.owner,
                (StatField::OwnerId, StatField::OwnerName),
                strategy,
            )
            .await?;
            let group = Self::read_ownership(
                &ops,
                path,
                &file.group,
                (StatField::GroupId, StatField::GroupName),
                strategy,
            )
            .await?;
            Ok::<_, RemoteError>(FileDescriptor {
                path: path.to_string(),
                content: Some(content),
                permissions,
                owner,
                group,
            })
        }
        .await
        .map_err(read)?;

        Ok(Some(FileState {
            id: resource_id(connection, path),
            file: observed,
        }))
    }

    /// Reads owner or group back in the form it was declared in.
    async fn read_ownership(
        ops: &RemoteFileOps<'_, C::Session>,
        path: &str,
        declared: &Ownership,
        (id_field, name_field): (StatField, StatField),
        strategy: Strategy,
    ) -> Result<Ownership, RemoteError> {
        match declared {
            Ownership::Unset => Ok(Ownership::Unset),
            Ownership::Numeric(_) => {
                let raw = ops.stat_attribute(path, id_field, strategy).await?;
                raw.parse().map(Ownership::Numeric).map_err(|_| {
                    RemoteError::read_failed(
                        path,
                        TransportError::Protocol(format!("unexpected numeric id '{raw}'")),
                    )
                })
            }
            Ownership::Named(_) => Ok(Ownership::Named(
                ops.stat_attribute(path, name_field, strategy).await?,
            )),
        }
    }

    async fn remove(
        session: &C::Session,
        connection: &ConnectionDescriptor,
        path: &str,
    ) -> Result<(), ResourceError> {
        let ops = RemoteFileOps::new(session);
        let strategy = Strategy::from_elevated(connection.sudo);

        let exists = ops
            .exists(path, strategy)
            .await
            .map_err(ResourceError::with_context("unable to check if remote file exists"))?;
        if !exists {
            debug!("{} already absent on {}", path, connection.identity());
            return Ok(());
        }
        ops.delete(path, strategy)
            .await
            .map_err(ResourceError::with_context("unable to delete remote file"))
    }

    async fn snapshot(
        session: &C::Session,
        connection: &ConnectionDescriptor,
        path: &str,
    ) -> Result<FileSnapshot, ResourceError> {
        let ops = RemoteFileOps::new(session);
        let strategy = Strategy::from_elevated(connection.sudo);

        let exists = ops
            .exists(path, strategy)
            .await
            .map_err(ResourceError::with_context("unable to check if remote file exists"))?;
        if !exists {
            return Err(RemoteError::RemoteNotFound(
                "cannot read file, it does not exist".to_string(),
            )
            .into());
        }

        let read = ResourceError::with_context("unable to read from remote");
        async {
            Ok::<_, RemoteError>(FileSnapshot {
                id: resource_id(connection, path),
                path: path.to_string(),
                content: ops.read(path, strategy).await?,
                permissions: ops.read_permissions(path, strategy).await?,
                owner: ops.stat_attribute(path, StatField::OwnerId, strategy).await?,
                owner_name: ops
                    .stat_attribute(path, StatField::OwnerName, strategy)
                    .await?,
                group: ops.stat_attribute(path, StatField::GroupId, strategy).await?,
                group_name: ops
                    .stat_attribute(path, StatField::GroupName, strategy)
                    .await?,
            })
        }
        .await
        .map_err(read)
    }
}

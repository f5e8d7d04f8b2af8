use super::*;

use crate::session::FileTransfer;

impl<S: RemoteSession + ?Sized> RemoteFileOps<'_, S> {
    pub(super) async fn direct_exists(&self, path: &str) -> Result<bool, RemoteError> {
        let mut transfer = self.open_transfer(|err| RemoteError::read_failed(path, err)).await?;
        let stat = transfer.stat(path).await;
        close_transfer(transfer, path).await;
        match stat {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(RemoteError::read_failed(path, err)),
        }
    }

    pub(super) async fn direct_read(&self, path: &str) -> Result<String, RemoteError> {
        let mut transfer = self.open_transfer(|err| RemoteError::read_failed(path, err)).await?;
        let content = transfer.read(path).await;
        close_transfer(transfer, path).await;
        let content = content.map_err(|err| RemoteError::read_failed(path, err))?;
        decode(path, content)
    }

    pub(super) async fn direct_write(
        &self,
        content: &str,
        path: &str,
        permissions: &Permissions,
    ) -> Result<(), RemoteError> {
        trace!("copying {} bytes to {}", content.len(), path);
        self.session
            .copy(content.as_bytes(), path, permissions)
            .await
            .map_err(|err| RemoteError::write_failed(path, err))
    }

    pub(super) async fn direct_read_permissions(&self, path: &str) -> Result<String, RemoteError> {
        let mut transfer = self.open_transfer(|err| RemoteError::read_failed(path, err)).await?;
        let stat = transfer.stat(path).await;
        close_transfer(transfer, path).await;
        let stat = stat.map_err(|err| RemoteError::read_failed(path, err))?;
        Ok(Permissions::from_mode_bits(stat.mode))
    }

    pub(super) async fn direct_delete(&self, path: &str) -> Result<(), RemoteError> {
        let mut transfer = self.open_transfer(|err| RemoteError::write_failed(path, err)).await?;
        let removed = transfer.remove(path).await;
        close_transfer(transfer, path).await;
        match removed {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                Err(RemoteError::RemoteNotFound(format!("{path} does not exist")))
            }
            Err(err) => Err(RemoteError::write_failed(path, err)),
        }
    }

    async fn open_transfer(
        &self,
        failed: impl FnOnce(TransportError) -> RemoteError,
    ) -> Result<Box<dyn FileTransfer>, RemoteError> {
        self.session.open_transfer().await.map_err(failed)
    }
}

/// Closes the channel once the operation has its answer. The operation's
/// result stands either way.
async fn close_transfer(mut transfer: Box<dyn FileTransfer>, path: &str) {
    if let Err(err) = transfer.close().await {
        warn!("Error closing file-transfer channel used for {}: {}", path, err);
    }
}

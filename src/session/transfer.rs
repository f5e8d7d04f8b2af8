use super::*;

use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;

/// A file-transfer channel backed by the SFTP subsystem.
pub struct SftpTransfer {
    sftp: SftpSession,
}

impl SftpTransfer {
    pub(super) async fn open(
        channel: russh::Channel<russh::client::Msg>,
    ) -> Result<Self, TransportError> {
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok(Self { sftp })
    }
}

/// Maps "no such file" to [`TransportError::NotFound`] so callers need not
/// know about SFTP status codes.
fn sftp_error(err: SftpError) -> TransportError {
    match err {
        SftpError::Status(ref status) if status.status_code == StatusCode::NoSuchFile => {
            TransportError::NotFound
        }
        other => TransportError::Sftp(other),
    }
}

#[async_trait]
impl FileTransfer for SftpTransfer {
    async fn stat(&mut self, path: &str) -> Result<FileStat, TransportError> {
        let metadata = self.sftp.metadata(path).await.map_err(sftp_error)?;
        Ok(FileStat {
            mode: metadata.permissions.unwrap_or_default(),
            size: metadata.size.unwrap_or_default(),
        })
    }

    async fn read(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        let mut file = self.sftp.open(path).await.map_err(sftp_error)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content).await?;
        Ok(content)
    }

    async fn remove(&mut self, path: &str) -> Result<(), TransportError> {
        self.sftp.remove_file(path).await.map_err(sftp_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sftp.close().await.map_err(sftp_error)
    }
}

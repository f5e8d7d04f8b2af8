use super::*;

// The shell strategy always runs elevated.
const ELEVATED: bool = true;

impl<S: RemoteSession + ?Sized> RemoteFileOps<'_, S> {
    pub(super) async fn shell_exists(&self, path: &str) -> Result<bool, RemoteError> {
        if self
            .run(&command::test_file(path, ELEVATED), None)
            .await
            .is_ok()
        {
            return Ok(true);
        }
        // A failed test may also mean the command never ran; ask the
        // opposite question to tell the two apart.
        self.run(&command::test_not_file(path, ELEVATED), None)
            .await?;
        Ok(false)
    }

    pub(super) async fn shell_read(&self, path: &str) -> Result<String, RemoteError> {
        let output = self
            .run(&command::cat(path, ELEVATED), None)
            .await
            .map_err(|failure| RemoteError::read_failed(path, failure))?;
        decode(path, output.stdout)
    }

    pub(super) async fn shell_write(&self, content: &str, path: &str) -> Result<(), RemoteError> {
        self.run(
            &command::tee(path, ELEVATED),
            Some(content.as_bytes().to_vec()),
        )
        .await
        .map_err(|failure| RemoteError::write_failed(path, failure))?;
        Ok(())
    }

    pub(super) async fn shell_read_permissions(&self, path: &str) -> Result<String, RemoteError> {
        let output = self
            .run(&command::stat_mode(path, ELEVATED), None)
            .await
            .map_err(|failure| RemoteError::read_failed(path, failure))?;
        Ok(Permissions::from_stat_output(&output.stdout_lossy()))
    }

    pub(super) async fn shell_delete(&self, path: &str) -> Result<(), RemoteError> {
        self.run(&command::remove(path, ELEVATED), None).await?;
        Ok(())
    }
}

//! The slice of an SSH channel that command execution and bulk copy need.

use super::*;

/// One open session channel: start a command, write to it, read its replies.
#[async_trait]
pub(super) trait ChannelIo: Send {
    /// Starts `command` on the channel.
    async fn start(&mut self, command: &str) -> Result<(), TransportError>;

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Signals end of input.
    async fn close_input(&mut self) -> Result<(), TransportError>;

    /// Next message from the server, `None` once the channel is gone.
    async fn recv(&mut self) -> Option<ChannelMsg>;
}

#[async_trait]
impl ChannelIo for russh::Channel<russh::client::Msg> {
    async fn start(&mut self, command: &str) -> Result<(), TransportError> {
        self.exec(true, command).await?;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.data(data).await?;
        Ok(())
    }

    async fn close_input(&mut self) -> Result<(), TransportError> {
        self.eof().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<ChannelMsg> {
        self.wait().await
    }
}

/// A channel that replays canned server messages and records what the
/// client sent.
#[cfg(test)]
#[derive(Default)]
pub(super) struct ScriptedChannel {
    pub replies: std::collections::VecDeque<ChannelMsg>,
    pub command: Option<String>,
    pub sent: Vec<u8>,
    pub input_closed: bool,
}

#[cfg(test)]
impl ScriptedChannel {
    pub fn new(replies: impl IntoIterator<Item = ChannelMsg>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn data(bytes: &[u8]) -> ChannelMsg {
        ChannelMsg::Data {
            data: russh::CryptoVec::from_slice(bytes),
        }
    }

    pub fn stderr(bytes: &[u8]) -> ChannelMsg {
        ChannelMsg::ExtendedData {
            data: russh::CryptoVec::from_slice(bytes),
            ext: 1,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ChannelIo for ScriptedChannel {
    async fn start(&mut self, command: &str) -> Result<(), TransportError> {
        self.command = Some(command.to_string());
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.input_closed {
            return Err(TransportError::ChannelClosed);
        }
        self.sent.extend_from_slice(data);
        Ok(())
    }

    async fn close_input(&mut self) -> Result<(), TransportError> {
        self.input_closed = true;
        Ok(())
    }

    async fn recv(&mut self) -> Option<ChannelMsg> {
        self.replies.pop_front()
    }
}

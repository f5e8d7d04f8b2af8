//! Sink side of the SCP bulk-copy handshake.
//!
//! The remote `scp -t` process acknowledges each step with a single zero
//! byte; a 1 or 2 byte is followed by a one-line message.

use super::*;

use super::channel::ChannelIo;

pub(super) async fn send(
    channel: &mut impl ChannelIo,
    content: &[u8],
    path: &str,
    permissions: &Permissions,
) -> Result<(), TransportError> {
    let command = format!("scp -qt {}", shell_escape::unix::escape(path.into()));
    channel.start(&command).await?;
    expect_ack(channel).await?;

    let header = format!(
        "C{} {} {}\n",
        permissions.four_digit(),
        content.len(),
        file_name(path)
    );
    channel.write(header.as_bytes()).await?;
    expect_ack(channel).await?;

    channel.write(content).await?;
    channel.write(&[0u8]).await?;
    expect_ack(channel).await?;

    channel.close_input().await?;
    while let Some(msg) = channel.recv().await {
        if let ChannelMsg::ExitStatus { exit_status } = msg
            && exit_status != 0
        {
            return Err(TransportError::ExitStatus(exit_status));
        }
    }
    Ok(())
}

async fn expect_ack(channel: &mut impl ChannelIo) -> Result<(), TransportError> {
    loop {
        match channel.recv().await {
            Some(ChannelMsg::Data { ref data }) => match data.first() {
                Some(0) => return Ok(()),
                Some(_) => {
                    let message = String::from_utf8_lossy(data.get(1..).unwrap_or_default());
                    return Err(TransportError::Protocol(message.trim_end().to_string()));
                }
                None => {}
            },
            Some(ChannelMsg::ExitStatus { exit_status }) if exit_status != 0 => {
                return Err(TransportError::ExitStatus(exit_status));
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                return Err(TransportError::ChannelClosed);
            }
            Some(_) => {}
        }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

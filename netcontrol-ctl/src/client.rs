use anyhow::{anyhow, Context, Result};
use netcontrol_core::protocol::{parse_data_ack_header, ACK, DATA_ACK_HEADER_LEN};
use netcontrol_core::ControlCommand;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq)]
pub(crate) enum Response {
    Ack,
    Data(String),
}

/// Sends one command and waits for the daemon to close the connection.
pub(crate) async fn send(socket: &Path, command: ControlCommand) -> Result<Response> {
    tokio::time::timeout(TIMEOUT, exchange(socket, command))
        .await
        .map_err(|_| anyhow!("no response from {} within {:?}", socket.display(), TIMEOUT))?
}

async fn exchange(socket: &Path, command: ControlCommand) -> Result<Response> {
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("failed to connect to {}", socket.display()))?;
    stream.write_all(&command.to_request()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    if response.is_empty() {
        return Err(anyhow!("daemon closed the connection without answering {command}"));
    }

    if !command.expects_data() {
        if response != ACK.as_bytes() {
            return Err(anyhow!(
                "unexpected response to {command}: {:?}",
                String::from_utf8_lossy(&response)
            ));
        }
        return Ok(Response::Ack);
    }

    if response.len() < DATA_ACK_HEADER_LEN {
        return Err(anyhow!("truncated response header for {command}"));
    }
    let (header, payload) = response.split_at(DATA_ACK_HEADER_LEN);
    let len = parse_data_ack_header(header)?;
    if payload.len() != len {
        return Err(anyhow!(
            "payload of {} bytes announced, {} received",
            len,
            payload.len()
        ));
    }

    Ok(Response::Data(String::from_utf8_lossy(payload).into_owned()))
}

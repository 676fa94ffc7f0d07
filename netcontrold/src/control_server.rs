use anyhow::{Context, Result};
use metrics::counter;
use netcontrol_core::protocol::{data_ack_header, ACK, MAX_PAYLOAD_LEN, REQUEST_LEN};
use netcontrol_core::ControlCommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::daemon_metrics::CONTROL_COMMANDS_TOTAL;
use crate::rebalance_state::RebalanceState;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Serves the control socket, one connection and one command at a time.
pub(crate) struct ControlServer {
    path: PathBuf,
    listener: UnixListener,
    state: Arc<RebalanceState>,
}

impl ControlServer {
    /// Binds the socket, replacing a stale socket file left by a previous run.
    pub(crate) fn bind(path: &Path, state: Arc<RebalanceState>) -> Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
        }
        let listener = UnixListener::bind(path)
            .with_context(|| format!("failed to bind control socket {}", path.display()))?;

        info!(socket = %path.display(), "control socket listening");
        Ok(Self {
            path: path.to_path_buf(),
            listener,
            state,
        })
    }

    pub(crate) async fn run(self, cancel: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        // a bad connection never takes the server down
                        if let Err(e) = self.serve(stream).await {
                            warn!(error = %e, "control connection dropped");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to accept control connection"),
                },
            }
        }

        drop(self.listener);
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(socket = %self.path.display(), error = %e, "failed to remove control socket");
        }
        info!("control socket closed");
        Ok(())
    }

    async fn serve(&self, mut stream: UnixStream) -> Result<()> {
        let mut request = [0u8; REQUEST_LEN];
        let len = tokio::time::timeout(READ_TIMEOUT, read_request(&mut stream, &mut request))
            .await
            .context("timed out reading control command")??;

        let command = ControlCommand::parse(&request[..len])?;
        counter!(CONTROL_COMMANDS_TOTAL.name, "command" => command.as_str()).increment(1);
        info!(command = %command, "control command received");

        let response = self.respond(command).await;
        stream.write_all(&response).await?;
        stream.shutdown().await?;
        Ok(())
    }

    async fn respond(&self, command: ControlCommand) -> Vec<u8> {
        match command {
            ControlCommand::DebugOn => {
                self.state.set_debug(true);
                ACK.as_bytes().to_vec()
            }
            ControlCommand::DebugOff => {
                self.state.set_debug(false);
                ACK.as_bytes().to_vec()
            }
            ControlCommand::RebalanceOn => {
                self.state.set_rebalance(true);
                ACK.as_bytes().to_vec()
            }
            ControlCommand::RebalanceOff => {
                self.state.set_rebalance(false);
                ACK.as_bytes().to_vec()
            }
            ControlCommand::RebalanceCount => {
                data_response(&self.state.rebalance_count().await.to_string())
            }
            ControlCommand::Status => data_response(&self.state.status().await),
        }
    }
}

/// Reads until the bytes received form a known command, the request buffer
/// is full or the peer stops sending. Clients may send the bare literal
/// without padding and wait for the answer.
async fn read_request(stream: &mut UnixStream, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
        // no command literal is a prefix of another
        if ControlCommand::parse(&buf[..filled]).is_ok() {
            break;
        }
    }
    Ok(filled)
}

/// Header plus payload, the payload cut to what the header can announce.
fn data_response(payload: &str) -> Vec<u8> {
    let body = &payload.as_bytes()[..payload.len().min(MAX_PAYLOAD_LEN)];
    if body.len() < payload.len() {
        warn!(len = payload.len(), "control payload truncated");
    }
    let mut response = data_ack_header(body.len()).into_bytes();
    response.extend_from_slice(body);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcontrol_core::protocol::{parse_data_ack_header, DATA_ACK_HEADER_LEN};

    async fn exchange(path: &Path, request: &[u8]) -> Vec<u8> {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    fn payload(response: &[u8]) -> String {
        let len = parse_data_ack_header(&response[..DATA_ACK_HEADER_LEN]).unwrap();
        let body = &response[DATA_ACK_HEADER_LEN..];
        assert_eq!(body.len(), len);
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn start(dir: &tempfile::TempDir, state: Arc<RebalanceState>) -> (PathBuf, CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let path = dir.path().join("ncd.sock");
        let server = ControlServer::bind(&path, state).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.run(cancel.clone()));
        (path, cancel, handle)
    }

    #[tokio::test]
    async fn test_rebalance_off_shows_in_status() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(RebalanceState::new(true, false, 6));
        let (path, cancel, handle) = start(&dir, state.clone());

        let ack = exchange(&path, &ControlCommand::RebalanceOff.to_request()).await;
        assert_eq!(ack, b"CTLD_ACK");
        assert!(!state.rebalance_enabled());

        let status = exchange(&path, &ControlCommand::Status.to_request()).await;
        assert!(status.starts_with(b"CTLD_DATA_ACK 0000"));
        let status = payload(&status);
        assert!(status.contains("rebalance mode: off"));
        assert!(status.contains("debug mode: off"));

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_toggles_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(RebalanceState::new(false, false, 0));
        state.record_apply(chrono::Local::now()).await;
        let (path, cancel, handle) = start(&dir, state.clone());

        // hidden while rebalance mode is off
        let count = exchange(&path, &ControlCommand::RebalanceCount.to_request()).await;
        assert_eq!(count, b"CTLD_DATA_ACK 0000010");

        exchange(&path, &ControlCommand::RebalanceOn.to_request()).await;
        exchange(&path, &ControlCommand::DebugOn.to_request()).await;
        assert!(state.debug_enabled());

        let count = exchange(&path, &ControlCommand::RebalanceCount.to_request()).await;
        assert_eq!(payload(&count), "1");

        exchange(&path, &ControlCommand::DebugOff.to_request()).await;
        assert!(!state.debug_enabled());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_malformed_command_gets_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(RebalanceState::new(true, false, 6));
        let (path, cancel, handle) = start(&dir, state.clone());

        let response = exchange(&path, b"CTLD_BOGUS\0\0\0\0\0\0").await;
        assert!(response.is_empty());
        assert!(state.rebalance_enabled());

        // the listener keeps serving
        let ack = exchange(&path, &ControlCommand::DebugOn.to_request()).await;
        assert_eq!(ack, b"CTLD_ACK");

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unpadded_command_is_answered() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(RebalanceState::new(true, false, 6));
        let (path, cancel, handle) = start(&dir, state);

        // the client keeps its write side open and waits for the answer
        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"CTLD_STATUS").await.unwrap();
        let mut response = Vec::new();
        tokio::time::timeout(Duration::from_secs(1), stream.read_to_end(&mut response))
            .await
            .expect("answered before the read timeout")
            .unwrap();
        assert!(payload(&response).contains("rebalance mode: on"));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn test_oversized_payload_matches_its_header() {
        let response = data_response(&"x".repeat(MAX_PAYLOAD_LEN + 5));
        assert_eq!(&response[..DATA_ACK_HEADER_LEN], b"CTLD_DATA_ACK 999999");
        assert_eq!(payload(&response).len(), MAX_PAYLOAD_LEN);
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ncd.sock");
        std::fs::write(&path, b"stale").unwrap();

        let state = Arc::new(RebalanceState::new(true, false, 6));
        assert!(ControlServer::bind(&path, state).is_ok());
    }
}

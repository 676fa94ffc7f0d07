use assert_cmd::prelude::*;
use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

pub fn cli(socket: &Path) -> Command {
    let mut cmd = Command::cargo_bin("netcontrol-ctl").expect("binary exists");
    cmd.env_remove("NETCONTROL_SOCKET");
    cmd.arg("--socket").arg(socket);
    cmd
}

/// A stand-in daemon answering a single connection with `response`.
pub struct FakeDaemon {
    pub socket: PathBuf,
    requests: mpsc::Receiver<Vec<u8>>,
    handle: JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl FakeDaemon {
    pub fn answering(response: &[u8]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("ncd.sock");
        let listener = UnixListener::bind(&socket).expect("bind fake daemon");
        let response = response.to_vec();
        let (tx, requests) = mpsc::channel();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut request = [0u8; 16];
            stream.read_exact(&mut request).expect("read request");
            tx.send(request.to_vec()).expect("report request");
            stream.write_all(&response).expect("write response");
        });

        Self {
            socket,
            requests,
            handle,
            _dir: dir,
        }
    }

    /// The raw request the CLI sent.
    pub fn request(self) -> Vec<u8> {
        let request = self.requests.recv().expect("request received");
        self.handle.join().expect("fake daemon thread");
        request
    }
}

pub fn padded(command: &str) -> Vec<u8> {
    let mut request = command.as_bytes().to_vec();
    request.resize(16, 0);
    request
}

use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::{ByteReader, ByteWriter, Communicator};
use crate::uds::{poll_readable, UnixDomainSocket};

/// Which end of the connection a communicator plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connects to a listening render server (the host side).
    Client,
    /// Binds the path and accepts one host connection (the render server side).
    Server,
}

/// Configuration for the socket communicator.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Permission mode applied to the bound socket file (server role).
    pub socket_mode: u32,
    /// Maximum time `open` waits for a client (server role). `None` blocks.
    pub accept_timeout: Option<Duration>,
    /// Read timeout on the connected stream. `None` blocks.
    pub read_timeout: Option<Duration>,
    /// Write timeout on the connected stream. `None` blocks.
    pub write_timeout: Option<Duration>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            socket_mode: UnixDomainSocket::DEFAULT_SOCKET_MODE,
            accept_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// A connected stream that turns short system transfers into complete ones.
///
/// Reads and writes loop until the requested length is done. A partial count
/// is only returned when the peer closed the connection or an unrecoverable
/// error occurred; the stream is then marked broken and the owning
/// communicator tears it down.
#[derive(Debug)]
struct SocketStream {
    stream: UnixStream,
    broken: bool,
}

impl SocketStream {
    fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            broken: false,
        }
    }
}

impl ByteReader for SocketStream {
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        if self.broken {
            return 0;
        }
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    debug!(
                        expected = buf.len(),
                        read = filled,
                        "peer closed connection during read"
                    );
                    self.broken = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(
                        error = %err,
                        expected = buf.len(),
                        read = filled,
                        "socket read failed"
                    );
                    self.broken = true;
                    break;
                }
            }
        }
        filled
    }
}

impl ByteWriter for SocketStream {
    fn write_bytes(&mut self, buf: &[u8]) -> usize {
        if self.broken {
            return 0;
        }
        let mut offset = 0usize;
        while offset < buf.len() {
            match self.stream.write(&buf[offset..]) {
                Ok(0) => {
                    debug!(
                        expected = buf.len(),
                        written = offset,
                        "peer closed connection during write"
                    );
                    self.broken = true;
                    break;
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(
                        error = %err,
                        expected = buf.len(),
                        written = offset,
                        "socket write failed"
                    );
                    self.broken = true;
                    break;
                }
            }
        }
        offset
    }
}

/// Communicator over a filesystem-path Unix domain socket.
///
/// In the server role the listener outlives individual connections, so a
/// closed or failed connection can be replaced by calling `open` again. The
/// listener (and its socket file) goes away when the communicator is dropped.
pub struct LocalSocketCommunicator {
    role: Role,
    config: SocketConfig,
    listener: Option<UnixDomainSocket>,
    stream: Option<SocketStream>,
    path: Option<PathBuf>,
}

impl LocalSocketCommunicator {
    /// Host-side communicator that connects to a render server.
    pub fn client() -> Self {
        Self::with_config(Role::Client, SocketConfig::default())
    }

    /// Render-server-side communicator that binds and accepts.
    pub fn server() -> Self {
        Self::with_config(Role::Server, SocketConfig::default())
    }

    /// Communicator with explicit role and configuration.
    pub fn with_config(role: Role, config: SocketConfig) -> Self {
        Self {
            role,
            config,
            listener: None,
            stream: None,
            path: None,
        }
    }

    /// Bind the listening socket without waiting for a client (server role).
    ///
    /// `open` binds on demand, but binding first lets a server publish its
    /// path before it starts blocking in accept.
    pub fn bind(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(listener) = &self.listener {
            if listener.path() == path {
                return Ok(());
            }
        }
        self.listener = Some(UnixDomainSocket::bind_with_mode(
            path,
            self.config.socket_mode,
        )?);
        Ok(())
    }

    /// The role this communicator was created with.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Path of the current (or last) connection.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn accept_client(&mut self, path: &Path) -> Result<UnixStream> {
        let freshly_bound = !self
            .listener
            .as_ref()
            .is_some_and(|listener| listener.path() == path);
        if freshly_bound {
            self.bind(path)?;
        }

        let listener = self.listener.as_ref().ok_or(TransportError::NotConnected)?;
        match listener.accept_timeout(self.config.accept_timeout) {
            Ok(stream) => Ok(stream),
            Err(err) => {
                if freshly_bound {
                    // Release the listener we created in this call.
                    self.listener = None;
                }
                Err(err)
            }
        }
    }

    fn apply_timeouts(&self, stream: &UnixStream) -> Result<()> {
        stream.set_read_timeout(self.config.read_timeout)?;
        stream.set_write_timeout(self.config.write_timeout)?;
        Ok(())
    }

    /// Drop a stream that failed mid-transfer.
    fn reap_broken(&mut self) {
        if self.stream.as_ref().is_some_and(|s| s.broken) {
            debug!(path = ?self.path, "tearing down failed connection");
            self.stream = None;
        }
    }

    fn live_stream(&mut self) -> Result<&mut SocketStream> {
        self.reap_broken();
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Communicator for LocalSocketCommunicator {
    fn open(&mut self, identifier: &str) -> Result<()> {
        self.reap_broken();
        if self.stream.is_some() {
            debug!(path = ?self.path, "communicator already open");
            return Ok(());
        }

        let path = PathBuf::from(identifier);
        let stream = match self.role {
            Role::Client => UnixDomainSocket::connect(&path)?,
            Role::Server => self.accept_client(&path)?,
        };
        self.apply_timeouts(&stream)?;

        debug!(?path, role = ?self.role, "connection open");
        self.stream = Some(SocketStream::new(stream));
        self.path = Some(path);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(socket) = self.stream.take() {
            let _ = socket.stream.shutdown(std::net::Shutdown::Both);
            debug!(path = ?self.path, "connection closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !s.broken)
    }

    fn data_waiting(&self) -> bool {
        let Some(socket) = self.stream.as_ref().filter(|s| !s.broken) else {
            return false;
        };
        match poll_readable(socket.stream.as_raw_fd(), Some(Duration::ZERO)) {
            Ok(ready) => ready,
            Err(err) => {
                warn!(error = %err, "readiness poll failed");
                false
            }
        }
    }

    fn reader(&mut self) -> Result<&mut dyn ByteReader> {
        Ok(self.live_stream()?)
    }

    fn writer(&mut self) -> Result<&mut dyn ByteWriter> {
        Ok(self.live_stream()?)
    }

    fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

impl std::fmt::Debug for LocalSocketCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSocketCommunicator")
            .field("role", &self.role)
            .field("path", &self.path)
            .field("listening", &self.listener.is_some())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/rlink-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("render.sock")
    }

    fn cleanup(sock_path: &Path) {
        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    fn connected_pair(tag: &str) -> (LocalSocketCommunicator, LocalSocketCommunicator, PathBuf) {
        let sock_path = make_sock_path(tag);
        let mut server = LocalSocketCommunicator::server();
        server.bind(&sock_path).expect("server should bind");

        let path = sock_path.to_string_lossy().into_owned();
        let client_path = path.clone();
        let client = thread::spawn(move || {
            let mut client = LocalSocketCommunicator::client();
            client.open(&client_path).expect("client should connect");
            client
        });

        server.open(&path).expect("server should accept");
        let client = client.join().expect("client thread should finish");
        (server, client, sock_path)
    }

    #[test]
    fn client_open_fails_without_listener() {
        let sock_path = make_sock_path("nolisten");
        let mut client = LocalSocketCommunicator::client();
        let err = client
            .open(&sock_path.to_string_lossy())
            .expect_err("nothing is listening");
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(!client.is_open());
        assert!(matches!(client.reader(), Err(TransportError::NotConnected)));
        cleanup(&sock_path);
    }

    #[test]
    fn server_open_cleans_up_after_accept_timeout() {
        let sock_path = make_sock_path("accept-timeout");
        let mut server = LocalSocketCommunicator::with_config(
            Role::Server,
            SocketConfig {
                accept_timeout: Some(Duration::from_millis(20)),
                ..SocketConfig::default()
            },
        );

        let err = server
            .open(&sock_path.to_string_lossy())
            .expect_err("no client connects");
        assert!(matches!(err, TransportError::Accept(_)));
        assert!(!sock_path.exists(), "listener created by open is released");
        cleanup(&sock_path);
    }

    #[test]
    fn client_to_server_bytes_arrive_complete() {
        let (mut server, mut client, sock_path) = connected_pair("c2s");
        assert!(!server.data_waiting());

        let payload: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();
        let sent = client.writer().unwrap().write_bytes(&payload);
        assert_eq!(sent, payload.len());

        let mut buf = vec![0u8; payload.len()];
        let read = server.reader().unwrap().read_bytes(&mut buf);
        assert_eq!(read, payload.len());
        assert_eq!(buf, payload);
        assert!(!server.data_waiting());

        cleanup(&sock_path);
    }

    #[test]
    fn server_to_client_bytes_arrive_complete() {
        let (mut server, mut client, sock_path) = connected_pair("s2c");
        assert!(!client.data_waiting());

        let payload = vec![0x5Au8; 4096];
        assert_eq!(server.writer().unwrap().write_bytes(&payload), 4096);

        let mut buf = vec![0u8; 4096];
        assert_eq!(client.reader().unwrap().read_bytes(&mut buf), 4096);
        assert_eq!(buf, payload);

        cleanup(&sock_path);
    }

    #[test]
    fn data_waiting_after_write() {
        let (server, mut client, sock_path) = connected_pair("waiting");
        client.writer().unwrap().write_bytes(&[1, 2]);

        let mut waited = 0;
        while !server.data_waiting() && waited < 100 {
            thread::sleep(Duration::from_millis(5));
            waited += 1;
        }
        assert!(server.data_waiting());

        cleanup(&sock_path);
    }

    #[test]
    fn peer_close_yields_short_read_and_tears_down() {
        let (mut server, mut client, sock_path) = connected_pair("peer-close");
        client.writer().unwrap().write_bytes(&[7, 7]);
        client.close();

        let mut buf = [0u8; 4];
        let read = server.reader().unwrap().read_bytes(&mut buf);
        assert_eq!(read, 2);
        assert_eq!(&buf[..2], &[7, 7]);
        assert!(!server.is_open());
        assert!(!server.data_waiting());
        assert!(matches!(server.reader(), Err(TransportError::NotConnected)));

        cleanup(&sock_path);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut server, mut client, sock_path) = connected_pair("close-twice");
        client.close();
        client.close();
        assert!(!client.is_open());
        server.close();
        server.close();
        assert!(!server.is_open());

        cleanup(&sock_path);
    }

    #[test]
    fn server_reaccepts_after_close() {
        let (mut server, mut client, sock_path) = connected_pair("reaccept");
        client.close();
        server.close();

        let path = sock_path.to_string_lossy().into_owned();
        let client_path = path.clone();
        let second = thread::spawn(move || {
            let mut client = LocalSocketCommunicator::client();
            client.open(&client_path).expect("second client should connect");
            client.writer().unwrap().write_bytes(b"again");
            client
        });

        server.open(&path).expect("server should accept again");
        let mut buf = [0u8; 5];
        assert_eq!(server.reader().unwrap().read_bytes(&mut buf), 5);
        assert_eq!(&buf, b"again");

        let _client = second.join().expect("client thread should finish");
        drop(server);
        assert!(!sock_path.exists(), "socket file removed with the listener");
        cleanup(&sock_path);
    }
}

use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Listening side of a filesystem-path Unix domain socket.
///
/// The render server binds one of these per session and accepts the host's
/// connection from it. The socket file is removed on `Drop`, but only if the
/// path still refers to the socket this listener created.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl UnixDomainSocket {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    pub const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    pub const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// If the path already exists and is a socket, it is removed first (stale
    /// socket from a previous session).
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen with an explicit permission mode on the socket file.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;

        // Remove stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_error(&path, e))?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| bind_error(&path, e))?;
            } else {
                return Err(bind_error(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_error(&path, e))?;

        // From here on a failure must not leave the freshly created file behind.
        let finish = || -> std::io::Result<(u64, u64)> {
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))?;
            let created = std::fs::symlink_metadata(&path)?;
            Ok((created.dev(), created.ino()))
        };
        let created_inode = match finish() {
            Ok(identity) => identity,
            Err(e) => {
                drop(listener);
                let _ = std::fs::remove_file(&path);
                return Err(bind_error(&path, e));
            }
        };

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            path,
            created_inode: Some(created_inode),
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(stream)
    }

    /// Accept an incoming connection, waiting at most `timeout`.
    ///
    /// `None` blocks until a client arrives.
    pub fn accept_timeout(&self, timeout: Option<Duration>) -> Result<UnixStream> {
        if let Some(timeout) = timeout {
            let ready = poll_readable(self.listener.as_raw_fd(), Some(timeout))
                .map_err(TransportError::Accept)?;
            if !ready {
                return Err(TransportError::Accept(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no client connected within {timeout:?}"),
                )));
            }
        }
        self.accept()
    }

    /// Connect to a listening Unix domain socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<UnixStream> {
        let path = path.as_ref();
        check_path_len(path)?;
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to unix domain socket");
        Ok(stream)
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= UnixDomainSocket::MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: UnixDomainSocket::MAX_PATH_LEN,
        });
    }
    Ok(())
}

fn bind_error(path: &Path, source: std::io::Error) -> TransportError {
    TransportError::Bind {
        path: path.to_path_buf(),
        source,
    }
}

/// Poll one descriptor for readability.
///
/// `Some(Duration::ZERO)` returns immediately. Hang-up and error conditions
/// count as readable so callers discover them on the following read.
pub(crate) fn poll_readable(fd: RawFd, timeout: Option<Duration>) -> std::io::Result<bool> {
    let timeout_ms = match timeout {
        Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    };

    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    loop {
        // SAFETY: `pfd` is a valid, writable pollfd and we pass a count of exactly one.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(rc > 0 && (pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR)) != 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "renderlink-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_bind_accept_connect() {
        let dir = temp_dir("uds");
        let sock_path = dir.join("test.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        let path_clone = sock_path.clone();
        let handle = std::thread::spawn(move || {
            let mut client = UnixDomainSocket::connect(&path_clone).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UnixDomainSocket::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
        let result = UnixDomainSocket::connect(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn test_bind_default_permissions_hardened() {
        let dir = temp_dir("perms");
        let sock_path = dir.join("perm.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bind_rejects_existing_non_socket_file() {
        let dir = temp_dir("bind-file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = UnixDomainSocket::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert_eq!(std::fs::read(&sock_path).unwrap(), b"regular-file");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bind_replaces_stale_socket() {
        let dir = temp_dir("stale");
        let sock_path = dir.join("stale.sock");

        let first = UnixDomainSocket::bind(&sock_path).unwrap();
        // Forget the first listener so its drop cleanup never runs.
        std::mem::forget(first);
        assert!(sock_path.exists());

        let second = UnixDomainSocket::bind(&sock_path);
        assert!(second.is_ok());

        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_drop_does_not_remove_replaced_path() {
        let dir = temp_dir("drop-race");
        let sock_path = dir.join("drop.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_accept_timeout_expires_without_client() {
        let dir = temp_dir("accept-timeout");
        let sock_path = dir.join("idle.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        let result = listener.accept_timeout(Some(Duration::from_millis(20)));
        match result {
            Err(TransportError::Accept(err)) => {
                assert_eq!(err.kind(), std::io::ErrorKind::TimedOut)
            }
            other => panic!("expected accept timeout, got {other:?}"),
        }

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_poll_readable_sees_pending_bytes() {
        let (mut left, right) = UnixStream::pair().unwrap();
        assert!(!poll_readable(right.as_raw_fd(), Some(Duration::ZERO)).unwrap());

        left.write_all(b"x").unwrap();
        assert!(poll_readable(right.as_raw_fd(), Some(Duration::ZERO)).unwrap());
    }

    #[test]
    fn test_poll_readable_reports_hangup() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(left);
        assert!(poll_readable(right.as_raw_fd(), Some(Duration::ZERO)).unwrap());
    }
}

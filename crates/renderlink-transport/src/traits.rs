use bytes::{Buf, BufMut, BytesMut};

use crate::error::Result;

/// Pulls raw protocol bytes from a connection.
///
/// Implementations fill as much of `buf` as they can and return the number of
/// bytes actually placed there. A count lower than `buf.len()` means the peer
/// closed the connection, an unrecoverable I/O error occurred, or (for
/// in-memory buffers) the bytes are simply not there.
pub trait ByteReader {
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize;
}

/// Pushes raw protocol bytes to a connection.
///
/// Returns the number of bytes actually written; anything lower than
/// `buf.len()` is a partial write and the caller must treat it as a failure.
pub trait ByteWriter {
    fn write_bytes(&mut self, buf: &[u8]) -> usize;
}

/// A single bidirectional connection between two endpoints.
///
/// The communicator exclusively owns the transport handle. Everything above it
/// reads and writes through [`Communicator::reader`] and
/// [`Communicator::writer`], so sockets and in-memory buffers are
/// interchangeable.
pub trait Communicator {
    /// Establish the connection named by `identifier`.
    ///
    /// Depending on the role this connects to a listening endpoint or accepts
    /// one client. Opening an already-open communicator is a no-op.
    fn open(&mut self, identifier: &str) -> Result<()>;

    /// Release the connection. Closing twice is a no-op.
    fn close(&mut self);

    /// Whether a connection is currently usable.
    fn is_open(&self) -> bool;

    /// Non-blocking check for at least one readable byte.
    ///
    /// Also reports true when the peer hung up, so the next read observes the
    /// disconnect instead of the caller polling forever.
    fn data_waiting(&self) -> bool;

    /// Reader for the open connection.
    fn reader(&mut self) -> Result<&mut dyn ByteReader>;

    /// Writer for the open connection.
    fn writer(&mut self) -> Result<&mut dyn ByteWriter>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<R: ByteReader + ?Sized> ByteReader for &mut R {
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        (**self).read_bytes(buf)
    }
}

impl<W: ByteWriter + ?Sized> ByteWriter for &mut W {
    fn write_bytes(&mut self, buf: &[u8]) -> usize {
        (**self).write_bytes(buf)
    }
}

impl<C: Communicator + ?Sized> Communicator for Box<C> {
    fn open(&mut self, identifier: &str) -> Result<()> {
        (**self).open(identifier)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn data_waiting(&self) -> bool {
        (**self).data_waiting()
    }

    fn reader(&mut self) -> Result<&mut dyn ByteReader> {
        (**self).reader()
    }

    fn writer(&mut self) -> Result<&mut dyn ByteWriter> {
        (**self).writer()
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

/// Consumes buffered bytes from the front.
impl ByteReader for BytesMut {
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len());
        self.copy_to_slice(&mut buf[..n]);
        n
    }
}

impl ByteWriter for BytesMut {
    fn write_bytes(&mut self, buf: &[u8]) -> usize {
        self.put_slice(buf);
        buf.len()
    }
}

impl ByteReader for &[u8] {
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len());
        buf[..n].copy_from_slice(&self[..n]);
        *self = &self[n..];
        n
    }
}

impl ByteWriter for Vec<u8> {
    fn write_bytes(&mut self, buf: &[u8]) -> usize {
        self.extend_from_slice(buf);
        buf.len()
    }
}

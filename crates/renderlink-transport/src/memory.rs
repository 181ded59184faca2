use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{ByteReader, ByteWriter, Communicator};

/// One direction of an in-memory connection.
#[derive(Debug, Default)]
struct Queue {
    bytes: Mutex<BytesMut>,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reading end of a queue. Never blocks: a read returns whatever is buffered.
#[derive(Debug)]
struct QueueReader(Arc<Queue>);

impl ByteReader for QueueReader {
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let mut queue = self.0.lock();
        let n = buf.len().min(queue.len());
        queue.copy_to_slice(&mut buf[..n]);
        n
    }
}

/// Writing end of a queue. Refuses writes once the peer has closed.
#[derive(Debug)]
struct QueueWriter {
    queue: Arc<Queue>,
    peer_open: Arc<AtomicBool>,
}

impl ByteWriter for QueueWriter {
    fn write_bytes(&mut self, buf: &[u8]) -> usize {
        if !self.peer_open.load(Ordering::SeqCst) {
            return 0;
        }
        self.queue.lock().extend_from_slice(buf);
        buf.len()
    }
}

/// In-memory communicator, one half of a connected pair.
///
/// Bytes written by one half become readable by the other. Reads return only
/// the bytes currently buffered, which makes short reads easy to provoke in
/// tests. Both halves must be opened before use, like any other communicator.
#[derive(Debug)]
pub struct MemoryCommunicator {
    reader: QueueReader,
    writer: QueueWriter,
    open: Arc<AtomicBool>,
    name: Option<String>,
}

impl MemoryCommunicator {
    /// Create two connected halves.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Queue::default());
        let b_to_a = Arc::new(Queue::default());
        let a_open = Arc::new(AtomicBool::new(false));
        let b_open = Arc::new(AtomicBool::new(false));

        let a = Self {
            reader: QueueReader(Arc::clone(&b_to_a)),
            writer: QueueWriter {
                queue: Arc::clone(&a_to_b),
                peer_open: Arc::clone(&b_open),
            },
            open: Arc::clone(&a_open),
            name: None,
        };
        let b = Self {
            reader: QueueReader(a_to_b),
            writer: QueueWriter {
                queue: b_to_a,
                peer_open: a_open,
            },
            open: b_open,
            name: None,
        };
        (a, b)
    }

    /// Create both halves already open, for tests that do not care about
    /// the connection lifecycle.
    pub fn open_pair(name: &str) -> (Self, Self) {
        let (mut a, mut b) = Self::pair();
        a.mark_open(name);
        b.mark_open(name);
        (a, b)
    }

    /// Number of bytes waiting to be read on this half.
    pub fn pending(&self) -> usize {
        self.reader.0.lock().len()
    }

    /// Append raw bytes to this half's inbound queue, as if the peer sent them.
    pub fn inject(&self, bytes: &[u8]) {
        self.reader.0.lock().extend_from_slice(bytes);
    }

    /// Name given at `open`.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn mark_open(&mut self, name: &str) {
        self.open.store(true, Ordering::SeqCst);
        self.name = Some(name.to_string());
    }
}

impl Communicator for MemoryCommunicator {
    fn open(&mut self, identifier: &str) -> Result<()> {
        if !self.is_open() {
            self.mark_open(identifier);
            debug!(name = identifier, "in-memory connection open");
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(name = ?self.name, "in-memory connection closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn data_waiting(&self) -> bool {
        self.is_open() && self.pending() > 0
    }

    fn reader(&mut self) -> Result<&mut dyn ByteReader> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        Ok(&mut self.reader)
    }

    fn writer(&mut self) -> Result<&mut dyn ByteWriter> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }
        Ok(&mut self.writer)
    }

    fn transport_name(&self) -> &'static str {
        "in-memory"
    }
}

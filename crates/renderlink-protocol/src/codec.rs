//! Fixed-width scalar and array codec.
//!
//! Two calling conventions sit side by side:
//!
//! - [`read`], [`read_array`], [`write`], [`write_array`] keep the wire
//!   contract shared with every endpoint: a short read yields the type's
//!   sentinel (`Unknown`, `u32::MAX`, NaN) and writes report the byte count
//!   actually written. Callers must check before trusting a value.
//! - The `try_` variants detect the short transfer directly and return a
//!   [`ProtocolError`], for layers that prefer `?` over sentinel checks.
//!
//! All values use native byte order. Arrays move in a single transfer call
//! and are all-or-nothing.

use renderlink_transport::{ByteReader, ByteWriter};

use crate::command::CommandCode;
use crate::error::{ProtocolError, Result};

const DISCARD_CHUNK: usize = 64 * 1024;

/// A scalar with a fixed wire width.
pub trait WireScalar: Copy {
    /// Raw native-endian bytes, `[u8; WIDTH]`.
    type Raw: AsRef<[u8]> + AsMut<[u8]> + Default;

    const WIDTH: usize;
    /// Field description used in errors.
    const WHAT: &'static str;

    /// Value returned by [`read`] when the transfer comes up short.
    fn sentinel() -> Self;
    fn from_raw(raw: Self::Raw) -> Self;
    fn to_raw(self) -> Self::Raw;
}

impl WireScalar for CommandCode {
    type Raw = [u8; 2];
    const WIDTH: usize = 2;
    const WHAT: &'static str = "command code";

    fn sentinel() -> Self {
        CommandCode::Unknown
    }

    fn from_raw(raw: Self::Raw) -> Self {
        CommandCode::from_wire(u16::from_ne_bytes(raw))
    }

    fn to_raw(self) -> Self::Raw {
        self.to_wire().to_ne_bytes()
    }
}

impl WireScalar for u32 {
    type Raw = [u8; 4];
    const WIDTH: usize = 4;
    const WHAT: &'static str = "uint32";

    fn sentinel() -> Self {
        u32::MAX
    }

    fn from_raw(raw: Self::Raw) -> Self {
        u32::from_ne_bytes(raw)
    }

    fn to_raw(self) -> Self::Raw {
        self.to_ne_bytes()
    }
}

impl WireScalar for f32 {
    type Raw = [u8; 4];
    const WIDTH: usize = 4;
    const WHAT: &'static str = "float";

    fn sentinel() -> Self {
        f32::NAN
    }

    fn from_raw(raw: Self::Raw) -> Self {
        f32::from_ne_bytes(raw)
    }

    fn to_raw(self) -> Self::Raw {
        self.to_ne_bytes()
    }
}

impl WireScalar for f64 {
    type Raw = [u8; 8];
    const WIDTH: usize = 8;
    const WHAT: &'static str = "double";

    fn sentinel() -> Self {
        f64::NAN
    }

    fn from_raw(raw: Self::Raw) -> Self {
        f64::from_ne_bytes(raw)
    }

    fn to_raw(self) -> Self::Raw {
        self.to_ne_bytes()
    }
}

/// Read one scalar, failing on a short transfer.
pub fn try_read<T: WireScalar, R: ByteReader + ?Sized>(reader: &mut R) -> Result<T> {
    let mut raw = T::Raw::default();
    let actual = reader.read_bytes(raw.as_mut());
    if actual != T::WIDTH {
        return Err(ProtocolError::ShortRead {
            what: T::WHAT,
            expected: T::WIDTH,
            actual,
        });
    }
    Ok(T::from_raw(raw))
}

/// Read one scalar, returning its sentinel on a short transfer.
pub fn read<T: WireScalar, R: ByteReader + ?Sized>(reader: &mut R) -> T {
    try_read(reader).unwrap_or_else(|_| T::sentinel())
}

/// Write one scalar and return the number of bytes actually written.
pub fn write<T: WireScalar, W: ByteWriter + ?Sized>(writer: &mut W, value: T) -> usize {
    writer.write_bytes(value.to_raw().as_ref())
}

/// Write one scalar, failing on a short transfer.
pub fn try_write<T: WireScalar, W: ByteWriter + ?Sized>(writer: &mut W, value: T) -> Result<()> {
    let actual = write(writer, value);
    if actual != T::WIDTH {
        return Err(ProtocolError::ShortWrite {
            what: T::WHAT,
            expected: T::WIDTH,
            actual,
        });
    }
    Ok(())
}

/// Read a command code; unassigned values and short reads give `Unknown`.
pub fn read_command_code<R: ByteReader + ?Sized>(reader: &mut R) -> CommandCode {
    read(reader)
}

/// Read a command code, keeping the raw value of an unassigned code.
pub fn try_read_command_code<R: ByteReader + ?Sized>(reader: &mut R) -> Result<CommandCode> {
    let mut raw = [0u8; 2];
    let actual = reader.read_bytes(&mut raw);
    if actual != raw.len() {
        return Err(ProtocolError::ShortRead {
            what: CommandCode::WHAT,
            expected: raw.len(),
            actual,
        });
    }
    let value = u16::from_ne_bytes(raw);
    match CommandCode::from_wire(value) {
        CommandCode::Unknown => Err(ProtocolError::UnknownCommand(value)),
        code => Ok(code),
    }
}

pub fn write_command_code<W: ByteWriter + ?Sized>(writer: &mut W, code: CommandCode) -> usize {
    write(writer, code)
}

/// Read `dst.len()` scalars in one transfer and return the bytes read.
///
/// `dst` is only written when the whole array arrived.
pub fn read_array<T: WireScalar, R: ByteReader + ?Sized>(reader: &mut R, dst: &mut [T]) -> usize {
    let expected = T::WIDTH * dst.len();
    let mut buf = vec![0u8; expected];
    let actual = reader.read_bytes(&mut buf);
    if actual == expected {
        for (slot, chunk) in dst.iter_mut().zip(buf.chunks_exact(T::WIDTH)) {
            let mut raw = T::Raw::default();
            raw.as_mut().copy_from_slice(chunk);
            *slot = T::from_raw(raw);
        }
    }
    actual
}

/// Fill `dst` in one transfer, failing on a short transfer.
pub fn try_read_array_into<T: WireScalar, R: ByteReader + ?Sized>(
    reader: &mut R,
    dst: &mut [T],
) -> Result<()> {
    let expected = T::WIDTH * dst.len();
    let actual = read_array(reader, dst);
    if actual != expected {
        return Err(ProtocolError::ShortRead {
            what: T::WHAT,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Read `n` scalars in one transfer.
pub fn try_read_array<T: WireScalar, R: ByteReader + ?Sized>(
    reader: &mut R,
    n: usize,
) -> Result<Vec<T>> {
    let mut values = vec![T::sentinel(); n];
    try_read_array_into(reader, &mut values)?;
    Ok(values)
}

/// Write `src` in one transfer and return the bytes written.
pub fn write_array<T: WireScalar, W: ByteWriter + ?Sized>(writer: &mut W, src: &[T]) -> usize {
    let mut buf = Vec::with_capacity(T::WIDTH * src.len());
    for value in src {
        buf.extend_from_slice(value.to_raw().as_ref());
    }
    writer.write_bytes(&buf)
}

/// Write `src` in one transfer, failing on a short transfer.
pub fn try_write_array<T: WireScalar, W: ByteWriter + ?Sized>(
    writer: &mut W,
    src: &[T],
) -> Result<()> {
    let expected = T::WIDTH * src.len();
    let actual = write_array(writer, src);
    if actual != expected {
        return Err(ProtocolError::ShortWrite {
            what: T::WHAT,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Read and drop `n` bytes, returning how many were consumed.
pub fn discard<R: ByteReader + ?Sized>(reader: &mut R, n: usize) -> usize {
    let mut chunk = vec![0u8; n.min(DISCARD_CHUNK)];
    let mut consumed = 0usize;
    while consumed < n {
        let want = (n - consumed).min(chunk.len());
        let got = reader.read_bytes(&mut chunk[..want]);
        consumed += got;
        if got < want {
            break;
        }
    }
    consumed
}

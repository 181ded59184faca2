//! Typed command payloads.
//!
//! [`Command`] carries one variant per assigned code. Encoding and decoding
//! walk the same field order and use the same size helpers, so the two sides
//! cannot drift apart.

use renderlink_transport::{ByteReader, ByteWriter};
use tracing::debug;

use crate::codec::{
    discard, try_read, try_read_array, try_read_command_code, try_write, try_write_array,
};
use crate::command::CommandCode;
use crate::error::{ProtocolError, Result};
use crate::sizes::{self, MATRIX_4X4_ELEMENTS, RGB_CHANNELS};

/// Floats per `dots` vertex (xyz).
pub const DOT_VERTEX_FLOATS: usize = 3;
/// Floats per colored vertex (xyz + rgb) for `line`, `quad`, `polygon`.
pub const COLORED_VERTEX_FLOATS: usize = 6;
/// Floats per textured vertex (xyz + uv) for `bltTexture`.
pub const TEXTURED_VERTEX_FLOATS: usize = 5;

/// Default ceiling for one decoded array (256 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 256 * 1024 * 1024;

/// Column-major 4x4 identity.
pub const IDENTITY_4X4: [f32; MATRIX_4X4_ELEMENTS] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Bounds applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Largest array, in bytes, a single command may announce.
    pub max_payload_bytes: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Flat vertex data with a fixed number of floats per vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertices {
    floats_per_vertex: usize,
    data: Vec<f32>,
}

impl Vertices {
    /// Returns `None` unless `data` holds a whole number of vertices.
    pub fn new(floats_per_vertex: usize, data: Vec<f32>) -> Option<Self> {
        if floats_per_vertex == 0 || data.len() % floats_per_vertex != 0 {
            return None;
        }
        Some(Self {
            floats_per_vertex,
            data,
        })
    }

    pub fn floats_per_vertex(&self) -> usize {
        self.floats_per_vertex
    }

    pub fn vertex_count(&self) -> usize {
        self.data.len() / self.floats_per_vertex
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }
}

/// A decoded command with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    ClearScreen {
        color: [f32; RGB_CHANNELS],
    },
    Dots {
        point_size: f32,
        color: [f32; RGB_CHANNELS],
        round: bool,
        vertices: Vertices,
    },
    Flush,
    SetXform {
        matrix: [f32; MATRIX_4X4_ELEMENTS],
    },
    Line {
        vertices: Vertices,
    },
    Quad {
        vertices: Vertices,
    },
    CreateTexture {
        width: u32,
        height: u32,
        /// RGBA floats, row-major.
        pixels: Vec<f32>,
    },
    BltTexture {
        vertices: Vertices,
        phase: f32,
    },
    Test,
    Fullscreen,
    Windowed,
    Blocking,
    Nonblocking,
    ProfileOn,
    ProfileOff,
    Polygon {
        vertices: Vertices,
    },
    GetSecs,
}

impl Command {
    pub fn code(&self) -> CommandCode {
        match self {
            Command::Ping => CommandCode::Ping,
            Command::ClearScreen { .. } => CommandCode::ClearScreen,
            Command::Dots { .. } => CommandCode::Dots,
            Command::Flush => CommandCode::Flush,
            Command::SetXform { .. } => CommandCode::SetXform,
            Command::Line { .. } => CommandCode::Line,
            Command::Quad { .. } => CommandCode::Quad,
            Command::CreateTexture { .. } => CommandCode::CreateTexture,
            Command::BltTexture { .. } => CommandCode::BltTexture,
            Command::Test => CommandCode::Test,
            Command::Fullscreen => CommandCode::Fullscreen,
            Command::Windowed => CommandCode::Windowed,
            Command::Blocking => CommandCode::Blocking,
            Command::Nonblocking => CommandCode::Nonblocking,
            Command::ProfileOn => CommandCode::ProfileOn,
            Command::ProfileOff => CommandCode::ProfileOff,
            Command::Polygon { .. } => CommandCode::Polygon,
            Command::GetSecs => CommandCode::GetSecs,
        }
    }

    /// Build a payload-free command from its code.
    pub fn bare(code: CommandCode) -> Option<Command> {
        let command = match code {
            CommandCode::Ping => Command::Ping,
            CommandCode::Flush => Command::Flush,
            CommandCode::Test => Command::Test,
            CommandCode::Fullscreen => Command::Fullscreen,
            CommandCode::Windowed => Command::Windowed,
            CommandCode::Blocking => Command::Blocking,
            CommandCode::Nonblocking => Command::Nonblocking,
            CommandCode::ProfileOn => Command::ProfileOn,
            CommandCode::ProfileOff => Command::ProfileOff,
            CommandCode::GetSecs => Command::GetSecs,
            _ => return None,
        };
        Some(command)
    }

    /// Bytes this command occupies on the wire, code included.
    pub fn encoded_len(&self) -> usize {
        let payload = match self {
            Command::ClearScreen { .. } => sizes::size_of_float_rgb_color(),
            Command::Dots { vertices, .. } => {
                sizes::size_of_float_array(1)
                    + sizes::size_of_float_rgb_color()
                    + sizes::size_of_u32_array(2)
                    + sizes::size_of_float_array(vertices.as_slice().len())
            }
            Command::SetXform { .. } => sizes::size_of_float_4x4_matrix(),
            Command::Line { vertices }
            | Command::Quad { vertices }
            | Command::Polygon { vertices } => {
                sizes::size_of_u32_array(1) + sizes::size_of_float_array(vertices.as_slice().len())
            }
            Command::CreateTexture { pixels, .. } => {
                sizes::size_of_u32_array(2) + sizes::size_of_float_array(pixels.len())
            }
            Command::BltTexture { vertices, .. } => {
                sizes::size_of_u32_array(1)
                    + sizes::size_of_float_array(vertices.as_slice().len() + 1)
            }
            _ => 0,
        };
        sizes::size_of_command_code_array(1) + payload
    }

    /// Check that the fields match the command's wire layout.
    pub fn validate(&self) -> Result<()> {
        let command = self.code();
        let malformed = |reason: String| ProtocolError::MalformedPayload { command, reason };
        let expect_layout = |vertices: &Vertices, floats: usize| {
            if vertices.floats_per_vertex() != floats {
                return Err(malformed(format!(
                    "expected {floats} floats per vertex, got {}",
                    vertices.floats_per_vertex()
                )));
            }
            u32::try_from(vertices.vertex_count())
                .map(|_| ())
                .map_err(|_| malformed("vertex count exceeds u32".to_string()))
        };

        match self {
            Command::Dots { vertices, .. } => expect_layout(vertices, DOT_VERTEX_FLOATS),
            Command::Line { vertices }
            | Command::Quad { vertices }
            | Command::Polygon { vertices } => {
                expect_layout(vertices, COLORED_VERTEX_FLOATS)
            }
            Command::BltTexture { vertices, .. } => expect_layout(vertices, TEXTURED_VERTEX_FLOATS),
            Command::CreateTexture {
                width,
                height,
                pixels,
            } => {
                let expected =
                    sizes::checked_rgba_texture_elements(*width as usize, *height as usize)
                        .ok_or_else(|| malformed("texture size overflows".to_string()))?;
                if pixels.len() != expected {
                    return Err(malformed(format!(
                        "{width}x{height} texture needs {expected} floats, got {}",
                        pixels.len()
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Write the code and payload. Validates first, so nothing is written for
    /// a malformed command.
    pub fn encode<W: ByteWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        self.validate()?;
        try_write(writer, self.code())?;

        match self {
            Command::ClearScreen { color } => try_write_array(writer, color)?,
            Command::Dots {
                point_size,
                color,
                round,
                vertices,
            } => {
                try_write(writer, *point_size)?;
                try_write_array(writer, color)?;
                try_write(writer, u32::from(*round))?;
                write_vertex_block(writer, vertices)?;
            }
            Command::SetXform { matrix } => try_write_array(writer, matrix)?,
            Command::Line { vertices }
            | Command::Quad { vertices }
            | Command::Polygon { vertices } => {
                write_vertex_block(writer, vertices)?;
            }
            Command::CreateTexture {
                width,
                height,
                pixels,
            } => {
                try_write(writer, *width)?;
                try_write(writer, *height)?;
                try_write_array(writer, pixels)?;
            }
            Command::BltTexture { vertices, phase } => {
                write_vertex_block(writer, vertices)?;
                try_write(writer, *phase)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Read a command code and its payload.
    pub fn decode<R: ByteReader + ?Sized>(
        reader: &mut R,
        limits: &DecodeLimits,
    ) -> Result<Command> {
        let code = try_read_command_code(reader)?;
        Self::decode_payload(code, reader, limits)
    }

    /// Read the payload of a command whose code has already been consumed.
    ///
    /// The whole announced payload is consumed even when it is rejected for
    /// size, so the next read starts on a command boundary. Only
    /// [`ProtocolError::SizeOverflow`] and short reads leave the stream
    /// misaligned.
    pub fn decode_payload<R: ByteReader + ?Sized>(
        code: CommandCode,
        reader: &mut R,
        limits: &DecodeLimits,
    ) -> Result<Command> {
        if let Some(command) = Command::bare(code) {
            return Ok(command);
        }

        let command = match code {
            CommandCode::ClearScreen => Command::ClearScreen {
                color: read_fixed(reader)?,
            },
            CommandCode::Dots => {
                let point_size = try_read(reader)?;
                let color = read_fixed(reader)?;
                let round = try_read::<u32, _>(reader)? != 0;
                let vertices = read_vertex_block(reader, code, DOT_VERTEX_FLOATS, limits)?;
                Command::Dots {
                    point_size,
                    color,
                    round,
                    vertices,
                }
            }
            CommandCode::SetXform => Command::SetXform {
                matrix: read_fixed(reader)?,
            },
            CommandCode::Line => Command::Line {
                vertices: read_vertex_block(reader, code, COLORED_VERTEX_FLOATS, limits)?,
            },
            CommandCode::Quad => Command::Quad {
                vertices: read_vertex_block(reader, code, COLORED_VERTEX_FLOATS, limits)?,
            },
            CommandCode::Polygon => Command::Polygon {
                vertices: read_vertex_block(reader, code, COLORED_VERTEX_FLOATS, limits)?,
            },
            CommandCode::CreateTexture => {
                let width: u32 = try_read(reader)?;
                let height: u32 = try_read(reader)?;
                let elements = sizes::checked_rgba_texture_elements(width as usize, height as usize)
                    .ok_or(ProtocolError::SizeOverflow { command: code })?;
                let pixels = read_float_block(reader, code, elements, limits)?;
                Command::CreateTexture {
                    width,
                    height,
                    pixels,
                }
            }
            CommandCode::BltTexture => {
                // The trailing phase is consumed even if the vertex block was rejected.
                let vertices = read_vertex_block(reader, code, TEXTURED_VERTEX_FLOATS, limits);
                let phase = try_read(reader);
                Command::BltTexture {
                    vertices: vertices?,
                    phase: phase?,
                }
            }
            _ => return Err(ProtocolError::UnknownCommand(code.to_wire())),
        };

        debug!(command = %code, bytes = command.encoded_len(), "payload decoded");
        Ok(command)
    }
}

fn read_fixed<const N: usize, R: ByteReader + ?Sized>(reader: &mut R) -> Result<[f32; N]> {
    let mut values = [0.0f32; N];
    crate::codec::try_read_array_into(reader, &mut values)?;
    Ok(values)
}

fn write_vertex_block<W: ByteWriter + ?Sized>(writer: &mut W, vertices: &Vertices) -> Result<()> {
    let count = u32::try_from(vertices.vertex_count()).map_err(|_| ProtocolError::ShortWrite {
        what: "vertex count",
        expected: sizes::size_of_u32_array(1),
        actual: 0,
    })?;
    try_write(writer, count)?;
    try_write_array(writer, vertices.as_slice())
}

fn read_vertex_block<R: ByteReader + ?Sized>(
    reader: &mut R,
    command: CommandCode,
    floats_per_vertex: usize,
    limits: &DecodeLimits,
) -> Result<Vertices> {
    let count: u32 = try_read(reader)?;
    let floats = (count as usize)
        .checked_mul(floats_per_vertex)
        .ok_or(ProtocolError::SizeOverflow { command })?;
    let data = read_float_block(reader, command, floats, limits)?;
    Ok(Vertices {
        floats_per_vertex,
        data,
    })
}

fn read_float_block<R: ByteReader + ?Sized>(
    reader: &mut R,
    command: CommandCode,
    count: usize,
    limits: &DecodeLimits,
) -> Result<Vec<f32>> {
    let size = sizes::checked_float_array_size(count)
        .ok_or(ProtocolError::SizeOverflow { command })?;
    if size > limits.max_payload_bytes {
        let drained = discard(reader, size);
        if drained < size {
            return Err(ProtocolError::ShortRead {
                what: "float array",
                expected: size,
                actual: drained,
            });
        }
        return Err(ProtocolError::PayloadTooLarge {
            command,
            size,
            max: limits.max_payload_bytes,
        });
    }
    try_read_array(reader, count)
}

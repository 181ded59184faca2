//! Byte sizes of arrays of wire scalars.
//!
//! Encoders and decoders both call these, so the two sides never compute an
//! array length with different arithmetic.

use crate::command::CommandCode;

const COMMAND_CODE_WIDTH: usize = std::mem::size_of::<CommandCode>();
const UINT32_WIDTH: usize = std::mem::size_of::<u32>();
const FLOAT_WIDTH: usize = std::mem::size_of::<f32>();
const DOUBLE_WIDTH: usize = std::mem::size_of::<f64>();

/// Channels per texel of an RGBA texture.
pub const RGBA_CHANNELS: usize = 4;
/// Channels of an RGB color.
pub const RGB_CHANNELS: usize = 3;
/// Elements of a 4x4 matrix.
pub const MATRIX_4X4_ELEMENTS: usize = 16;

/// Byte size of `n` command codes.
pub fn size_of_command_code_array(n: usize) -> usize {
    COMMAND_CODE_WIDTH.saturating_mul(n)
}

/// Byte size of `n` u32 values.
pub fn size_of_u32_array(n: usize) -> usize {
    UINT32_WIDTH.saturating_mul(n)
}

/// Byte size of `n` f64 values.
pub fn size_of_double_array(n: usize) -> usize {
    DOUBLE_WIDTH.saturating_mul(n)
}

/// Byte size of `n` f32 values.
pub fn size_of_float_array(n: usize) -> usize {
    FLOAT_WIDTH.saturating_mul(n)
}

/// Byte size of `n_vertices` vertices of `n_dimensions` floats each.
pub fn size_of_float_vertex_array(n_vertices: usize, n_dimensions: usize) -> usize {
    size_of_float_array(n_vertices.saturating_mul(n_dimensions))
}

/// Byte size of a `width` x `height` RGBA float texture. Saturates at
/// `usize::MAX` when the size does not fit.
pub fn size_of_float_rgba_texture(width: usize, height: usize) -> usize {
    checked_rgba_texture_elements(width, height)
        .and_then(checked_float_array_size)
        .unwrap_or(usize::MAX)
}

/// Byte size of an RGB float color.
pub fn size_of_float_rgb_color() -> usize {
    size_of_float_array(RGB_CHANNELS)
}

/// Byte size of a 4x4 float matrix.
pub fn size_of_float_4x4_matrix() -> usize {
    size_of_float_array(MATRIX_4X4_ELEMENTS)
}

/// Element count of an RGBA texture, `None` if it overflows.
pub fn checked_rgba_texture_elements(width: usize, height: usize) -> Option<usize> {
    width.checked_mul(height)?.checked_mul(RGBA_CHANNELS)
}

/// Byte size of `n` floats, `None` if it overflows.
pub fn checked_float_array_size(n: usize) -> Option<usize> {
    n.checked_mul(FLOAT_WIDTH)
}

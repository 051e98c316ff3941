//! Reference quantization and dequantization for the Q4_0 and Q8_0 block
//! formats.
//!
//! All routines parse and emit explicit little-endian bytes so tensor storage
//! carries no alignment requirement. Block layouts:
//!
//! - Q8_0 (34 bytes, 32 elements): 2-byte f16 scale, then 32 signed 8-bit
//!   quants. Value: `q * d`.
//! - Q4_0 (18 bytes, 32 elements): 2-byte f16 scale, then 16 bytes of packed
//!   4-bit values (2 per byte, lower nibble first). Value: `(nibble - 8) * d`.

use half::f16;

use crate::dtype::{DType, QK};

/// Byte length of one Q8_0 block.
pub const Q8_0_BLOCK_BYTES: usize = 34;
/// Byte length of one Q4_0 block.
pub const Q4_0_BLOCK_BYTES: usize = 18;

/// Quantize one row of f32 values into Q8_0 blocks.
///
/// `src.len()` must be a multiple of 32 and `dst` must hold exactly
/// `src.len() / 32` blocks of 34 bytes.
///
/// # Panics
/// Panics if the lengths disagree.
pub fn quantize_row_q8_0(src: &[f32], dst: &mut [u8]) {
    assert_eq!(src.len() % QK, 0, "row length must be a multiple of {}", QK);
    let n_blocks = src.len() / QK;
    assert_eq!(dst.len(), n_blocks * Q8_0_BLOCK_BYTES);

    for (block_idx, values) in src.chunks_exact(QK).enumerate() {
        let block = &mut dst[block_idx * Q8_0_BLOCK_BYTES..][..Q8_0_BLOCK_BYTES];

        let amax = values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        let d = amax / 127.0;
        let id = if d != 0.0 { 1.0 / d } else { 0.0 };

        block[..2].copy_from_slice(&f16::from_f32(d).to_le_bytes());
        for (i, &v) in values.iter().enumerate() {
            let q = (v * id).round().clamp(-127.0, 127.0) as i8;
            block[2 + i] = q as u8;
        }
    }
}

/// Quantize one row of f32 values into Q4_0 blocks.
///
/// The scale is derived from the signed value of largest magnitude
/// (`d = max / -8`) so the full [-8, 7] nibble range is used.
///
/// # Panics
/// Panics if `src.len()` is not a multiple of 32 or `dst` has the wrong size.
pub fn quantize_row_q4_0(src: &[f32], dst: &mut [u8]) {
    assert_eq!(src.len() % QK, 0, "row length must be a multiple of {}", QK);
    let n_blocks = src.len() / QK;
    assert_eq!(dst.len(), n_blocks * Q4_0_BLOCK_BYTES);

    for (block_idx, values) in src.chunks_exact(QK).enumerate() {
        let block = &mut dst[block_idx * Q4_0_BLOCK_BYTES..][..Q4_0_BLOCK_BYTES];

        // Signed max by magnitude, so the sign of the extreme value lands in d.
        let mut max = 0.0f32;
        let mut amax = 0.0f32;
        for &v in values {
            if v.abs() > amax {
                amax = v.abs();
                max = v;
            }
        }
        let d = max / -8.0;
        let id = if d != 0.0 { 1.0 / d } else { 0.0 };

        block[..2].copy_from_slice(&f16::from_f32(d).to_le_bytes());
        for i in 0..QK / 2 {
            let lo = quantize_nibble(values[2 * i], id);
            let hi = quantize_nibble(values[2 * i + 1], id);
            block[2 + i] = lo | (hi << 4);
        }
    }
}

fn quantize_nibble(v: f32, id: f32) -> u8 {
    ((v * id + 8.0).round().clamp(0.0, 15.0)) as u8
}

/// Dequantize one row of Q8_0 blocks to f32.
///
/// # Panics
/// Panics if the lengths disagree (see [`quantize_row_q8_0`]).
pub fn dequantize_row_q8_0(src: &[u8], dst: &mut [f32]) {
    assert_eq!(dst.len() % QK, 0);
    let n_blocks = dst.len() / QK;
    assert_eq!(src.len(), n_blocks * Q8_0_BLOCK_BYTES);

    for block_idx in 0..n_blocks {
        let block = &src[block_idx * Q8_0_BLOCK_BYTES..][..Q8_0_BLOCK_BYTES];
        let d = f16::from_le_bytes([block[0], block[1]]).to_f32();
        for i in 0..QK {
            dst[block_idx * QK + i] = (block[2 + i] as i8) as f32 * d;
        }
    }
}

/// Dequantize one row of Q4_0 blocks to f32.
///
/// # Panics
/// Panics if the lengths disagree (see [`quantize_row_q4_0`]).
pub fn dequantize_row_q4_0(src: &[u8], dst: &mut [f32]) {
    assert_eq!(dst.len() % QK, 0);
    let n_blocks = dst.len() / QK;
    assert_eq!(src.len(), n_blocks * Q4_0_BLOCK_BYTES);

    for block_idx in 0..n_blocks {
        let block = &src[block_idx * Q4_0_BLOCK_BYTES..][..Q4_0_BLOCK_BYTES];
        let d = f16::from_le_bytes([block[0], block[1]]).to_f32();
        for i in 0..QK / 2 {
            let byte = block[2 + i];
            let lo = (byte & 0x0F) as i32 - 8;
            let hi = ((byte >> 4) & 0x0F) as i32 - 8;
            dst[block_idx * QK + 2 * i] = lo as f32 * d;
            dst[block_idx * QK + 2 * i + 1] = hi as f32 * d;
        }
    }
}

/// Dequantize one row of quantized blocks to f32, dispatching on dtype.
///
/// # Panics
/// Panics if `dtype` is not a quantized format.
pub fn dequantize_row(dtype: DType, src: &[u8], dst: &mut [f32]) {
    match dtype {
        DType::Q4_0 => dequantize_row_q4_0(src, dst),
        DType::Q8_0 => dequantize_row_q8_0(src, dst),
        other => panic!("dequantize_row: {} is not a quantized format", other),
    }
}

/// Unpack one quantized block into signed 8-bit integers, returning the
/// block's f32 scale factor.
///
/// For Q8_0 the quants are copied as-is; for Q4_0 each nibble is widened to
/// `nibble - 8`. The integer result times the returned scale reproduces the
/// dequantized values exactly.
///
/// # Panics
/// Panics if `block` is not exactly one block of the given dtype, or if
/// `dtype` is not a quantized format.
pub fn unpack_block_i8(dtype: DType, block: &[u8], out: &mut [i8; QK]) -> f32 {
    assert_eq!(block.len(), dtype.size_in_bytes());
    let d = f16::from_le_bytes([block[0], block[1]]).to_f32();
    match dtype {
        DType::Q8_0 => {
            for i in 0..QK {
                out[i] = block[2 + i] as i8;
            }
        }
        DType::Q4_0 => {
            for i in 0..QK / 2 {
                let byte = block[2 + i];
                out[2 * i] = (byte & 0x0F) as i8 - 8;
                out[2 * i + 1] = ((byte >> 4) & 0x0F) as i8 - 8;
            }
        }
        other => panic!("unpack_block_i8: {} is not a quantized format", other),
    }
    d
}

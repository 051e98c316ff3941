//! `tm-tensor` - Tensor descriptors and quantized block formats for tilemul.
//!
//! This crate provides:
//! - `DType` element type tags (F32, F16, Q4_0, Q8_0)
//! - Borrowed 2D descriptors: read-only `TensorView`, concurrently writable
//!   `OutputView`
//! - Reference quantize/dequantize routines for the Q4_0 and Q8_0 block
//!   formats
//! - Shape utilities

pub mod dtype;
pub mod error;
pub mod quant;
pub mod shape;
pub mod view;

// Re-export primary types at the crate root for convenience.
pub use dtype::{DType, QK};
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use view::{OutputView, TensorData, TensorView};

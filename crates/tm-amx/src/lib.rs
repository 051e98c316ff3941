//! `tm-amx` - AMX-style tiled quantized matrix multiplication.
//!
//! The accelerated matmul path of the tilemul backend:
//! - `detect`: one-time probing of the required instruction-set extensions
//!   (integer tile multiply + AVX-512 VNNI) and the per-dtype support table
//! - `tile`: tile-register configuration with guaranteed release, behind the
//!   `TileOps` seam (one implementation per target architecture)
//! - `matmul`: the tiled Q4_0/Q8_0 x f32 multiply kernel, parallelized over
//!   worker threads via `tm-parallel`
//!
//! The call surface a graph executor uses per eligible node is
//! `detect::is_available()`, `detect::supports_dtype(..)` and
//! `matmul::matmul(..)`; precondition violations past that gate are
//! programming errors, not recoverable failures.

pub mod detect;
pub mod matmul;
pub mod tile;

// Re-export primary entry points at the crate root for convenience.
pub use detect::{is_available, supports_dtype};
pub use matmul::{matmul, required_work_size, ROW_BLOCK};
pub use tile::{SoftwareTiles, TileConfig, TileOps, TileScope};

//! `tm-parallel` - Cooperative work distribution for tilemul kernels.
//!
//! This crate provides the protocol any accelerated kernel uses to spread
//! one logical operation across a fixed set of worker threads:
//! - `ThreadPool`: a reusable generation-counted barrier plus an atomic
//!   chunk counter for dynamic work claiming
//! - `ComputeContext`: the per-thread invocation record a scheduler hands to
//!   a kernel
//! - `WorkBuffer`: shared scratch memory carved into disjoint spans
//! - `parallel_region`: a scoped-thread driver for dispatching a region
//!
//! Threads synchronize only through the barrier and the chunk counter; no
//! lock is held across computation.

pub mod context;
pub mod pool;

pub use context::{ComputeContext, WorkBuffer};
pub use pool::{parallel_region, ThreadPool};

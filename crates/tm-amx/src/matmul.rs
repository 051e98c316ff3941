//! The tiled quantized matrix-multiply kernel.
//!
//! Computes `result = activations @ weights^T` for Q4_0/Q8_0 weights and f32
//! activations, producing f32 output. Every worker thread of a parallel
//! region calls [`matmul`] with its own [`ComputeContext`]; the threads
//! cooperate through the pool's chunk counter and barrier and return only
//! once the whole output is written.
//!
//! Per invocation, each thread runs two phases:
//! 1. Activation rows are quantized to Q8_0 into the shared work buffer
//!    (static partition by thread index), then all threads barrier.
//! 2. Output row blocks of [`ROW_BLOCK`] rows are claimed dynamically from
//!    the chunk counter, so faster threads absorb more blocks. Each block is
//!    computed tile by tile: one 32-element K-block per tile step, i8 x i8
//!    accumulated in i32, then folded into f32 with the two block scales.
//!    A final barrier guarantees the caller observes a fully written result.
//!
//! Preconditions (supported dtype, transpose-compatible shapes, sufficient
//! work buffer) are the caller's contract, checked with assertions rather
//! than returned errors; this path is only reached after the scheduler has
//! verified support via [`crate::detect`].

use tm_parallel::ComputeContext;
use tm_tensor::quant::{quantize_row_q8_0, unpack_block_i8, Q8_0_BLOCK_BYTES};
use tm_tensor::{DType, OutputView, TensorView, QK};

use crate::detect;
use crate::tile::{SoftwareTiles, TileConfig, TileOps, TileScope, MAX_TILE_ROWS};

/// Output rows per claimable chunk, sized to the hardware tile height.
pub const ROW_BLOCK: usize = MAX_TILE_ROWS;
/// Weight rows (output columns) per tile step.
const COL_BLOCK: usize = 16;

// Tile register assignment: accumulator, activations, weights.
const TILE_ACC: usize = 0;
const TILE_LHS: usize = 1;
const TILE_RHS: usize = 2;

/// Scratch bytes one invocation needs: every activation row quantized to
/// Q8_0. The scheduler allocates a [`tm_parallel::WorkBuffer`] of at least
/// this capacity before dispatching.
pub fn required_work_size(activations: &TensorView) -> usize {
    activations.rows() * DType::Q8_0.row_size_in_bytes(activations.cols())
}

/// Tiled quantized multiply: `result = activations @ weights^T`.
///
/// - `weights`: Q4_0 or Q8_0, shape `[n, k]`
/// - `activations`: f32, shape `[m, k]`
/// - `result`: f32, shape `[m, n]`
/// - `ctx`: this worker's slice of the parallel region
///
/// Must be called by every thread of the region with the same operands. The
/// output is bitwise identical regardless of the thread count.
///
/// # Panics
/// Panics (or fails debug assertions) on contract violations: unsupported
/// weight dtype, non-f32 activations, incompatible shapes, a work buffer
/// smaller than [`required_work_size`], or `k` not a whole number of blocks.
pub fn matmul(
    weights: &TensorView,
    activations: &TensorView,
    result: &OutputView,
    ctx: &ComputeContext,
) {
    let m = activations.rows();
    let k = activations.cols();
    let n = weights.rows();

    debug_assert!(
        detect::supports_dtype(weights.dtype()),
        "unsupported weight dtype {}",
        weights.dtype()
    );
    debug_assert_eq!(weights.cols(), k, "reduction dimensions disagree");
    debug_assert_eq!(result.rows(), m, "result rows must match activations");
    debug_assert_eq!(result.cols(), n, "result cols must match weight rows");

    let a = activations.as_f32().expect("activations must be f32");
    let qa_row_bytes = DType::Q8_0.row_size_in_bytes(k);
    assert!(
        ctx.work.capacity() >= m * qa_row_bytes,
        "work buffer holds {} bytes, invocation needs {}",
        ctx.work.capacity(),
        m * qa_row_bytes
    );

    let ith = ctx.thread_index;
    let nth = ctx.thread_count;

    // Phase 1: quantize activation rows into the shared work buffer.
    // Static partition; row ranges are disjoint per thread.
    let mut row = ith;
    while row < m {
        let dst = unsafe { ctx.work.span(row * qa_row_bytes, qa_row_bytes) };
        quantize_row_q8_0(&a[row * k..(row + 1) * k], dst);
        row += nth;
    }
    if ith == 0 {
        ctx.pool.chunk_set(nth);
    }
    ctx.pool.barrier();

    // Phase 2: claim output row blocks until none remain. The quantized
    // activations are read-only from here to the end of the region.
    let qa = unsafe { ctx.work.as_slice() };
    let n_row_blocks = m.div_ceil(ROW_BLOCK);

    let mut tiles = SoftwareTiles::new();
    {
        let mut tiles = TileScope::activate(&mut tiles, TileConfig::full());
        let mut current = ith;
        while current < n_row_blocks {
            let r0 = current * ROW_BLOCK;
            let r1 = (r0 + ROW_BLOCK).min(m);
            // Safety: each row block is claimed by exactly one thread.
            let out = unsafe { result.row_block_mut(r0, r1) };
            let qa_rows = &qa[r0 * qa_row_bytes..r1 * qa_row_bytes];
            gemm_row_block(&mut *tiles, weights, qa_rows, out, r1 - r0, n, k);
            current = ctx.pool.chunk_add(1);
        }
    }
    ctx.pool.barrier();
}

/// Compute `mr` output rows against all `n` weight rows.
///
/// `qa_rows` holds the rows' Q8_0 blocks; `out` is their `mr * n` output
/// span. Works through the tile file in 16-column strips, one 32-element
/// K-block per `dpbssd`, so each integer accumulator pairs with exactly one
/// scale per operand.
fn gemm_row_block(
    tiles: &mut impl TileOps,
    weights: &TensorView,
    qa_rows: &[u8],
    out: &mut [f32],
    mr: usize,
    n: usize,
    k: usize,
) {
    let wtype = weights.dtype();
    let wblock_bytes = wtype.size_in_bytes();
    let blocks_per_row = k / QK;
    let groups = QK / 4; // VNNI rows per K-block

    let mut a_tile = [0i8; MAX_TILE_ROWS * QK];
    let mut b_tile = [0i8; (QK / 4) * 4 * COL_BLOCK];
    let mut acc = [0i32; MAX_TILE_ROWS * COL_BLOCK];
    let mut da = [0.0f32; MAX_TILE_ROWS];
    let mut db = [0.0f32; COL_BLOCK];
    let mut unpacked = [0i8; QK];

    for j0 in (0..n).step_by(COL_BLOCK) {
        let jn = COL_BLOCK.min(n - j0);
        let mut accf = [0.0f32; MAX_TILE_ROWS * COL_BLOCK];

        for kb in 0..blocks_per_row {
            // Activation tile: mr rows of one Q8_0 block each.
            for r in 0..mr {
                let block =
                    &qa_rows[r * blocks_per_row * Q8_0_BLOCK_BYTES + kb * Q8_0_BLOCK_BYTES..]
                        [..Q8_0_BLOCK_BYTES];
                da[r] = unpack_block_i8(DType::Q8_0, block, &mut unpacked);
                a_tile[r * QK..(r + 1) * QK].copy_from_slice(&unpacked);
            }

            // Weight tile in VNNI layout: row g carries 4-byte group g of
            // every column in the strip.
            for (jcol, db_slot) in db.iter_mut().enumerate().take(jn) {
                let wrow = weights.quantized_row(j0 + jcol);
                let block = &wrow[kb * wblock_bytes..][..wblock_bytes];
                *db_slot = unpack_block_i8(wtype, block, &mut unpacked);
                for g in 0..groups {
                    for l in 0..4 {
                        b_tile[g * 4 * jn + 4 * jcol + l] = unpacked[4 * g + l];
                    }
                }
            }

            tiles.zero(TILE_ACC);
            tiles.load(TILE_LHS, &a_tile[..mr * QK], mr, QK);
            tiles.load(TILE_RHS, &b_tile[..groups * 4 * jn], groups, 4 * jn);
            tiles.dpbssd(TILE_ACC, TILE_LHS, TILE_RHS);
            tiles.store(TILE_ACC, &mut acc[..mr * jn]);

            // Dequantize the integer partial sums: one scale pair per block.
            for r in 0..mr {
                for c in 0..jn {
                    accf[r * COL_BLOCK + c] += da[r] * db[c] * acc[r * jn + c] as f32;
                }
            }
        }

        for r in 0..mr {
            for c in 0..jn {
                out[r * n + j0 + c] = accf[r * COL_BLOCK + c];
            }
        }
    }
}

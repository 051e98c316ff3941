//! Tile-register configuration and the tile instruction seam.
//!
//! The accelerator exposes 8 tile registers of up to 16 rows x 64 bytes.
//! Exactly one [`TileConfig`] is active per thread at a time: it is programmed
//! before kernel math runs and released afterward. The instruction surface is
//! the [`TileOps`] trait, one implementation per target; [`SoftwareTiles`] is
//! the portable model with exact `TDPBSSD` semantics, and a hardware-backed
//! implementation plugs in behind the same trait. Tile state is per-thread,
//! never shared, so none of this needs synchronization.

/// Maximum rows of a tile register.
pub const MAX_TILE_ROWS: usize = 16;
/// Maximum bytes per tile-register row.
pub const MAX_TILE_COLSB: usize = 64;
/// Number of tile registers.
pub const NUM_TILE_REGS: usize = 8;
/// The only palette the hardware defines besides "unconfigured".
pub const TILE_PALETTE: u8 = 1;

/// Geometry of the tile-register file while configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileConfig {
    /// Register-file partition scheme; 1 is the only defined palette.
    pub palette_id: u8,
    /// First hardware row assigned to tile 0.
    pub start_row: u8,
    /// Rows per tile.
    pub rows: u8,
    /// Bytes per tile row.
    pub colsb: u8,
}

impl TileConfig {
    /// A configuration of `rows` x `colsb` bytes on palette 1.
    ///
    /// # Panics
    /// Panics if the geometry exceeds the hardware maximum of 16 rows x 64
    /// bytes, or is zero-sized.
    pub fn new(rows: usize, colsb: usize) -> Self {
        assert!(
            (1..=MAX_TILE_ROWS).contains(&rows) && (1..=MAX_TILE_COLSB).contains(&colsb),
            "tile geometry {}x{} outside 1..={} rows x 1..={} bytes",
            rows,
            colsb,
            MAX_TILE_ROWS,
            MAX_TILE_COLSB
        );
        TileConfig {
            palette_id: TILE_PALETTE,
            start_row: 0,
            rows: rows as u8,
            colsb: colsb as u8,
        }
    }

    /// The full 16-row x 64-byte configuration the matmul kernel uses.
    pub fn full() -> Self {
        TileConfig::new(MAX_TILE_ROWS, MAX_TILE_COLSB)
    }
}

/// The tile instruction surface, one implementation per target architecture.
///
/// State machine: Unconfigured -> `configure` -> Configured -> `release` ->
/// Unconfigured. Configuring while configured is a programming error caught
/// by debug assertions; `release` on an unconfigured file is an idempotent
/// no-op (the documented choice here; see the state-machine tests).
pub trait TileOps {
    /// Program the register file for the given geometry.
    fn configure(&mut self, config: TileConfig);

    /// Reset the register file to the unconfigured state. Idempotent.
    fn release(&mut self);

    /// Whether a configuration is currently active.
    fn is_configured(&self) -> bool;

    /// Load `rows` x `colsb` bytes of signed 8-bit data into a tile,
    /// row-major with stride `colsb`.
    fn load(&mut self, tile: usize, src: &[i8], rows: usize, colsb: usize);

    /// Zero a tile's contents.
    fn zero(&mut self, tile: usize);

    /// Integer tile multiply-accumulate with `TDPBSSD` semantics:
    /// treating `lhs` as i8 rows of 4-byte groups and `rhs` as VNNI-packed
    /// i8 (each row holds one 4-byte group of every output column),
    /// accumulate i32 dot products into `dst`.
    fn dpbssd(&mut self, dst: usize, lhs: usize, rhs: usize);

    /// Store a tile's i32 contents into `dst`, row-major and tightly packed.
    fn store(&self, tile: usize, dst: &mut [i32]);
}

/// Portable model of the tile register file.
///
/// Byte-for-byte the semantics of the hardware instructions, minus the
/// hardware: tiles are plain arrays and `dpbssd` is the documented
/// i8 x i8 -> i32 groups-of-four reduction. Kernels written against
/// [`TileOps`] run unchanged on targets without the accelerator.
#[derive(Debug)]
pub struct SoftwareTiles {
    config: Option<TileConfig>,
    regs: [TileReg; NUM_TILE_REGS],
}

#[derive(Debug, Clone, Copy)]
struct TileReg {
    rows: usize,
    colsb: usize,
    bytes: [u8; MAX_TILE_ROWS * MAX_TILE_COLSB],
}

impl TileReg {
    const EMPTY: TileReg = TileReg {
        rows: 0,
        colsb: 0,
        bytes: [0; MAX_TILE_ROWS * MAX_TILE_COLSB],
    };

    fn i8_at(&self, row: usize, col: usize) -> i32 {
        self.bytes[row * self.colsb + col] as i8 as i32
    }

    fn i32_at(&self, row: usize, col: usize) -> i32 {
        let off = row * self.colsb + col * 4;
        i32::from_le_bytes([
            self.bytes[off],
            self.bytes[off + 1],
            self.bytes[off + 2],
            self.bytes[off + 3],
        ])
    }

    fn set_i32(&mut self, row: usize, col: usize, value: i32) {
        let off = row * self.colsb + col * 4;
        self.bytes[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl SoftwareTiles {
    pub fn new() -> Self {
        SoftwareTiles {
            config: None,
            regs: [TileReg::EMPTY; NUM_TILE_REGS],
        }
    }
}

impl Default for SoftwareTiles {
    fn default() -> Self {
        Self::new()
    }
}

impl TileOps for SoftwareTiles {
    fn configure(&mut self, config: TileConfig) {
        debug_assert!(
            self.config.is_none(),
            "tile configure while already configured; release first"
        );
        debug_assert_eq!(config.palette_id, TILE_PALETTE, "unknown tile palette");
        self.config = Some(config);
    }

    fn release(&mut self) {
        self.config = None;
        self.regs = [TileReg::EMPTY; NUM_TILE_REGS];
    }

    fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    fn load(&mut self, tile: usize, src: &[i8], rows: usize, colsb: usize) {
        debug_assert!(self.config.is_some(), "tile load while unconfigured");
        debug_assert!(rows <= MAX_TILE_ROWS && colsb <= MAX_TILE_COLSB);
        assert!(src.len() >= rows * colsb, "tile load source too short");

        let reg = &mut self.regs[tile];
        reg.rows = rows;
        reg.colsb = colsb;
        for (dst, &s) in reg.bytes[..rows * colsb].iter_mut().zip(src) {
            *dst = s as u8;
        }
    }

    fn zero(&mut self, tile: usize) {
        debug_assert!(self.config.is_some(), "tile zero while unconfigured");
        self.regs[tile].bytes = [0; MAX_TILE_ROWS * MAX_TILE_COLSB];
    }

    fn dpbssd(&mut self, dst: usize, lhs: usize, rhs: usize) {
        debug_assert!(self.config.is_some(), "tile dpbssd while unconfigured");
        debug_assert!(dst != lhs && dst != rhs, "dpbssd operands must be distinct");

        let (m, kb) = (self.regs[lhs].rows, self.regs[lhs].colsb);
        debug_assert_eq!(kb % 4, 0, "lhs row bytes must be whole 4-byte groups");
        let groups = kb / 4;
        debug_assert_eq!(
            self.regs[rhs].rows, groups,
            "rhs rows must match lhs 4-byte groups"
        );
        let n = self.regs[rhs].colsb / 4;

        // The accumulator geometry follows the operands.
        self.regs[dst].rows = m;
        self.regs[dst].colsb = 4 * n;

        for r in 0..m {
            for c in 0..n {
                let mut sum = self.regs[dst].i32_at(r, c);
                for g in 0..groups {
                    for l in 0..4 {
                        sum += self.regs[lhs].i8_at(r, 4 * g + l)
                            * self.regs[rhs].i8_at(g, 4 * c + l);
                    }
                }
                self.regs[dst].set_i32(r, c, sum);
            }
        }
    }

    fn store(&self, tile: usize, dst: &mut [i32]) {
        debug_assert!(self.config.is_some(), "tile store while unconfigured");
        let reg = &self.regs[tile];
        let (rows, cols) = (reg.rows, reg.colsb / 4);
        assert!(dst.len() >= rows * cols, "tile store destination too short");
        for r in 0..rows {
            for c in 0..cols {
                dst[r * cols + c] = reg.i32_at(r, c);
            }
        }
    }
}

/// Guaranteed-release guard around an active tile configuration.
///
/// `activate` programs the register file; dropping the scope releases it on
/// every exit path, so a panic or early return in kernel math cannot leave
/// stale tile state behind.
pub struct TileScope<'a, T: TileOps> {
    tiles: &'a mut T,
}

impl<'a, T: TileOps> TileScope<'a, T> {
    pub fn activate(tiles: &'a mut T, config: TileConfig) -> Self {
        tiles.configure(config);
        TileScope { tiles }
    }
}

impl<T: TileOps> std::ops::Deref for TileScope<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.tiles
    }
}

impl<T: TileOps> std::ops::DerefMut for TileScope<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.tiles
    }
}

impl<T: TileOps> Drop for TileScope<'_, T> {
    fn drop(&mut self) {
        self.tiles.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_without_activate_is_noop() {
        let mut tiles = SoftwareTiles::new();
        assert!(!tiles.is_configured());
        tiles.release();
        tiles.release();
        assert!(!tiles.is_configured());
    }

    #[test]
    fn test_activate_release_roundtrip() {
        let mut tiles = SoftwareTiles::new();
        tiles.configure(TileConfig::full());
        assert!(tiles.is_configured());
        tiles.release();
        assert!(!tiles.is_configured());
        // Equivalent to never having activated: a fresh configure works.
        tiles.configure(TileConfig::new(4, 16));
        assert!(tiles.is_configured());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already configured")]
    fn test_double_activate_fails_fast() {
        let mut tiles = SoftwareTiles::new();
        tiles.configure(TileConfig::full());
        tiles.configure(TileConfig::full());
    }

    #[test]
    fn test_scope_releases_on_drop() {
        let mut tiles = SoftwareTiles::new();
        {
            let scope = TileScope::activate(&mut tiles, TileConfig::full());
            assert!(scope.is_configured());
        }
        assert!(!tiles.is_configured());
    }

    #[test]
    fn test_scope_releases_on_panic() {
        let mut tiles = SoftwareTiles::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = TileScope::activate(&mut tiles, TileConfig::full());
            panic!("kernel math failed");
        }));
        assert!(result.is_err());
        assert!(!tiles.is_configured());
    }

    #[test]
    #[should_panic]
    fn test_config_rejects_oversized_geometry() {
        TileConfig::new(17, 64);
    }

    #[test]
    fn test_dpbssd_matches_scalar_reference() {
        // 3x8 i8 lhs against 2 output columns: rhs has 8/4 = 2 VNNI rows.
        let mut tiles = SoftwareTiles::new();
        tiles.configure(TileConfig::full());

        let lhs: Vec<i8> = (0..3 * 8).map(|i| (i as i8) - 12).collect();
        // Weight rows w0, w1 of length 8, VNNI-packed: row g holds group g of
        // each column: [w0[4g..4g+4], w1[4g..4g+4]].
        let w0: Vec<i8> = (0..8).map(|i| (i as i8) - 3).collect();
        let w1: Vec<i8> = (0..8).map(|i| 2 * (i as i8) - 7).collect();
        let mut rhs = Vec::new();
        for g in 0..2 {
            rhs.extend_from_slice(&w0[4 * g..4 * g + 4]);
            rhs.extend_from_slice(&w1[4 * g..4 * g + 4]);
        }

        tiles.load(1, &lhs, 3, 8);
        tiles.load(2, &rhs, 2, 8);
        tiles.zero(0);
        tiles.dpbssd(0, 1, 2);

        let mut got = [0i32; 3 * 2];
        tiles.store(0, &mut got);

        for r in 0..3 {
            for (c, w) in [&w0, &w1].iter().enumerate() {
                let expected: i32 = (0..8)
                    .map(|i| lhs[r * 8 + i] as i32 * w[i] as i32)
                    .sum();
                assert_eq!(got[r * 2 + c], expected, "r={} c={}", r, c);
            }
        }
    }

    #[test]
    fn test_dpbssd_accumulates() {
        let mut tiles = SoftwareTiles::new();
        tiles.configure(TileConfig::full());

        let lhs = [1i8; 4];
        let rhs = [1i8; 4];
        tiles.load(1, &lhs, 1, 4);
        tiles.load(2, &rhs, 1, 4);
        tiles.zero(0);
        tiles.dpbssd(0, 1, 2);
        tiles.dpbssd(0, 1, 2);

        let mut got = [0i32; 1];
        tiles.store(0, &mut got);
        assert_eq!(got[0], 8); // two passes of 4 products each
    }
}

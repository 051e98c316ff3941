//! Runtime detection of the matrix-multiply accelerator.
//!
//! The accelerated path needs two instruction-set extensions: integer tile
//! multiply (AMX-INT8, plus the AMX-TILE base) and AVX-512 VNNI. The probe
//! runs once per process and is cached; hardware capability does not change
//! during a process lifetime, so the cached value is never torn down.

use std::sync::OnceLock;

use tm_tensor::DType;

static AMX_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Returns whether the executing processor supports the accelerated path.
///
/// Idempotent and safe to call repeatedly from any thread; the underlying
/// CPUID probe (and, on Linux, the tile-state permission request) happens at
/// most once. Callers must check this before routing work to the kernel:
/// dispatching without support is a caller error, not a signaled one.
pub fn is_available() -> bool {
    *AMX_AVAILABLE.get_or_init(probe)
}

/// Returns whether the tiled kernel has an implementation for `dtype`.
///
/// Pure function of a fixed table, independent of hardware availability.
pub fn supports_dtype(dtype: DType) -> bool {
    matches!(dtype, DType::Q4_0 | DType::Q8_0)
}

#[cfg(target_arch = "x86_64")]
fn probe() -> bool {
    use std::arch::x86_64::{__cpuid, __cpuid_count};

    // CPUID leaf 7 subleaf 0: EDX bit 24 = AMX-TILE, EDX bit 25 = AMX-INT8,
    // ECX bit 11 = AVX-512 VNNI.
    let max_leaf = unsafe { __cpuid(0) }.eax;
    if max_leaf < 7 {
        return false;
    }
    let features = unsafe { __cpuid_count(7, 0) };
    let amx_tile = features.edx & (1 << 24) != 0;
    let amx_int8 = features.edx & (1 << 25) != 0;
    let avx512_vnni = features.ecx & (1 << 11) != 0;
    if !(amx_tile && amx_int8 && avx512_vnni) {
        return false;
    }
    request_tile_data_permission()
}

#[cfg(not(target_arch = "x86_64"))]
fn probe() -> bool {
    false
}

/// Linux gates the tile-register state behind an explicit per-process opt-in;
/// without it the first tile instruction faults even on capable hardware.
#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
fn request_tile_data_permission() -> bool {
    const ARCH_REQ_XCOMP_PERM: libc::c_ulong = 0x1023;
    const XFEATURE_XTILEDATA: libc::c_ulong = 18;

    let rc = unsafe {
        libc::syscall(
            libc::SYS_arch_prctl,
            ARCH_REQ_XCOMP_PERM,
            XFEATURE_XTILEDATA,
        )
    };
    rc == 0
}

#[cfg(all(target_arch = "x86_64", not(target_os = "linux")))]
fn request_tile_data_permission() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_is_idempotent() {
        // The value is hardware-dependent; what we can check is that the
        // cached probe never flips and never panics.
        let first = is_available();
        for _ in 0..3 {
            assert_eq!(is_available(), first);
        }
    }

    #[test]
    fn test_supported_dtypes() {
        assert!(supports_dtype(DType::Q4_0));
        assert!(supports_dtype(DType::Q8_0));
    }

    #[test]
    fn test_unsupported_dtypes() {
        assert!(!supports_dtype(DType::F32));
        assert!(!supports_dtype(DType::F16));
    }
}

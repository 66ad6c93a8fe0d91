//! Runtime CPU feature detection.

use once_cell::sync::Lazy;

/// Instruction-set tier available on the running CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimdLevel {
    /// No usable vector extension.
    Portable,
    /// AArch64 Advanced SIMD (128-bit).
    Neon,
    /// x86_64 AVX (256-bit).
    Avx,
    /// x86_64 AVX-512 Foundation (512-bit).
    Avx512,
}

impl SimdLevel {
    /// Number of f32 lanes in one vector register at this tier.
    pub fn f32_lanes(self) -> usize {
        match self {
            SimdLevel::Portable => 8,
            SimdLevel::Neon => 4,
            SimdLevel::Avx => 8,
            SimdLevel::Avx512 => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SimdLevel::Portable => "portable",
            SimdLevel::Neon => "NEON",
            SimdLevel::Avx => "AVX",
            SimdLevel::Avx512 => "AVX-512",
        }
    }
}

static DETECTED: Lazy<SimdLevel> = Lazy::new(|| {
    let level = detect();
    log::debug!("detected SIMD level: {}", level.name());
    level
});

#[cfg(target_arch = "x86_64")]
fn detect() -> SimdLevel {
    if is_x86_feature_detected!("avx512f") {
        SimdLevel::Avx512
    } else if is_x86_feature_detected!("avx") {
        SimdLevel::Avx
    } else {
        SimdLevel::Portable
    }
}

#[cfg(target_arch = "aarch64")]
fn detect() -> SimdLevel {
    // Advanced SIMD is mandatory on AArch64.
    SimdLevel::Neon
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn detect() -> SimdLevel {
    SimdLevel::Portable
}

/// The SIMD tier of the running CPU, detected once per process.
pub fn simd_level() -> SimdLevel {
    *DETECTED
}

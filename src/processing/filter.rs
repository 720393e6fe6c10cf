//! Windowed-sinc (Lanczos) weighting used by both resampling passes.

use std::f64::consts::PI;

/// Support radius of the Lanczos window, in source samples.
pub const LANCZOS_SUPPORT: f64 = 3.0;

/// Normalized sinc: `sin(πx) / πx`, with the removable singularity filled in.
#[inline]
pub fn sinc(x: f64) -> f64 {
    let x = x * PI;
    if x != 0.0 { x.sin() / x } else { 1.0 }
}

/// Lanczos-3 weight for a sample `t` units away from the filter center.
/// Zero outside the support.
#[inline]
pub fn lanczos3(t: f64) -> f64 {
    let t = t.abs();
    if t < LANCZOS_SUPPORT {
        sinc(t) * sinc(t / LANCZOS_SUPPORT)
    } else {
        0.0
    }
}

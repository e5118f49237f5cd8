//! Precision policies.
//!
//! Viewport values travel through text (query strings) and are compared with
//! tolerances to ignore sub-pixel jitter. This module keeps both rules in one
//! place:
//! - `canonical_f64` removes `-0.0` and NaN payload differences.
//! - `format_fixed` / `round_to` implement fixed-precision serialization.
//! - `differs_by_more_than` is the tolerance test used for change detection.

/// Canonicalize a floating-point value.
///
/// Rules:
/// - `-0.0` becomes `0.0`
/// - all NaNs become a single canonical NaN
pub fn canonical_f64(v: f64) -> f64 {
    if v == 0.0 {
        // Handles +0.0 and -0.0.
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

/// Formats `v` with exactly `digits` fractional digits.
///
/// Values that round to zero are written without a sign (`0.000000`, never
/// `-0.000000`).
pub fn format_fixed(v: f64, digits: usize) -> String {
    let rounded = canonical_f64(round_to(v, digits));
    format!("{rounded:.digits$}")
}

/// Rounds `v` to `digits` fractional digits.
pub fn round_to(v: f64, digits: usize) -> f64 {
    if !v.is_finite() {
        return v;
    }
    let scale = 10f64.powi(digits as i32);
    (v * scale).round() / scale
}

/// `true` if `a` and `b` differ by strictly more than `tolerance`.
pub fn differs_by_more_than(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() > tolerance
}

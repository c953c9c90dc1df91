/// Clamp into `0.0..=1.0`, mapping NaN to zero.
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Arithmetic mean of two values, the default median combinator.
pub fn average(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

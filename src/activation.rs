//! The squashing nonlinearity applied by hidden and output nodes.
//!
//! Every non-input node uses the same logistic sigmoid. Input nodes pass
//! their injected value through untouched.

/// Logistic sigmoid: `f(x) = 1 / (1 + e^(-x))`.
///
/// NaN propagates. Infinite inputs saturate to exactly 0 or 1, and finite
/// inputs are clamped so `exp` never overflows.
#[inline]
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    if x.is_nan() {
        return f32::NAN;
    }
    if x == f32::INFINITY {
        return 1.0;
    }
    if x == f32::NEG_INFINITY {
        return 0.0;
    }
    // sigmoid(-88) ≈ 0, sigmoid(88) ≈ 1
    let clamped = x.clamp(-88.0, 88.0);
    1.0 / (1.0 + (-clamped).exp())
}

//! Execution weights.
//!
//! A weight is a relative execution frequency. A block that executes once per call of the
//! function has weight [`UNITY_WEIGHT`]; weights obtained from profile data use the same scale.

pub type Weight = f64;

pub const ZERO_WEIGHT: Weight = 0.0;
pub const UNITY_WEIGHT: Weight = 100.0;
pub const MAX_WEIGHT: Weight = f32::MAX as f64;

/// Factor by which the body of a loop is assumed to run more often than its surroundings.
pub const LOOP_WEIGHT_SCALE: Weight = 8.0;

/// Adds two weights, saturating at [`MAX_WEIGHT`].
pub fn add_weights(a: Weight, b: Weight) -> Weight {
    (a + b).min(MAX_WEIGHT)
}

/// Subtracts `b` from `a` without going negative.
pub fn sub_weights(a: Weight, b: Weight) -> Weight {
    if a > b {
        a - b
    } else {
        ZERO_WEIGHT
    }
}

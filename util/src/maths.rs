//! Utility maths functions

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Limit a value to the range `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Convert a normalised value in `[0.0, 1.0]` into a byte, clamping out of range inputs.
///
/// The conversion truncates, so `1.0` is the only input giving `255`.
pub fn norm_to_byte(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }

    (clamp(&value, &0.0, &1.0) * 255.0) as u8
}

/// Convert a byte into a normalised value in `[0.0, 1.0]`.
pub fn byte_to_norm(value: u8) -> f64 {
    value as f64 / 255.0
}

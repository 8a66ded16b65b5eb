//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Limit a value to the range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    value.max(min).min(max)
}

/// Returns zero if `value` is within `+/-band` of zero, otherwise `value`.
pub fn deadband<T>(value: T, band: T) -> T
where
    T: Float,
{
    if value.abs() <= band {
        T::zero()
    } else {
        value
    }
}

/// Returns true if `a` and `b` differ by less than `tolerance`.
pub fn within<T>(a: T, b: T, tolerance: T) -> bool
where
    T: Float,
{
    (a - b).abs() < tolerance
}

// Speed Estimation Module
// Maps a model's parameter count to an emission rate: bigger models answer slower.

/// Base speed of a very small model, tokens per second
pub const BASE_SPEED: f64 = 25.0;

/// Lower bound of a parameter-derived rate
pub const MIN_RATE: f64 = 1.0;

/// Upper bound of a parameter-derived rate
pub const MAX_RATE: f64 = 20.0;

/// Estimate an emission rate from a parameter count in billions.
///
/// `rate = clamp(25 * (1 / ln(params + 1))^1.5, 1, 20)`
///
/// Returns `None` when the count is not positive (or not finite), where the
/// formula is undefined; callers fall back to their default rate.
pub fn rate_from_parameters(params_billions: f64) -> Option<f64> {
    if !params_billions.is_finite() || params_billions <= 0.0 {
        return None;
    }

    let log = (params_billions + 1.0).ln();
    let rate = BASE_SPEED * (1.0 / log).powf(1.5);
    Some(rate.clamp(MIN_RATE, MAX_RATE))
}

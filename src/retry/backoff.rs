use std::time::Duration;

use rand::Rng;

use crate::retry::classify::ErrorKind;
use crate::retry::config::RetryConfig;

/// Delay before retrying after failed attempt `attempt` (1-based), without
/// jitter: `initial_delay * exponential_base^(attempt - 1)`, scaled for rate
/// limits and capped at `max_delay`.
pub fn base_delay(attempt: u32, kind: ErrorKind, config: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let mut delay = config.initial_delay.as_secs_f64() * config.exponential_base.powi(exponent);

    if kind == ErrorKind::RateLimit {
        delay *= config.rate_limit_multiplier;
    }

    clamp_secs(delay, config.max_delay)
}

/// `base_delay` with uniform jitter of `jitter_range * delay` applied,
/// clamped to `[0, max_delay]`
pub fn calculate_delay(attempt: u32, kind: ErrorKind, config: &RetryConfig) -> Duration {
    let delay = base_delay(attempt, kind, config).as_secs_f64();
    if !config.jitter || delay == 0.0 {
        return Duration::from_secs_f64(delay);
    }

    let fraction = if config.jitter_range.is_finite() {
        config.jitter_range.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let range = delay * fraction;
    let jitter = if range > 0.0 {
        rand::rng().random_range(-range..=range)
    } else {
        0.0
    };

    clamp_secs(delay + jitter, config.max_delay)
}

fn clamp_secs(secs: f64, max: Duration) -> Duration {
    let max_secs = max.as_secs_f64();
    if secs.is_nan() || secs <= 0.0 {
        Duration::ZERO
    } else if secs >= max_secs {
        max
    } else {
        Duration::from_secs_f64(secs)
    }
}

//! Exponential backoff with jitter, used between worker respawns.

use std::time::Duration;

use rand::Rng;

/// Delay before attempt number `attempt` (1-based).
///
/// `base_ms * 2^(attempt - 1)`, capped at `max_ms`, plus up to 10% jitter so
/// several crashed workers do not respawn in lockstep.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_ms = match delay_ms / 10 {
        0 => 0,
        range => rand::thread_rng().gen_range(0..range),
    };

    Duration::from_millis(delay_ms + jitter_ms)
}

//! Time utilities for the game loop and operator panel

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Whole milliseconds left until `deadline`, zero once it has passed
pub fn millis_until(deadline: Instant, now: Instant) -> u64 {
    deadline.saturating_duration_since(now).as_millis() as u64
}

/// Whole milliseconds elapsed from `earlier` to `now`, zero if `earlier` is later
pub fn millis_since(earlier: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(earlier).as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_zero_before_init_or_small_after() {
        init_server_time();
        assert!(uptime_secs() < 5);
    }

    #[test]
    fn millis_until_saturates_at_zero() {
        let now = Instant::now();
        assert_eq!(millis_until(now, now + Duration::from_secs(1)), 0);
        assert_eq!(millis_until(now + Duration::from_millis(250), now), 250);
    }

    #[test]
    fn millis_since_saturates_at_zero() {
        let now = Instant::now();
        assert_eq!(millis_since(now, now + Duration::from_millis(40)), 40);
        assert_eq!(millis_since(now + Duration::from_secs(1), now), 0);
    }

    #[test]
    fn unix_millis_advances() {
        let a = unix_millis();
        std::thread::sleep(Duration::from_millis(2));
        assert!(unix_millis() > a);
    }
}

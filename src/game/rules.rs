//! Tag rules - hit validation, safe zones and timers

use std::time::{Duration, Instant};

use super::device::{BaseStation, Car};

/// Why a sighting between two cars did not count as a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitRejection {
    UnknownShooter,
    UnknownTarget,
    FriendlyFire,
    TargetSafe,
    TargetDisabled,
    ShooterDisabled,
}

/// Stateless rule checks shared by event handling and the timer sweep
pub struct TagRules;

impl TagRules {
    /// Whether `shooter` seeing `target` disables the target
    pub fn judge_hit(shooter: Option<&Car>, target: Option<&Car>) -> Result<(), HitRejection> {
        let shooter = shooter.ok_or(HitRejection::UnknownShooter)?;
        let target = target.ok_or(HitRejection::UnknownTarget)?;

        if shooter.team == target.team {
            return Err(HitRejection::FriendlyFire);
        }
        if target.is_safe {
            return Err(HitRejection::TargetSafe);
        }
        if target.is_disabled() {
            return Err(HitRejection::TargetDisabled);
        }
        if shooter.is_disabled() {
            return Err(HitRejection::ShooterDisabled);
        }
        Ok(())
    }

    /// When a penalty that starts at `now` ends
    pub fn penalty_deadline(now: Instant, penalty: Duration) -> Instant {
        now + penalty
    }

    /// A sighting only protects a car when the station is on its team
    pub fn is_safe_sighting(station: &BaseStation, car: &Car) -> bool {
        station.team == car.team
    }

    /// Penalty over?
    pub fn penalty_expired(car: &Car, now: Instant) -> bool {
        matches!(car.disabled_until, Some(until) if now >= until)
    }

    /// Safe, but no corroborating sighting for longer than `timeout`
    pub fn safe_zone_expired(car: &Car, now: Instant, timeout: Duration) -> bool {
        if !car.is_safe {
            return false;
        }
        match car.last_safe_at {
            Some(last) => now.saturating_duration_since(last) > timeout,
            None => true,
        }
    }

    /// Moving, but the operator went quiet for longer than `timeout`
    pub fn motion_expired(car: &Car, now: Instant, timeout: Duration) -> bool {
        if !car.is_moving {
            return false;
        }
        match car.last_command_at {
            Some(last) => now.saturating_duration_since(last) > timeout,
            None => true,
        }
    }
}

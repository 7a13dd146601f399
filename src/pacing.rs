//! Rate control for generators and uploaders
//!
//! A [`RateController`] bounds long-run throughput either as a fixed
//! per-call delay or as a requests-per-second token bucket. Each call
//! delays only its own caller, so one controller is safe to share across
//! workers via `Arc`.

use crate::config::Profile;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

enum Mode {
    /// Pacing disabled: `throttle` is a no-op
    Disabled,
    /// Sleep a fixed duration on every call
    FixedDelay(Duration),
    /// Token bucket at a target rate
    Rate(RateLimiter<NotKeyed, InMemoryState, DefaultClock>, f64),
}

/// Pacing primitive shared by producers and upload workers
///
/// This component cannot error, only delay.
pub struct RateController {
    mode: Mode,
}

impl RateController {
    /// Controller that never delays
    pub fn disabled() -> Self {
        Self {
            mode: Mode::Disabled,
        }
    }

    /// Controller that sleeps `delay` on every `throttle` call
    ///
    /// A zero delay degenerates to the disabled controller.
    pub fn fixed_delay(delay: Duration) -> Self {
        if delay.is_zero() {
            return Self::disabled();
        }
        Self {
            mode: Mode::FixedDelay(delay),
        }
    }

    /// Controller targeting `rps` calls per second via a token bucket
    ///
    /// Non-positive rates disable pacing. Sub-1 rates are rounded up to
    /// 1 per second.
    pub fn per_second(rps: f64) -> Self {
        let limiter = if rps > 0.0 {
            let rps_int = (rps.ceil() as u32).max(1);
            NonZeroU32::new(rps_int).map(|n| RateLimiter::direct(Quota::per_second(n)))
        } else {
            None
        };
        match limiter {
            Some(limiter) => Self {
                mode: Mode::Rate(limiter, rps),
            },
            None => Self::disabled(),
        }
    }

    /// Controller derived from a profile's pacing settings
    ///
    /// `need_sleep = false` disables pacing entirely.
    pub fn from_profile(profile: &Profile) -> Self {
        if !profile.need_sleep {
            return Self::disabled();
        }
        Self::fixed_delay(profile.request_sleep_time)
    }

    /// Suspend the caller just long enough to hold the configured rate
    ///
    /// Returns immediately when pacing is disabled.
    pub async fn throttle(&self) {
        match &self.mode {
            Mode::Disabled => {}
            Mode::FixedDelay(delay) => tokio::time::sleep(*delay).await,
            Mode::Rate(limiter, _) => limiter.until_ready().await,
        }
    }

    /// Whether this controller ever delays
    pub fn is_enabled(&self) -> bool {
        !matches!(self.mode, Mode::Disabled)
    }
}

impl std::fmt::Debug for RateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.mode {
            Mode::Disabled => "disabled".to_string(),
            Mode::FixedDelay(delay) => format!("fixed_delay({:?})", delay),
            Mode::Rate(_, rps) => format!("rate({} rps)", rps),
        };
        f.debug_struct("RateController").field("mode", &mode).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppKind;
    use std::time::Instant;

    #[test]
    fn test_disabled_controller() {
        assert!(!RateController::disabled().is_enabled());
        assert!(!RateController::fixed_delay(Duration::ZERO).is_enabled());
        assert!(!RateController::per_second(0.0).is_enabled());
        assert!(!RateController::per_second(-5.0).is_enabled());
    }

    #[test]
    fn test_enabled_controller() {
        assert!(RateController::fixed_delay(Duration::from_millis(200)).is_enabled());
        assert!(RateController::per_second(1000.0).is_enabled());
    }

    #[test]
    fn test_from_profile_honors_need_sleep() {
        let mut profile = Profile::standalone(AppKind::Shopping);
        assert!(RateController::from_profile(&profile).is_enabled());

        profile.need_sleep = false;
        assert!(!RateController::from_profile(&profile).is_enabled());
    }

    #[tokio::test]
    async fn test_throttle_disabled_returns_immediately() {
        let controller = RateController::disabled();
        let start = Instant::now();
        for _ in 0..100 {
            controller.throttle().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_throttle_fixed_delay_waits() {
        let controller = RateController::fixed_delay(Duration::from_millis(20));
        let start = Instant::now();
        controller.throttle().await;
        controller.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_throttle_rate_allows_first_call() {
        let controller = RateController::per_second(1000.0);
        let start = Instant::now();
        controller.throttle().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_debug_output() {
        let debug = format!("{:?}", RateController::per_second(100.0));
        assert!(debug.contains("rate(100 rps)"));
    }
}

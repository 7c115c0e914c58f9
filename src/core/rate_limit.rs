use crate::error::ReclaimError;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GcraLimiter};
use log::debug;
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Connect,
    Claim,
}

impl Action {
    pub fn cooldown(&self) -> Duration {
        match self {
            Action::Connect => Duration::from_millis(1_000),
            Action::Claim => Duration::from_millis(5_000),
        }
    }

    /// One cell per cooldown period, no burst.
    fn quota(&self) -> Quota {
        Quota::with_period(self.cooldown())
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Connect => f.write_str("connect"),
            Action::Claim => f.write_str("claim"),
        }
    }
}

type Direct<C> = GcraLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Per-action cooldowns for the lifetime of a session.
pub struct RateLimiter<C: Clock = DefaultClock> {
    clock: C,
    connect: Direct<C>,
    claim: Direct<C>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_clock(DefaultClock::default())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            connect: GcraLimiter::direct_with_clock(Action::Connect.quota(), &clock),
            claim: GcraLimiter::direct_with_clock(Action::Claim.quota(), &clock),
            clock,
        }
    }

    fn limiter(&self, action: Action) -> &Direct<C> {
        match action {
            Action::Connect => &self.connect,
            Action::Claim => &self.claim,
        }
    }

    /// Passes and consumes the action's cell, or fails leaving the cell untouched.
    pub fn check_and_mark(&self, action: Action) -> Result<(), ReclaimError> {
        self.limiter(action).check().map_err(|not_until| {
            let retry_after = not_until.wait_time_from(self.clock.now());
            debug!("{} blocked for another {:?}", action, retry_after);
            ReclaimError::RateLimited { action, retry_after }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    fn limiter() -> (RateLimiter<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        (RateLimiter::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_claim_cooldown() {
        let (limiter, clock) = limiter();
        limiter.check_and_mark(Action::Claim).unwrap();

        clock.advance(Duration::from_millis(4_999));
        let err = limiter.check_and_mark(Action::Claim).unwrap_err();
        assert_eq!(
            err,
            ReclaimError::RateLimited {
                action: Action::Claim,
                retry_after: Duration::from_millis(1),
            }
        );

        clock.advance(Duration::from_millis(1));
        limiter.check_and_mark(Action::Claim).unwrap();
        assert!(limiter.check_and_mark(Action::Claim).is_err());
    }

    #[test]
    fn test_blocked_attempt_does_not_extend_window() {
        let (limiter, clock) = limiter();
        limiter.check_and_mark(Action::Connect).unwrap();

        clock.advance(Duration::from_millis(600));
        assert!(limiter.check_and_mark(Action::Connect).is_err());

        clock.advance(Duration::from_millis(400));
        assert!(limiter.check_and_mark(Action::Connect).is_ok());
    }

    #[test]
    fn test_actions_are_independent() {
        let (limiter, _clock) = limiter();
        limiter.check_and_mark(Action::Claim).unwrap();
        limiter.check_and_mark(Action::Connect).unwrap();
        assert!(limiter.check_and_mark(Action::Claim).is_err());
        assert!(matches!(
            limiter.check_and_mark(Action::Connect),
            Err(ReclaimError::RateLimited { action: Action::Connect, .. })
        ));
    }
}

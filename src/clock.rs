// Turn deadline tracking with stale-timer invalidation.

use tokio::time::Instant;

/// Handle to one armed deadline. Tokens are monotonically increasing per
/// clock; a token minted before the latest `arm`/`disarm` is stale and any
/// expiry carrying it must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockToken(u64);

/// The deadline for the current turn of one draft.
///
/// Rearming replaces the deadline and bumps the token, so a timer that
/// fires late for a superseded turn is rejected by [`PickClock::accepts`]
/// instead of producing a duplicate skip. There is no cancel-and-wait:
/// superseding is the only cancellation mechanism.
#[derive(Debug, Default)]
pub struct PickClock {
    token: u64,
    deadline: Option<Instant>,
}

impl PickClock {
    pub fn new() -> Self {
        PickClock::default()
    }

    /// Arm (or rearm) the clock for a new turn. Any previously issued token
    /// becomes stale.
    pub fn arm(&mut self, deadline: Instant) -> ClockToken {
        self.token += 1;
        self.deadline = Some(deadline);
        ClockToken(self.token)
    }

    /// Drop the deadline entirely (draft completed). Outstanding tokens
    /// become stale.
    pub fn disarm(&mut self) {
        self.token += 1;
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The token an expiry of the currently armed deadline would carry.
    pub fn current_token(&self) -> Option<ClockToken> {
        self.deadline.map(|_| ClockToken(self.token))
    }

    /// Whether an expiry carrying `token` is for the currently armed
    /// deadline. Stale tokens and disarmed clocks both reject.
    pub fn accepts(&self, token: ClockToken) -> bool {
        self.deadline.is_some() && token.0 == self.token
    }
}

//! Expiry computation and time sources.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of the current time.
///
/// The cache and the in-memory store read time through this trait so that
/// expiry can be tested without sleeping.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }

    /// Jump to an instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// The earlier of the absolute expiry and the idle deadline.
pub fn effective_expires(
    expires: DateTime<Utc>,
    idle_deadline: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match idle_deadline {
        Some(idle) => expires.min(idle),
        None => expires,
    }
}

/// A session is unusable at or after its effective expiry.
pub fn is_expired(effective: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= effective
}

/// Backend TTL for an entry expiring at `effective`.
///
/// Rounded up to whole seconds; an already expired entry gets a zero TTL.
pub(crate) fn ttl_until(effective: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    let remaining = effective - now;
    if remaining <= Duration::zero() {
        return std::time::Duration::ZERO;
    }
    let secs = remaining.num_seconds() + i64::from(remaining.subsec_nanos() > 0);
    std::time::Duration::from_secs(secs.max(0) as u64)
}

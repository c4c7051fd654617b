//! Fixed clock for deterministic event timestamps.

use chrono::{DateTime, Utc};
use chronicle_core::clock::Clock;

/// A clock that always returns a fixed point in time, so recorded events
/// carry predictable `created` timestamps.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

//! Lamport clock over epoch-millisecond ticks.
//!
//! Local mutations advance the counter to `max(counter + 1, now_millis)`, so
//! timestamps stay comparable with note `modified_at` values while remaining
//! strictly monotone on each device. Observing a remote timestamp `t` moves
//! the counter to `max(counter, t) + 1`.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

#[derive(Debug)]
pub struct LamportClock {
    counter: AtomicI64,
}

impl LamportClock {
    pub fn new(initial: i64) -> Self {
        LamportClock {
            counter: AtomicI64::new(initial),
        }
    }

    pub fn current(&self) -> i64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Timestamp for a locally produced operation. Strictly greater than
    /// anything this device has observed.
    pub fn tick(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        loop {
            let seen = self.counter.load(Ordering::Acquire);
            let next = (seen + 1).max(now);
            if self
                .counter
                .compare_exchange(seen, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Folds a remote timestamp into the clock.
    pub fn observe(&self, remote: i64) -> i64 {
        loop {
            let seen = self.counter.load(Ordering::Acquire);
            let next = seen.max(remote) + 1;
            if self
                .counter
                .compare_exchange(seen, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next;
            }
        }
    }
}

/// Interprets a Lamport timestamp as a UTC instant for `modified_at` fields.
pub fn lamport_to_datetime(timestamp: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(timestamp)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn datetime_to_lamport(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

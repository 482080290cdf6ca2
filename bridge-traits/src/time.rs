//! Time Source Abstraction
//!
//! Token expiry is judged against stored absolute instants, so the check
//! itself must be injectable: tests pin the clock instead of sleeping.

use chrono::{DateTime, Utc};

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

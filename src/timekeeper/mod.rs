use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeZone};

/// Source of the current time for everything that stamps or names files.
pub trait Timekeeper: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock.
#[derive(Clone, Copy, Default, Debug)]
pub struct SystemTimekeeper;

impl Timekeeper for SystemTimekeeper {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Clone, Debug)]
pub struct FrozenTimekeeper {
    instant: Arc<Mutex<DateTime<Local>>>,
}

impl FrozenTimekeeper {
    /// Freezes the clock at the given unix timestamp (seconds).
    pub fn at_unix(seconds: i64) -> Self {
        let instant = Local
            .timestamp_opt(seconds, 0)
            .single()
            .unwrap_or_else(Local::now);

        Self {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    pub fn set_unix(&self, seconds: i64) {
        if let Some(instant) = Local.timestamp_opt(seconds, 0).single() {
            if let Ok(mut guard) = self.instant.lock() {
                *guard = instant;
            }
        }
    }
}

impl Timekeeper for FrozenTimekeeper {
    fn now(&self) -> DateTime<Local> {
        match self.instant.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

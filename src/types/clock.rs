use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Source of "now" for cooldown bookkeeping.
pub trait Clock: Send + Sync + std::fmt::Debug {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A clock stuck at one instant, handy for replaying a schedule.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.0
  }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
  Arc::new(SystemClock)
}

use chrono::{DateTime, Duration, Utc};

/// Wall clock shifted by an operator-set offset. All tracking decisions are
/// made against this time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceClock {
    offset: Duration,
}

impl Default for ReferenceClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceClock {
    pub fn new() -> Self {
        Self {
            offset: Duration::zero(),
        }
    }

    pub fn with_offset(offset: Duration) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }

    pub fn set_offset(&mut self, offset: Duration) {
        self.offset = offset;
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.at(Utc::now())
    }

    pub fn at(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        wall + self.offset
    }
}

use std::time::Duration;

/// Tick interval that stretches while the application is idle.
///
/// Each pass that finds no work doubles the interval, up to `max`. A pass
/// with work drops it straight back to `base`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// Accounts for one pass and returns the interval until the next one.
    pub fn record(&mut self, had_work: bool) -> Duration {
        self.current = if had_work {
            self.base
        } else {
            self.current.saturating_mul(2).min(self.max)
        };
        self.current
    }
}

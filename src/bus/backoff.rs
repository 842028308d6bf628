use std::time::Duration;

use rand::Rng;

use crate::constants::RECONNECT_INITIAL;

/// Exponential reconnect delay: starts at one second, doubles per attempt,
/// never exceeds `max`, and adds up to 25% random jitter on top.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    current: Duration,
    max: Duration,
    attempts: u32,
}

impl ReconnectBackoff {
    pub fn new(max: Duration) -> Self {
        let max = max.max(RECONNECT_INITIAL);
        Self {
            current: RECONNECT_INITIAL,
            max,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next attempt, jitter excluded.
    pub fn base_delay(&self) -> Duration {
        self.current
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.attempts += 1;
        self.current = self.current.saturating_mul(2).min(self.max);

        let jitter = rand::thread_rng().gen_range(0.0..=0.25);
        base.saturating_add(base.mul_f64(jitter)).min(self.max)
    }

    pub fn reset(&mut self) {
        self.current = RECONNECT_INITIAL;
        self.attempts = 0;
    }
}

//! Capped exponential backoff between reconnection attempts

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Delay sequence `initial, initial*m, initial*m^2, ...` capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial: config.initial_backoff(),
            max: config.max_backoff().max(config.initial_backoff()),
            multiplier: config.multiplier.max(1.0),
            current: None,
        }
    }

    /// The delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.initial,
            Some(previous) => {
                let grown = (previous.as_nanos() as f64 * self.multiplier).round();
                if grown >= self.max.as_nanos() as f64 {
                    self.max
                } else {
                    Duration::from_nanos(grown as u64)
                }
            }
        };
        self.current = Some(delay);
        delay
    }

    /// Start over from the initial delay (after a successful connect).
    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(initial_ms: u64, max_ms: u64, multiplier: f64) -> ReconnectConfig {
        ReconnectConfig {
            initial_backoff_ms: initial_ms,
            max_backoff_ms: max_ms,
            multiplier,
            max_retries: None,
        }
    }

    #[test]
    fn doubles_until_capped() {
        let mut backoff = Backoff::new(&config(100, 1_000, 2.0));
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, [100, 200, 400, 800, 1_000, 1_000, 1_000]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    proptest! {
        #[test]
        fn delays_increase_strictly_until_cap(
            initial in 1u64..5_000,
            extra in 0u64..100_000,
            multiplier in 1.1f64..4.0,
            attempts in 1usize..40,
        ) {
            let max = Duration::from_millis(initial + extra);
            let mut backoff = Backoff::new(&config(initial, initial + extra, multiplier));
            let delays: Vec<Duration> = (0..attempts).map(|_| backoff.next_delay()).collect();

            prop_assert_eq!(delays[0], Duration::from_millis(initial));
            for pair in delays.windows(2) {
                prop_assert!(pair[1] <= max);
                if pair[0] < max {
                    prop_assert!(pair[1] > pair[0]);
                } else {
                    prop_assert_eq!(pair[1], max);
                }
            }
        }
    }
}

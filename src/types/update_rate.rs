//! Notification rate control for renderer-facing streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a renderer wants to hear about feed changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every change as it happens
    Native,

    /// Coalesced to at most this many notifications per second.
    /// `Max(0)` is treated as `Native`.
    Max(u32),
}

impl UpdateRate {
    /// Coalescing interval, if any
    pub fn interval(self) -> Option<Duration> {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }
}

impl Default for UpdateRate {
    fn default() -> Self {
        // Matches the 100ms poll of a typical terminal refresh loop
        UpdateRate::Max(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals() {
        assert_eq!(UpdateRate::Native.interval(), None);
        assert_eq!(UpdateRate::Max(0).interval(), None);
        assert_eq!(UpdateRate::Max(10).interval(), Some(Duration::from_millis(100)));
        assert_eq!(UpdateRate::default(), UpdateRate::Max(10));
    }
}

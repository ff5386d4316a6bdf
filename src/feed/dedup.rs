//! Duplicate packet suppression
//!
//! The same packet commonly reaches APRS-IS through several igates, and a
//! reconnect can replay recent traffic. Copies with the same source,
//! destination and information field seen within the window are dropped
//! before they reach the filter.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, SystemTime};

use crate::types::Packet;

/// Sliding window of recently seen packet keys.
#[derive(Debug, Default)]
pub struct DedupWindow {
    window: Duration,
    seen: HashMap<String, SystemTime>,
    order: VecDeque<(SystemTime, String)>,
}

impl DedupWindow {
    /// A zero window disables suppression.
    pub fn new(window: Duration) -> Self {
        Self { window, seen: HashMap::new(), order: VecDeque::new() }
    }

    fn key(packet: &Packet) -> String {
        format!("{}>{}:{}", packet.source, packet.destination, packet.information())
    }

    /// Record `packet`, returning `true` if a copy was already seen inside the window.
    ///
    /// Ages are measured on packet arrival times. The window runs from the
    /// first copy; later copies do not extend it.
    pub fn is_duplicate(&mut self, packet: &Packet) -> bool {
        if self.window.is_zero() {
            return false;
        }
        let now = packet.received_at;
        self.expire(now);

        let key = Self::key(packet);
        if self.seen.contains_key(&key) {
            return true;
        }
        self.seen.insert(key.clone(), now);
        self.order.push_back((now, key));
        false
    }

    fn expire(&mut self, now: SystemTime) {
        while let Some((first_seen, _)) = self.order.front() {
            let age = now.duration_since(*first_seen).unwrap_or_default();
            if age < self.window {
                break;
            }
            if let Some((first_seen, key)) = self.order.pop_front() {
                // Only drop the map entry if it still belongs to this record
                if self.seen.get(&key) == Some(&first_seen) {
                    self.seen.remove(&key);
                }
            }
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget everything seen so far.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

//! Resumable read position over a [`LiveFeed`]

use super::{FeedEntry, LiveFeed};

/// Entries returned by one [`FeedCursor::next_batch`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedBatch {
    pub entries: Vec<FeedEntry>,
    /// Sequence numbers between the cursor and the first entry that were
    /// evicted or discarded by a rebuild before this reader got to them
    pub skipped: u64,
}

/// A reader's position in the feed.
///
/// Records the last sequence number delivered so the next batch starts
/// exactly after it: nothing is delivered twice and nothing still retained is
/// skipped. Cursors are plain values; each reader owns its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedCursor {
    last_seen: u64,
}

impl FeedCursor {
    /// Cursor before the oldest entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor resuming after `seq`.
    pub fn after(seq: u64) -> Self {
        Self { last_seen: seq }
    }

    /// Cursor at the current head: only entries admitted from now on.
    pub fn tail(feed: &LiveFeed) -> Self {
        Self::after(feed.head_seq())
    }

    /// Last sequence number delivered through this cursor.
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Read up to `max` entries after the cursor and advance past them.
    pub fn next_batch(&mut self, feed: &LiveFeed, max: usize) -> FeedBatch {
        let (entries, skipped) = feed.read_since(self.last_seen, max);
        if let Some(last) = entries.last() {
            self.last_seen = last.seq;
        } else if skipped > 0 {
            self.last_seen += skipped;
        }
        FeedBatch { entries, skipped }
    }
}

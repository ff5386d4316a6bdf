//! Live feed buffer: the bounded, ordered, filtered view of admitted packets.
//!
//! The pipeline is the single writer. It calls [`LiveFeed::append`], which
//! evaluates the current filter and either admits the packet under the next
//! sequence number or drops it. Any number of readers tail the feed with
//! [`LiveFeed::read`] or a [`FeedCursor`], and scroll back with
//! [`LiveFeed::read_before`].
//!
//! ```rust
//! use aprsfeed::feed::{FeedCursor, LiveFeed};
//! use aprsfeed::normalize::normalize;
//! use aprsfeed::types::RawFrame;
//! use aprsfeed::config::FeedConfig;
//! use std::sync::Arc;
//! use std::time::SystemTime;
//!
//! let feed = LiveFeed::new(&FeedConfig { capacity: 3, ..FeedConfig::default() });
//! for n in 1..=5 {
//!     let frame = RawFrame::new(format!("N0CALL>APRS:>status {n}"), SystemTime::UNIX_EPOCH, 1);
//!     feed.append(Arc::new(normalize(&frame).unwrap()));
//! }
//!
//! let mut cursor = FeedCursor::new();
//! let batch = cursor.next_batch(&feed, 10);
//! let seqs: Vec<u64> = batch.entries.iter().map(|e| e.seq).collect();
//! assert_eq!(seqs, [3, 4, 5]);
//! assert_eq!(batch.skipped, 2);
//! ```

mod cursor;
mod dedup;
mod live;

pub use cursor::{FeedBatch, FeedCursor};
pub use dedup::DedupWindow;
pub use live::{FeedEntry, FeedEvent, LiveFeed, RebuildReport};

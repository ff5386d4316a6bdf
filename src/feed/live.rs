//! The bounded feed store

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{broadcast, watch};
use tracing::{info, trace};

use crate::config::FeedConfig;
use crate::filter::{FilterPredicate, FilterSlot, compile};
use crate::types::Packet;
use crate::{FeedError, Result};

const DEFAULT_EVENT_CAPACITY: usize = 1_024;

/// An admitted packet and its position in the feed's total order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// Sequence number, strictly increasing and never reused
    pub seq: u64,
    pub packet: Arc<Packet>,
}

/// Notifications published by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A packet was admitted under `seq`
    Appended { seq: u64 },
    /// The current filter was replaced without touching retained entries
    FilterChanged { expression: Arc<str> },
    /// Retained entries were discarded and rebuilt from the raw log
    Rebuilt(RebuildReport),
}

/// Outcome of an explicit filter re-apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Expression of the predicate the feed was rebuilt with
    pub expression: Arc<str>,
    /// Raw log packets evaluated
    pub scanned: usize,
    /// Entries retained after the rebuild
    pub admitted: usize,
    /// Entries discarded from the previous view
    pub discarded: usize,
    /// Sequence of the first rebuilt entry, if any were admitted
    pub first_seq: Option<u64>,
}

struct Inner {
    entries: VecDeque<FeedEntry>,
    capacity: usize,
    /// Unfiltered copies of recent packets, for rebuilds
    raw_log: VecDeque<Arc<Packet>>,
    raw_log_capacity: usize,
    next_seq: u64,
}

impl Inner {
    fn admit(&mut self, packet: Arc<Packet>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(FeedEntry { seq, packet });
        seq
    }

    fn log_raw(&mut self, packet: &Arc<Packet>) {
        if self.raw_log_capacity == 0 {
            return;
        }
        if self.raw_log.len() == self.raw_log_capacity {
            self.raw_log.pop_front();
        }
        self.raw_log.push_back(Arc::clone(packet));
    }

    /// Index of the first entry with a sequence above `seq`.
    fn index_after(&self, seq: u64) -> usize {
        self.entries.partition_point(|e| e.seq <= seq)
    }

    fn first_seq(&self) -> Option<u64> {
        self.entries.front().map(|e| e.seq)
    }
}

/// Bounded, ordered, filtered packet store.
///
/// Admission, eviction and rebuilds happen under a write lock; reads take a
/// read lock and clone out whole [`FeedEntry`] values, so a reader never sees
/// a partially inserted entry. Eviction is FIFO and never waits on readers.
pub struct LiveFeed {
    inner: RwLock<Inner>,
    filter: FilterSlot,
    events: broadcast::Sender<FeedEvent>,
    head: watch::Sender<u64>,
}

impl LiveFeed {
    /// Feed with its own match-all filter slot.
    pub fn new(config: &FeedConfig) -> Self {
        Self::with_filter(config, FilterSlot::default(), DEFAULT_EVENT_CAPACITY)
    }

    /// Feed admitting through `filter`, which may be shared with other components.
    pub fn with_filter(config: &FeedConfig, filter: FilterSlot, event_capacity: usize) -> Self {
        let capacity = config.capacity.max(1);
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (head, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner {
                entries: VecDeque::with_capacity(capacity.min(4_096)),
                capacity,
                raw_log: VecDeque::new(),
                raw_log_capacity: config.raw_log_capacity,
                next_seq: 1,
            }),
            filter,
            events,
            head,
        }
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a packet to the feed.
    ///
    /// The packet is always recorded in the raw log (when enabled). It is
    /// admitted only if the predicate current at this instant matches it;
    /// returns the assigned sequence number on admission.
    pub fn append(&self, packet: Arc<Packet>) -> Option<u64> {
        let seq = {
            let mut inner = self.write_inner();
            inner.log_raw(&packet);
            // Read under the write lock so a concurrent rebuild cannot slip a
            // new predicate in between evaluation and insertion.
            if !self.filter.current().matches(&packet) {
                trace!(source = %packet.source, "Packet rejected by filter");
                return None;
            }
            inner.admit(packet)
        };

        trace!(seq, "Packet admitted");
        self.head.send_replace(seq);
        let _ = self.events.send(FeedEvent::Appended { seq });
        Some(seq)
    }

    /// Replace the current filter for future packets only.
    ///
    /// Retained entries keep reflecting the filter they were admitted under.
    /// On a syntax error the previous filter stays active.
    pub fn set_filter(&self, expression: &str) -> Result<Arc<FilterPredicate>> {
        let predicate = {
            // Serialize with appends so no packet is judged by a half-installed filter
            let _guard = self.write_inner();
            self.filter.install(expression)?
        };
        let _ = self.events.send(FeedEvent::FilterChanged {
            expression: Arc::from(predicate.expression()),
        });
        Ok(predicate)
    }

    /// Install a new filter and rebuild the view from the raw log.
    ///
    /// All retained entries are discarded; raw log packets matching the new
    /// predicate are re-admitted oldest first under fresh sequence numbers
    /// that continue after the previous head. Fails without side effects on
    /// a syntax error or when the raw log is disabled.
    pub fn reapply_filter(&self, expression: &str) -> Result<RebuildReport> {
        let predicate = compile(expression)?;

        let report = {
            let mut inner = self.write_inner();
            if inner.raw_log_capacity == 0 {
                return Err(FeedError::RawLogDisabled);
            }
            let predicate = self.filter.replace(predicate);

            let matching: Vec<Arc<Packet>> =
                inner.raw_log.iter().filter(|p| predicate.matches(p)).cloned().collect();
            let scanned = inner.raw_log.len();
            let discarded = inner.entries.len();
            let keep_from = matching.len().saturating_sub(inner.capacity);

            inner.entries.clear();
            let mut first_seq = None;
            for packet in matching.into_iter().skip(keep_from) {
                let seq = inner.admit(packet);
                first_seq.get_or_insert(seq);
            }

            RebuildReport {
                expression: Arc::from(predicate.expression()),
                scanned,
                admitted: inner.entries.len(),
                discarded,
                first_seq,
            }
        };

        info!(
            filter = %report.expression,
            scanned = report.scanned,
            admitted = report.admitted,
            discarded = report.discarded,
            "Feed rebuilt from raw log"
        );
        if report.first_seq.is_some() {
            self.head.send_replace(self.head_seq());
        }
        let _ = self.events.send(FeedEvent::Rebuilt(report.clone()));
        Ok(report)
    }

    /// Up to `max` retained entries with sequence above `from_seq`, in order.
    ///
    /// Pass the last sequence you saw to resume tailing; `0` reads from the
    /// oldest retained entry.
    pub fn read(&self, from_seq: u64, max: usize) -> Vec<FeedEntry> {
        self.read_since(from_seq, max).0
    }

    /// Like [`read`](Self::read), also reporting how many sequence numbers
    /// after `from_seq` are no longer retained.
    pub(crate) fn read_since(&self, from_seq: u64, max: usize) -> (Vec<FeedEntry>, u64) {
        let inner = self.read_inner();
        let skipped = match inner.first_seq() {
            Some(first) if first > from_seq.saturating_add(1) => first - from_seq - 1,
            Some(_) => 0,
            // Everything up to the head is gone
            None => (inner.next_seq - 1).saturating_sub(from_seq),
        };
        let start = inner.index_after(from_seq);
        let entries = inner.entries.range(start..).take(max).cloned().collect();
        (entries, skipped)
    }

    /// Up to `max` retained entries immediately preceding `before_seq`, in order.
    pub fn read_before(&self, before_seq: u64, max: usize) -> Vec<FeedEntry> {
        let inner = self.read_inner();
        let end = inner.entries.partition_point(|e| e.seq < before_seq);
        let start = end.saturating_sub(max);
        inner.entries.range(start..end).cloned().collect()
    }

    /// The newest `max` entries, in order.
    pub fn latest(&self, max: usize) -> Vec<FeedEntry> {
        let inner = self.read_inner();
        let start = inner.entries.len().saturating_sub(max);
        inner.entries.range(start..).cloned().collect()
    }

    /// Sequence of the newest admitted entry, or 0 before the first admission.
    pub fn head_seq(&self) -> u64 {
        self.read_inner().next_seq - 1
    }

    /// Sequence of the oldest retained entry.
    pub fn first_seq(&self) -> Option<u64> {
        self.read_inner().first_seq()
    }

    pub fn len(&self) -> usize {
        self.read_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_inner().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.read_inner().capacity
    }

    /// Packets currently held in the raw log.
    pub fn raw_log_len(&self) -> usize {
        self.read_inner().raw_log.len()
    }

    /// The filter slot this feed admits through.
    pub fn filter(&self) -> &FilterSlot {
        &self.filter
    }

    /// Subscribe to append, filter and rebuild notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    /// Watch the head sequence number.
    pub fn watch_head(&self) -> watch::Receiver<u64> {
        self.head.subscribe()
    }
}

impl std::fmt::Debug for LiveFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read_inner();
        f.debug_struct("LiveFeed")
            .field("len", &inner.entries.len())
            .field("capacity", &inner.capacity)
            .field("head_seq", &(inner.next_seq - 1))
            .field("filter", &self.filter.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::RawFrame;
    use proptest::prelude::*;
    use std::time::SystemTime;

    fn packet(line: &str) -> Arc<Packet> {
        Arc::new(normalize(&RawFrame::new(line, SystemTime::UNIX_EPOCH, 1)).unwrap())
    }

    fn status(source: &str, n: usize) -> Arc<Packet> {
        packet(&format!("{source}>APRS:>status {n}"))
    }

    fn feed(capacity: usize, raw_log_capacity: usize) -> LiveFeed {
        LiveFeed::new(&FeedConfig { capacity, raw_log_capacity, dedup_window_ms: 0 })
    }

    fn seqs(entries: &[FeedEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.seq).collect()
    }

    #[test]
    fn capacity_three_keeps_last_three() {
        let feed = feed(3, 0);
        let packets: Vec<_> = (1..=5).map(|n| status("N0CALL", n)).collect();
        for p in &packets {
            feed.append(Arc::clone(p));
        }

        let entries = feed.read(0, 100);
        assert_eq!(seqs(&entries), [3, 4, 5]);
        for (entry, expected) in entries.iter().zip(&packets[2..]) {
            assert!(Arc::ptr_eq(&entry.packet, expected));
        }
        assert_eq!(feed.head_seq(), 5);
        assert_eq!(feed.first_seq(), Some(3));
    }

    #[test]
    fn rejected_packets_consume_no_sequence() {
        let feed = feed(10, 0);
        feed.set_filter("from=W1AW").unwrap();

        assert_eq!(feed.append(status("N0CALL", 1)), None);
        assert_eq!(feed.append(status("W1AW", 2)), Some(1));
        assert_eq!(feed.append(status("N0CALL", 3)), None);
        assert_eq!(feed.append(status("W1AW", 4)), Some(2));
    }

    #[test]
    fn filter_change_is_not_retroactive() {
        let feed = feed(10, 10);
        feed.set_filter("from=W1AW").unwrap();
        feed.append(status("N0CALL", 1));
        feed.append(status("W1AW", 2));

        feed.set_filter("from=N0CALL").unwrap();
        let entries = feed.read(0, 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].packet.source.as_str(), "W1AW");
    }

    #[test]
    fn invalid_filter_keeps_previous() {
        let feed = feed(10, 10);
        feed.set_filter("type=status").unwrap();
        assert!(matches!(feed.set_filter("type="), Err(FeedError::FilterSyntax { .. })));
        assert!(matches!(feed.reapply_filter("type=("), Err(FeedError::FilterSyntax { .. })));
        assert_eq!(feed.filter().current().expression(), "type=status");
    }

    #[test]
    fn reapply_rebuilds_with_fresh_sequences() {
        let feed = feed(10, 100);
        feed.set_filter("from=W1AW").unwrap();
        for n in 0..6 {
            feed.append(status(if n % 2 == 0 { "N0CALL" } else { "W1AW" }, n));
        }
        assert_eq!(seqs(&feed.read(0, 10)), [1, 2, 3]);

        let mut events = feed.subscribe();
        let report = feed.reapply_filter("from=N0CALL").unwrap();
        assert_eq!(report.scanned, 6);
        assert_eq!(report.admitted, 3);
        assert_eq!(report.discarded, 3);
        assert_eq!(report.first_seq, Some(4));

        let entries = feed.read(0, 10);
        assert_eq!(seqs(&entries), [4, 5, 6]);
        assert!(entries.iter().all(|e| e.packet.source.as_str() == "N0CALL"));
        assert_eq!(events.try_recv().unwrap(), FeedEvent::Rebuilt(report));
        assert_eq!(feed.append(status("N0CALL", 9)), Some(7));
    }

    #[test]
    fn reapply_respects_capacity() {
        let feed = feed(2, 100);
        for n in 0..5 {
            feed.append(status("N0CALL", n));
        }
        let report = feed.reapply_filter("*").unwrap();
        assert_eq!(report.admitted, 2);
        assert_eq!(seqs(&feed.read(0, 10)), [6, 7]);
    }

    #[test]
    fn reapply_without_raw_log_is_refused() {
        let feed = feed(10, 0);
        feed.set_filter("type=status").unwrap();
        assert!(matches!(feed.reapply_filter("type=message"), Err(FeedError::RawLogDisabled)));
        assert_eq!(feed.filter().current().expression(), "type=status");
    }

    #[test]
    fn read_before_scrolls_back() {
        let feed = feed(10, 0);
        for n in 0..8 {
            feed.append(status("N0CALL", n));
        }
        assert_eq!(seqs(&feed.read_before(6, 3)), [3, 4, 5]);
        assert_eq!(seqs(&feed.read_before(2, 3)), [1]);
        assert_eq!(seqs(&feed.read_before(100, 2)), [7, 8]);
        assert_eq!(seqs(&feed.latest(2)), [7, 8]);
    }

    #[test]
    fn events_and_head_are_published() {
        let feed = feed(10, 0);
        let mut events = feed.subscribe();
        let head = feed.watch_head();

        feed.append(status("N0CALL", 1));
        feed.set_filter("type=message").unwrap();

        assert_eq!(events.try_recv().unwrap(), FeedEvent::Appended { seq: 1 });
        assert_eq!(
            events.try_recv().unwrap(),
            FeedEvent::FilterChanged { expression: Arc::from("type=message") }
        );
        assert_eq!(*head.borrow(), 1);
    }

    proptest! {
        #[test]
        fn retained_sequences_are_contiguous(
            capacity in 1usize..20,
            sources in prop::collection::vec(prop::bool::ANY, 0..80),
        ) {
            let feed = feed(capacity, 0);
            feed.set_filter("from=W1AW").unwrap();
            for (n, admit) in sources.iter().enumerate() {
                feed.append(status(if *admit { "W1AW" } else { "N0CALL" }, n));
            }

            let entries = feed.read(0, usize::MAX);
            let admitted = sources.iter().filter(|a| **a).count();
            prop_assert_eq!(entries.len(), admitted.min(capacity));
            for pair in entries.windows(2) {
                prop_assert_eq!(pair[1].seq, pair[0].seq + 1);
            }
            if let Some(last) = entries.last() {
                prop_assert_eq!(last.seq, admitted as u64);
            }
        }

        #[test]
        fn resumed_reads_neither_repeat_nor_skip(
            capacity in 1usize..30,
            total in 0usize..60,
            from in 0u64..70,
            max in 1usize..40,
        ) {
            let feed = feed(capacity, 0);
            for n in 0..total {
                feed.append(status("N0CALL", n));
            }

            let batch = feed.read(from, max);
            prop_assert!(batch.iter().all(|e| e.seq > from));

            let expected: Vec<u64> = feed
                .read(0, usize::MAX)
                .iter()
                .map(|e| e.seq)
                .filter(|seq| *seq > from)
                .take(max)
                .collect();
            prop_assert_eq!(seqs(&batch), expected);
        }
    }
}

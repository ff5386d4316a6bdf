//! Driver spawns and manages the ingestion pipeline task

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::chat::ChatSession;
use crate::feed::{DedupWindow, LiveFeed};
use crate::normalize::normalize;
use crate::types::{PacketKind, RawFrame};

/// Snapshot of pipeline counters since start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Lines received from the link, including server comments
    pub frames: u64,
    /// `#` server comment lines
    pub comments: u64,
    /// Frames that normalized into packets
    pub normalized: u64,
    /// Frames dropped as malformed
    pub parse_errors: u64,
    /// Packets dropped as duplicates
    pub duplicates: u64,
    /// Packets admitted into the feed
    pub admitted: u64,
    /// Packets the current filter did not match
    pub rejected: u64,
    /// Normalized packets by type
    pub by_kind: BTreeMap<PacketKind, u64>,
}

#[derive(Default)]
struct Counters {
    frames: AtomicU64,
    comments: AtomicU64,
    normalized: AtomicU64,
    parse_errors: AtomicU64,
    duplicates: AtomicU64,
    admitted: AtomicU64,
    rejected: AtomicU64,
    by_kind: [AtomicU64; PacketKind::ALL.len()],
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            frames: load(&self.frames),
            comments: load(&self.comments),
            normalized: load(&self.normalized),
            parse_errors: load(&self.parse_errors),
            duplicates: load(&self.duplicates),
            admitted: load(&self.admitted),
            rejected: load(&self.rejected),
            by_kind: PacketKind::ALL
                .iter()
                .zip(&self.by_kind)
                .map(|(kind, count)| (*kind, load(count)))
                .collect(),
        }
    }
}

/// Handle to the running pipeline
pub struct PipelineHandle {
    counters: Arc<Counters>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Whether the pipeline task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the pipeline and wait for it to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            debug!("Pipeline task ended abnormally: {}", e);
        }
    }
}

/// Driver spawns the task that turns raw frames into feed entries
///
/// One task per connection manager: frames are handled strictly in arrival
/// order, so sequence numbers follow arrival order. Malformed frames are
/// counted and skipped; nothing in the pipeline stops on bad input.
pub struct Driver;

impl Driver {
    pub fn spawn(
        frames: mpsc::Receiver<RawFrame>,
        feed: Arc<LiveFeed>,
        chat: ChatSession,
        dedup_window: Duration,
    ) -> PipelineHandle {
        let counters = Arc::new(Counters::default());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Self::pipeline_task(
            frames,
            feed,
            chat,
            DedupWindow::new(dedup_window),
            Arc::clone(&counters),
            cancel.clone(),
        ));

        PipelineHandle { counters, cancel, task }
    }

    async fn pipeline_task(
        mut frames: mpsc::Receiver<RawFrame>,
        feed: Arc<LiveFeed>,
        chat: ChatSession,
        mut dedup: DedupWindow,
        counters: Arc<Counters>,
        cancel: CancellationToken,
    ) {
        info!("Pipeline task started");

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Pipeline cancelled");
                    break;
                }
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        debug!("Frame source closed");
                        break;
                    }
                },
            };

            bump(&counters.frames);
            if frame.is_server_comment() {
                bump(&counters.comments);
                trace!(line = %frame.data, "Server comment");
                continue;
            }

            let packet = match normalize(&frame) {
                Ok(packet) => Arc::new(packet),
                Err(e) => {
                    bump(&counters.parse_errors);
                    debug!(connection_id = frame.connection_id, frame = %frame.data, error = %e, "Dropping malformed frame");
                    continue;
                }
            };
            bump(&counters.normalized);
            if let Some(index) = PacketKind::ALL.iter().position(|k| *k == packet.kind()) {
                bump(&counters.by_kind[index]);
            }

            // Chat sees every packet, duplicates included, so retransmitted
            // messages are acknowledged again
            chat.observe(&packet);

            if dedup.is_duplicate(&packet) {
                bump(&counters.duplicates);
                trace!(source = %packet.source, "Duplicate packet dropped");
                continue;
            }

            match feed.append(packet) {
                Some(_) => bump(&counters.admitted),
                None => bump(&counters.rejected),
            }
        }

        let stats = counters.snapshot();
        info!(
            frames = stats.frames,
            admitted = stats.admitted,
            parse_errors = stats.parse_errors,
            "Pipeline task ended"
        );
    }
}

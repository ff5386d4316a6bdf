//! Rate-limiting stream adapter with latest-wins semantics

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait to add coalescing to any Stream
pub trait CoalesceExt: Stream {
    /// Emit at most once per `period`.
    ///
    /// Items arriving between emissions replace each other; only the newest
    /// is delivered. The first item after a quiet spell goes out immediately.
    fn coalesce(self, period: Duration) -> Coalesce<Self>
    where
        Self: Sized,
    {
        Coalesce::new(self, period)
    }
}

impl<T: Stream> CoalesceExt for T {}

pin_project! {
    /// Stream returned by [`CoalesceExt::coalesce`]
    pub struct Coalesce<S: Stream> {
        #[pin]
        stream: S,
        period: Duration,
        // Created on first use so the adapter can be built off the runtime
        interval: Option<Interval>,
        pending: Option<S::Item>,
        done: bool,
    }
}

impl<S: Stream> Coalesce<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        Self { stream, period, interval: None, pending: None, done: false }
    }
}

impl<S: Stream> Stream for Coalesce<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => break,
            }
        }

        if this.pending.is_some() {
            // Only tick when something is due, so idle periods do not
            // accumulate into a burst
            let period = *this.period;
            let ticks = this.interval.get_or_insert_with(|| {
                let mut ticks = interval(period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticks
            });
            return match ticks.poll_tick(cx) {
                Poll::Ready(_) => Poll::Ready(this.pending.take()),
                Poll::Pending => Poll::Pending,
            };
        }

        if *this.done { Poll::Ready(None) } else { Poll::Pending }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[tokio::test(start_paused = true)]
    async fn keeps_only_the_latest_item_per_period() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = UnboundedReceiverStream::new(rx).coalesce(Duration::from_millis(100));

        for n in 1..=3 {
            tx.send(n).unwrap();
        }
        assert_eq!(stream.next().await, Some(3));

        let start = tokio::time::Instant::now();
        tx.send(4).unwrap();
        tx.send(5).unwrap();
        assert_eq!(stream.next().await, Some(5));
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_instead_of_ending_when_idle() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = UnboundedReceiverStream::new(rx).coalesce(Duration::from_millis(50));

        let idle = tokio::time::timeout(Duration::from_secs(1), stream.next()).await;
        assert!(idle.is_err(), "an idle source must not end the stream");

        tx.send(7).unwrap();
        assert_eq!(stream.next().await, Some(7));
    }

    #[test]
    fn can_be_built_outside_a_runtime() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = UnboundedReceiverStream::new(rx).coalesce(Duration::from_millis(10));
        tx.send(1).unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        assert_eq!(runtime.block_on(stream.next()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_pending_item_before_ending() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = UnboundedReceiverStream::new(rx).coalesce(Duration::from_millis(50));

        tx.send(1).unwrap();
        assert_eq!(stream.next().await, Some(1));
        tx.send(2).unwrap();
        drop(tx);
        assert_eq!(stream.next().await, Some(2));
        assert_eq!(stream.next().await, None);
    }
}

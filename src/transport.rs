//! Transport traits for the upstream link

use crate::Result;

/// Factory for links to the packet source.
///
/// The connection manager calls [`connect`](Transport::connect) once per
/// attempt; every successful call yields an independent [`Link`]. Timeouts
/// and retries are the manager's job, not the transport's.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new link.
    async fn connect(&self) -> Result<Box<dyn Link>>;

    /// Where this transport connects, for logs and state snapshots
    fn endpoint(&self) -> String;
}

/// An open, line-oriented duplex link.
#[async_trait::async_trait]
pub trait Link: Send + 'static {
    /// Read the next line, without its terminator.
    ///
    /// Returns:
    /// - `Ok(Some(line))` - A line arrived
    /// - `Ok(None)` - The peer closed the link
    /// - `Err(e)` - The link failed
    ///
    /// Must be cancel-safe: the manager races this against timers and
    /// commands, and a cancelled read must not lose a partially received line.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>>;

    /// Write one line; the link appends the terminator.
    async fn write_frame(&mut self, line: &str) -> Result<()>;

    /// Close the link. Further reads return `Ok(None)`.
    async fn close(&mut self) -> Result<()>;
}

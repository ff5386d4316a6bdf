//! APRS-IS over TCP

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder, Framed};
use tracing::{debug, info, trace, warn};

use crate::config::Endpoint;
use crate::transport::{Link, Transport};
use crate::{FeedError, Result};

/// Longest line accepted from the server. APRS-IS limits packets to 512
/// bytes; anything far beyond that means the stream is corrupt.
const MAX_LINE_LEN: usize = 4_096;

/// Connects to an APRS-IS server over plain TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    endpoint: Endpoint,
}

impl TcpTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<Box<dyn Link>> {
        let address = self.endpoint.address();
        debug!(%address, "Opening TCP connection");

        let stream = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(|e| {
                FeedError::connection_failed_with_source(format!("connect to {address}"), Box::new(e))
            })?;
        stream.set_nodelay(true)?;

        info!(%address, peer = ?stream.peer_addr().ok(), "TCP connection established");
        Ok(Box::new(TcpLink::new(stream)))
    }

    fn endpoint(&self) -> String {
        self.endpoint.address()
    }
}

/// One decoded chunk of the server stream.
#[derive(Debug)]
enum Line {
    Text(Bytes),
    /// A line over [`MAX_LINE_LEN`]. The codec drops it up to the next `\n`.
    Overlong,
}

/// `\n`-delimited lines, `\r\n` on the way out.
///
/// A thin layer over [`AnyDelimiterCodec`] that reports an over-long line as
/// an item instead of an error, since `Framed` ends the stream after any
/// decode error.
struct LineCodec {
    inner: AnyDelimiterCodec,
}

impl LineCodec {
    fn new() -> Self {
        let inner =
            AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\r\n".to_vec(), MAX_LINE_LEN);
        Self { inner }
    }

    fn lift(
        decoded: Result<Option<Bytes>, AnyDelimiterCodecError>,
    ) -> Result<Option<Line>, AnyDelimiterCodecError> {
        match decoded {
            Ok(line) => Ok(line.map(Line::Text)),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Line::Overlong)),
            Err(e) => Err(e),
        }
    }
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, Self::Error> {
        Self::lift(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Line>, Self::Error> {
        Self::lift(self.inner.decode_eof(buf))
    }
}

impl Encoder<&str> for LineCodec {
    type Error = AnyDelimiterCodecError;

    fn encode(&mut self, line: &str, buf: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(line, buf)
    }
}

/// Line-framed TCP stream.
///
/// Lines are split on `\n` (a preceding `\r` is trimmed later by
/// [`RawFrame::from_bytes`](crate::types::RawFrame::from_bytes)) and written
/// with `\r\n` as APRS-IS expects. Lines longer than [`MAX_LINE_LEN`] are
/// dropped and the link carries on with the next one.
pub struct TcpLink {
    framed: Framed<TcpStream, LineCodec>,
    closed: bool,
    overlong: u64,
}

impl TcpLink {
    fn new(stream: TcpStream) -> Self {
        Self { framed: Framed::new(stream, LineCodec::new()), closed: false, overlong: 0 }
    }
}

fn codec_error(error: AnyDelimiterCodecError) -> FeedError {
    match error {
        AnyDelimiterCodecError::Io(e) => FeedError::Io(e),
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            FeedError::send_failed(format!("line longer than {MAX_LINE_LEN} bytes"))
        }
    }
}

#[async_trait::async_trait]
impl Link for TcpLink {
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            match self.framed.next().await {
                Some(Ok(Line::Text(line))) if line.iter().all(|b| b.is_ascii_whitespace()) => continue,
                Some(Ok(Line::Text(line))) => {
                    trace!(len = line.len(), "Line received");
                    return Ok(Some(line.to_vec()));
                }
                Some(Ok(Line::Overlong)) => {
                    self.overlong += 1;
                    warn!(limit = MAX_LINE_LEN, dropped = self.overlong, "Dropping over-long line");
                }
                Some(Err(e)) => return Err(codec_error(e)),
                None => return Ok(None),
            }
        }
    }

    async fn write_frame(&mut self, line: &str) -> Result<()> {
        if self.closed {
            return Err(FeedError::send_failed("link closed"));
        }
        self.framed.send(line).await.map_err(codec_error)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            SinkExt::<&str>::close(&mut self.framed).await.map_err(codec_error)?;
        }
        Ok(())
    }
}

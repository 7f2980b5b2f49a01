//! Paced copy of producer output into a response body.
//!
//! The relay pushes [`RelayFrame`]s into a bounded channel whose receiving end
//! becomes the HTTP body (see [`body_stream`]). Dropping the body closes the
//! channel, which every suspension point of [`relay`] watches for.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{stream, Stream};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;

/// Item carried from the streaming task to the response body.
#[derive(Debug)]
pub enum RelayFrame {
    Data(Bytes),
    /// The archive is complete; the body may end cleanly.
    End,
}

pub type FrameSender = mpsc::Sender<RelayFrame>;
pub type FrameReceiver = mpsc::Receiver<RelayFrame>;

/// At most one chunk is ever queued between the relay and the client.
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    mpsc::channel(1)
}

#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    pub chunk_size: usize,
    /// Pause after each chunk that carried data.
    pub delay: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub chunks: u64,
    pub bytes: u64,
}

/// Copy `reader` into `sink` chunk by chunk until end of stream.
///
/// Each iteration first waits for the channel slot to be free, then reads at
/// most `chunk_size` bytes, hands them to the sink and sleeps for `delay`.
/// The next chunk is not read from the producer until the body has taken the
/// previous one, so besides the chunk the server is writing at most one more
/// sits in the channel. Closing the sink yields [`StreamError::PeerClosed`]
/// and cancelling `cancel` yields [`StreamError::Cancelled`], whichever
/// suspension point is pending.
pub async fn relay<R>(
    reader: &mut R,
    sink: &FrameSender,
    options: RelayOptions,
    cancel: &CancellationToken,
) -> Result<RelayStats, StreamError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut stats = RelayStats::default();
    loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            permit = sink.reserve() => permit.map_err(|_| StreamError::PeerClosed)?,
        };

        let mut buf = BytesMut::zeroed(options.chunk_size);
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            _ = sink.closed() => return Err(StreamError::PeerClosed),
            read = reader.read(&mut buf) => read.map_err(StreamError::Read)?,
        };
        if n == 0 {
            return Ok(stats);
        }
        buf.truncate(n);

        permit.send(RelayFrame::Data(buf.freeze()));
        stats.chunks += 1;
        stats.bytes += n as u64;
        tracing::trace!(chunk = stats.chunks, bytes = n, "relayed chunk");

        if !options.delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = sink.closed() => return Err(StreamError::PeerClosed),
                _ = tokio::time::sleep(options.delay) => {}
            }
        }
    }
}

/// Send one data chunk outside the read loop.
pub async fn send_chunk(
    sink: &FrameSender,
    bytes: Bytes,
    cancel: &CancellationToken,
) -> Result<(), StreamError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StreamError::Cancelled),
        sent = sink.send(RelayFrame::Data(bytes)) => sent.map_err(|_| StreamError::PeerClosed),
    }
}

/// Tell the body that the archive is complete.
pub async fn finish(sink: &FrameSender) -> Result<(), StreamError> {
    sink.send(RelayFrame::End)
        .await
        .map_err(|_| StreamError::PeerClosed)
}

/// Adapt the receiving end of [`frame_channel`] into a body stream.
///
/// If the sender goes away without sending [`RelayFrame::End`] the stream
/// yields an error, so the server aborts the connection instead of ending
/// the chunked body as if the archive were whole.
pub fn body_stream(rx: FrameReceiver) -> impl Stream<Item = io::Result<Bytes>> {
    stream::unfold(Some(rx), |rx| async move {
        let Some(mut rx) = rx else {
            return None;
        };
        match rx.recv().await {
            Some(RelayFrame::Data(bytes)) => Some((Ok(bytes), Some(rx))),
            Some(RelayFrame::End) => None,
            None => Some((
                Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "archive stream aborted",
                )),
                None,
            )),
        }
    })
}

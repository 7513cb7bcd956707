//! Upstream ingest interface
//!
//! The relay does not pull media itself. An `Ingest` implementation (RTSP
//! client, file reader, in-process encoder, ...) is asked to start a feed for
//! a stream and hands back the negotiated codecs plus a packet channel.
//!
//! ```text
//!   registry.ensure_running(id)
//!            │
//!            ▼
//!   ingest.pull(id, source, stop) ──► IngestFeed { codecs, packets }
//!                                                          │
//!                                              fanout task ◄┘
//! ```
//!
//! The feed is not restartable. It ends when the sender side is dropped, when
//! an `Err` item is sent, or when `stop` is cancelled by the registry.

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::media::{CodecSet, Packet};
use crate::registry::{StreamConfig, StreamId};

#[cfg(test)]
pub(crate) mod mock;

/// Sending half of a feed, owned by the ingest implementation
pub type PacketSender = mpsc::Sender<Result<Packet, IngestError>>;

/// Receiving half of a feed, owned by the fan-out task
pub type PacketReceiver = mpsc::Receiver<Result<Packet, IngestError>>;

/// Error reported by an ingest implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Source could not be reached
    Unreachable(String),
    /// Source was reached but codecs could not be negotiated
    Negotiation(String),
    /// Feed failed after it had started
    Interrupted(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Unreachable(msg) => write!(f, "Source unreachable: {}", msg),
            IngestError::Negotiation(msg) => write!(f, "Codec negotiation failed: {}", msg),
            IngestError::Interrupted(msg) => write!(f, "Ingest interrupted: {}", msg),
        }
    }
}

impl std::error::Error for IngestError {}

/// A started upstream feed
pub struct IngestFeed {
    /// Codecs negotiated with the source
    pub codecs: CodecSet,
    /// Packets in production order
    pub packets: PacketReceiver,
}

impl IngestFeed {
    /// Create a feed and the sender the producer should write into
    pub fn channel(codecs: CodecSet, capacity: usize) -> (PacketSender, Self) {
        let (tx, packets) = mpsc::channel(capacity);
        (tx, Self { codecs, packets })
    }
}

/// Starts upstream feeds on behalf of the registry
///
/// `pull` must return once codecs are known. Packet production continues in
/// the background until `stop` is cancelled or the receiver is dropped.
pub trait Ingest: Send + Sync + 'static {
    fn pull(
        &self,
        id: &StreamId,
        source: &StreamConfig,
        stop: CancellationToken,
    ) -> impl Future<Output = Result<IngestFeed, IngestError>> + Send;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::media::{CodecType, TrackCodec};

    #[test]
    fn test_ingest_error_display() {
        let err = IngestError::Unreachable("connection refused".into());
        assert_eq!(err.to_string(), "Source unreachable: connection refused");

        let err = IngestError::Interrupted("EOF".into());
        assert_eq!(err.to_string(), "Ingest interrupted: EOF");
    }

    #[tokio::test]
    async fn test_feed_channel() {
        let codecs = CodecSet::new(vec![TrackCodec::new(CodecType::H264)]);
        let (tx, mut feed) = IngestFeed::channel(codecs.clone(), 4);

        tx.send(Ok(Packet::keyframe(0, Duration::ZERO, Bytes::from_static(b"k"))))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(feed.codecs, codecs);
        assert!(feed.packets.recv().await.unwrap().unwrap().is_keyframe);
        assert!(feed.packets.recv().await.is_none());
    }
}

//! Viewer session handle
//!
//! A `ViewerSession` is the consumer end of one registration. The fan-out
//! task owns the sending half of the queue (inside the stream entry); the
//! session owns the receiving half plus a link used to close it early.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::media::Packet;
use crate::registry::{StreamId, ViewerId};

/// Why a viewer's queue was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Removed through `deregister`
    Deregistered,
    /// Upstream feed ended or failed
    StreamEnded,
    /// Stream was removed from the registry
    StreamRemoved,
    /// Queue overflowed under `OverflowPolicy::EvictViewer`
    QueueOverflow,
    /// Consumer dropped its end of the queue
    ConsumerGone,
    /// Registry shut down
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::Deregistered => "deregistered",
            CloseReason::StreamEnded => "stream ended",
            CloseReason::StreamRemoved => "stream removed",
            CloseReason::QueueOverflow => "queue overflow",
            CloseReason::ConsumerGone => "consumer gone",
            CloseReason::Shutdown => "shutdown",
        };
        f.write_str(reason)
    }
}

/// State shared between the registry-side slot and the session
///
/// The first recorded reason wins.
#[derive(Debug, Default)]
pub(crate) struct ViewerLink {
    cancel: CancellationToken,
    reason: OnceLock<CloseReason>,
}

impl ViewerLink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record the reason and stop the consumer without draining its queue
    pub(crate) fn close(&self, reason: CloseReason) {
        let _ = self.reason.set(reason);
        self.cancel.cancel();
    }

    /// Record the reason only; the consumer drains its queue, then sees it closed
    pub(crate) fn finish(&self, reason: CloseReason) {
        let _ = self.reason.set(reason);
    }

    pub(crate) fn reason(&self) -> Option<CloseReason> {
        self.reason.get().copied()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Consumer end of a viewer registration
pub struct ViewerSession {
    id: ViewerId,
    stream: StreamId,
    audio_only: bool,
    packets: mpsc::Receiver<Packet>,
    link: Arc<ViewerLink>,
}

impl ViewerSession {
    pub(crate) fn new(
        id: ViewerId,
        stream: StreamId,
        audio_only: bool,
        packets: mpsc::Receiver<Packet>,
        link: Arc<ViewerLink>,
    ) -> Self {
        Self {
            id,
            stream,
            audio_only,
            packets,
            link,
        }
    }

    /// Registration id
    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Stream this viewer is registered with
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Whether the stream's codecs were audio-only at registration
    pub fn audio_only(&self) -> bool {
        self.audio_only
    }

    /// Receive the next packet
    ///
    /// Returns `None` once the session is closed. An early close (deregister,
    /// eviction, removal) takes effect immediately; a stream end is only seen
    /// after the queued packets have been drained.
    pub async fn recv(&mut self) -> Option<Packet> {
        tokio::select! {
            biased;
            _ = self.link.cancel.cancelled() => None,
            packet = self.packets.recv() => packet,
        }
    }

    /// Receive a packet if one is queued
    pub fn try_recv(&mut self) -> Option<Packet> {
        if self.link.cancel.is_cancelled() {
            return None;
        }
        self.packets.try_recv().ok()
    }

    /// Why the session was closed, if it was
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.link.reason()
    }

    /// Whether the session was closed early
    pub fn is_cancelled(&self) -> bool {
        self.link.cancel.is_cancelled()
    }

    /// Token cancelled when the session is closed early
    pub fn cancellation(&self) -> CancellationToken {
        self.link.token()
    }

    pub(crate) fn link(&self) -> Arc<ViewerLink> {
        Arc::clone(&self.link)
    }
}

impl fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewerSession")
            .field("id", &self.id)
            .field("stream", &self.stream)
            .field("audio_only", &self.audio_only)
            .field("close_reason", &self.link.reason())
            .finish()
    }
}

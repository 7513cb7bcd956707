//! Broadcast fan-out
//!
//! One task per running stream reads the upstream feed and offers every
//! packet to every registered viewer with a non-blocking `try_send`. A full
//! queue never stalls the task: the overflow policy decides whether the
//! packet or the viewer is dropped.
//!
//! # Slow viewers
//!
//! Under `OverflowPolicy::DropPacket` a video viewer that misses a packet is
//! put into resync and skips everything up to the next keyframe it can
//! accept. What it does receive is still a gap-free run of GOPs, in upstream
//! order. Audio has no inter-packet dependencies, so audio-only viewers just
//! lose the packet.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::ingest::{IngestError, PacketReceiver};
use crate::media::Packet;
use crate::registry::config::OverflowPolicy;
use crate::registry::entry::{StreamEntry, ViewerSet};
use crate::registry::StreamId;
use crate::viewer::CloseReason;

/// Outcome of offering one packet to a viewer set
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub(crate) delivered: usize,
    pub(crate) dropped: usize,
    pub(crate) removed: usize,
}

/// Offer `packet` to every viewer in `viewers`
pub(crate) fn deliver(
    stream: &StreamId,
    viewers: &mut ViewerSet,
    packet: &Packet,
    policy: OverflowPolicy,
    audio_only: bool,
) -> Delivery {
    let mut report = Delivery::default();

    viewers.slots.retain(|id, slot| {
        if slot.resync && !audio_only && !packet.is_keyframe {
            slot.dropped += 1;
            report.dropped += 1;
            return true;
        }

        match slot.tx.try_send(packet.clone()) {
            Ok(()) => {
                if slot.resync {
                    tracing::debug!(stream = %stream, viewer = %id, "Viewer resynced on keyframe");
                }
                slot.resync = false;
                slot.delivered += 1;
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => match policy {
                OverflowPolicy::DropPacket => {
                    if !slot.resync {
                        tracing::debug!(
                            stream = %stream,
                            viewer = %id,
                            dropped = slot.dropped + 1,
                            "Viewer queue full, dropping packets"
                        );
                    }
                    slot.dropped += 1;
                    slot.resync = !audio_only;
                    report.dropped += 1;
                    true
                }
                OverflowPolicy::EvictViewer => {
                    tracing::warn!(stream = %stream, viewer = %id, "Viewer queue full, evicting");
                    slot.link.close(CloseReason::QueueOverflow);
                    report.removed += 1;
                    false
                }
            },
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(stream = %stream, viewer = %id, "Viewer queue closed, removing");
                slot.link.finish(CloseReason::ConsumerGone);
                report.removed += 1;
                false
            }
        }
    });

    if report.removed > 0 {
        viewers.mark_if_empty();
    }

    report
}

/// Fan-out task for one ingest run
///
/// Ends when the feed ends, reports an error, or `stop` is cancelled. If the
/// run is still the entry's current one, every viewer is closed with
/// `CloseReason::StreamEnded`.
pub(crate) async fn run(
    entry: Arc<StreamEntry>,
    mut packets: PacketReceiver,
    stop: CancellationToken,
    generation: u64,
    policy: OverflowPolicy,
    audio_only: bool,
) {
    let stream = entry.id().clone();
    tracing::debug!(stream = %stream, generation = generation, "Fanout started");

    let failure: Option<IngestError> = loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break None,
            next = packets.recv() => match next {
                Some(Ok(packet)) => {
                    entry.count_packet();
                    let mut viewers = entry.viewers.write().await;
                    let report = deliver(&stream, &mut viewers, &packet, policy, audio_only);
                    tracing::trace!(
                        stream = %stream,
                        delivered = report.delivered,
                        dropped = report.dropped,
                        removed = report.removed,
                        keyframe = packet.is_keyframe,
                        "Packet fanned out"
                    );
                }
                Some(Err(e)) => break Some(e),
                None => break None,
            },
        }
    };

    // Dropping the receiver and cancelling tells the producer to stop
    drop(packets);
    stop.cancel();

    if !entry.end_run(generation, failure.clone()).await {
        tracing::debug!(stream = %stream, generation = generation, "Fanout stopped");
        return;
    }

    let closed = entry.viewers.write().await.close_all(CloseReason::StreamEnded);
    match failure {
        Some(e) => tracing::warn!(
            stream = %stream,
            viewers = closed,
            error = %e,
            "Ingest failed, stream stopped"
        ),
        None => tracing::info!(stream = %stream, viewers = closed, "Ingest ended"),
    }
}

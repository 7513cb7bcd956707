//! Stream entry and viewer bookkeeping
//!
//! This module defines the per-stream state stored in the registry. Every
//! entry carries its own locks so unrelated streams never contend:
//! - `start_lock` serializes ingest starts (single flight per stream)
//! - `status` holds ingest state readable without waiting on a start
//! - `viewers` is the fan-out target set

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ingest::IngestError;
use crate::media::{CodecSet, Packet};
use crate::viewer::session::{CloseReason, ViewerLink};

use super::config::StreamConfig;
use super::id::{StreamId, ViewerId};

/// Registry-side half of a viewer registration
pub(crate) struct ViewerSlot {
    pub(crate) tx: mpsc::Sender<Packet>,
    pub(crate) link: Arc<ViewerLink>,
    /// Skip packets until the next keyframe fits in the queue
    pub(crate) resync: bool,
    pub(crate) delivered: u64,
    pub(crate) dropped: u64,
}

impl ViewerSlot {
    pub(crate) fn new(tx: mpsc::Sender<Packet>, link: Arc<ViewerLink>) -> Self {
        Self {
            tx,
            link,
            resync: false,
            delivered: 0,
            dropped: 0,
        }
    }
}

/// Viewers registered with one stream
#[derive(Default)]
pub(crate) struct ViewerSet {
    pub(crate) slots: HashMap<ViewerId, ViewerSlot>,
    /// Set when the last viewer leaves, cleared on registration
    pub(crate) empty_since: Option<Instant>,
}

impl ViewerSet {
    pub(crate) fn insert(&mut self, id: ViewerId, slot: ViewerSlot) {
        self.slots.insert(id, slot);
        self.empty_since = None;
    }

    pub(crate) fn remove(&mut self, id: ViewerId) -> Option<ViewerSlot> {
        let slot = self.slots.remove(&id);
        self.mark_if_empty();
        slot
    }

    /// Drop slots whose consumer has gone away
    pub(crate) fn prune_closed(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            if slot.tx.is_closed() {
                slot.link.finish(CloseReason::ConsumerGone);
                false
            } else {
                true
            }
        });
        self.mark_if_empty();
        before - self.slots.len()
    }

    /// Remove every viewer and close it
    ///
    /// `StreamEnded` lets consumers drain what is already queued; any other
    /// reason stops them immediately.
    pub(crate) fn close_all(&mut self, reason: CloseReason) -> usize {
        let count = self.slots.len();
        for (_, slot) in self.slots.drain() {
            if reason == CloseReason::StreamEnded {
                slot.link.finish(reason);
            } else {
                slot.link.close(reason);
            }
        }
        self.mark_if_empty();
        count
    }

    pub(crate) fn mark_if_empty(&mut self) {
        if self.slots.is_empty() && self.empty_since.is_none() {
            self.empty_since = Some(Instant::now());
        }
    }

    /// Restart the idle clock if nobody is watching
    pub(crate) fn restart_idle_clock(&mut self) {
        if self.slots.is_empty() {
            self.empty_since = Some(Instant::now());
        }
    }

    /// Empty for at least `timeout` as of `now`
    pub(crate) fn idle_for(&self, timeout: Duration, now: Instant) -> bool {
        self.slots.is_empty()
            && self
                .empty_since
                .is_some_and(|since| now.saturating_duration_since(since) >= timeout)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Ingest state of a stream
#[derive(Default)]
pub(crate) struct IngestStatus {
    pub(crate) running: bool,
    /// Codecs of the current (or last) run
    pub(crate) codecs: Option<CodecSet>,
    pub(crate) last_error: Option<IngestError>,
    /// Error of the most recent start attempt, `None` if it succeeded
    pub(crate) start_error: Option<IngestError>,
    /// Bumped on every start and every deliberate stop
    pub(crate) generation: u64,
    /// Completed start attempts, successful or not
    pub(crate) attempts: u64,
    pub(crate) stop: Option<CancellationToken>,
}

/// Entry for a single stream in the registry
pub struct StreamEntry {
    id: StreamId,
    source: StreamConfig,
    pub(crate) start_lock: Mutex<()>,
    pub(crate) status: RwLock<IngestStatus>,
    pub(crate) viewers: RwLock<ViewerSet>,
    packets_received: AtomicU64,
    created_at: Instant,
}

impl StreamEntry {
    pub(crate) fn new(id: StreamId, source: StreamConfig) -> Self {
        let mut viewers = ViewerSet::default();
        viewers.mark_if_empty();

        Self {
            id,
            source,
            start_lock: Mutex::new(()),
            status: RwLock::new(IngestStatus::default()),
            viewers: RwLock::new(viewers),
            packets_received: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn source(&self) -> &StreamConfig {
        &self.source
    }

    pub fn is_on_demand(&self) -> bool {
        self.source.on_demand
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Packets received from upstream over all runs
    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub(crate) fn count_packet(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn is_running(&self) -> bool {
        self.status.read().await.running
    }

    /// Codecs if ingest is currently running
    pub(crate) async fn running_codecs(&self) -> Option<CodecSet> {
        let status = self.status.read().await;
        if status.running {
            status.codecs.clone()
        } else {
            None
        }
    }

    pub(crate) async fn attempts(&self) -> u64 {
        self.status.read().await.attempts
    }

    /// Record a successful start, returning the run's generation
    ///
    /// On-demand idle time is measured from here, not from when the last
    /// viewer left before the start.
    pub(crate) async fn begin_run(&self, codecs: CodecSet, stop: CancellationToken) -> u64 {
        let generation = {
            let mut status = self.status.write().await;
            status.running = true;
            status.codecs = Some(codecs);
            status.last_error = None;
            status.start_error = None;
            status.generation += 1;
            status.attempts += 1;
            status.stop = Some(stop);
            status.generation
        };

        self.viewers.write().await.restart_idle_clock();
        generation
    }

    /// Record a failed start
    pub(crate) async fn fail_start(&self, err: IngestError) {
        let mut status = self.status.write().await;
        status.last_error = Some(err.clone());
        status.start_error = Some(err);
        status.attempts += 1;
    }

    /// Error of the most recent start attempt
    pub(crate) async fn start_error(&self) -> Option<IngestError> {
        self.status.read().await.start_error.clone()
    }

    /// Called by the fan-out task when its feed ends
    ///
    /// Returns false if the run had already been superseded or stopped.
    pub(crate) async fn end_run(&self, generation: u64, err: Option<IngestError>) -> bool {
        let mut status = self.status.write().await;
        if status.generation != generation {
            return false;
        }
        if err.is_some() {
            status.last_error = err;
        }
        status.running = false;
        status.stop = None;
        true
    }

    /// Stop the current run, if any, and close every viewer with `reason`
    ///
    /// Viewers are closed even if no run was active. Returns true if a run
    /// was stopped.
    pub(crate) async fn stop_ingest(&self, reason: CloseReason) -> bool {
        let mut viewers = self.viewers.write().await;
        self.stop_locked(&mut viewers, reason).await
    }

    /// Stop the current run if the stream has had no viewers for `timeout`
    ///
    /// The check and the stop happen under one viewers lock. A viewer that
    /// registers concurrently either keeps the run alive or is added after
    /// the stop and waits for the next start.
    pub(crate) async fn stop_if_idle(&self, timeout: Duration, now: Instant) -> bool {
        let mut viewers = self.viewers.write().await;
        viewers.prune_closed();
        if !viewers.idle_for(timeout, now) {
            return false;
        }
        self.stop_locked(&mut viewers, CloseReason::StreamEnded).await
    }

    // Lock order is viewers, then status
    async fn stop_locked(&self, viewers: &mut ViewerSet, reason: CloseReason) -> bool {
        let stopped = {
            let mut status = self.status.write().await;
            match status.stop.take() {
                Some(stop) => {
                    stop.cancel();
                    status.running = false;
                    status.generation += 1;
                    true
                }
                None => false,
            }
        };

        let closed = viewers.close_all(reason);
        if closed > 0 {
            tracing::debug!(
                stream = %self.id,
                viewers = closed,
                reason = %reason,
                "Closed viewers of stopped stream"
            );
        }

        stopped
    }

    pub(crate) async fn stats(&self) -> StreamStats {
        let (running, codecs, last_error) = {
            let status = self.status.read().await;
            (status.running, status.codecs.clone(), status.last_error.clone())
        };

        let viewers = self.viewers.read().await;
        let mut viewer_stats: Vec<ViewerStats> = viewers
            .slots
            .iter()
            .map(|(id, slot)| ViewerStats {
                id: *id,
                delivered: slot.delivered,
                dropped: slot.dropped,
                resyncing: slot.resync,
            })
            .collect();
        viewer_stats.sort_by_key(|v| v.id);

        StreamStats {
            viewer_count: viewers.len(),
            running,
            on_demand: self.source.on_demand,
            packets_received: self.packets_received(),
            codecs,
            last_error,
            viewers: viewer_stats,
        }
    }
}

/// Statistics for one viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerStats {
    pub id: ViewerId,
    /// Packets placed in the viewer's queue
    pub delivered: u64,
    /// Packets dropped for this viewer by the overflow policy
    pub dropped: u64,
    /// Waiting for a keyframe after a drop
    pub resyncing: bool,
}

/// Statistics for a stream
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Number of registered viewers
    pub viewer_count: usize,
    /// Whether ingest is running
    pub running: bool,
    pub on_demand: bool,
    /// Packets received from upstream over all runs
    pub packets_received: u64,
    /// Codecs of the current or last run
    pub codecs: Option<CodecSet>,
    pub last_error: Option<IngestError>,
    pub viewers: Vec<ViewerStats>,
}

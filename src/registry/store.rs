//! Stream registry implementation
//!
//! The central registry that owns every stream entry, starts and stops
//! upstream ingest, and registers viewers with the fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::fanout;
use crate::ingest::{Ingest, IngestError};
use crate::media::CodecSet;
use crate::viewer::session::{CloseReason, ViewerLink, ViewerSession};
use crate::viewer::task::{run_viewer, PacketWriter, ViewerHandle};

use super::config::{RegistryConfig, StreamConfig};
use super::entry::{StreamEntry, StreamStats, ViewerSlot};
use super::error::RegistryError;
use super::id::{StreamId, ViewerId};

/// Central registry for all streams
///
/// The map lock is only held to look up, insert or remove entries. Ingest
/// starts and viewer changes lock the individual entry, so unrelated streams
/// never wait on each other.
pub struct StreamRegistry<I: Ingest> {
    /// Map of stream id to stream entry
    streams: RwLock<HashMap<StreamId, Arc<StreamEntry>>>,

    /// Upstream feed provider
    ingest: I,

    /// Configuration
    config: RegistryConfig,

    next_viewer_id: AtomicU64,
}

impl<I: Ingest> StreamRegistry<I> {
    /// Create a new stream registry with default configuration
    pub fn new(ingest: I) -> Self {
        Self::with_config(ingest, RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(ingest: I, config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            ingest,
            config,
            next_viewer_id: AtomicU64::new(1),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the ingest provider
    pub fn ingest(&self) -> &I {
        &self.ingest
    }

    async fn entry(&self, id: &StreamId) -> Result<Arc<StreamEntry>, RegistryError> {
        self.streams
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::StreamNotFound(id.clone()))
    }

    async fn entries(&self) -> Vec<Arc<StreamEntry>> {
        self.streams.read().await.values().cloned().collect()
    }

    /// Add a stream definition
    ///
    /// Adding the same definition twice is a no-op. A different source under
    /// an existing id is rejected.
    pub async fn add_stream(
        &self,
        id: impl Into<StreamId>,
        source: StreamConfig,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        let mut streams = self.streams.write().await;

        if let Some(existing) = streams.get(&id) {
            if existing.source() == &source {
                return Ok(());
            }
            return Err(RegistryError::StreamIdCollision {
                id,
                existing: existing.source().url.clone(),
                requested: source.url,
            });
        }

        tracing::info!(
            stream = %id,
            url = %source.url,
            on_demand = source.on_demand,
            "Stream added"
        );
        streams.insert(id.clone(), Arc::new(StreamEntry::new(id, source)));

        Ok(())
    }

    /// Add an on-demand stream for `url`, deriving its id from the URL
    ///
    /// Returns the existing id if the same URL was added before.
    pub async fn add_source_url(&self, url: &str) -> Result<StreamId, RegistryError> {
        let id = StreamId::from_source_url(url);
        let mut streams = self.streams.write().await;

        if let Some(existing) = streams.get(&id) {
            if existing.source().url == url {
                return Ok(id);
            }
            tracing::warn!(
                stream = %id,
                existing = %existing.source().url,
                requested = %url,
                "Derived stream id collides with another source"
            );
            return Err(RegistryError::StreamIdCollision {
                id,
                existing: existing.source().url.clone(),
                requested: url.to_string(),
            });
        }

        let source = StreamConfig::new(url).on_demand(true);
        tracing::info!(stream = %id, url = %url, "Stream added from source URL");
        streams.insert(id.clone(), Arc::new(StreamEntry::new(id.clone(), source)));

        Ok(id)
    }

    /// Remove a stream, stopping ingest and closing its viewers
    pub async fn remove_stream(&self, id: &StreamId) -> bool {
        let Some(entry) = self.streams.write().await.remove(id) else {
            return false;
        };

        let viewers = entry.viewers.read().await.len();
        entry.stop_ingest(CloseReason::StreamRemoved).await;

        tracing::info!(stream = %id, viewers = viewers, "Stream removed");
        true
    }

    /// Check if a stream exists, running or not
    pub async fn exists(&self, id: &StreamId) -> bool {
        self.streams.read().await.contains_key(id)
    }

    /// Check if a stream's ingest is running
    pub async fn is_running(&self, id: &StreamId) -> bool {
        match self.entry(id).await {
            Ok(entry) => entry.is_running().await,
            Err(_) => false,
        }
    }

    /// Start ingest for a stream unless it is already running
    ///
    /// Concurrent calls for the same stream share one start: the first caller
    /// pulls from the ingest while the others wait and receive its result.
    pub async fn ensure_running(&self, id: &StreamId) -> Result<CodecSet, RegistryError> {
        let entry = self.entry(id).await?;

        if let Some(codecs) = entry.running_codecs().await {
            return Ok(codecs);
        }

        let seen_attempts = entry.attempts().await;
        let _start = entry.start_lock.lock().await;

        // Someone else may have finished a start while we waited
        if let Some(codecs) = entry.running_codecs().await {
            return Ok(codecs);
        }
        if entry.attempts().await != seen_attempts {
            // A start that succeeded and then ended is retried below
            if let Some(err) = entry.start_error().await {
                return Err(RegistryError::IngestStartFailed(id.clone(), err));
            }
        }

        let stop = CancellationToken::new();
        let feed = match self.ingest.pull(id, entry.source(), stop.clone()).await {
            Ok(feed) => feed,
            Err(e) => {
                stop.cancel();
                tracing::warn!(stream = %id, error = %e, "Ingest start failed");
                entry.fail_start(e.clone()).await;
                return Err(RegistryError::IngestStartFailed(id.clone(), e));
            }
        };

        let codecs = feed.codecs.clone();
        let audio_only = codecs.is_audio_only();
        let generation = entry.begin_run(codecs.clone(), stop.clone()).await;

        tokio::spawn(fanout::run(
            Arc::clone(&entry),
            feed.packets,
            stop,
            generation,
            self.config.overflow_policy,
            audio_only,
        ));

        tracing::info!(
            stream = %id,
            tracks = codecs.len(),
            audio_only = audio_only,
            "Ingest started"
        );

        Ok(codecs)
    }

    /// Codecs of the current or last ingest run
    pub async fn codecs(&self, id: &StreamId) -> Option<CodecSet> {
        let entry = self.entry(id).await.ok()?;
        let status = entry.status.read().await;
        status.codecs.clone()
    }

    /// Last ingest error of a stream
    pub async fn last_error(&self, id: &StreamId) -> Option<IngestError> {
        let entry = self.entry(id).await.ok()?;
        let status = entry.status.read().await;
        status.last_error.clone()
    }

    /// Register a viewer with a stream
    ///
    /// The returned session receives packets once ingest is running. Its
    /// playback gate mode follows the codecs known at registration time, so
    /// call `ensure_running` first.
    pub async fn register(&self, id: &StreamId) -> Result<ViewerSession, RegistryError> {
        let entry = self.entry(id).await?;

        let audio_only = entry
            .status
            .read()
            .await
            .codecs
            .as_ref()
            .is_some_and(|codecs| codecs.is_audio_only());

        let viewer_id = ViewerId(self.next_viewer_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.config.viewer_queue_capacity);
        let link = ViewerLink::new();

        let viewers = {
            let mut viewers = entry.viewers.write().await;
            viewers.insert(viewer_id, ViewerSlot::new(tx, Arc::clone(&link)));
            viewers.len()
        };

        tracing::info!(
            stream = %id,
            viewer = %viewer_id,
            viewers = viewers,
            audio_only = audio_only,
            "Viewer registered"
        );

        Ok(ViewerSession::new(viewer_id, id.clone(), audio_only, rx, link))
    }

    /// Remove a viewer from a stream
    ///
    /// Safe to call repeatedly, for unknown viewers, or after the stream is
    /// gone. Returns true if a viewer was removed.
    pub async fn deregister(&self, id: &StreamId, viewer_id: ViewerId) -> bool {
        let Ok(entry) = self.entry(id).await else {
            return false;
        };

        let (slot, remaining) = {
            let mut viewers = entry.viewers.write().await;
            let slot = viewers.remove(viewer_id);
            (slot, viewers.len())
        };

        let Some(slot) = slot else {
            return false;
        };
        slot.link.close(CloseReason::Deregistered);

        tracing::info!(
            stream = %id,
            viewer = %viewer_id,
            viewers = remaining,
            delivered = slot.delivered,
            dropped = slot.dropped,
            "Viewer removed"
        );
        true
    }

    /// Register a viewer and spawn its writer task
    ///
    /// The task gates playback on the first keyframe, closes the viewer after
    /// `idle_timeout` without one, and deregisters the viewer when it ends.
    pub async fn attach<W: PacketWriter>(
        self: &Arc<Self>,
        id: &StreamId,
        writer: W,
    ) -> Result<ViewerHandle, RegistryError> {
        let mut session = self.register(id).await?;
        let viewer_id = session.id();
        let link = session.link();
        let registry = Arc::clone(self);
        let idle_timeout = self.config.idle_timeout;

        let task = tokio::spawn(async move {
            let mut writer = writer;
            let exit = run_viewer(&mut session, &mut writer, idle_timeout).await;
            registry.deregister(session.stream(), session.id()).await;
            exit
        });

        Ok(ViewerHandle::new(viewer_id, id.clone(), link, task))
    }

    /// Number of viewers registered with a stream
    pub async fn viewer_count(&self, id: &StreamId) -> usize {
        match self.entry(id).await {
            Ok(entry) => entry.viewers.read().await.len(),
            Err(_) => 0,
        }
    }

    /// All stream ids, sorted
    pub async fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.streams.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Get stream statistics
    pub async fn stream_stats(&self, id: &StreamId) -> Option<StreamStats> {
        let entry = self.entry(id).await.ok()?;
        Some(entry.stats().await)
    }

    /// Start every persistent (not on-demand) stream
    ///
    /// Failures are logged and left for the maintenance task to retry.
    /// Returns the number of streams running afterwards.
    pub async fn start_persistent(&self) -> usize {
        let mut running = 0;
        for entry in self.entries().await {
            if entry.is_on_demand() {
                continue;
            }
            if self.ensure_running(entry.id()).await.is_ok() {
                running += 1;
            }
        }
        running
    }

    /// Run maintenance once
    ///
    /// - Drops viewers whose consumer has gone away
    /// - Stops on-demand ingest that has had no viewers for `on_demand_idle_timeout`
    /// - Restarts persistent streams whose ingest is not running
    pub async fn maintain(&self) {
        let now = Instant::now();

        for entry in self.entries().await {
            if entry.is_on_demand() {
                if entry.stop_if_idle(self.config.on_demand_idle_timeout, now).await {
                    tracing::info!(stream = %entry.id(), "No viewers, on-demand ingest stopped");
                }
                continue;
            }

            entry.viewers.write().await.prune_closed();
            if !entry.is_running().await {
                tracing::debug!(stream = %entry.id(), "Restarting persistent stream");
                // Failure is recorded as last_error and logged by ensure_running
                let _ = self.ensure_running(entry.id()).await;
            }
        }
    }

    /// Spawn background maintenance task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_maintenance_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.maintenance_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.maintain().await;
            }
        })
    }

    /// Stop all ingest, close all viewers and forget every stream
    pub async fn shutdown(&self) {
        let entries: Vec<Arc<StreamEntry>> =
            self.streams.write().await.drain().map(|(_, e)| e).collect();

        for entry in &entries {
            entry.stop_ingest(CloseReason::Shutdown).await;
        }

        tracing::info!(streams = entries.len(), "Registry shut down");
    }
}

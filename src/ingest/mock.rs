//! In-process ingest used by tests
//!
//! Streams are configured with a `CodecSet` up front. Each successful `pull`
//! parks the packet sender so the test can push packets into the feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{Ingest, IngestError, IngestFeed, PacketSender};
use crate::media::{CodecSet, CodecType, TrackCodec};
use crate::registry::{StreamConfig, StreamId};

#[derive(Default)]
pub(crate) struct MockIngest {
    codecs: Mutex<HashMap<StreamId, CodecSet>>,
    senders: Mutex<HashMap<StreamId, PacketSender>>,
    stops: Mutex<HashMap<StreamId, CancellationToken>>,
    pulls: AtomicUsize,
    delay: Duration,
}

impl MockIngest {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Delay every `pull` to widen race windows
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make `id` pullable with the given codecs
    pub(crate) fn stream(self, id: &str, codecs: &[CodecType]) -> Self {
        self.set_codecs(id, codecs);
        self
    }

    pub(crate) fn set_codecs(&self, id: &str, codecs: &[CodecType]) {
        let set = CodecSet::new(codecs.iter().copied().map(TrackCodec::new).collect());
        self.codecs.lock().unwrap().insert(StreamId::from(id), set);
    }

    pub(crate) fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    /// Sender of the most recent feed for `id`
    pub(crate) fn sender(&self, id: &str) -> PacketSender {
        self.senders
            .lock()
            .unwrap()
            .get(&StreamId::from(id))
            .cloned()
            .expect("stream was never pulled")
    }

    /// Stop token handed to the most recent `pull` for `id`
    pub(crate) fn stop_token(&self, id: &str) -> CancellationToken {
        self.stops
            .lock()
            .unwrap()
            .get(&StreamId::from(id))
            .cloned()
            .expect("stream was never pulled")
    }

    /// Drop the parked sender so the feed ends once other clones are gone
    pub(crate) fn close(&self, id: &str) {
        self.senders.lock().unwrap().remove(&StreamId::from(id));
    }
}

impl Ingest for MockIngest {
    async fn pull(
        &self,
        id: &StreamId,
        _source: &StreamConfig,
        stop: CancellationToken,
    ) -> Result<IngestFeed, IngestError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let codecs = self
            .codecs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| IngestError::Unreachable(format!("no source for {}", id)))?;

        let (tx, feed) = IngestFeed::channel(codecs, 64);
        self.senders.lock().unwrap().insert(id.clone(), tx);
        self.stops.lock().unwrap().insert(id.clone(), stop);

        Ok(feed)
    }
}

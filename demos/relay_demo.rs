//! Relay demo with a synthetic camera
//!
//! Run with: cargo run --example relay_demo
//!
//! Set `RUST_LOG=rtc_relay=debug` for per-viewer drop and resync logs.
//!
//! ## What it shows
//!
//! - On-demand start: the synthetic camera only starts when the first viewer asks for it
//! - Keyframe gating: viewers joining mid-GOP wait for the next keyframe
//! - Slow viewers: a stalled viewer drops packets without holding back the others
//! - Idle timeout: a viewer on a stream that stops sending keyframes is closed

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rtc_relay::ingest::{Ingest, IngestError, IngestFeed};
use rtc_relay::media::{CodecSet, CodecType, Packet, TrackCodec};
use rtc_relay::viewer::{PacketWriter, WriteError};
use rtc_relay::{RegistryConfig, StreamConfig, StreamId, StreamRegistry};

/// Camera that emits 25 fps video with a keyframe every second
struct SyntheticCamera;

impl Ingest for SyntheticCamera {
    async fn pull(
        &self,
        id: &StreamId,
        source: &StreamConfig,
        stop: CancellationToken,
    ) -> Result<IngestFeed, IngestError> {
        if !source.url.starts_with("synthetic://") {
            return Err(IngestError::Unreachable(source.url.clone()));
        }

        let codecs = CodecSet::new(vec![
            TrackCodec::new(CodecType::H264),
            TrackCodec::new(CodecType::PcmMulaw),
        ]);
        let (tx, feed) = IngestFeed::channel(codecs, 64);
        let stream = id.clone();

        tokio::spawn(async move {
            let frame = Duration::from_millis(40);
            let mut ticker = tokio::time::interval(frame);
            let mut n: u32 = 0;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let ts = frame * n;
                let payload = Bytes::from(vec![0u8; 1200]);
                let packet = if n % 25 == 0 {
                    Packet::keyframe(0, ts, payload)
                } else {
                    Packet::new(0, ts, payload)
                };

                if tx.send(Ok(packet.with_duration(frame))).await.is_err() {
                    break;
                }
                n = n.wrapping_add(1);
            }

            println!("[{}] camera stopped after {} frames", stream, n);
        });

        Ok(feed)
    }
}

/// Writer that counts packets, optionally stalling on every write
struct CountingWriter {
    name: &'static str,
    written: Arc<AtomicU64>,
    stall: Option<Duration>,
}

impl PacketWriter for CountingWriter {
    async fn write_packet(&mut self, _packet: &Packet) -> Result<(), WriteError> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) {
        println!(
            "[{}] closed after {} packets",
            self.name,
            self.written.load(Ordering::Relaxed)
        );
    }
}

fn writer(name: &'static str, stall: Option<Duration>) -> (CountingWriter, Arc<AtomicU64>) {
    let written = Arc::new(AtomicU64::new(0));
    let writer = CountingWriter {
        name,
        written: Arc::clone(&written),
        stall,
    };
    (writer, written)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rtc_relay=info")),
        )
        .init();

    let config = RegistryConfig::default()
        .viewer_queue_capacity(32)
        .on_demand_idle_timeout(Duration::from_secs(2))
        .maintenance_interval(Duration::from_secs(1));
    let registry = Arc::new(StreamRegistry::with_config(SyntheticCamera, config));

    registry
        .add_stream("cam1", StreamConfig::new("synthetic://cam1").on_demand(true))
        .await?;
    let maintenance = registry.spawn_maintenance_task();

    let id = StreamId::from("cam1");
    let codecs = registry.ensure_running(&id).await?;
    let tracks: Vec<String> = codecs
        .negotiate()
        .kinds()
        .iter()
        .map(|k| k.to_string())
        .collect();
    println!("cam1 tracks: {:?}", tracks);

    let (fast_writer, fast) = writer("fast", None);
    let (slow_writer, slow) = writer("slow", Some(Duration::from_millis(200)));
    let fast_viewer = registry.attach(&id, fast_writer).await?;
    let slow_viewer = registry.attach(&id, slow_writer).await?;

    tokio::time::sleep(Duration::from_secs(3)).await;

    if let Some(stats) = registry.stream_stats(&id).await {
        println!(
            "cam1: received={} viewers={}",
            stats.packets_received, stats.viewer_count
        );
        for viewer in &stats.viewers {
            println!(
                "  {} delivered={} dropped={} resyncing={}",
                viewer.id, viewer.delivered, viewer.dropped, viewer.resyncing
            );
        }
    }
    println!(
        "written: fast={} slow={}",
        fast.load(Ordering::Relaxed),
        slow.load(Ordering::Relaxed)
    );

    fast_viewer.close();
    slow_viewer.close();
    println!("fast: {}", fast_viewer.join().await);
    println!("slow: {}", slow_viewer.join().await);

    // No viewers left: the maintenance task stops the camera
    tokio::time::sleep(Duration::from_secs(4)).await;
    println!("cam1 running: {}", registry.is_running(&id).await);

    maintenance.abort();
    registry.shutdown().await;

    Ok(())
}

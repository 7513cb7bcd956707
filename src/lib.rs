//! # rtc-relay
//!
//! Viewer fan-out and lifecycle engine for relaying live streams to WebRTC
//! viewers.
//!
//! One upstream packet feed per stream is distributed to any number of
//! independently paced viewers. Each viewer has its own bounded queue, waits
//! for a keyframe before playback starts, and is closed when no keyframe
//! arrives within the idle timeout. Upstream ingest is started on demand and
//! shared between concurrent callers.
//!
//! Signaling, SDP handling and the WebRTC transport itself live outside this
//! crate. They plug in through two traits:
//! - [`ingest::Ingest`] starts an upstream feed and reports its codecs
//! - [`viewer::PacketWriter`] writes admitted packets to one viewer
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtc_relay::ingest::{Ingest, IngestError, IngestFeed};
//! use rtc_relay::media::Packet;
//! use rtc_relay::viewer::{PacketWriter, WriteError};
//! use rtc_relay::{StreamConfig, StreamId, StreamRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! struct RtspIngest;
//!
//! impl Ingest for RtspIngest {
//!     async fn pull(
//!         &self,
//!         _id: &StreamId,
//!         _source: &StreamConfig,
//!         _stop: CancellationToken,
//!     ) -> Result<IngestFeed, IngestError> {
//!         Err(IngestError::Unreachable("not implemented".into()))
//!     }
//! }
//!
//! struct PeerWriter;
//!
//! impl PacketWriter for PeerWriter {
//!     async fn write_packet(&mut self, _packet: &Packet) -> Result<(), WriteError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(StreamRegistry::new(RtspIngest));
//! registry
//!     .add_stream("cam1", StreamConfig::new("rtsp://10.0.0.5/main").on_demand(true))
//!     .await?;
//! let _maintenance = registry.spawn_maintenance_task();
//!
//! // Per signaling request
//! let id = StreamId::from("cam1");
//! let codecs = registry.ensure_running(&id).await?;
//! let tracks = codecs.negotiate();
//! // ... answer the SDP offer with `tracks` ...
//! let viewer = registry.attach(&id, PeerWriter).await?;
//! let exit = viewer.join().await;
//! println!("viewer finished: {}", exit);
//! # Ok(())
//! # }
//! ```

mod fanout;
pub mod ingest;
pub mod media;
pub mod registry;
pub mod viewer;

pub use ingest::{Ingest, IngestError, IngestFeed};
pub use media::{CodecSet, Packet};
pub use registry::{RegistryConfig, RegistryError, StreamConfig, StreamId, StreamRegistry, ViewerId};
pub use viewer::{CloseReason, PacketWriter, ViewerExit, ViewerHandle, ViewerSession};

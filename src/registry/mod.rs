//! Stream registry and on-demand ingest lifecycle
//!
//! The registry owns every stream entry, starts upstream ingest when a
//! stream is first needed, and keeps the set of viewers the fan-out delivers
//! to.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry<I>>
//!                     ┌───────────────────────────┐
//!                     │ streams: HashMap<Id,      │
//!                     │   Arc<StreamEntry {       │
//!                     │     start_lock,           │  single-flight ingest start
//!                     │     status,               │  running / codecs / last_error
//!                     │     viewers,              │  ViewerSet (bounded queues)
//!                     │   }>                      │
//!                     │ >                         │
//!                     └─────────────┬─────────────┘
//!                                   │
//!         ┌─────────────────────────┼─────────────────────────┐
//!         │                         │                         │
//!         ▼                         ▼                         ▼
//!   ingest.pull()             [ViewerSession]           [ViewerSession]
//!   fanout::run() ──try_send──► gate ──► writer          gate ──► writer
//! ```
//!
//! # Lifecycle
//!
//! Persistent streams are started by `start_persistent` and restarted by the
//! maintenance task when their feed ends. On-demand streams start on the
//! first `ensure_running` and are stopped by the maintenance task once they
//! have had no viewers for `on_demand_idle_timeout`.

pub mod config;
pub mod entry;
pub mod error;
pub mod id;
pub mod store;

pub use config::{OverflowPolicy, RegistryConfig, StreamConfig};
pub use entry::{StreamEntry, StreamStats, ViewerStats};
pub use error::RegistryError;
pub use id::{StreamId, ViewerId};
pub use store::StreamRegistry;

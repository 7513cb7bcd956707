//! Viewer sessions
//!
//! A viewer is registered with a stream and receives that stream's packets
//! through its own bounded queue. Attached viewers additionally get a writer
//! task that gates playback on the first keyframe and closes idle sessions.
//!
//! ```text
//!   fanout ──try_send──► [queue] ──recv──► PlaybackGate ──► PacketWriter
//!                                   ▲
//!                          deadline ┘ (select)
//! ```

pub mod gate;
pub mod session;
pub mod task;

pub use gate::{GateState, PlaybackGate};
pub use session::{CloseReason, ViewerSession};
pub use task::{run_viewer, PacketWriter, ViewerExit, ViewerHandle, WriteError};

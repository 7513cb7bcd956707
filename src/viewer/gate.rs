//! Playback start gating and idle detection
//!
//! A viewer that joins mid-GOP cannot decode anything until the next
//! keyframe, so packets are discarded until one arrives. The same keyframes
//! keep the viewer alive: if none shows up within the idle timeout the gate
//! times out and the session is torn down.
//!
//! ```text
//!                 keyframe                    keyframe
//!   WaitingForKeyframe ──────────► Streaming ◄────────┐
//!          │                          │  └────────────┘
//!          │        deadline          │ deadline
//!          └──────────► TimedOut ◄────┘
//! ```
//!
//! Audio-only streams have no keyframes; every packet counts instead and the
//! gate starts out in `Streaming`.

use std::time::Duration;

use tokio::time::Instant;

use crate::media::Packet;

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Discarding packets until the first keyframe
    WaitingForKeyframe,
    /// Forwarding packets
    Streaming,
    /// Deadline passed, terminal
    TimedOut,
}

/// Per-viewer playback gate
#[derive(Debug)]
pub struct PlaybackGate {
    state: GateState,
    audio_only: bool,
    idle_timeout: Duration,
    deadline: Instant,
    /// Set on first entering `Streaming`, never cleared
    started: bool,
    forwarded: u64,
    discarded: u64,
}

impl PlaybackGate {
    /// Create a gate whose first deadline is `idle_timeout` from now
    pub fn new(audio_only: bool, idle_timeout: Duration) -> Self {
        Self::starting_at(audio_only, idle_timeout, Instant::now())
    }

    /// Create a gate with an explicit start time
    pub fn starting_at(audio_only: bool, idle_timeout: Duration, now: Instant) -> Self {
        let state = if audio_only {
            GateState::Streaming
        } else {
            GateState::WaitingForKeyframe
        };

        Self {
            state,
            audio_only,
            idle_timeout,
            deadline: now + idle_timeout,
            started: audio_only,
            forwarded: 0,
            discarded: 0,
        }
    }

    /// Feed a packet through the gate
    ///
    /// Returns true if the packet should be written to the viewer.
    pub fn admit(&mut self, packet: &Packet, now: Instant) -> bool {
        if self.state == GateState::TimedOut {
            return false;
        }

        if packet.is_keyframe || self.audio_only {
            self.deadline = now + self.idle_timeout;
            self.state = GateState::Streaming;
            self.started = true;
        }

        if self.state == GateState::Streaming {
            self.forwarded += 1;
            true
        } else {
            self.discarded += 1;
            false
        }
    }

    /// Instant at which the gate times out
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Mark the gate as timed out
    pub fn expire(&mut self) {
        self.state = GateState::TimedOut;
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Whether playback has started (stays true after a timeout)
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Packets admitted so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Packets discarded while waiting for a keyframe
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

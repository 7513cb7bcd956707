//! Media types shared between ingest, fan-out and viewers
//!
//! This module provides:
//! - The `Packet` unit delivered to viewers
//! - Track codec descriptors and WebRTC track negotiation

pub mod codec;
pub mod packet;

pub use codec::{CodecSet, CodecType, Negotiated, NegotiatedTrack, TrackCodec, TrackKind};
pub use packet::Packet;

//! Media packet type
//!
//! Packets arrive already demuxed from the ingest side. They are cloned once
//! per viewer during fan-out, so the payload is kept in `Bytes` and only the
//! reference count changes.

use std::time::Duration;

use bytes::Bytes;

/// A single demuxed media packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Index of the track in the stream's `CodecSet`
    pub track: u8,
    /// Whether decoding can start at this packet
    pub is_keyframe: bool,
    /// Presentation time relative to the start of the stream
    pub timestamp: Duration,
    /// Packet duration (zero if unknown)
    pub duration: Duration,
    /// Payload (zero-copy via reference counting)
    pub data: Bytes,
}

impl Packet {
    /// Create a non-keyframe packet
    pub fn new(track: u8, timestamp: Duration, data: Bytes) -> Self {
        Self {
            track,
            is_keyframe: false,
            timestamp,
            duration: Duration::ZERO,
            data,
        }
    }

    /// Create a keyframe packet
    pub fn keyframe(track: u8, timestamp: Duration, data: Bytes) -> Self {
        Self {
            is_keyframe: true,
            ..Self::new(track, timestamp, data)
        }
    }

    /// Set the packet duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_constructors() {
        let data = Bytes::from_static(&[0x65, 0x88]);

        let delta = Packet::new(0, Duration::from_millis(40), data.clone());
        assert!(!delta.is_keyframe);
        assert_eq!(delta.duration, Duration::ZERO);
        assert_eq!(delta.size(), 2);

        let key = Packet::keyframe(0, Duration::ZERO, data)
            .with_duration(Duration::from_millis(40));
        assert!(key.is_keyframe);
        assert_eq!(key.duration, Duration::from_millis(40));
    }

    #[test]
    fn test_packet_clone_shares_payload() {
        let packet = Packet::keyframe(1, Duration::ZERO, Bytes::from(vec![0u8; 1024]));
        let copy = packet.clone();

        assert_eq!(packet.data.as_ptr(), copy.data.as_ptr());
    }
}

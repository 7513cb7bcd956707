//! Track codec descriptors and WebRTC track negotiation
//!
//! The ingest side reports one `TrackCodec` per track. Only a handful of
//! codecs can be carried to a browser without transcoding; everything else is
//! skipped when the viewer-facing track list is built.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Codec carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// H.264/AVC
    H264,
    /// H.265/HEVC
    H265,
    /// Motion JPEG
    Mjpeg,
    /// AAC
    Aac,
    /// G.711 A-law
    PcmAlaw,
    /// G.711 µ-law
    PcmMulaw,
    /// Opus
    Opus,
}

impl CodecType {
    /// Whether this is a video codec
    pub fn is_video(&self) -> bool {
        matches!(self, CodecType::H264 | CodecType::H265 | CodecType::Mjpeg)
    }

    /// Whether this is an audio codec
    pub fn is_audio(&self) -> bool {
        !self.is_video()
    }

    /// Whether the codec can be sent over WebRTC as-is
    pub fn is_webrtc_supported(&self) -> bool {
        matches!(
            self,
            CodecType::H264 | CodecType::PcmAlaw | CodecType::PcmMulaw | CodecType::Opus
        )
    }

    /// Track kind for this codec
    pub fn kind(&self) -> TrackKind {
        if self.is_video() {
            TrackKind::Video
        } else {
            TrackKind::Audio
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecType::H264 => "H264",
            CodecType::H265 => "H265",
            CodecType::Mjpeg => "MJPEG",
            CodecType::Aac => "AAC",
            CodecType::PcmAlaw => "PCM_ALAW",
            CodecType::PcmMulaw => "PCM_MULAW",
            CodecType::Opus => "OPUS",
        };
        f.write_str(name)
    }
}

/// Media kind advertised to the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codec descriptor for one track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCodec {
    /// Codec type
    pub codec: CodecType,
    /// Decoder configuration (SPS/PPS, AudioSpecificConfig, ...), opaque here
    pub config: Bytes,
}

impl TrackCodec {
    /// Create a descriptor without decoder configuration
    pub fn new(codec: CodecType) -> Self {
        Self {
            codec,
            config: Bytes::new(),
        }
    }

    /// Attach decoder configuration
    pub fn with_config(mut self, config: Bytes) -> Self {
        self.config = config;
        self
    }
}

/// A track that survived negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedTrack {
    /// Index into the originating `CodecSet`
    pub index: usize,
    pub codec: CodecType,
    pub kind: TrackKind,
}

/// Result of negotiating a `CodecSet` for WebRTC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Supported tracks in `CodecSet` order
    pub tracks: Vec<NegotiatedTrack>,
    /// Exactly one supported track and it is audio
    pub audio_only: bool,
}

impl Negotiated {
    /// Track kinds in order, as advertised to the viewer
    pub fn kinds(&self) -> Vec<TrackKind> {
        self.tracks.iter().map(|t| t.kind).collect()
    }
}

/// Ordered list of track codecs for a stream
///
/// Cheap to clone; every caller of `ensure_running` gets the same set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecSet {
    tracks: Arc<[TrackCodec]>,
}

impl CodecSet {
    pub fn new(tracks: Vec<TrackCodec>) -> Self {
        Self {
            tracks: tracks.into(),
        }
    }

    pub fn tracks(&self) -> &[TrackCodec] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Classify tracks for WebRTC delivery
    ///
    /// Unsupported codecs are logged and left out of the result.
    pub fn negotiate(&self) -> Negotiated {
        let mut tracks = Vec::with_capacity(self.tracks.len());

        for (index, track) in self.tracks.iter().enumerate() {
            if !track.codec.is_webrtc_supported() {
                tracing::warn!(
                    track = index,
                    codec = %track.codec,
                    "Codec not supported by WebRTC, ignoring track"
                );
                continue;
            }
            tracks.push(NegotiatedTrack {
                index,
                codec: track.codec,
                kind: track.codec.kind(),
            });
        }

        let audio_only = tracks.len() == 1 && tracks[0].kind == TrackKind::Audio;

        Negotiated { tracks, audio_only }
    }

    /// Shorthand for `negotiate().audio_only`
    pub fn is_audio_only(&self) -> bool {
        self.negotiate().audio_only
    }
}

impl From<Vec<TrackCodec>> for CodecSet {
    fn from(tracks: Vec<TrackCodec>) -> Self {
        Self::new(tracks)
    }
}

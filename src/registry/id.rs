//! Stream and viewer identifiers

use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(String);

impl StreamId {
    /// Create a stream id from an explicit name
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a stream id from a source URL
    ///
    /// `rtsp://host:554/cam/1` becomes `host_554-cam-1`. The mapping is not
    /// injective on its own (`a/b` and `a-b` collide); the registry rejects a
    /// derived id that already names a different source.
    pub fn from_source_url(url: &str) -> Self {
        let trimmed = url.strip_prefix("rtsp://").unwrap_or(url);
        Self(trimmed.replace('/', "-").replace(':', "_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StreamId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for StreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifier of one viewer registration, unique per registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(pub u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_source_url() {
        let id = StreamId::from_source_url("rtsp://10.0.0.5:554/stream/main");
        assert_eq!(id.as_str(), "10.0.0.5_554-stream-main");

        // Only the leading scheme is stripped
        let id = StreamId::from_source_url("rtsp://host/rtsp://x");
        assert_eq!(id.as_str(), "host-rtsp_--x");
    }

    #[test]
    fn test_from_source_url_without_scheme() {
        let id = StreamId::from_source_url("camera/front");
        assert_eq!(id.as_str(), "camera-front");
    }

    #[test]
    fn test_derivation_can_collide() {
        // Distinct sources, same id: the registry must flag this
        assert_eq!(
            StreamId::from_source_url("rtsp://a/b"),
            StreamId::from_source_url("rtsp://a-b")
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(StreamId::from("cam1").to_string(), "cam1");
        assert_eq!(ViewerId(7).to_string(), "v7");
    }
}

//! Registry and stream configuration

use std::time::Duration;

/// What the fan-out does when a viewer's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the packet for that viewer only. Video viewers then skip ahead to
    /// the next keyframe so they never decode across a gap.
    #[default]
    DropPacket,
    /// Remove the viewer from the stream
    EvictViewer,
}

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Packets buffered per viewer before the overflow policy applies
    pub viewer_queue_capacity: usize,

    /// Slow consumer handling
    pub overflow_policy: OverflowPolicy,

    /// A viewer with no keyframe (audio-only: no packet) within this time is closed
    pub idle_timeout: Duration,

    /// On-demand ingest is stopped after having no viewers for this long
    pub on_demand_idle_timeout: Duration,

    /// Interval of the maintenance task
    pub maintenance_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            viewer_queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropPacket,
            idle_timeout: Duration::from_secs(10),
            on_demand_idle_timeout: Duration::from_secs(20),
            maintenance_interval: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    /// Set per-viewer queue capacity (at least 1)
    pub fn viewer_queue_capacity(mut self, capacity: usize) -> Self {
        self.viewer_queue_capacity = capacity.max(1);
        self
    }

    /// Set overflow policy
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set viewer idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set how long an on-demand stream may run without viewers
    pub fn on_demand_idle_timeout(mut self, timeout: Duration) -> Self {
        self.on_demand_idle_timeout = timeout;
        self
    }

    /// Set maintenance interval
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }
}

/// Definition of one stream source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Source URL handed to the ingest
    pub url: String,

    /// Start ingest only while viewers are present
    pub on_demand: bool,
}

impl StreamConfig {
    /// Create a persistent stream definition
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            on_demand: false,
        }
    }

    /// Set on-demand mode
    pub fn on_demand(mut self, on_demand: bool) -> Self {
        self.on_demand = on_demand;
        self
    }
}

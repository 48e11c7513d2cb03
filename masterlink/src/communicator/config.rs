//! Tunables of the communicator.

use std::time::Duration;

/// Default deadline of [`crate::MasterCommunicator::do_command`].
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bounded wait of one reader iteration.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Communicator configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CommunicatorConfig {
    /// Deadline for commands issued without an explicit timeout.
    pub default_timeout: Duration,
    /// Bounded wait of one reader iteration.
    pub read_timeout: Duration,
    /// Maximum bytes pulled from the transport per iteration.
    pub read_chunk_size: usize,
    /// Chunks held by the passthrough and maintenance buffers before the
    /// oldest is dropped.
    pub passthrough_capacity: usize,
    /// How long a mode switch waits for an outstanding request before
    /// failing it.
    pub maintenance_drain: Duration,
    /// First pause after a transport error.
    pub transport_backoff: Duration,
    /// Upper bound of the doubling transport backoff.
    pub max_transport_backoff: Duration,
    /// Consecutive timeouts after which the master is reported offline.
    pub offline_threshold: u32,
    /// Timestamps kept per call outcome.
    pub call_history: usize,
    /// Age limit of the debug buffer.
    pub debug_buffer_duration: Duration,
    /// Kick a master left in CLI mode back to API mode on start.
    pub init_master: bool,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            read_chunk_size: 1024,
            passthrough_capacity: 1024,
            maintenance_drain: Duration::from_millis(500),
            transport_backoff: Duration::from_millis(500),
            max_transport_backoff: Duration::from_secs(5),
            offline_threshold: 3,
            call_history: 50,
            debug_buffer_duration: Duration::from_secs(300),
            init_master: false,
        }
    }
}

impl CommunicatorConfig {
    /// Set the default command deadline.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the reader's bounded wait.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the passthrough buffer capacity in chunks.
    #[must_use]
    pub fn with_passthrough_capacity(mut self, capacity: usize) -> Self {
        self.passthrough_capacity = capacity.max(1);
        self
    }

    /// Set how long mode switches wait for an outstanding request.
    #[must_use]
    pub fn with_maintenance_drain(mut self, drain: Duration) -> Self {
        self.maintenance_drain = drain;
        self
    }

    /// Set the transport error backoff range.
    #[must_use]
    pub fn with_transport_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.transport_backoff = initial;
        self.max_transport_backoff = max.max(initial);
        self
    }

    /// Set the consecutive timeouts that mark the master offline.
    #[must_use]
    pub fn with_offline_threshold(mut self, threshold: u32) -> Self {
        self.offline_threshold = threshold.max(1);
        self
    }

    /// Enable or disable master initialisation on start.
    #[must_use]
    pub fn with_init_master(mut self, init: bool) -> Self {
        self.init_master = init;
        self
    }
}

//! Configuration types for Rampart sessions and peer protocols.
//!
//! # Overview
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `ProtocolConfig` | Byte order and quality/consistency cadence | `lan()`, `high_latency()`, `debug()` |
//! | `SyncTestConfig` | Forced-rollback self tests | `with_check_distance()`, `with_throw_on_desync()` |
//! | `ReplayConfig` | How a replay source is encoded | `compressed()` |
//!
//! # Example
//!
//! ```
//! use rampart::{Config, ProtocolConfig, SessionBuilder, SyncTestConfig};
//! use rampart::serialization::IntegerSerializer;
//!
//! # struct MyConfig;
//! # impl Config for MyConfig {
//! #     type Input = u32;
//! #     type InputSerializer = IntegerSerializer<u32>;
//! #     type State = ();
//! # }
//! let builder = SessionBuilder::<MyConfig>::new()
//!     .with_protocol_config(ProtocolConfig::lan())
//!     .with_sync_test_config(SyncTestConfig::default().with_check_distance(4));
//! ```

use web_time::Duration;

use crate::error::RampartError;
use crate::serialization::Endianness;

/// Settings for a [`PeerProtocol`](crate::PeerProtocol).
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Construct instances with the
/// `..ProtocolConfig::default()` pattern.
///
/// # Example
///
/// ```
/// use rampart::{Endianness, ProtocolConfig};
/// use web_time::Duration;
///
/// let config = ProtocolConfig {
///     endianness: Endianness::Little,
///     quality_report_interval: Duration::from_millis(100),
///     ..ProtocolConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ProtocolConfig has no effect unless passed to PeerProtocol::new() or SessionBuilder::with_protocol_config()"]
pub struct ProtocolConfig {
    /// Byte order of every message and record in the session.
    ///
    /// Both peers must agree on it.
    ///
    /// Default: [`Endianness::Big`]
    pub endianness: Endianness,

    /// Interval between quality reports.
    ///
    /// Default: 200ms
    pub quality_report_interval: Duration,

    /// Frames between consistency checks. `0` disables them.
    ///
    /// Default: 60
    pub consistency_check_interval: u32,

    /// Number of unanswered consistency checks kept before the oldest is dropped.
    ///
    /// Default: 32
    pub max_checksum_history: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            endianness: Endianness::Big,
            quality_report_interval: Duration::from_millis(200),
            consistency_check_interval: 60,
            max_checksum_history: 32,
        }
    }
}

impl ProtocolConfig {
    /// Creates a new `ProtocolConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration preset for LAN play.
    ///
    /// Faster quality reports and a check every 30 frames.
    pub fn lan() -> Self {
        Self {
            quality_report_interval: Duration::from_millis(100),
            consistency_check_interval: 30,
            ..Self::default()
        }
    }

    /// Configuration preset for high-latency WAN connections.
    ///
    /// Fewer reports, and more unanswered checks tolerated while replies are in flight.
    pub fn high_latency() -> Self {
        Self {
            quality_report_interval: Duration::from_millis(400),
            consistency_check_interval: 120,
            max_checksum_history: 64,
            ..Self::default()
        }
    }

    /// Configuration preset for debugging desyncs.
    ///
    /// Checks every frame and keeps a long history.
    pub fn debug() -> Self {
        Self {
            quality_report_interval: Duration::from_millis(500),
            consistency_check_interval: 1,
            max_checksum_history: 128,
            ..Self::default()
        }
    }

    /// Sets the byte order.
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Validates the protocol configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RampartError::InvalidRequest`] if any configuration value is out of range.
    pub fn validate(&self) -> Result<(), RampartError> {
        // 1ms to 10s
        if self.quality_report_interval < Duration::from_millis(1)
            || self.quality_report_interval > Duration::from_millis(10_000)
        {
            return Err(RampartError::InvalidRequest {
                info: format!(
                    "quality_report_interval must be between 1ms and 10000ms, got {}ms",
                    self.quality_report_interval.as_millis()
                ),
            });
        }

        if self.max_checksum_history < 1 || self.max_checksum_history > 1024 {
            return Err(RampartError::InvalidRequest {
                info: format!(
                    "max_checksum_history must be between 1 and 1024, got {}",
                    self.max_checksum_history
                ),
            });
        }

        Ok(())
    }
}

/// Largest supported [`SyncTestConfig::check_distance`].
pub const MAX_CHECK_DISTANCE: usize = 128;

/// Settings for a [`SyncTestSession`](crate::SyncTestSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "SyncTestConfig has no effect unless passed to SessionBuilder::with_sync_test_config()"]
pub struct SyncTestConfig {
    /// How many frames every advance rolls back and resimulates. `0` disables the rollbacks.
    ///
    /// Default: 1
    pub check_distance: usize,

    /// Whether a checksum mismatch fails [`advance_frame`](crate::SyncTestSession::advance_frame)
    /// with [`RampartError::ChecksumMismatch`]. When `false` the mismatch is only logged.
    ///
    /// Default: `true`
    pub throw_on_desync: bool,

    /// Whether both text renderings of a desynced state are logged.
    ///
    /// Default: `true`
    pub log_state_on_desync: bool,
}

impl Default for SyncTestConfig {
    fn default() -> Self {
        Self {
            check_distance: 1,
            throw_on_desync: true,
            log_state_on_desync: true,
        }
    }
}

impl SyncTestConfig {
    /// Creates a new `SyncTestConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets [`check_distance`](Self::check_distance).
    pub fn with_check_distance(mut self, check_distance: usize) -> Self {
        self.check_distance = check_distance;
        self
    }

    /// Sets [`throw_on_desync`](Self::throw_on_desync).
    pub fn with_throw_on_desync(mut self, enabled: bool) -> Self {
        self.throw_on_desync = enabled;
        self
    }

    /// Sets [`log_state_on_desync`](Self::log_state_on_desync).
    pub fn with_log_state_on_desync(mut self, enabled: bool) -> Self {
        self.log_state_on_desync = enabled;
        self
    }

    /// Validates the sync test configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RampartError::InvalidRequest`] if `check_distance` exceeds
    /// [`MAX_CHECK_DISTANCE`].
    pub fn validate(&self) -> Result<(), RampartError> {
        if self.check_distance > MAX_CHECK_DISTANCE {
            return Err(RampartError::InvalidRequest {
                info: format!(
                    "check_distance must be at most {}, got {}",
                    MAX_CHECK_DISTANCE, self.check_distance
                ),
            });
        }
        Ok(())
    }
}

/// Describes how a replay source is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[must_use = "ReplayConfig has no effect unless passed to an input provider"]
pub struct ReplayConfig {
    /// Whether the records are wrapped in a deflate stream.
    ///
    /// Default: `false`
    pub compressed: bool,
}

impl ReplayConfig {
    /// Uncompressed records.
    pub fn new() -> Self {
        Self::default()
    }

    /// A deflate stream of records.
    pub fn compressed() -> Self {
        Self { compressed: true }
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    // ==========================================
    // ProtocolConfig Tests
    // ==========================================

    #[test]
    fn protocol_config_default_values() {
        let config = ProtocolConfig::default();
        assert_eq!(config.endianness, Endianness::Big);
        assert_eq!(config.quality_report_interval, Duration::from_millis(200));
        assert_eq!(config.consistency_check_interval, 60);
        assert_eq!(config.max_checksum_history, 32);
        assert_eq!(ProtocolConfig::new(), config);
    }

    #[test]
    fn protocol_config_presets_are_valid() {
        for config in [
            ProtocolConfig::default(),
            ProtocolConfig::lan(),
            ProtocolConfig::high_latency(),
            ProtocolConfig::debug(),
        ] {
            assert!(config.validate().is_ok(), "{config:?}");
        }
        assert_eq!(ProtocolConfig::debug().consistency_check_interval, 1);
        assert!(
            ProtocolConfig::lan().quality_report_interval
                < ProtocolConfig::high_latency().quality_report_interval
        );
    }

    #[test]
    fn protocol_config_with_endianness() {
        let config = ProtocolConfig::lan().with_endianness(Endianness::Little);
        assert_eq!(config.endianness, Endianness::Little);
        assert_eq!(config.consistency_check_interval, 30);
    }

    #[test]
    fn protocol_config_rejects_out_of_range_values() {
        let zero_interval = ProtocolConfig {
            quality_report_interval: Duration::ZERO,
            ..ProtocolConfig::default()
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(RampartError::InvalidRequest { .. })
        ));

        let no_history = ProtocolConfig {
            max_checksum_history: 0,
            ..ProtocolConfig::default()
        };
        assert!(no_history.validate().is_err());

        let huge_history = ProtocolConfig {
            max_checksum_history: 1025,
            ..ProtocolConfig::default()
        };
        assert!(huge_history.validate().is_err());
    }

    // ==========================================
    // SyncTestConfig Tests
    // ==========================================

    #[test]
    fn sync_test_config_defaults() {
        let config = SyncTestConfig::default();
        assert_eq!(config.check_distance, 1);
        assert!(config.throw_on_desync);
        assert!(config.log_state_on_desync);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sync_test_config_setters() {
        let config = SyncTestConfig::new()
            .with_check_distance(7)
            .with_throw_on_desync(false)
            .with_log_state_on_desync(false);
        assert_eq!(
            config,
            SyncTestConfig {
                check_distance: 7,
                throw_on_desync: false,
                log_state_on_desync: false,
            }
        );
    }

    #[test]
    fn sync_test_config_limits_check_distance() {
        assert!(SyncTestConfig::new()
            .with_check_distance(MAX_CHECK_DISTANCE)
            .validate()
            .is_ok());
        assert!(SyncTestConfig::new()
            .with_check_distance(MAX_CHECK_DISTANCE + 1)
            .validate()
            .is_err());
    }

    // ==========================================
    // ReplayConfig Tests
    // ==========================================

    #[test]
    fn replay_config_constructors() {
        assert!(!ReplayConfig::new().compressed);
        assert!(ReplayConfig::compressed().compressed);
    }
}

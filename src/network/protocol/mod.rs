//! Per-peer protocol logic: lifecycle, quality probes and consistency checks.
//!
//! [`PeerProtocol`] never touches a socket. The transport decodes incoming bytes with
//! [`deserialize_message`](crate::network::messages::deserialize_message), hands the message to
//! the matching `on_*` method and sends whatever that method returns.
//!
//! ```
//! use rampart::network::protocol::{ConsistencyOutcome, PeerProtocol};
//! use rampart::{Frame, PlayerConnectionStatus, ProtocolConfig};
//!
//! let mut local = PeerProtocol::new(ProtocolConfig::default());
//! let mut remote = PeerProtocol::new(ProtocolConfig::default());
//! local.start_running()?;
//! remote.start_running()?;
//! assert_eq!(local.connection_status(), PlayerConnectionStatus::Connected);
//!
//! // Both simulations agree on frame 60.
//! let checksums = |frame: Frame| (frame == Frame::new(60)).then_some(0xC0FFEE_u32);
//!
//! let request = local.request_consistency_check(Frame::new(60)).unwrap();
//! let reply = remote.on_consistency_check_request(&request, &checksums).unwrap();
//! assert_eq!(
//!     local.on_consistency_check_reply(&reply, &checksums),
//!     ConsistencyOutcome::Consistent { frame: Frame::new(60) }
//! );
//! # Ok::<(), rampart::RampartError>(())
//! ```

mod state;

pub use state::{PlayerConnectionStatus, ProtocolStatus};

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, trace};
use web_time::{Duration, Instant};

use crate::error::RampartError;
use crate::network::messages::{
    ConsistencyCheckReply, ConsistencyCheckRequest, QualityReply, QualityReport,
};
use crate::report_violation_to;
use crate::sessions::config::ProtocolConfig;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{Frame, MaybeSendSync};

/// Computes the checksum of the local simulation state at a frame.
///
/// Implemented by the host. Any `Fn(Frame) -> Option<u32>` closure qualifies.
pub trait StateChecksumSource: MaybeSendSync {
    /// The checksum at `frame`, or `None` if that state is no longer (or not yet) available.
    fn checksum_at(&self, frame: Frame) -> Option<u32>;
}

impl<F> StateChecksumSource for F
where
    F: Fn(Frame) -> Option<u32> + MaybeSendSync,
{
    fn checksum_at(&self, frame: Frame) -> Option<u32> {
        self(frame)
    }
}

/// Result of matching a [`ConsistencyCheckReply`] against the local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyOutcome {
    /// Both peers computed the same checksum.
    Consistent {
        /// The checked frame.
        frame: Frame,
    },
    /// The peers disagree: the simulations have diverged.
    Mismatch {
        /// The checked frame.
        frame: Frame,
        /// The local checksum.
        local: u32,
        /// The checksum the peer sent.
        remote: u32,
    },
    /// The reply does not answer an outstanding request, or the connection is closing.
    Discarded {
        /// The frame named in the reply.
        frame: Frame,
    },
    /// The local state for the frame is no longer available.
    Unavailable {
        /// The checked frame.
        frame: Frame,
    },
}

/// Protocol state for one remote peer.
pub struct PeerProtocol {
    status: ProtocolStatus,
    config: ProtocolConfig,

    // quality
    epoch: Instant,
    last_quality_report: Option<Instant>,
    round_trip_time: Option<Duration>,
    local_frame_advantage: i32,
    remote_frame_advantage: i32,

    // consistency
    pending_checks: BTreeSet<Frame>,
    last_consistent_frame: Frame,

    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl PeerProtocol {
    /// A protocol in [`ProtocolStatus::Syncing`].
    #[must_use]
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            status: ProtocolStatus::Syncing,
            config,
            epoch: Instant::now(),
            last_quality_report: None,
            round_trip_time: None,
            local_frame_advantage: 0,
            remote_frame_advantage: 0,
            pending_checks: BTreeSet::new(),
            last_consistent_frame: Frame::NULL,
            violation_observer: None,
        }
    }

    /// Routes protocol violations to `observer`.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Option<Arc<dyn ViolationObserver>>) -> Self {
        self.violation_observer = observer;
        self
    }

    /// The configuration this protocol was created with.
    #[must_use]
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// The current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ProtocolStatus {
        self.status
    }

    /// The status as reported to the host.
    #[must_use]
    pub fn connection_status(&self) -> PlayerConnectionStatus {
        self.status.into()
    }

    /// Returns `true` if live confirmed inputs may be exchanged.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ProtocolStatus::Running
    }

    /// Restarts the handshake: forgets quality measurements and outstanding checks.
    ///
    /// # Errors
    ///
    /// [`RampartError::InvalidStatusTransition`] unless the protocol is still syncing.
    pub fn synchronize(&mut self) -> Result<(), RampartError> {
        self.transition(ProtocolStatus::Syncing)?;
        self.last_quality_report = None;
        self.round_trip_time = None;
        self.remote_frame_advantage = 0;
        self.pending_checks.clear();
        Ok(())
    }

    /// Completes the handshake.
    ///
    /// # Errors
    ///
    /// [`RampartError::InvalidStatusTransition`] if the connection is already closing.
    pub fn start_running(&mut self) -> Result<(), RampartError> {
        self.transition(ProtocolStatus::Running)
    }

    /// Begins closing the connection.
    ///
    /// # Errors
    ///
    /// [`RampartError::InvalidStatusTransition`] if it is already closed.
    pub fn disconnect(&mut self) -> Result<(), RampartError> {
        self.transition(ProtocolStatus::Disconnecting)
    }

    /// Closes the connection for good. Outstanding consistency checks are dropped.
    ///
    /// # Errors
    ///
    /// [`RampartError::InvalidStatusTransition`] if it is already closed.
    pub fn finish_disconnect(&mut self) -> Result<(), RampartError> {
        self.transition(ProtocolStatus::Disconnected)?;
        self.pending_checks.clear();
        Ok(())
    }

    fn transition(&mut self, next: ProtocolStatus) -> Result<(), RampartError> {
        match self.status.transition_to(next) {
            Ok(next) => {
                if next != self.status {
                    debug!(from = %self.status, to = %next, "peer status changed");
                }
                self.status = next;
                Ok(())
            },
            Err(err) => {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Error,
                    ViolationKind::Protocol,
                    "rejected status transition {} -> {}",
                    self.status,
                    next
                );
                Err(err)
            },
        }
    }

    // ------------------------------------------------------------------
    // quality
    // ------------------------------------------------------------------

    /// Milliseconds since this protocol was created; the timestamp sent as `ping`.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        i64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    /// Records how many frames the local simulation is ahead of the peer.
    pub fn set_local_frame_advantage(&mut self, frames: i32) {
        self.local_frame_advantage = frames;
    }

    /// The local frame advantage last set.
    #[must_use]
    pub fn local_frame_advantage(&self) -> i32 {
        self.local_frame_advantage
    }

    /// The frame advantage from the peer's last [`QualityReport`].
    #[must_use]
    pub fn remote_frame_advantage(&self) -> i32 {
        self.remote_frame_advantage
    }

    /// The last measured round-trip time, if a [`QualityReply`] arrived.
    #[must_use]
    pub fn round_trip_time(&self) -> Option<Duration> {
        self.round_trip_time
    }

    /// Returns `true` if a quality report is due at `now`.
    #[must_use]
    pub fn quality_report_due(&self, now: Instant) -> bool {
        self.status.accepts_messages()
            && self.last_quality_report.is_none_or(|last| {
                now.saturating_duration_since(last) >= self.config.quality_report_interval
            })
    }

    /// Builds a quality report stamped with the current time.
    ///
    /// Returns `None` once the connection is closing.
    pub fn quality_report(&mut self) -> Option<QualityReport> {
        if !self.status.accepts_messages() {
            return None;
        }
        self.last_quality_report = Some(Instant::now());
        Some(QualityReport {
            frame_advantage: self.local_frame_advantage,
            ping: self.timestamp_millis(),
        })
    }

    /// Stores the peer's frame advantage and echoes its timestamp.
    pub fn on_quality_report(&mut self, report: &QualityReport) -> Option<QualityReply> {
        if !self.status.accepts_messages() {
            trace!(status = %self.status, "dropping quality report");
            return None;
        }
        self.remote_frame_advantage = report.frame_advantage;
        Some(QualityReply { pong: report.ping })
    }

    /// Measures the round-trip time from an echoed timestamp.
    ///
    /// A timestamp from the future is reported and ignored.
    pub fn on_quality_reply(&mut self, reply: &QualityReply) -> Option<Duration> {
        if !self.status.accepts_messages() {
            trace!(status = %self.status, "dropping quality reply");
            return None;
        }
        let now = self.timestamp_millis();
        let Some(elapsed) = now
            .checked_sub(reply.pong)
            .and_then(|elapsed| u64::try_from(elapsed).ok())
        else {
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::Protocol,
                "quality reply from the future: pong={}, now={}",
                reply.pong,
                now
            );
            return None;
        };
        let rtt = Duration::from_millis(elapsed);
        self.round_trip_time = Some(rtt);
        trace!(rtt_ms = elapsed, "measured round trip");
        Some(rtt)
    }

    // ------------------------------------------------------------------
    // consistency
    // ------------------------------------------------------------------

    /// Returns `true` if `frame` is on the configured consistency-check cadence.
    #[must_use]
    pub fn consistency_check_due(&self, frame: Frame) -> bool {
        let interval = self.config.consistency_check_interval;
        interval > 0
            && frame.is_valid()
            && frame > self.last_consistent_frame
            && frame.as_i32() % interval as i32 == 0
            && self.status.accepts_messages()
    }

    /// Frames with an outstanding consistency check, oldest first.
    pub fn pending_checks(&self) -> impl Iterator<Item = Frame> + '_ {
        self.pending_checks.iter().copied()
    }

    /// The newest frame both peers confirmed to be consistent.
    #[must_use]
    pub fn last_consistent_frame(&self) -> Frame {
        self.last_consistent_frame
    }

    /// Starts a consistency check for `frame`.
    ///
    /// At most `max_checksum_history` checks (and never fewer than one) are outstanding; the
    /// oldest is dropped to make room.
    /// Returns `None` for an invalid frame or a closing connection.
    pub fn request_consistency_check(&mut self, frame: Frame) -> Option<ConsistencyCheckRequest> {
        if !frame.is_valid() || !self.status.accepts_messages() {
            return None;
        }
        // a zero history still keeps the newest check
        let capacity = self.config.max_checksum_history.max(1);
        while self.pending_checks.len() >= capacity {
            let Some(dropped) = self.pending_checks.pop_first() else {
                break;
            };
            trace!(frame = dropped.as_i32(), "dropping unanswered consistency check");
        }
        self.pending_checks.insert(frame);
        Some(ConsistencyCheckRequest { frame })
    }

    /// Answers the peer's request with the local checksum at the same frame.
    ///
    /// Returns `None` if the local state is unavailable or the connection is closing.
    pub fn on_consistency_check_request(
        &self,
        request: &ConsistencyCheckRequest,
        source: &dyn StateChecksumSource,
    ) -> Option<ConsistencyCheckReply> {
        if !self.status.accepts_messages() {
            trace!(status = %self.status, "dropping consistency check request");
            return None;
        }
        match source.checksum_at(request.frame) {
            Some(checksum) => Some(ConsistencyCheckReply {
                frame: request.frame,
                checksum,
            }),
            None => {
                debug!(
                    frame = request.frame.as_i32(),
                    "no local state to answer consistency check"
                );
                None
            },
        }
    }

    /// Matches a reply against an outstanding request and the local checksum.
    ///
    /// Replies for frames that were never requested, or whose request was already answered or
    /// dropped, are [`Discarded`](ConsistencyOutcome::Discarded).
    pub fn on_consistency_check_reply(
        &mut self,
        reply: &ConsistencyCheckReply,
        source: &dyn StateChecksumSource,
    ) -> ConsistencyOutcome {
        let frame = reply.frame;
        if !self.status.accepts_messages() || !self.pending_checks.remove(&frame) {
            trace!(frame = frame.as_i32(), "discarding stale consistency reply");
            return ConsistencyOutcome::Discarded { frame };
        }
        let Some(local) = source.checksum_at(frame) else {
            return ConsistencyOutcome::Unavailable { frame };
        };
        if local == reply.checksum {
            if frame > self.last_consistent_frame {
                self.last_consistent_frame = frame;
            }
            return ConsistencyOutcome::Consistent { frame };
        }

        report_violation_to!(
            &self.violation_observer,
            ViolationSeverity::Critical,
            ViolationKind::ChecksumMismatch,
            "peer checksum mismatch at frame {}: local={:#010x}, remote={:#010x}",
            frame,
            local,
            reply.checksum
        );
        ConsistencyOutcome::Mismatch {
            frame,
            local,
            remote: reply.checksum,
        }
    }
}

impl std::fmt::Debug for PeerProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerProtocol")
            .field("status", &self.status)
            .field("round_trip_time", &self.round_trip_time)
            .field("remote_frame_advantage", &self.remote_frame_advantage)
            .field("pending_checks", &self.pending_checks.len())
            .finish_non_exhaustive()
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
    use crate::telemetry::CollectingObserver;

    fn running() -> PeerProtocol {
        let mut protocol = PeerProtocol::new(ProtocolConfig::default());
        protocol.start_running().unwrap();
        protocol
    }

    fn checksum_of(frame: Frame) -> Option<u32> {
        frame.is_valid().then(|| frame.as_i32() as u32 * 31)
    }

    // ==========================================
    // Lifecycle
    // ==========================================

    #[test]
    fn new_protocol_is_syncing() {
        let protocol = PeerProtocol::new(ProtocolConfig::default());
        assert_eq!(protocol.status(), ProtocolStatus::Syncing);
        assert_eq!(protocol.connection_status(), PlayerConnectionStatus::Syncing);
        assert!(!protocol.is_running());
    }

    #[test]
    fn full_lifecycle() {
        let mut protocol = running();
        assert!(protocol.is_running());
        protocol.disconnect().unwrap();
        assert_eq!(protocol.connection_status(), PlayerConnectionStatus::Unknown);
        protocol.finish_disconnect().unwrap();
        assert_eq!(
            protocol.connection_status(),
            PlayerConnectionStatus::Disconnected
        );
    }

    #[test]
    fn cannot_leave_disconnected() {
        let observer = Arc::new(CollectingObserver::new());
        let mut protocol = PeerProtocol::new(ProtocolConfig::default())
            .with_violation_observer(Some(observer.clone() as Arc<dyn ViolationObserver>));
        protocol.finish_disconnect().unwrap();

        assert!(matches!(
            protocol.start_running(),
            Err(RampartError::InvalidStatusTransition { .. })
        ));
        assert!(protocol.synchronize().is_err());
        assert!(protocol.disconnect().is_err());
        assert_eq!(protocol.status(), ProtocolStatus::Disconnected);
        assert_eq!(observer.violations_of_kind(ViolationKind::Protocol).len(), 3);
    }

    #[test]
    fn synchronize_only_while_syncing() {
        let mut protocol = PeerProtocol::new(ProtocolConfig::default());
        protocol.request_consistency_check(Frame::new(1)).unwrap();
        protocol.synchronize().unwrap();
        assert_eq!(protocol.pending_checks().count(), 0);

        protocol.start_running().unwrap();
        assert!(protocol.synchronize().is_err());
    }

    // ==========================================
    // Quality
    // ==========================================

    #[test]
    fn quality_report_is_echoed() {
        let mut local = running();
        let mut remote = running();
        local.set_local_frame_advantage(-2);

        let report = local.quality_report().unwrap();
        assert_eq!(report.frame_advantage, -2);

        let reply = remote.on_quality_report(&report).unwrap();
        assert_eq!(reply.pong, report.ping);
        assert_eq!(remote.remote_frame_advantage(), -2);

        let rtt = local.on_quality_reply(&reply).unwrap();
        assert_eq!(local.round_trip_time(), Some(rtt));
    }

    #[test]
    fn quality_reply_from_the_future_is_ignored() {
        let observer = Arc::new(CollectingObserver::new());
        let mut protocol = running()
            .with_violation_observer(Some(observer.clone() as Arc<dyn ViolationObserver>));
        let reply = QualityReply { pong: i64::MAX };
        assert!(protocol.on_quality_reply(&reply).is_none());
        assert!(protocol.round_trip_time().is_none());
        assert!(observer.has_violation(ViolationKind::Protocol));
    }

    #[test]
    fn quality_report_cadence() {
        let mut protocol = running();
        let now = Instant::now();
        assert!(protocol.quality_report_due(now));
        protocol.quality_report().unwrap();
        assert!(!protocol.quality_report_due(Instant::now()));
        assert!(protocol.quality_report_due(
            Instant::now() + protocol.config().quality_report_interval
        ));
    }

    #[test]
    fn closing_protocol_drops_quality_messages() {
        let mut protocol = running();
        protocol.disconnect().unwrap();
        assert!(protocol.quality_report().is_none());
        assert!(protocol.on_quality_report(&QualityReport::default()).is_none());
        assert!(!protocol.quality_report_due(Instant::now()));
    }

    // ==========================================
    // Consistency
    // ==========================================

    #[test]
    fn consistent_reply_advances_last_consistent_frame() {
        let mut local = running();
        let remote = running();
        let request = local.request_consistency_check(Frame::new(120)).unwrap();
        let reply = remote
            .on_consistency_check_request(&request, &checksum_of)
            .unwrap();
        assert_eq!(reply.frame, Frame::new(120));

        assert_eq!(
            local.on_consistency_check_reply(&reply, &checksum_of),
            ConsistencyOutcome::Consistent {
                frame: Frame::new(120)
            }
        );
        assert_eq!(local.last_consistent_frame(), Frame::new(120));
        assert!(!local.consistency_check_due(Frame::new(60)));
    }

    #[test]
    fn mismatch_is_reported() {
        let observer = Arc::new(CollectingObserver::new());
        let mut local = running()
            .with_violation_observer(Some(observer.clone() as Arc<dyn ViolationObserver>));
        local.request_consistency_check(Frame::new(10)).unwrap();
        let reply = ConsistencyCheckReply {
            frame: Frame::new(10),
            checksum: 1,
        };
        assert_eq!(
            local.on_consistency_check_reply(&reply, &checksum_of),
            ConsistencyOutcome::Mismatch {
                frame: Frame::new(10),
                local: 310,
                remote: 1,
            }
        );
        assert!(observer.has_violation(ViolationKind::ChecksumMismatch));
    }

    #[test]
    fn unrequested_and_repeated_replies_are_discarded() {
        let mut local = running();
        let reply = ConsistencyCheckReply {
            frame: Frame::new(10),
            checksum: 310,
        };
        assert_eq!(
            local.on_consistency_check_reply(&reply, &checksum_of),
            ConsistencyOutcome::Discarded {
                frame: Frame::new(10)
            }
        );

        local.request_consistency_check(Frame::new(10)).unwrap();
        assert!(matches!(
            local.on_consistency_check_reply(&reply, &checksum_of),
            ConsistencyOutcome::Consistent { .. }
        ));
        assert!(matches!(
            local.on_consistency_check_reply(&reply, &checksum_of),
            ConsistencyOutcome::Discarded { .. }
        ));
    }

    #[test]
    fn missing_local_state_is_unavailable() {
        let mut local = running();
        local.request_consistency_check(Frame::new(3)).unwrap();
        let nothing = |_: Frame| None;
        let reply = ConsistencyCheckReply {
            frame: Frame::new(3),
            checksum: 0,
        };
        assert_eq!(
            local.on_consistency_check_reply(&reply, &nothing),
            ConsistencyOutcome::Unavailable {
                frame: Frame::new(3)
            }
        );
        assert!(local
            .on_consistency_check_request(&ConsistencyCheckRequest { frame: Frame::new(3) }, &nothing)
            .is_none());
    }

    #[test]
    fn pending_checks_are_bounded() {
        let config = ProtocolConfig {
            max_checksum_history: 4,
            ..ProtocolConfig::default()
        };
        let mut protocol = PeerProtocol::new(config);
        for frame in 0..10 {
            protocol.request_consistency_check(Frame::new(frame)).unwrap();
        }
        let pending: Vec<_> = protocol.pending_checks().collect();
        assert_eq!(
            pending,
            vec![Frame::new(6), Frame::new(7), Frame::new(8), Frame::new(9)]
        );
    }

    #[test]
    fn zero_history_keeps_only_the_newest_check() {
        let config = ProtocolConfig {
            max_checksum_history: 0,
            ..ProtocolConfig::default()
        };
        assert!(config.validate().is_err());
        let mut protocol = PeerProtocol::new(config);
        for frame in [1, 2, 3] {
            assert_eq!(
                protocol.request_consistency_check(Frame::new(frame)),
                Some(ConsistencyCheckRequest {
                    frame: Frame::new(frame)
                })
            );
        }
        assert_eq!(protocol.pending_checks().collect::<Vec<_>>(), vec![Frame::new(3)]);
    }

    #[test]
    fn invalid_frames_are_never_requested() {
        let mut protocol = running();
        assert!(protocol.request_consistency_check(Frame::NULL).is_none());
        assert!(!protocol.consistency_check_due(Frame::NULL));
    }

    #[test]
    fn check_cadence_follows_interval() {
        let config = ProtocolConfig {
            consistency_check_interval: 30,
            ..ProtocolConfig::default()
        };
        let protocol = PeerProtocol::new(config);
        assert!(protocol.consistency_check_due(Frame::new(0)));
        assert!(protocol.consistency_check_due(Frame::new(30)));
        assert!(!protocol.consistency_check_due(Frame::new(31)));

        let disabled = PeerProtocol::new(ProtocolConfig {
            consistency_check_interval: 0,
            ..ProtocolConfig::default()
        });
        assert!(!disabled.consistency_check_due(Frame::new(30)));
    }
}

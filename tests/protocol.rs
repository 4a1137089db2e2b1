//! Peer protocol integration tests.
//!
//! Two [`PeerProtocol`]s talk to each other through encoded bytes only, the way a transport
//! would drive them.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use web_time::{Duration, Instant};

use rampart::network::messages::{deserialize_message, serialize_message};
use rampart::network::protocol::ConsistencyOutcome;
use rampart::serialization::{BinaryDecode, BinaryEncode, FixedSize};
use rampart::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity};
use rampart::{
    ConsistencyCheckReply, ConsistencyCheckRequest, Endianness, Frame, PeerProtocol,
    PlayerConnectionStatus, ProtocolConfig, ProtocolStatus, QualityReply, QualityReport,
    RampartError,
};

/// Sends `message` over a simulated wire: encode, copy, decode.
fn wire<M>(message: &M, endianness: Endianness) -> M
where
    M: BinaryEncode + BinaryDecode + FixedSize,
{
    let mut packet = [0u8; 64];
    let written = serialize_message(message, &mut packet, endianness).unwrap();
    assert_eq!(written, M::SIZE);
    let (decoded, read) = deserialize_message::<M>(&packet[..written], endianness).unwrap();
    assert_eq!(read, written);
    decoded
}

fn connected_pair(config: ProtocolConfig) -> (PeerProtocol, PeerProtocol) {
    let mut local = PeerProtocol::new(config);
    let mut remote = PeerProtocol::new(config);
    local.start_running().unwrap();
    remote.start_running().unwrap();
    (local, remote)
}

// ============================================================================
// Messages
// ============================================================================

#[test]
fn messages_survive_the_wire_in_both_byte_orders() {
    for endianness in [Endianness::Big, Endianness::Little] {
        let report = QualityReport {
            frame_advantage: -7,
            ping: 9_876_543_210,
        };
        assert_eq!(wire(&report, endianness), report);

        let reply = QualityReply { pong: 42 };
        assert_eq!(wire(&reply, endianness), reply);

        let request = ConsistencyCheckRequest {
            frame: Frame::new(600),
        };
        assert_eq!(wire(&request, endianness), request);

        let check = ConsistencyCheckReply {
            frame: Frame::new(600),
            checksum: 0x1234_5678,
        };
        assert_eq!(wire(&check, endianness), check);
    }
}

#[test]
fn request_layout_is_a_bare_frame() {
    let request = ConsistencyCheckRequest {
        frame: Frame::new(0x0102_0304),
    };
    let mut big = [0u8; 4];
    let mut little = [0u8; 4];
    serialize_message(&request, &mut big, Endianness::Big).unwrap();
    serialize_message(&request, &mut little, Endianness::Little).unwrap();
    assert_eq!(big, [1, 2, 3, 4]);
    assert_eq!(little, [4, 3, 2, 1]);
}

#[test]
fn short_packet_is_rejected() {
    let mut packet = [0u8; 7];
    let err = serialize_message(&QualityReply { pong: 1 }, &mut packet, Endianness::Big)
        .unwrap_err();
    assert!(matches!(err, RampartError::InsufficientBuffer { .. }));

    let err = deserialize_message::<ConsistencyCheckReply>(&packet[..5], Endianness::Big)
        .unwrap_err();
    assert!(matches!(err, RampartError::TruncatedData { .. }));
}

#[test]
fn status_travels_as_one_byte() {
    for status in ProtocolStatus::ALL {
        let mut packet = [0u8; 1];
        serialize_message(&status, &mut packet, Endianness::Little).unwrap();
        assert_eq!(packet[0], u8::from(status));
        assert_eq!(wire(&status, Endianness::Big), status);
    }

    let err = deserialize_message::<ProtocolStatus>(&[9], Endianness::Big).unwrap_err();
    assert!(matches!(err, RampartError::InvalidEnumValue { .. }));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn full_lifecycle() {
    let mut peer = PeerProtocol::new(ProtocolConfig::default());
    assert_eq!(peer.connection_status(), PlayerConnectionStatus::Syncing);

    peer.synchronize().unwrap();
    peer.start_running().unwrap();
    assert!(peer.is_running());
    assert_eq!(peer.connection_status(), PlayerConnectionStatus::Connected);

    peer.disconnect().unwrap();
    assert_eq!(peer.connection_status(), PlayerConnectionStatus::Unknown);
    assert!(peer.quality_report().is_none());

    peer.finish_disconnect().unwrap();
    assert_eq!(peer.status(), ProtocolStatus::Disconnected);
    assert!(peer.status().is_terminal());
}

#[test]
fn closed_connection_cannot_reopen() {
    let observer = Arc::new(CollectingObserver::new());
    let mut peer = PeerProtocol::new(ProtocolConfig::default())
        .with_violation_observer(Some(observer.clone() as Arc<dyn ViolationObserver>));
    peer.finish_disconnect().unwrap();

    for attempt in [
        PeerProtocol::start_running,
        PeerProtocol::synchronize,
        PeerProtocol::disconnect,
        PeerProtocol::finish_disconnect,
    ] {
        let err = attempt(&mut peer).unwrap_err();
        assert!(matches!(
            err,
            RampartError::InvalidStatusTransition {
                from: "Disconnected",
                ..
            }
        ));
    }
    assert_eq!(observer.violations_of_kind(ViolationKind::Protocol).len(), 4);
    assert_eq!(peer.status(), ProtocolStatus::Disconnected);
}

#[test]
fn running_peer_cannot_resync() {
    let mut peer = PeerProtocol::new(ProtocolConfig::default());
    peer.start_running().unwrap();
    assert!(matches!(
        peer.synchronize(),
        Err(RampartError::InvalidStatusTransition {
            from: "Running",
            to: "Syncing"
        })
    ));
    assert!(peer.is_running());
}

// ============================================================================
// Quality
// ============================================================================

#[test]
fn quality_exchange_measures_round_trip() {
    let (mut local, mut remote) = connected_pair(ProtocolConfig::default());
    local.set_local_frame_advantage(3);

    assert!(local.quality_report_due(Instant::now()));
    let report = wire(&local.quality_report().unwrap(), Endianness::Big);
    assert_eq!(report.frame_advantage, 3);
    assert!(!local.quality_report_due(Instant::now()));

    let reply = wire(&remote.on_quality_report(&report).unwrap(), Endianness::Big);
    assert_eq!(remote.remote_frame_advantage(), 3);
    assert_eq!(reply.pong, report.ping);

    let rtt = local.on_quality_reply(&reply).unwrap();
    assert_eq!(local.round_trip_time(), Some(rtt));
    assert!(rtt < Duration::from_secs(5));
}

#[test]
fn quality_report_due_after_interval() {
    let (mut local, _) = connected_pair(ProtocolConfig::lan());
    local.quality_report().unwrap();
    let later = Instant::now() + ProtocolConfig::lan().quality_report_interval;
    assert!(local.quality_report_due(later));
}

#[test]
fn reply_from_the_future_is_ignored() {
    let observer = Arc::new(CollectingObserver::new());
    let mut local = PeerProtocol::new(ProtocolConfig::default())
        .with_violation_observer(Some(observer.clone() as Arc<dyn ViolationObserver>));

    let reply = QualityReply {
        pong: local.timestamp_millis() + 60_000,
    };
    assert!(local.on_quality_reply(&reply).is_none());
    assert!(local.round_trip_time().is_none());
    assert!(observer.has_severity(ViolationSeverity::Warning));
}

#[test]
fn closing_peer_drops_quality_messages() {
    let (mut local, mut remote) = connected_pair(ProtocolConfig::default());
    let report = local.quality_report().unwrap();
    remote.disconnect().unwrap();
    assert!(remote.on_quality_report(&report).is_none());
    assert_eq!(remote.remote_frame_advantage(), 0);
}

// ============================================================================
// Consistency Checks
// ============================================================================

fn agreeing(frame: Frame) -> Option<u32> {
    frame.is_valid().then(|| frame.as_i32() as u32 ^ 0xA5A5_A5A5)
}

#[test]
fn consistency_check_on_cadence() {
    let config = ProtocolConfig::default();
    let (mut local, remote) = connected_pair(config);
    let mut checked = Vec::new();

    for frame in (0..=240).map(Frame::new) {
        if !local.consistency_check_due(frame) {
            continue;
        }
        let request = wire(&local.request_consistency_check(frame).unwrap(), Endianness::Big);
        let reply = wire(
            &remote.on_consistency_check_request(&request, &agreeing).unwrap(),
            Endianness::Big,
        );
        assert_eq!(
            local.on_consistency_check_reply(&reply, &agreeing),
            ConsistencyOutcome::Consistent { frame }
        );
        checked.push(frame.as_i32());
    }

    assert_eq!(checked, vec![0, 60, 120, 180, 240]);
    assert!(!local.consistency_check_due(Frame::new(180)));
    assert_eq!(local.last_consistent_frame(), Frame::new(240));
    assert_eq!(local.pending_checks().count(), 0);
}

#[test]
fn diverged_simulations_are_reported() {
    let observer = Arc::new(CollectingObserver::new());
    let (local, remote) = connected_pair(ProtocolConfig::debug());
    let mut local =
        local.with_violation_observer(Some(observer.clone() as Arc<dyn ViolationObserver>));
    let diverged = |frame: Frame| agreeing(frame).map(|c| c.wrapping_add(1));

    let request = local.request_consistency_check(Frame::new(7)).unwrap();
    let reply = remote.on_consistency_check_request(&request, &diverged).unwrap();
    let outcome = local.on_consistency_check_reply(&reply, &agreeing);

    assert_eq!(
        outcome,
        ConsistencyOutcome::Mismatch {
            frame: Frame::new(7),
            local: agreeing(Frame::new(7)).unwrap(),
            remote: reply.checksum,
        }
    );
    let violations = observer.violations_of_kind(ViolationKind::ChecksumMismatch);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, ViolationSeverity::Critical);
    assert_eq!(local.last_consistent_frame(), Frame::NULL);
}

#[test]
fn unrequested_and_duplicate_replies_are_discarded() {
    let (mut local, remote) = connected_pair(ProtocolConfig::default());
    let stray = ConsistencyCheckReply {
        frame: Frame::new(60),
        checksum: 0,
    };
    assert_eq!(
        local.on_consistency_check_reply(&stray, &agreeing),
        ConsistencyOutcome::Discarded {
            frame: Frame::new(60)
        }
    );

    let request = local.request_consistency_check(Frame::new(60)).unwrap();
    let reply = remote.on_consistency_check_request(&request, &agreeing).unwrap();
    assert!(matches!(
        local.on_consistency_check_reply(&reply, &agreeing),
        ConsistencyOutcome::Consistent { .. }
    ));
    assert!(matches!(
        local.on_consistency_check_reply(&reply, &agreeing),
        ConsistencyOutcome::Discarded { .. }
    ));
}

#[test]
fn pruned_local_state_is_unavailable() {
    let (mut local, remote) = connected_pair(ProtocolConfig::default());
    let pruned = |frame: Frame| (frame > Frame::new(100)).then_some(1_u32);

    let request = local.request_consistency_check(Frame::new(60)).unwrap();
    assert!(remote.on_consistency_check_request(&request, &pruned).is_none());

    let reply = remote.on_consistency_check_request(&request, &agreeing).unwrap();
    assert_eq!(
        local.on_consistency_check_reply(&reply, &pruned),
        ConsistencyOutcome::Unavailable {
            frame: Frame::new(60)
        }
    );
}

#[test]
fn oldest_checks_are_dropped_when_history_is_full() {
    let config = ProtocolConfig {
        max_checksum_history: 3,
        ..ProtocolConfig::default()
    };
    let (mut local, _) = connected_pair(config);
    for frame in [10, 20, 30, 40, 50] {
        local.request_consistency_check(Frame::new(frame)).unwrap();
    }
    let pending: Vec<i32> = local.pending_checks().map(Frame::as_i32).collect();
    assert_eq!(pending, vec![30, 40, 50]);
    assert!(local.request_consistency_check(Frame::NULL).is_none());
}

#[test]
fn finishing_disconnect_forgets_pending_checks() {
    let (mut local, remote) = connected_pair(ProtocolConfig::default());
    let request = local.request_consistency_check(Frame::new(60)).unwrap();
    let reply = remote.on_consistency_check_request(&request, &agreeing).unwrap();

    local.disconnect().unwrap();
    local.finish_disconnect().unwrap();
    assert_eq!(local.pending_checks().count(), 0);
    assert_eq!(
        local.on_consistency_check_reply(&reply, &agreeing),
        ConsistencyOutcome::Discarded {
            frame: Frame::new(60)
        }
    );
}

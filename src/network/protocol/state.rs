//! Connection lifecycle of a peer.
//!
//! # State Machine Diagram
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Peer Connection Lifecycle                  │
//! │                                                              │
//! │   ┌─────────┐  start_running()  ┌─────────┐                  │
//! │   │ Syncing │ ─────────────────►│ Running │                  │
//! │   └────┬────┘                   └────┬────┘                  │
//! │        │                             │ disconnect()          │
//! │        │ disconnect()                ▼                       │
//! │        │                    ┌───────────────┐                │
//! │        └───────────────────►│ Disconnecting │                │
//! │                             └───────┬───────┘                │
//! │                                     │ finish_disconnect()    │
//! │                                     ▼                        │
//! │                             ┌──────────────┐                 │
//! │                             │ Disconnected │                 │
//! │                             └──────────────┘                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## State Transitions
//!
//! | From          | To            | Trigger                                  |
//! |---------------|---------------|------------------------------------------|
//! | Syncing       | Running       | handshake complete                       |
//! | Syncing       | Disconnecting | peer gave up during the handshake        |
//! | Running       | Disconnecting | disconnect requested or timed out        |
//! | Syncing       | Disconnected  | hard failure                             |
//! | Running       | Disconnected  | hard failure                             |
//! | Disconnecting | Disconnected  | pending messages flushed                 |
//!
//! Disconnected is terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RampartError;
use crate::serialization::{
    BinaryDecode, BinaryEncode, BinaryReader, BinaryWriter, ByteSink, CodecError, FixedSize,
};

/// Where a peer connection is in its lifecycle.
///
/// On the wire the status is a single byte holding the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtocolStatus {
    /// Exchanging quality and consistency probes. The only legal initial state.
    #[default]
    Syncing = 0,
    /// Handshake complete; live confirmed inputs may be exchanged.
    Running = 1,
    /// Shutting down; remaining messages are being flushed.
    Disconnecting = 2,
    /// Closed for good.
    Disconnected = 3,
}

impl ProtocolStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Syncing,
        Self::Running,
        Self::Disconnecting,
        Self::Disconnected,
    ];

    const fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Syncing),
            1 => Some(Self::Running),
            2 => Some(Self::Disconnecting),
            3 => Some(Self::Disconnected),
            _ => None,
        }
    }

    /// The status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Syncing => "Syncing",
            Self::Running => "Running",
            Self::Disconnecting => "Disconnecting",
            Self::Disconnected => "Disconnected",
        }
    }

    /// Returns `true` if the lifecycle allows moving from `self` to `next`.
    ///
    /// Staying in the same state is allowed for every state except
    /// [`Disconnected`](Self::Disconnected).
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Syncing, Self::Syncing)
                | (Self::Syncing, Self::Running)
                | (Self::Syncing, Self::Disconnecting)
                | (Self::Syncing, Self::Disconnected)
                | (Self::Running, Self::Running)
                | (Self::Running, Self::Disconnecting)
                | (Self::Running, Self::Disconnected)
                | (Self::Disconnecting, Self::Disconnecting)
                | (Self::Disconnecting, Self::Disconnected)
        )
    }

    /// Validates a transition.
    ///
    /// # Errors
    ///
    /// [`RampartError::InvalidStatusTransition`] if the lifecycle forbids it.
    pub fn transition_to(self, next: Self) -> Result<Self, RampartError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(RampartError::InvalidStatusTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Returns `true` for [`Disconnected`](Self::Disconnected).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns `true` if quality and consistency messages are still processed.
    #[must_use]
    pub const fn accepts_messages(self) -> bool {
        matches!(self, Self::Syncing | Self::Running)
    }
}

impl fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for ProtocolStatus {
    type Error = RampartError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(i32::from(value))
    }
}

impl TryFrom<i32> for ProtocolStatus {
    type Error = RampartError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_raw(value).ok_or(RampartError::InvalidEnumValue {
            type_name: "ProtocolStatus",
            value: i64::from(value),
        })
    }
}

impl From<ProtocolStatus> for u8 {
    fn from(status: ProtocolStatus) -> Self {
        status as u8
    }
}

impl FixedSize for ProtocolStatus {
    const SIZE: usize = 1;
}

impl BinaryEncode for ProtocolStatus {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write_u8(u8::from(*self))
    }
}

impl BinaryDecode for ProtocolStatus {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        let raw = reader.read_u8()?;
        Self::from_raw(i32::from(raw)).ok_or(CodecError::invalid("ProtocolStatus", i64::from(raw)))
    }
}

/// Coarse connection status reported to the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerConnectionStatus {
    /// The handshake is still running.
    Syncing,
    /// The peer is playing.
    Connected,
    /// The peer is gone.
    Disconnected,
    /// The peer is in a transitional state.
    Unknown,
}

impl From<ProtocolStatus> for PlayerConnectionStatus {
    fn from(status: ProtocolStatus) -> Self {
        match status {
            ProtocolStatus::Syncing => Self::Syncing,
            ProtocolStatus::Running => Self::Connected,
            ProtocolStatus::Disconnected => Self::Disconnected,
            ProtocolStatus::Disconnecting => Self::Unknown,
        }
    }
}

impl fmt::Display for PlayerConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syncing => write!(f, "Syncing"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Unknown => write!(f, "Unknown"),
        }
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
    use crate::serialization::{decode_at, encode_at, Endianness};

    // ==========================================================================
    // Raw Value Tests
    // ==========================================================================

    #[test]
    fn protocol_status_from_raw_values() {
        for status in ProtocolStatus::ALL {
            assert_eq!(ProtocolStatus::try_from(u8::from(status)).unwrap(), status);
            assert_eq!(ProtocolStatus::try_from(status as i32).unwrap(), status);
        }
    }

    #[test]
    fn protocol_status_rejects_out_of_range_values() {
        for raw in [4i32, -1, 255, i32::MAX] {
            assert_eq!(
                ProtocolStatus::try_from(raw),
                Err(RampartError::InvalidEnumValue {
                    type_name: "ProtocolStatus",
                    value: i64::from(raw),
                })
            );
        }
        assert!(ProtocolStatus::try_from(4u8).is_err());
    }

    #[test]
    fn protocol_status_default_is_syncing() {
        assert_eq!(ProtocolStatus::default(), ProtocolStatus::Syncing);
    }

    // ==========================================================================
    // Transition Tests
    // ==========================================================================

    #[test]
    fn disconnected_is_terminal() {
        for next in ProtocolStatus::ALL {
            assert!(!ProtocolStatus::Disconnected.can_transition_to(next));
        }
        assert!(ProtocolStatus::Disconnected.is_terminal());
        assert!(!ProtocolStatus::Disconnected.accepts_messages());
    }

    #[test]
    fn no_transition_moves_backward() {
        for from in ProtocolStatus::ALL {
            for to in ProtocolStatus::ALL {
                if to < from {
                    assert!(!from.can_transition_to(to), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn transition_to_reports_names() {
        assert_eq!(
            ProtocolStatus::Disconnecting.transition_to(ProtocolStatus::Running),
            Err(RampartError::InvalidStatusTransition {
                from: "Disconnecting",
                to: "Running",
            })
        );
        assert_eq!(
            ProtocolStatus::Syncing.transition_to(ProtocolStatus::Running),
            Ok(ProtocolStatus::Running)
        );
    }

    // ==========================================================================
    // Mapping Tests
    // ==========================================================================

    #[test]
    fn player_connection_status_mapping() {
        assert_eq!(
            PlayerConnectionStatus::from(ProtocolStatus::Syncing),
            PlayerConnectionStatus::Syncing
        );
        assert_eq!(
            PlayerConnectionStatus::from(ProtocolStatus::Running),
            PlayerConnectionStatus::Connected
        );
        assert_eq!(
            PlayerConnectionStatus::from(ProtocolStatus::Disconnected),
            PlayerConnectionStatus::Disconnected
        );
        assert_eq!(
            PlayerConnectionStatus::from(ProtocolStatus::Disconnecting),
            PlayerConnectionStatus::Unknown
        );
        assert_eq!(PlayerConnectionStatus::Connected.to_string(), "Connected");
    }

    // ==========================================================================
    // Wire Tests
    // ==========================================================================

    #[test]
    fn status_byte_roundtrip_and_rejection() {
        let mut buffer = [0u8; 1];
        let mut offset = 0;
        encode_at(&ProtocolStatus::Disconnecting, &mut buffer, &mut offset, Endianness::Big)
            .unwrap();
        assert_eq!(buffer, [2]);

        let mut offset = 0;
        let decoded: ProtocolStatus = decode_at(&buffer, &mut offset, Endianness::Big).unwrap();
        assert_eq!(decoded, ProtocolStatus::Disconnecting);

        let mut offset = 0;
        let err = decode_at::<ProtocolStatus>(&[9], &mut offset, Endianness::Big).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidValue {
                type_name: "ProtocolStatus",
                value: 9
            }
        ));
    }

    #[test]
    fn wire_decode_agrees_with_raw_conversion() {
        for raw in 0..=u8::MAX {
            let mut offset = 0;
            let decoded = decode_at::<ProtocolStatus>(&[raw], &mut offset, Endianness::Little);
            match ProtocolStatus::try_from(raw) {
                Ok(status) => assert_eq!(decoded, Ok(status)),
                Err(RampartError::InvalidEnumValue { type_name, value }) => {
                    assert_eq!(decoded, Err(CodecError::InvalidValue { type_name, value }));
                },
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
    }
}

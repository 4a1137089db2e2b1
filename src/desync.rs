//! Desync detection for forced-rollback self tests.
//!
//! A [`SyncTestSession`](crate::SyncTestSession) simulates every frame at least twice. The first
//! time a frame is saved, its serialized state and checksum are recorded as a
//! [`ChecksummedState`]. Every later save of the same frame is compared against that record by
//! a [`DesyncDetector`]. When the checksums disagree, the detector renders both states to text,
//! hands both to the configured [`DesyncHandler`] and then either fails with
//! [`RampartError::ChecksumMismatch`] or only logs, depending on
//! [`SyncTestConfig::throw_on_desync`].
//!
//! ```
//! use rampart::desync::DesyncDetector;
//! use rampart::{Frame, RampartError, StateSnapshot, SyncTestConfig};
//!
//! let mut detector = DesyncDetector::<Vec<u8>>::new(&SyncTestConfig::default());
//! let first = detector.record(StateSnapshot::new(Frame::new(3), vec![1, 2, 3]), None);
//! let again = detector.record(StateSnapshot::new(Frame::new(3), vec![1, 2, 3]), None);
//! assert!(detector.check(&first, &again)?);
//!
//! let diverged = detector.record(StateSnapshot::new(Frame::new(3), vec![1, 2, 4]), None);
//! assert!(matches!(
//!     detector.check(&first, &diverged),
//!     Err(RampartError::ChecksumMismatch { .. })
//! ));
//! # Ok::<(), RampartError>(())
//! ```

use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{error, warn};

use crate::checksum::fletcher32;
use crate::error::RampartError;
use crate::frame_info::StateSnapshot;
use crate::serialization::{BinaryReader, Endianness};
use crate::sessions::config::SyncTestConfig;
use crate::telemetry::{
    report_to_observer, SpecViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};
use crate::{Frame, MaybeSendSync};

/// Checksum function applied to serialized states.
pub type ChecksumFn = fn(&[u8]) -> u32;

/// One side of a desync, as seen by a [`DesyncHandler`].
///
/// Borrowed from the detector for the duration of the handler call.
pub struct DesyncState<'a, S> {
    text: &'a str,
    bytes: &'a [u8],
    checksum: u32,
    state: Option<&'a S>,
}

impl<'a, S> DesyncState<'a, S> {
    /// The text rendering produced by the configured [`StateStringParser`].
    #[must_use]
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// The serialized state.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// A reader positioned over the serialized state.
    ///
    /// `offset` starts the read and is advanced as values are decoded.
    pub fn reader<'r>(&'r self, offset: &'r mut usize, endianness: Endianness) -> BinaryReader<'r> {
        BinaryReader::new(self.bytes, offset, endianness)
    }

    /// The checksum of [`bytes`](Self::bytes).
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// The state object, if the host stored one alongside the bytes.
    #[must_use]
    pub fn state(&self) -> Option<&'a S> {
        self.state
    }
}

impl<S> fmt::Display for DesyncState<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text)
    }
}

impl<S> fmt::Debug for DesyncState<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesyncState")
            .field("checksum", &format_args!("{:#010x}", self.checksum))
            .field("size", &self.bytes.len())
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

/// Receives both sides of a checksum mismatch, e.g. to diff and display them.
///
/// Called exactly once per mismatch, before the session fails or continues. Closures of the
/// form `FnMut(Frame, &DesyncState<S>, &DesyncState<S>)` are handlers.
pub trait DesyncHandler<S>: MaybeSendSync {
    /// Handles a mismatch at `frame` between the first recorded state and the resimulated one.
    fn handle(&mut self, frame: Frame, previous: &DesyncState<'_, S>, current: &DesyncState<'_, S>);
}

impl<S, F> DesyncHandler<S> for F
where
    F: FnMut(Frame, &DesyncState<'_, S>, &DesyncState<'_, S>) + MaybeSendSync,
{
    fn handle(&mut self, frame: Frame, previous: &DesyncState<'_, S>, current: &DesyncState<'_, S>) {
        self(frame, previous, current);
    }
}

/// Renders a state as text for desync diagnostics.
pub trait StateStringParser<S>: MaybeSendSync {
    /// Renders the serialized `bytes`, or `state` when the parser understands it.
    fn render(&self, bytes: &[u8], state: Option<&S>) -> String;
}

/// Renders the serialized bytes as a hex dump, 16 bytes per line.
///
/// ```
/// use rampart::desync::{HexStateStringParser, StateStringParser};
///
/// let text = StateStringParser::<()>::render(&HexStateStringParser, &[0xde, 0xad, 0xbe, 0xef], None);
/// assert_eq!(text, "0000: de ad be ef");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct HexStateStringParser;

impl<S> StateStringParser<S> for HexStateStringParser {
    fn render(&self, bytes: &[u8], _state: Option<&S>) -> String {
        let mut out = String::with_capacity(bytes.len() * 3 + bytes.len() / 16 * 7);
        for (line, chunk) in bytes.chunks(16).enumerate() {
            if line > 0 {
                out.push('\n');
            }
            let _ = write!(out, "{:04x}:", line * 16);
            for byte in chunk {
                let _ = write!(out, " {byte:02x}");
            }
        }
        out
    }
}

/// Renders the state object as pretty-printed JSON.
///
/// Falls back to a hex dump when no state object was stored or it fails to serialize.
#[cfg(feature = "json")]
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStateStringParser;

#[cfg(feature = "json")]
impl<S: serde::Serialize> StateStringParser<S> for JsonStateStringParser {
    fn render(&self, bytes: &[u8], state: Option<&S>) -> String {
        state
            .and_then(|state| serde_json::to_string_pretty(state).ok())
            .unwrap_or_else(|| HexStateStringParser.render(bytes, state))
    }
}

/// A serialized state together with its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksummedState<S> {
    snapshot: StateSnapshot,
    checksum: u32,
    state: Option<S>,
}

impl<S> ChecksummedState<S> {
    /// The frame the state belongs to.
    #[must_use]
    pub fn frame(&self) -> Frame {
        self.snapshot.frame
    }

    /// The checksum of the serialized state.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// The serialized state.
    #[must_use]
    pub fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    /// The state object, if one was stored.
    #[must_use]
    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }
}

/// Compares states recorded for the same frame and reacts to mismatches.
pub struct DesyncDetector<S> {
    checksum_fn: ChecksumFn,
    parser: Box<dyn StateStringParser<S>>,
    handler: Option<Box<dyn DesyncHandler<S>>>,
    throw_on_desync: bool,
    log_state_on_desync: bool,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<S: 'static> DesyncDetector<S> {
    /// A detector with [`fletcher32`] checksums, hex rendering and no handler.
    #[must_use]
    pub fn new(config: &SyncTestConfig) -> Self {
        Self {
            checksum_fn: fletcher32,
            parser: Box::new(HexStateStringParser),
            handler: None,
            throw_on_desync: config.throw_on_desync,
            log_state_on_desync: config.log_state_on_desync,
            violation_observer: None,
        }
    }

    /// Uses `checksum_fn` instead of [`fletcher32`].
    #[must_use]
    pub fn with_checksum_fn(mut self, checksum_fn: ChecksumFn) -> Self {
        self.checksum_fn = checksum_fn;
        self
    }

    /// Renders states with `parser`.
    #[must_use]
    pub fn with_parser(mut self, parser: impl StateStringParser<S> + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Calls `handler` on every mismatch.
    #[must_use]
    pub fn with_handler(mut self, handler: impl DesyncHandler<S> + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Reports mismatches to `observer` instead of the tracing fallback.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Option<Arc<dyn ViolationObserver>>) -> Self {
        self.violation_observer = observer;
        self
    }

    pub(crate) fn set_parser(&mut self, parser: Box<dyn StateStringParser<S>>) {
        self.parser = parser;
    }

    pub(crate) fn set_handler(&mut self, handler: Option<Box<dyn DesyncHandler<S>>>) {
        self.handler = handler;
    }
}

impl<S> DesyncDetector<S> {
    /// Checksums `snapshot` and keeps it for later comparison.
    #[must_use]
    pub fn record(&self, snapshot: StateSnapshot, state: Option<S>) -> ChecksummedState<S> {
        ChecksummedState {
            checksum: (self.checksum_fn)(&snapshot.state),
            snapshot,
            state,
        }
    }

    /// The checksum this detector computes for `bytes`.
    #[must_use]
    pub fn checksum(&self, bytes: &[u8]) -> u32 {
        (self.checksum_fn)(bytes)
    }

    /// Compares the first recorded state of a frame with a later one.
    ///
    /// Returns `Ok(true)` if the checksums agree and `Ok(false)` for a mismatch that is only
    /// logged.
    ///
    /// # Errors
    ///
    /// - [`RampartError::ChecksumMismatch`] on a mismatch when `throw_on_desync` is set. The
    ///   handler has already run when this is returned.
    /// - [`RampartError::InvalidFrame`] if the two states belong to different frames.
    pub fn check(
        &mut self,
        previous: &ChecksummedState<S>,
        current: &ChecksummedState<S>,
    ) -> Result<bool, RampartError> {
        let frame = previous.frame();
        if current.frame() != frame {
            return Err(RampartError::InvalidFrame {
                frame: current.frame(),
                reason: format!("compared against a state recorded for frame {frame}"),
            });
        }
        if previous.checksum == current.checksum {
            return Ok(true);
        }

        let previous_text = self
            .parser
            .render(&previous.snapshot.state, previous.state.as_ref());
        let current_text = self
            .parser
            .render(&current.snapshot.state, current.state.as_ref());

        if let Some(handler) = self.handler.as_mut() {
            handler.handle(
                frame,
                &DesyncState {
                    text: &previous_text,
                    bytes: &previous.snapshot.state,
                    checksum: previous.checksum,
                    state: previous.state.as_ref(),
                },
                &DesyncState {
                    text: &current_text,
                    bytes: &current.snapshot.state,
                    checksum: current.checksum,
                    state: current.state.as_ref(),
                },
            );
        }

        let severity = if self.throw_on_desync {
            ViolationSeverity::Critical
        } else {
            ViolationSeverity::Error
        };
        let violation = SpecViolation::new(
            severity,
            ViolationKind::ChecksumMismatch,
            format!(
                "checksum mismatch at frame {}: previous={:#010x}, current={:#010x}",
                frame, previous.checksum, current.checksum
            ),
            concat!(file!(), ":", line!()),
        )
        .with_frame(frame)
        .with_context("previous", format!("{:#010x}", previous.checksum))
        .with_context("current", format!("{:#010x}", current.checksum));
        report_to_observer(self.violation_observer.as_ref(), &violation);

        if self.log_state_on_desync {
            error!(
                frame = frame.as_i32(),
                previous = %previous_text,
                current = %current_text,
                "state desync"
            );
        }

        if self.throw_on_desync {
            return Err(RampartError::ChecksumMismatch {
                frame,
                previous: previous.checksum,
                current: current.checksum,
            });
        }
        warn!(frame = frame.as_i32(), "continuing after desync");
        Ok(false)
    }
}

impl<S> fmt::Debug for DesyncDetector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesyncDetector")
            .field("has_handler", &self.handler.is_some())
            .field("throw_on_desync", &self.throw_on_desync)
            .field("log_state_on_desync", &self.log_state_on_desync)
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
    use parking_lot::Mutex;

    fn snapshot(frame: i32, bytes: &[u8]) -> StateSnapshot {
        StateSnapshot::new(Frame::new(frame), bytes.to_vec())
    }

    // ==========================================
    // Rendering
    // ==========================================

    #[test]
    fn hex_parser_breaks_lines_every_sixteen_bytes() {
        let bytes: Vec<u8> = (0..18).collect();
        let text = StateStringParser::<()>::render(&HexStateStringParser, &bytes, None);
        assert_eq!(
            text,
            "0000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f\n0010: 10 11"
        );
        assert_eq!(StateStringParser::<()>::render(&HexStateStringParser, &[], None), "");
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_parser_prefers_state_object() {
        #[derive(serde::Serialize)]
        struct Game {
            x: i32,
        }
        let text = JsonStateStringParser.render(&[1], Some(&Game { x: 4 }));
        assert!(text.contains("\"x\": 4"));
        assert_eq!(JsonStateStringParser.render(&[1], None::<&Game>), "0000: 01");
    }

    // ==========================================
    // Comparison
    // ==========================================

    #[test]
    fn equal_checksums_pass() {
        let mut detector = DesyncDetector::<()>::new(&SyncTestConfig::default());
        let a = detector.record(snapshot(1, &[9, 9]), None);
        let b = detector.record(snapshot(1, &[9, 9]), None);
        assert_eq!(a.checksum(), fletcher32(&[9, 9]));
        assert!(detector.check(&a, &b).unwrap());
    }

    #[test]
    fn mismatch_invokes_handler_once_before_error() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let mut detector = DesyncDetector::<u8>::new(&SyncTestConfig::default()).with_handler(
            move |frame: Frame, previous: &DesyncState<'_, u8>, current: &DesyncState<'_, u8>| {
                seen.lock().push((
                    frame,
                    previous.text().to_owned(),
                    current.checksum(),
                    current.state().copied(),
                ));
            },
        );
        let a = detector.record(snapshot(5, &[1]), Some(1));
        let b = detector.record(snapshot(5, &[2]), Some(2));

        let err = detector.check(&a, &b).unwrap_err();
        assert_eq!(
            err,
            RampartError::ChecksumMismatch {
                frame: Frame::new(5),
                previous: a.checksum(),
                current: b.checksum(),
            }
        );
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Frame::new(5));
        assert_eq!(calls[0].1, "0000: 01");
        assert_eq!(calls[0].2, b.checksum());
        assert_eq!(calls[0].3, Some(2));
    }

    #[test]
    fn mismatch_can_be_downgraded_to_a_log() {
        let observer = Arc::new(CollectingObserver::new());
        let config = SyncTestConfig::default().with_throw_on_desync(false);
        let mut detector = DesyncDetector::<()>::new(&config)
            .with_violation_observer(Some(observer.clone() as Arc<dyn ViolationObserver>));
        let a = detector.record(snapshot(2, &[1, 2]), None);
        let b = detector.record(snapshot(2, &[2, 1]), None);

        assert!(!detector.check(&a, &b).unwrap());
        let violations = observer.violations_of_kind(ViolationKind::ChecksumMismatch);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].frame, Some(Frame::new(2)));
        assert_eq!(violations[0].severity, ViolationSeverity::Error);
    }

    #[test]
    fn frames_must_match() {
        let mut detector = DesyncDetector::<()>::new(&SyncTestConfig::default());
        let a = detector.record(snapshot(1, &[1]), None);
        let b = detector.record(snapshot(2, &[1]), None);
        assert!(matches!(
            detector.check(&a, &b),
            Err(RampartError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn custom_checksum_fn_is_used() {
        let detector =
            DesyncDetector::<()>::new(&SyncTestConfig::default()).with_checksum_fn(|_| 7);
        assert_eq!(detector.record(snapshot(0, &[1, 2, 3]), None).checksum(), 7);
        assert_eq!(detector.checksum(&[]), 7);
    }

    #[test]
    fn reader_decodes_state_bytes() {
        let bytes = 0x0102_0304u32.to_be_bytes();
        let state = DesyncState::<()> {
            text: "",
            bytes: &bytes,
            checksum: 0,
            state: None,
        };
        let mut offset = 0;
        {
            let mut reader = state.reader(&mut offset, Endianness::Big);
            assert_eq!(reader.read_u32().unwrap(), 0x0102_0304);
        }
        assert_eq!(offset, 4);
    }
}

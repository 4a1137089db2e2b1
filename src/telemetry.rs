//! Structured reporting of broken invariants.
//!
//! Codec, protocol, recording and desync problems are reported as [`SpecViolation`] values
//! instead of bare log lines. A violation goes to a [`ViolationObserver`]; the default
//! [`TracingObserver`] logs it through `tracing` with structured fields, and tests swap in a
//! [`CollectingObserver`] to assert on what was reported.
//!
//! # Example
//!
//! ```
//! use rampart::telemetry::{CollectingObserver, ViolationKind, ViolationObserver};
//! use rampart::{report_violation_to, telemetry::ViolationSeverity};
//! use std::sync::Arc;
//!
//! let collector = Arc::new(CollectingObserver::new());
//! let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
//!
//! report_violation_to!(
//!     &observer,
//!     ViolationSeverity::Warning,
//!     ViolationKind::Protocol,
//!     "stale consistency reply for frame {}",
//!     12
//! );
//! assert!(collector.has_violation(ViolationKind::Protocol));
//! ```

use crate::Frame;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serializes `Option<Frame>` as an integer, or `null` for `None` and [`Frame::NULL`].
mod frame_serializer {
    use crate::Frame;
    use serde::Serializer;

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(frame: &Option<Frame>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match frame {
            Some(f) if !f.is_null() => serializer.serialize_i32(f.as_i32()),
            _ => serializer.serialize_none(),
        }
    }
}

/// How bad a violation is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but handled, e.g. a stale reply that was dropped.
    Warning,
    /// The operation failed or produced degraded results.
    Error,
    /// Simulation state can no longer be trusted (a desync).
    Critical,
}

impl ViolationSeverity {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subsystem a violation was raised in.
///
/// # Forward Compatibility
///
/// This enum is `#[non_exhaustive]`; include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Binary encoding or decoding failed (short buffer, truncated data, bad value).
    Codec,
    /// Frame or time arithmetic produced an invalid value, e.g. saving at [`Frame::NULL`].
    FrameTime,
    /// Connection status or message exchange went wrong: illegal transition, stale reply,
    /// negative round trip.
    Protocol,
    /// A recording listener failed to store or flush a confirmed-input record.
    InputRecording,
    /// A replay source was missing or malformed.
    Replay,
    /// Two checksums for the same frame disagree.
    ChecksumMismatch,
    /// A configuration value was rejected.
    Configuration,
    /// A library bug.
    InternalError,
}

impl ViolationKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Codec => "codec",
            Self::FrameTime => "frame_time",
            Self::Protocol => "protocol",
            Self::InputRecording => "input_recording",
            Self::Replay => "replay",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::Configuration => "configuration",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reported violation with its location and any structured context.
///
/// `frame` serializes as an integer, or `null` when absent or [`Frame::NULL`].
///
/// ```
/// use rampart::telemetry::{SpecViolation, ViolationKind, ViolationSeverity};
/// use rampart::Frame;
///
/// let violation = SpecViolation::new(
///     ViolationSeverity::Critical,
///     ViolationKind::ChecksumMismatch,
///     "checksum mismatch",
///     "desync.rs:10",
/// )
/// .with_frame(Frame::new(100))
/// .with_context("previous", "0x00000001");
///
/// let json = serde_json::to_string(&violation).unwrap();
/// assert!(json.contains(r#""kind":"checksum_mismatch""#));
/// assert!(json.contains(r#""frame":100"#));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct SpecViolation {
    /// Severity level.
    pub severity: ViolationSeverity,
    /// Subsystem.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub message: String,
    /// `file:line` where the violation was raised.
    pub location: &'static str,
    /// Frame the violation relates to, if any.
    #[serde(serialize_with = "frame_serializer::serialize")]
    pub frame: Option<Frame>,
    /// Extra key/value diagnostics.
    pub context: BTreeMap<String, String>,
}

impl SpecViolation {
    /// Creates a violation with no frame and no context.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            frame: None,
            context: BTreeMap::new(),
        }
    }

    /// Attaches the frame.
    #[must_use]
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Serializes to compact JSON. Returns `None` if serialization fails.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Serializes to indented JSON. Returns `None` if serialization fails.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json_pretty(&self) -> Option<String> {
        serde_json::to_string_pretty(self).ok()
    }
}

impl std::fmt::Display for SpecViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(frame) = self.frame {
            write!(f, ", frame={frame}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Receives reported violations.
///
/// Called inline from the code that detected the problem, so implementations should return
/// quickly.
#[cfg(feature = "sync-send")]
pub trait ViolationObserver: Send + Sync {
    /// Handles one violation.
    fn on_violation(&self, violation: &SpecViolation);
}

/// Receives reported violations.
///
/// Called inline from the code that detected the problem, so implementations should return
/// quickly.
#[cfg(not(feature = "sync-send"))]
pub trait ViolationObserver {
    /// Handles one violation.
    fn on_violation(&self, violation: &SpecViolation);
}

/// Default observer: logs through `tracing`.
///
/// `Warning` maps to `warn!`, `Error` and `Critical` to `error!`. The fields `severity`,
/// `kind`, `location`, `frame` and `context` are emitted as structured fields so JSON
/// formatters can pick them up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates the observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn format_frame(frame: Option<Frame>) -> String {
        match frame {
            Some(f) if !f.is_null() => f.as_i32().to_string(),
            _ => "null".to_owned(),
        }
    }

    fn format_context(context: &BTreeMap<String, String>) -> String {
        let pairs: Vec<String> = context.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{{{}}}", pairs.join(", "))
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        let frame = Self::format_frame(violation.frame);
        let context = Self::format_context(&violation.context);

        match violation.severity {
            ViolationSeverity::Warning => tracing::warn!(
                severity,
                kind,
                location,
                frame = %frame,
                context = %context,
                "{}",
                violation.message
            ),
            ViolationSeverity::Error | ViolationSeverity::Critical => tracing::error!(
                severity,
                kind,
                location,
                frame = %frame,
                context = %context,
                "{}",
                violation.message
            ),
        }
    }
}

/// Observer that keeps every violation in memory, for tests.
///
/// ```
/// use rampart::telemetry::{
///     CollectingObserver, SpecViolation, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
///
/// let observer = CollectingObserver::new();
/// observer.on_violation(&SpecViolation::new(
///     ViolationSeverity::Error,
///     ViolationKind::Replay,
///     "replay file missing",
///     "test.rs:1",
/// ));
/// assert_eq!(observer.len(), 1);
/// assert!(observer.has_violation(ViolationKind::Replay));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<SpecViolation>>,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything collected so far.
    #[must_use]
    pub fn violations(&self) -> Vec<SpecViolation> {
        self.violations.lock().clone()
    }

    /// Number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Returns `true` if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Returns `true` if a violation of `kind` was collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Returns `true` if a violation of exactly `severity` was collected.
    #[must_use]
    pub fn has_severity(&self, severity: ViolationSeverity) -> bool {
        self.violations
            .lock()
            .iter()
            .any(|v| v.severity == severity)
    }

    /// Violations of `kind`, in report order.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<SpecViolation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }

    /// Violations at or above `min_severity`, in report order.
    #[must_use]
    pub fn violations_at_severity(&self, min_severity: ViolationSeverity) -> Vec<SpecViolation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.severity >= min_severity)
            .cloned()
            .collect()
    }

    /// Drops everything collected so far.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Sends `violation` to `observer`, or to [`TracingObserver`] when there is none.
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &SpecViolation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Reports a violation through `tracing`, recording the call site.
///
/// ```
/// use rampart::{report_violation, telemetry::{ViolationKind, ViolationSeverity}};
///
/// report_violation!(
///     ViolationSeverity::Warning,
///     ViolationKind::FrameTime,
///     "frame {} is out of range",
///     -4
/// );
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Reports a violation to an `Option<Arc<dyn ViolationObserver>>`, falling back to
/// [`TracingObserver`] when it is `None`.
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
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

    fn violation(severity: ViolationSeverity, kind: ViolationKind) -> SpecViolation {
        SpecViolation::new(severity, kind, "test", "test.rs:1")
    }

    #[test]
    fn test_violation_severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn test_violation_kind_as_str() {
        assert_eq!(ViolationKind::Codec.as_str(), "codec");
        assert_eq!(ViolationKind::FrameTime.as_str(), "frame_time");
        assert_eq!(ViolationKind::Protocol.as_str(), "protocol");
        assert_eq!(ViolationKind::InputRecording.as_str(), "input_recording");
        assert_eq!(ViolationKind::Replay.as_str(), "replay");
        assert_eq!(
            ViolationKind::ChecksumMismatch.as_str(),
            "checksum_mismatch"
        );
        assert_eq!(ViolationKind::Configuration.as_str(), "configuration");
        assert_eq!(ViolationKind::InternalError.as_str(), "internal_error");
    }

    #[test]
    fn test_spec_violation_builder_and_display() {
        let v = SpecViolation::new(
            ViolationSeverity::Error,
            ViolationKind::Replay,
            "stride mismatch",
            "test.rs:42",
        )
        .with_frame(Frame::new(50))
        .with_context("length", "7");

        assert_eq!(v.frame, Some(Frame::new(50)));
        assert_eq!(v.context.get("length").map(String::as_str), Some("7"));
        let display = v.to_string();
        assert!(display.contains("error"));
        assert!(display.contains("replay"));
        assert!(display.contains("stride mismatch"));
        assert!(display.contains("frame=50"));
        assert!(display.contains("test.rs:42"));
    }

    // ==========================================
    // Observers
    // ==========================================

    #[test]
    fn test_collecting_observer_filters() {
        let observer = CollectingObserver::new();
        assert!(observer.is_empty());

        observer.on_violation(&violation(ViolationSeverity::Warning, ViolationKind::Protocol));
        observer.on_violation(&violation(ViolationSeverity::Error, ViolationKind::Codec));
        observer.on_violation(&violation(
            ViolationSeverity::Critical,
            ViolationKind::ChecksumMismatch,
        ));

        assert_eq!(observer.len(), 3);
        assert!(observer.has_violation(ViolationKind::Codec));
        assert!(!observer.has_violation(ViolationKind::Replay));
        assert!(observer.has_severity(ViolationSeverity::Critical));
        assert_eq!(observer.violations_of_kind(ViolationKind::Protocol).len(), 1);
        assert_eq!(
            observer
                .violations_at_severity(ViolationSeverity::Error)
                .len(),
            2
        );

        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn test_collecting_observer_concurrent_writes() {
        let observer = Arc::new(CollectingObserver::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let observer = observer.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        observer.on_violation(&violation(
                            ViolationSeverity::Warning,
                            ViolationKind::InputRecording,
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread should not panic");
        }
        assert_eq!(observer.len(), 400);
    }

    // ==========================================
    // Macros
    // ==========================================

    #[test]
    fn test_report_violation_macro_forms() {
        report_violation!(
            ViolationSeverity::Warning,
            ViolationKind::FrameTime,
            "plain"
        );
        report_violation!(
            ViolationSeverity::Error,
            ViolationKind::Codec,
            "needed {} bytes",
            8
        );
    }

    #[test]
    fn test_report_violation_to_observer_and_fallback() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::Protocol,
            "reply for frame {} is stale",
            3
        );
        assert!(collector.has_violation(ViolationKind::Protocol));
        assert_eq!(
            collector.violations()[0].message,
            "reply for frame 3 is stale"
        );

        let none: Option<Arc<dyn ViolationObserver>> = None;
        report_violation_to!(
            &none,
            ViolationSeverity::Warning,
            ViolationKind::Protocol,
            "logged only"
        );
    }

    #[test]
    fn test_tracing_observer_format_helpers() {
        assert_eq!(TracingObserver::format_frame(None), "null");
        assert_eq!(TracingObserver::format_frame(Some(Frame::NULL)), "null");
        assert_eq!(TracingObserver::format_frame(Some(Frame::new(9))), "9");
        let mut context = BTreeMap::new();
        assert_eq!(TracingObserver::format_context(&context), "{}");
        context.insert("a".to_owned(), "1".to_owned());
        context.insert("b".to_owned(), "2".to_owned());
        assert_eq!(TracingObserver::format_context(&context), "{a=1, b=2}");
    }

    // ==========================================
    // JSON
    // ==========================================

    #[test]
    fn test_spec_violation_json_null_frame() {
        let v = violation(ViolationSeverity::Warning, ViolationKind::Codec).with_frame(Frame::NULL);
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains(r#""frame":null"#));
        assert!(json.contains(r#""severity":"warning""#));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["location"], "test.rs:1");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_to_json_helpers() {
        let v = violation(ViolationSeverity::Critical, ViolationKind::ChecksumMismatch)
            .with_frame(Frame::new(4));
        assert!(v.to_json().unwrap().contains(r#""frame":4"#));
        assert!(v.to_json_pretty().unwrap().contains('\n'));
    }
}

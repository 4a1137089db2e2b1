use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::RampartError;
use crate::input::{compression, ConfirmedInputs, InputContext};
use crate::report_violation;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{Frame, MaybeSendSync};

/// Receives every confirmed frame of a session, in frame order.
///
/// Sessions call [`on_session_start`](Self::on_session_start) once before the first frame,
/// [`on_confirmed`](Self::on_confirmed) for each confirmed frame with strictly increasing frame
/// numbers, and [`on_session_close`](Self::on_session_close) once at the end. Calls come from a
/// single thread; listeners do no locking of their own.
pub trait InputListener<I: Copy + Default>: MaybeSendSync {
    /// Prepares storage for a new session.
    fn on_session_start(&mut self, context: &InputContext<I>) -> Result<(), RampartError> {
        let _ = context;
        Ok(())
    }

    /// Handles the confirmed inputs of `frame`.
    fn on_confirmed(&mut self, frame: Frame, inputs: &ConfirmedInputs<I>) -> Result<(), RampartError>;

    /// Flushes and finalizes storage.
    fn on_session_close(&mut self) -> Result<(), RampartError> {
        Ok(())
    }
}

/// An ordered list of listeners that all receive every call.
///
/// Each call goes to every listener in insertion order, even if an earlier one fails. The first
/// error is returned and later ones are reported as violations.
pub struct ListenerChain<I: Copy + Default> {
    listeners: Vec<Box<dyn InputListener<I>>>,
}

impl<I: Copy + Default + 'static> ListenerChain<I> {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Appends a listener.
    pub fn push(&mut self, listener: impl InputListener<I> + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Appends an already boxed listener.
    pub fn push_boxed(&mut self, listener: Box<dyn InputListener<I>>) {
        self.listeners.push(listener);
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns `true` if the chain has no listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn for_each(
        &mut self,
        stage: &str,
        mut call: impl FnMut(&mut dyn InputListener<I>) -> Result<(), RampartError>,
    ) -> Result<(), RampartError> {
        let mut first_error = None;
        for (index, listener) in self.listeners.iter_mut().enumerate() {
            if let Err(err) = call(listener.as_mut()) {
                if first_error.is_none() {
                    first_error = Some(err);
                } else {
                    report_violation!(
                        ViolationSeverity::Error,
                        ViolationKind::InputRecording,
                        "listener {} failed during {}: {}",
                        index,
                        stage,
                        err
                    );
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<I: Copy + Default + 'static> Default for ListenerChain<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Copy + Default + 'static> InputListener<I> for ListenerChain<I> {
    fn on_session_start(&mut self, context: &InputContext<I>) -> Result<(), RampartError> {
        self.for_each("session start", |listener| listener.on_session_start(context))
    }

    fn on_confirmed(&mut self, frame: Frame, inputs: &ConfirmedInputs<I>) -> Result<(), RampartError> {
        self.for_each("confirmed frame", |listener| listener.on_confirmed(frame, inputs))
    }

    fn on_session_close(&mut self) -> Result<(), RampartError> {
        self.for_each("session close", |listener| listener.on_session_close())
    }
}

impl<I: Copy + Default> std::fmt::Debug for ListenerChain<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerChain")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

struct MemoryRecording<I: Copy + Default> {
    inputs: Vec<ConfirmedInputs<I>>,
    context: Option<InputContext<I>>,
}

/// Keeps every confirmed frame in memory.
///
/// Clones share the same recording, so keep one handle and give the other to the session.
///
/// ```
/// use rampart::input::{InputContext, InputListener, MemoryInputListener};
/// use rampart::serialization::IntegerSerializer;
/// use rampart::{ConfirmedInputs, Endianness, Frame};
///
/// let context = InputContext::new(IntegerSerializer::<u8>::new(), 2, Endianness::Big)?;
/// let recording = MemoryInputListener::new();
/// let mut listener = recording.clone();
///
/// listener.on_session_start(&context)?;
/// listener.on_confirmed(Frame::new(0), &ConfirmedInputs::from_slice(&[1, 2]))?;
/// assert_eq!(recording.len(), 1);
/// assert!(!recording.compressed_inputs()?.is_empty());
/// # Ok::<(), rampart::RampartError>(())
/// ```
pub struct MemoryInputListener<I: Copy + Default> {
    recording: Arc<Mutex<MemoryRecording<I>>>,
}

impl<I: Copy + Default> MemoryInputListener<I> {
    /// An empty recording.
    #[must_use]
    pub fn new() -> Self {
        Self {
            recording: Arc::new(Mutex::new(MemoryRecording {
                inputs: Vec::with_capacity(5 * 1024),
                context: None,
            })),
        }
    }

    /// A copy of every recorded frame, in order.
    #[must_use]
    pub fn inputs(&self) -> Vec<ConfirmedInputs<I>> {
        self.recording.lock().inputs.clone()
    }

    /// Iterates over a copy of the recorded frames.
    pub fn iter(&self) -> std::vec::IntoIter<ConfirmedInputs<I>> {
        self.inputs().into_iter()
    }

    /// Number of recorded frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recording.lock().inputs.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recording.lock().inputs.is_empty()
    }

    /// Drops every recorded frame.
    pub fn clear(&self) {
        self.recording.lock().inputs.clear();
    }

    /// Encodes every recorded frame at the record stride and deflates the result.
    ///
    /// The recording itself is left as it is. Before a session has started there is no context
    /// to encode with, and the result is empty.
    pub fn compressed_inputs(&self) -> Result<Vec<u8>, RampartError> {
        let recording = self.recording.lock();
        let Some(context) = recording.context.as_ref() else {
            return Ok(Vec::new());
        };
        let mut records = Vec::with_capacity(context.confirmed_input_size() * recording.inputs.len());
        for inputs in &recording.inputs {
            context.write_record(&mut records, inputs)?;
        }
        compression::compress(&records)
    }
}

impl<I: Copy + Default> Default for MemoryInputListener<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Copy + Default> Clone for MemoryInputListener<I> {
    fn clone(&self) -> Self {
        Self {
            recording: Arc::clone(&self.recording),
        }
    }
}

impl<I: Copy + Default> std::fmt::Debug for MemoryInputListener<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryInputListener")
            .field("frames", &self.len())
            .finish()
    }
}

impl<I> InputListener<I> for MemoryInputListener<I>
where
    I: Copy + Default + 'static,
    MemoryInputListener<I>: MaybeSendSync,
{
    fn on_session_start(&mut self, context: &InputContext<I>) -> Result<(), RampartError> {
        let mut recording = self.recording.lock();
        recording.inputs.clear();
        recording.context = Some(context.clone());
        Ok(())
    }

    fn on_confirmed(&mut self, _frame: Frame, inputs: &ConfirmedInputs<I>) -> Result<(), RampartError> {
        self.recording.lock().inputs.push(inputs.clone());
        Ok(())
    }
}

/// Writes every confirmed frame to a file as a fixed-stride record.
///
/// Uncompressed recordings are written frame by frame, so this does blocking I/O on the
/// session thread. Compressed recordings are kept in memory and deflated into the file when the
/// session closes.
#[derive(Debug)]
pub struct FileInputListener<I: Copy + Default> {
    path: PathBuf,
    compressed: bool,
    context: Option<InputContext<I>>,
    file: Option<BufWriter<File>>,
    pending: Vec<u8>,
    record: Vec<u8>,
    last_frame: Frame,
}

impl<I: Copy + Default> FileInputListener<I> {
    /// Records to `path` without compression.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            compressed: false,
            context: None,
            file: None,
            pending: Vec::new(),
            record: Vec::new(),
            last_frame: Frame::NULL,
        }
    }

    /// Records to `path` as a deflate stream written on close.
    #[must_use]
    pub fn compressed(path: impl AsRef<Path>) -> Self {
        Self {
            compressed: true,
            ..Self::new(path)
        }
    }

    /// The file being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_out(&mut self, bytes: &[u8]) -> Result<(), RampartError> {
        let file = self.file.as_mut().ok_or_else(|| RampartError::InvalidRequest {
            info: "confirmed inputs arrived before the session started".to_owned(),
        })?;
        file.write_all(bytes)
            .map_err(|err| RampartError::io("writing input record", &err))
    }
}

impl<I> InputListener<I> for FileInputListener<I>
where
    I: Copy + Default + 'static,
    FileInputListener<I>: MaybeSendSync,
{
    fn on_session_start(&mut self, context: &InputContext<I>) -> Result<(), RampartError> {
        let file = File::create(&self.path).map_err(|err| {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::InputRecording,
                "cannot create recording {}: {}",
                self.path.display(),
                err
            );
            RampartError::io("creating input recording", &err)
        })?;
        debug!(path = %self.path.display(), compressed = self.compressed, "recording inputs");
        self.file = Some(BufWriter::new(file));
        self.record = Vec::with_capacity(context.confirmed_input_size());
        self.pending.clear();
        self.last_frame = Frame::NULL;
        self.context = Some(context.clone());
        Ok(())
    }

    fn on_confirmed(&mut self, frame: Frame, inputs: &ConfirmedInputs<I>) -> Result<(), RampartError> {
        if frame <= self.last_frame {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::InputRecording,
                "confirmed frame {} arrived after frame {}",
                frame,
                self.last_frame
            );
        }
        self.last_frame = frame;

        let context = self.context.as_ref().ok_or_else(|| RampartError::InvalidRequest {
            info: "confirmed inputs arrived before the session started".to_owned(),
        })?;
        if self.compressed {
            return context.write_record(&mut self.pending, inputs);
        }

        let mut record = std::mem::take(&mut self.record);
        record.clear();
        let written = context.write_record(&mut record, inputs);
        let result = written.and_then(|()| self.write_out(&record));
        self.record = record;
        trace!(frame = frame.as_i32(), "recorded confirmed inputs");
        result
    }

    fn on_session_close(&mut self) -> Result<(), RampartError> {
        if self.file.is_none() {
            // never started, or already closed
            return Ok(());
        }
        if self.compressed {
            let compressed = compression::compress(&self.pending)?;
            self.write_out(&compressed)?;
            self.pending.clear();
        }
        if let Some(mut file) = self.file.take() {
            file.flush()
                .map_err(|err| RampartError::io("flushing input recording", &err))?;
        }
        debug!(path = %self.path.display(), "input recording closed");
        Ok(())
    }
}

/// Forwards every confirmed frame to a closure.
pub struct ClosureInputListener<F> {
    callback: F,
}

impl<F> ClosureInputListener<F> {
    /// Wraps `callback`.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> std::fmt::Debug for ClosureInputListener<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureInputListener").finish_non_exhaustive()
    }
}

impl<I, F> InputListener<I> for ClosureInputListener<F>
where
    I: Copy + Default,
    F: FnMut(Frame, &ConfirmedInputs<I>) + MaybeSendSync,
{
    fn on_confirmed(&mut self, frame: Frame, inputs: &ConfirmedInputs<I>) -> Result<(), RampartError> {
        (self.callback)(frame, inputs);
        Ok(())
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
    use crate::serialization::{Endianness, IntegerSerializer};

    fn context() -> InputContext<u16> {
        InputContext::new(IntegerSerializer::<u16>::new(), 2, Endianness::Big).unwrap()
    }

    struct Failing;

    impl InputListener<u16> for Failing {
        fn on_confirmed(&mut self, frame: Frame, _: &ConfirmedInputs<u16>) -> Result<(), RampartError> {
            Err(RampartError::InvalidFrame {
                frame,
                reason: "test".to_owned(),
            })
        }
    }

    // ==========================================
    // ListenerChain
    // ==========================================

    #[test]
    fn chain_preserves_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ListenerChain::<u16>::new();
        for id in 0..3 {
            let order = Arc::clone(&order);
            chain.push(ClosureInputListener::new(move |frame: Frame, _: &ConfirmedInputs<u16>| {
                order.lock().push((frame.as_i32(), id));
            }));
        }
        assert_eq!(chain.len(), 3);
        chain.on_confirmed(Frame::new(0), &ConfirmedInputs::new(2)).unwrap();
        chain.on_confirmed(Frame::new(1), &ConfirmedInputs::new(2)).unwrap();
        assert_eq!(
            *order.lock(),
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]
        );
    }

    #[test]
    fn chain_keeps_going_after_failure() {
        let memory = MemoryInputListener::new();
        let mut chain = ListenerChain::<u16>::new();
        chain.push(Failing);
        chain.push(memory.clone());
        chain.on_session_start(&context()).unwrap();
        let result = chain.on_confirmed(Frame::new(4), &ConfirmedInputs::new(2));
        assert!(matches!(result, Err(RampartError::InvalidFrame { .. })));
        assert_eq!(memory.len(), 1);
    }

    // ==========================================
    // MemoryInputListener
    // ==========================================

    #[test]
    fn memory_listener_restarts_on_session_start() {
        let memory = MemoryInputListener::new();
        let mut listener = memory.clone();
        listener.on_session_start(&context()).unwrap();
        listener.on_confirmed(Frame::new(0), &ConfirmedInputs::from_slice(&[1, 2])).unwrap();
        listener.on_session_start(&context()).unwrap();
        assert!(memory.is_empty());
    }

    #[test]
    fn compressed_snapshot_leaves_recording() {
        let memory = MemoryInputListener::new();
        assert!(memory.compressed_inputs().unwrap().is_empty());

        let mut listener = memory.clone();
        let ctx = context();
        listener.on_session_start(&ctx).unwrap();
        for frame in 0..10 {
            listener
                .on_confirmed(Frame::new(frame), &ConfirmedInputs::from_slice(&[frame as u16, 0]))
                .unwrap();
        }
        let compressed = memory.compressed_inputs().unwrap();
        assert_eq!(memory.len(), 10);

        let records = compression::decompress(&compressed).unwrap();
        assert_eq!(records.len(), 10 * ctx.confirmed_input_size());
        assert_eq!(ctx.read_records(&records).unwrap(), memory.inputs());
        assert_eq!(memory.iter().count(), 10);

        memory.clear();
        assert!(memory.is_empty());
    }

    // ==========================================
    // FileInputListener
    // ==========================================

    #[test]
    fn file_listener_requires_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unused.bin");
        let mut listener = FileInputListener::<u16>::new(&path);
        let result = listener.on_confirmed(Frame::new(0), &ConfirmedInputs::new(2));
        assert!(matches!(result, Err(RampartError::InvalidRequest { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn closing_an_unstarted_listener_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        for mut listener in [
            FileInputListener::<u16>::new(dir.path().join("raw.bin")),
            FileInputListener::<u16>::compressed(dir.path().join("deflated.bin")),
        ] {
            listener.on_session_close().unwrap();
            assert!(!listener.path().exists());
        }
    }

    #[test]
    fn closing_twice_keeps_the_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.bin");
        let mut listener = FileInputListener::compressed(&path);
        listener.on_session_start(&context()).unwrap();
        listener.on_confirmed(Frame::new(0), &ConfirmedInputs::from_slice(&[1, 2])).unwrap();
        listener.on_session_close().unwrap();
        let written = std::fs::read(&path).unwrap();
        listener.on_session_close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), written);
        assert_eq!(
            compression::decompress(&written).unwrap(),
            vec![0, 1, 0, 2]
        );
    }

    #[test]
    fn file_listener_writes_fixed_stride() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listener.bin");
        let mut listener = FileInputListener::new(&path);
        let ctx = context();
        listener.on_session_start(&ctx).unwrap();
        listener.on_confirmed(Frame::new(0), &ConfirmedInputs::from_slice(&[0x0102, 0x0304])).unwrap();
        listener.on_confirmed(Frame::new(1), &ConfirmedInputs::from_slice(&[0x0506])).unwrap();
        listener.on_session_close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6, 0, 0]);
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::RampartError;
use crate::input::{compression, ConfirmedInputs, InputContext};
use crate::report_violation;
use crate::sessions::config::ReplayConfig;
use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::MaybeSendSync;

/// Supplies the confirmed inputs of a recorded session, in frame order.
///
/// Replay sources never change once opened, so implementations decode on the first call and
/// hand out the cached result afterwards.
pub trait InputProvider<I: Copy + Default>: MaybeSendSync {
    /// Every recorded frame, decoded with `context`.
    ///
    /// Fails with [`RampartError::InvalidReplaySource`] if the source is missing or malformed.
    fn inputs(&mut self, context: &InputContext<I>) -> Result<Arc<[ConfirmedInputs<I>]>, RampartError>;
}

/// Replays inputs that are already in memory.
#[derive(Debug, Clone)]
pub struct MemoryInputProvider<I: Copy + Default> {
    inputs: Arc<[ConfirmedInputs<I>]>,
}

impl<I: Copy + Default> MemoryInputProvider<I> {
    /// Replays `inputs` in order.
    pub fn new(inputs: impl IntoIterator<Item = ConfirmedInputs<I>>) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
        }
    }
}

impl<I> InputProvider<I> for MemoryInputProvider<I>
where
    I: Copy + Default,
    MemoryInputProvider<I>: MaybeSendSync,
{
    fn inputs(&mut self, _context: &InputContext<I>) -> Result<Arc<[ConfirmedInputs<I>]>, RampartError> {
        Ok(Arc::clone(&self.inputs))
    }
}

fn decode_recording<I: Copy + Default>(
    context: &InputContext<I>,
    bytes: &[u8],
    compressed: bool,
) -> Result<Arc<[ConfirmedInputs<I>]>, RampartError> {
    let records = if compressed {
        compression::decompress(bytes)?
    } else {
        bytes.to_vec()
    };
    let inputs = context.read_records(&records).inspect_err(|err| {
        report_violation!(
            ViolationSeverity::Error,
            ViolationKind::Replay,
            "replay source rejected: {}",
            err
        );
    })?;
    debug!(frames = inputs.len(), compressed, "decoded replay");
    Ok(inputs.into())
}

/// Replays a buffer of fixed-stride records, optionally deflated.
#[derive(Debug, Clone)]
pub struct BinaryInputProvider<I: Copy + Default> {
    bytes: Vec<u8>,
    compressed: bool,
    cache: Option<Arc<[ConfirmedInputs<I>]>>,
}

impl<I: Copy + Default> BinaryInputProvider<I> {
    /// Replays raw records.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            compressed: false,
            cache: None,
        }
    }

    /// Replays a deflate stream of records.
    #[must_use]
    pub fn compressed(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            compressed: true,
            ..Self::new(bytes)
        }
    }

    /// Replays `bytes` encoded as `config` describes.
    #[must_use]
    pub fn with_config(bytes: impl Into<Vec<u8>>, config: &ReplayConfig) -> Self {
        Self {
            compressed: config.compressed,
            ..Self::new(bytes)
        }
    }
}

impl<I> InputProvider<I> for BinaryInputProvider<I>
where
    I: Copy + Default,
    BinaryInputProvider<I>: MaybeSendSync,
{
    fn inputs(&mut self, context: &InputContext<I>) -> Result<Arc<[ConfirmedInputs<I>]>, RampartError> {
        if let Some(cached) = &self.cache {
            return Ok(Arc::clone(cached));
        }
        let decoded = decode_recording(context, &self.bytes, self.compressed)?;
        self.cache = Some(Arc::clone(&decoded));
        Ok(decoded)
    }
}

/// Replays a recording file written by [`FileInputListener`](super::FileInputListener).
#[derive(Debug, Clone)]
pub struct FileInputProvider<I: Copy + Default> {
    path: PathBuf,
    compressed: bool,
    cache: Option<Arc<[ConfirmedInputs<I>]>>,
}

impl<I: Copy + Default> FileInputProvider<I> {
    /// Replays an uncompressed recording.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            compressed: false,
            cache: None,
        }
    }

    /// Replays a compressed recording.
    #[must_use]
    pub fn compressed(path: impl AsRef<Path>) -> Self {
        Self {
            compressed: true,
            ..Self::new(path)
        }
    }

    /// Replays `path` encoded as `config` describes.
    #[must_use]
    pub fn with_config(path: impl AsRef<Path>, config: &ReplayConfig) -> Self {
        Self {
            compressed: config.compressed,
            ..Self::new(path)
        }
    }

    /// The recording being replayed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<I> InputProvider<I> for FileInputProvider<I>
where
    I: Copy + Default,
    FileInputProvider<I>: MaybeSendSync,
{
    fn inputs(&mut self, context: &InputContext<I>) -> Result<Arc<[ConfirmedInputs<I>]>, RampartError> {
        if let Some(cached) = &self.cache {
            return Ok(Arc::clone(cached));
        }
        let bytes = std::fs::read(&self.path).map_err(|err| {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Replay,
                "cannot read replay {}: {}",
                self.path.display(),
                err
            );
            RampartError::InvalidReplaySource {
                reason: format!("cannot read {}: {err}", self.path.display()),
            }
        })?;
        let decoded = decode_recording(context, &bytes, self.compressed)?;
        self.cache = Some(Arc::clone(&decoded));
        Ok(decoded)
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

    fn context() -> InputContext<u8> {
        InputContext::new(IntegerSerializer::<u8>::new(), 2, Endianness::Little).unwrap()
    }

    #[test]
    fn memory_provider_replays_in_order() {
        let inputs = vec![
            ConfirmedInputs::from_slice(&[1, 2]),
            ConfirmedInputs::from_slice(&[3, 4]),
        ];
        let mut provider = MemoryInputProvider::new(inputs.clone());
        assert_eq!(&*provider.inputs(&context()).unwrap(), inputs.as_slice());
    }

    #[test]
    fn binary_provider_raw_and_compressed() {
        let raw = vec![1u8, 2, 3, 4];
        let mut provider = BinaryInputProvider::new(raw.clone());
        let decoded = provider.inputs(&context()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].as_slice(), &[3, 4]);

        let mut compressed = BinaryInputProvider::compressed(compression::compress(&raw).unwrap());
        assert_eq!(compressed.inputs(&context()).unwrap(), decoded);

        let mut configured =
            BinaryInputProvider::with_config(raw, &ReplayConfig { compressed: false });
        assert_eq!(configured.inputs(&context()).unwrap(), decoded);
    }

    #[test]
    fn binary_provider_memoizes() {
        let mut provider = BinaryInputProvider::new(vec![1u8, 2]);
        let first = provider.inputs(&context()).unwrap();
        let second = provider.inputs(&context()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn partial_record_is_invalid() {
        let mut provider = BinaryInputProvider::new(vec![1u8, 2, 3]);
        assert!(matches!(
            provider.inputs(&context()),
            Err(RampartError::InvalidReplaySource { .. })
        ));
    }

    #[test]
    fn missing_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = FileInputProvider::new(dir.path().join("does-not-exist.replay"));
        assert!(matches!(
            provider.inputs(&context()),
            Err(RampartError::InvalidReplaySource { .. })
        ));
    }
}

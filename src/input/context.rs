use std::fmt;
use std::sync::Arc;

use crate::error::RampartError;
use crate::input::ConfirmedInputs;
use crate::serialization::{
    BinaryBufferWriter, BinaryReader, BinarySerializer, BinarySpanWriter, Endianness,
};
use crate::MAX_PLAYERS;

/// Binds a game's input type to its wire layout for one session.
///
/// The context knows the serializer for a single player's input, the number of players and the
/// session byte order, and from those the fixed size of a confirmed-inputs record
/// ([`confirmed_input_size`](Self::confirmed_input_size)). Every listener and provider uses
/// that size as its record stride.
///
/// A context never changes after construction. Cloning it is cheap and shares the serializer.
///
/// ```
/// use rampart::input::InputContext;
/// use rampart::serialization::IntegerSerializer;
/// use rampart::{ConfirmedInputs, Endianness};
///
/// let context = InputContext::new(IntegerSerializer::<u16>::new(), 2, Endianness::Big)?;
/// assert_eq!(context.player_input_size(), 2);
/// assert_eq!(context.confirmed_input_size(), 4);
///
/// let mut record = Vec::new();
/// context.write_confirmed(&mut record, &ConfirmedInputs::from_slice(&[0x0102, 0x0304]))?;
/// assert_eq!(record, vec![1, 2, 3, 4]);
/// # Ok::<(), rampart::RampartError>(())
/// ```
pub struct InputContext<I> {
    serializer: Arc<dyn BinarySerializer<I>>,
    player_input_size: usize,
    num_players: usize,
    endianness: Endianness,
}

impl<I: Copy + Default> InputContext<I> {
    /// Creates a context for `num_players` players (1 to [`MAX_PLAYERS`]).
    pub fn new<S>(serializer: S, num_players: usize, endianness: Endianness) -> Result<Self, RampartError>
    where
        S: BinarySerializer<I> + 'static,
    {
        Self::from_shared(Arc::new(serializer), num_players, endianness)
    }

    /// Like [`new`](Self::new), sharing an existing serializer.
    pub fn from_shared(
        serializer: Arc<dyn BinarySerializer<I>>,
        num_players: usize,
        endianness: Endianness,
    ) -> Result<Self, RampartError> {
        if num_players == 0 || num_players > MAX_PLAYERS {
            return Err(RampartError::InvalidRequest {
                info: format!("number of players must be between 1 and {MAX_PLAYERS}, got {num_players}"),
            });
        }
        let player_input_size = serializer.size();
        if player_input_size == 0 {
            return Err(RampartError::InvalidRequest {
                info: "input serializer reports an encoded size of zero".to_owned(),
            });
        }
        Ok(Self {
            serializer,
            player_input_size,
            num_players,
            endianness,
        })
    }

    /// Encoded size of one player's input.
    #[must_use]
    pub fn player_input_size(&self) -> usize {
        self.player_input_size
    }

    /// Encoded size of one confirmed-inputs record: the stride of every recording.
    #[must_use]
    pub fn confirmed_input_size(&self) -> usize {
        self.player_input_size * self.num_players
    }

    /// Number of players in the session.
    #[must_use]
    pub fn num_players(&self) -> usize {
        self.num_players
    }

    /// Byte order of the session.
    #[must_use]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The single-input serializer.
    #[must_use]
    pub fn serializer(&self) -> &dyn BinarySerializer<I> {
        self.serializer.as_ref()
    }

    /// Appends one player's input to `buffer`, returning the bytes written.
    pub fn write_input(&self, buffer: &mut Vec<u8>, input: &I) -> Result<usize, RampartError> {
        let start = buffer.len();
        buffer.resize(start + self.player_input_size, 0);
        let written = self.write_input_into(&mut buffer[start..], input);
        match written {
            Ok(written) => {
                buffer.truncate(start + written);
                Ok(written)
            }
            Err(err) => {
                buffer.truncate(start);
                Err(err)
            }
        }
    }

    /// Writes one player's input at the start of `dst`, returning the bytes written.
    pub fn write_input_into(&self, dst: &mut [u8], input: &I) -> Result<usize, RampartError> {
        Ok(self.serializer.serialize(input, self.endianness, dst)?)
    }

    /// Appends every input of `inputs` to `buffer`, returning the bytes written.
    ///
    /// Fails if `inputs` has more slots than the session has players. Fewer slots are written as
    /// they are; [`write_record`](Self::write_record) pads them to the full stride.
    pub fn write_confirmed(
        &self,
        buffer: &mut Vec<u8>,
        inputs: &ConfirmedInputs<I>,
    ) -> Result<usize, RampartError> {
        self.check_player_count(inputs)?;
        let start = buffer.len();
        buffer.resize(start + self.confirmed_input_size(), 0);
        match self.write_confirmed_into(&mut buffer[start..], inputs) {
            Ok(written) => {
                buffer.truncate(start + written);
                Ok(written)
            }
            Err(err) => {
                buffer.truncate(start);
                Err(err)
            }
        }
    }

    /// Writes every input of `inputs` at the start of `dst`, returning the bytes written.
    pub fn write_confirmed_into(
        &self,
        dst: &mut [u8],
        inputs: &ConfirmedInputs<I>,
    ) -> Result<usize, RampartError> {
        self.check_player_count(inputs)?;
        let mut offset = 0;
        for input in inputs {
            let tail = dst.get_mut(offset..).unwrap_or_default();
            offset += self.write_input_into(tail, input)?;
        }
        Ok(offset)
    }

    /// Appends `inputs` to `buffer` as one full-stride record, zero-padding unused bytes.
    pub fn write_record(
        &self,
        buffer: &mut Vec<u8>,
        inputs: &ConfirmedInputs<I>,
    ) -> Result<(), RampartError> {
        let written = self.write_confirmed(buffer, inputs)?;
        let padding = self.confirmed_input_size() - written;
        buffer.resize(buffer.len() + padding, 0);
        Ok(())
    }

    /// Reads one player's input from the start of `src` into `input`, returning the bytes read.
    pub fn read_input(&self, src: &[u8], input: &mut I) -> Result<usize, RampartError> {
        Ok(self.serializer.deserialize(src, self.endianness, input)?)
    }

    /// Reads one input per player from the start of `src`, returning the bytes read.
    ///
    /// `inputs` is resized to the session's player count.
    pub fn read_confirmed(
        &self,
        src: &[u8],
        inputs: &mut ConfirmedInputs<I>,
    ) -> Result<usize, RampartError> {
        if inputs.len() != self.num_players {
            *inputs = ConfirmedInputs::new(self.num_players);
        }
        let mut offset = 0;
        for player in 0..self.num_players {
            let tail = src.get(offset..).unwrap_or_default();
            if let Some(slot) = inputs.get_mut(player.into()) {
                offset += self.read_input(tail, slot)?;
            }
        }
        Ok(offset)
    }

    /// Decodes a buffer of back-to-back records.
    ///
    /// Fails with [`RampartError::InvalidReplaySource`] if the length is not a multiple of the
    /// record stride or a record does not decode.
    pub fn read_records(&self, bytes: &[u8]) -> Result<Vec<ConfirmedInputs<I>>, RampartError> {
        let stride = self.confirmed_input_size();
        if bytes.len() % stride != 0 {
            return Err(RampartError::InvalidReplaySource {
                reason: format!(
                    "{} bytes is not a whole number of {stride}-byte records",
                    bytes.len()
                ),
            });
        }
        bytes
            .chunks_exact(stride)
            .enumerate()
            .map(|(index, record)| {
                let mut inputs = ConfirmedInputs::new(self.num_players);
                self.read_confirmed(record, &mut inputs)
                    .map_err(|err| RampartError::InvalidReplaySource {
                        reason: format!("record {index}: {err}"),
                    })?;
                Ok(inputs)
            })
            .collect()
    }

    /// A writer over `buffer` starting at `offset`, in the session byte order.
    pub fn span_writer<'a>(&self, buffer: &'a mut [u8], offset: &'a mut usize) -> BinarySpanWriter<'a> {
        BinarySpanWriter::new(buffer, offset, self.endianness)
    }

    /// A writer appending to `buffer`, in the session byte order.
    pub fn buffer_writer<'a>(&self, buffer: &'a mut Vec<u8>) -> BinaryBufferWriter<'a> {
        BinaryBufferWriter::new(buffer, self.endianness)
    }

    /// A reader over `buffer` starting at `offset`, in the session byte order.
    pub fn reader<'a>(&self, buffer: &'a [u8], offset: &'a mut usize) -> BinaryReader<'a> {
        BinaryReader::new(buffer, offset, self.endianness)
    }

    fn check_player_count(&self, inputs: &ConfirmedInputs<I>) -> Result<(), RampartError> {
        if inputs.len() > self.num_players {
            return Err(RampartError::InvalidRequest {
                info: format!(
                    "confirmed inputs hold {} players but the session has {}",
                    inputs.len(),
                    self.num_players
                ),
            });
        }
        Ok(())
    }
}

impl<I> Clone for InputContext<I> {
    fn clone(&self) -> Self {
        Self {
            serializer: Arc::clone(&self.serializer),
            player_input_size: self.player_input_size,
            num_players: self.num_players,
            endianness: self.endianness,
        }
    }
}

impl<I> fmt::Debug for InputContext<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputContext")
            .field("input", &std::any::type_name::<I>())
            .field("player_input_size", &self.player_input_size)
            .field("num_players", &self.num_players)
            .field("endianness", &self.endianness)
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
    use crate::serialization::{EncodableSerializer, IntegerSerializer, PlainDataSerializer};
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Pad {
        buttons: u16,
        stick: [i8; 2],
    }

    fn context(players: usize, endianness: Endianness) -> InputContext<u32> {
        InputContext::new(IntegerSerializer::<u32>::new(), players, endianness).unwrap()
    }

    // ==========================================
    // Construction
    // ==========================================

    #[test]
    fn rejects_bad_player_counts() {
        for players in [0, MAX_PLAYERS + 1] {
            let result = InputContext::<u8>::new(IntegerSerializer::<u8>::new(), players, Endianness::Big);
            assert!(matches!(result, Err(RampartError::InvalidRequest { .. })));
        }
    }

    #[test]
    fn sizes_follow_player_count() {
        let ctx = context(3, Endianness::Little);
        assert_eq!(ctx.player_input_size(), 4);
        assert_eq!(ctx.confirmed_input_size(), 12);
        assert_eq!(ctx.num_players(), 3);
        assert_eq!(ctx.endianness(), Endianness::Little);
    }

    // ==========================================
    // Single inputs
    // ==========================================

    #[test]
    fn single_input_roundtrip() {
        let ctx = context(2, Endianness::Big);
        let mut buffer = vec![0xAA];
        assert_eq!(ctx.write_input(&mut buffer, &0x01020304).unwrap(), 4);
        assert_eq!(buffer, vec![0xAA, 1, 2, 3, 4]);

        let mut value = 0;
        assert_eq!(ctx.read_input(&buffer[1..], &mut value).unwrap(), 4);
        assert_eq!(value, 0x01020304);
    }

    #[test]
    fn short_span_is_an_error() {
        let ctx = context(1, Endianness::Big);
        let mut dst = [0u8; 2];
        let err = ctx.write_input_into(&mut dst, &5).unwrap_err();
        assert!(matches!(err, RampartError::InsufficientBuffer { .. }));

        let mut value = 0;
        let err = ctx.read_input(&dst, &mut value).unwrap_err();
        assert!(matches!(err, RampartError::TruncatedData { .. }));
    }

    // ==========================================
    // Confirmed inputs and records
    // ==========================================

    #[test]
    fn confirmed_roundtrip_plain_data() {
        let ctx = InputContext::new(PlainDataSerializer::<Pad>::new(), 2, Endianness::Big).unwrap();
        let inputs = ConfirmedInputs::from_slice(&[
            Pad { buttons: 3, stick: [-1, 1] },
            Pad { buttons: 0xFFFF, stick: [0, 127] },
        ]);
        let mut buffer = Vec::new();
        assert_eq!(ctx.write_confirmed(&mut buffer, &inputs).unwrap(), 8);

        let mut decoded = ConfirmedInputs::default();
        assert_eq!(ctx.read_confirmed(&buffer, &mut decoded).unwrap(), 8);
        assert_eq!(decoded, inputs);
    }

    #[test]
    fn short_confirmed_pads_to_stride() {
        let ctx = context(3, Endianness::Big);
        let mut record = Vec::new();
        ctx.write_record(&mut record, &ConfirmedInputs::from_slice(&[7])).unwrap();
        assert_eq!(record.len(), ctx.confirmed_input_size());
        assert_eq!(record[..4], [0, 0, 0, 7]);
        assert!(record[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn too_many_players_is_rejected() {
        let ctx = context(1, Endianness::Big);
        let mut buffer = Vec::new();
        let result = ctx.write_confirmed(&mut buffer, &ConfirmedInputs::from_slice(&[1, 2]));
        assert!(matches!(result, Err(RampartError::InvalidRequest { .. })));
        assert!(buffer.is_empty());
    }

    #[test]
    fn records_must_be_whole() {
        let ctx = context(2, Endianness::Big);
        let result = ctx.read_records(&[0u8; 9]);
        assert!(matches!(result, Err(RampartError::InvalidReplaySource { .. })));
        assert!(ctx.read_records(&[]).unwrap().is_empty());
    }

    #[test]
    fn undecodable_record_is_an_invalid_source() {
        let ctx = InputContext::new(EncodableSerializer::<char>::new(), 1, Endianness::Big).unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&u32::from('a').to_be_bytes());
        bytes.extend_from_slice(&0xD800u32.to_be_bytes());

        match ctx.read_records(&bytes) {
            Err(RampartError::InvalidReplaySource { reason }) => {
                assert!(reason.starts_with("record 1:"), "{reason}");
            },
            other => panic!("expected an invalid replay source, got {other:?}"),
        }
    }

    #[test]
    fn helpers_use_session_byte_order() {
        let ctx = context(1, Endianness::Little);
        let mut buffer = Vec::new();
        ctx.buffer_writer(&mut buffer).write_u16(0x0102).unwrap();
        assert_eq!(buffer, vec![2, 1]);

        let mut offset = 0;
        assert_eq!(ctx.reader(&buffer, &mut offset).read_u16().unwrap(), 0x0102);

        let mut span = [0u8; 2];
        let mut offset = 0;
        ctx.span_writer(&mut span, &mut offset).write_u16(0x0304).unwrap();
        assert_eq!(span, [4, 3]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_records_have_fixed_stride(
            a in proptest::collection::vec(any::<u32>(), 1..=MAX_PLAYERS),
            b in proptest::collection::vec(any::<u32>(), 1..=MAX_PLAYERS),
            big_endian in any::<bool>(),
        ) {
            let endianness = if big_endian { Endianness::Big } else { Endianness::Little };
            let ctx = context(MAX_PLAYERS, endianness);
            let mut first = Vec::new();
            let mut second = Vec::new();
            ctx.write_record(&mut first, &ConfirmedInputs::from_slice(&a)).unwrap();
            ctx.write_record(&mut second, &ConfirmedInputs::from_slice(&b)).unwrap();
            prop_assert_eq!(first.len(), ctx.confirmed_input_size());
            prop_assert_eq!(second.len(), ctx.confirmed_input_size());
        }
    }
}

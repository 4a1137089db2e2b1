//! Game stub implementations for session tests.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::needless_pass_by_ref_mut,
    clippy::use_self
)]

use serde::{Deserialize, Serialize};

use rampart::serialization::{
    BinaryBufferWriter, BinaryDecode, BinaryEncode, BinaryReader, BinaryWriter, ByteSink,
    CodecError, EncodableSerializer, Endianness, FixedSize,
};
use rampart::{Config, ConfirmedInputs, Frame, SessionRequest, StateCell};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct StubInput {
    pub inp: u32,
}

impl FixedSize for StubInput {
    const SIZE: usize = 4;
}

impl BinaryEncode for StubInput {
    fn encode<S: ByteSink>(&self, writer: &mut BinaryWriter<S>) -> Result<(), CodecError> {
        writer.write_u32(self.inp)
    }
}

impl BinaryDecode for StubInput {
    fn decode(reader: &mut BinaryReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            inp: reader.read_u32()?,
        })
    }
}

#[derive(Debug)]
pub struct StubConfig;

impl Config for StubConfig {
    type Input = StubInput;
    type InputSerializer = EncodableSerializer<StubInput>;
    type State = StateStub;
}

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateStub {
    pub frame: i32,
    pub state: i32,
}

impl StateStub {
    fn advance_frame(&mut self, inputs: &ConfirmedInputs<StubInput>) {
        // Sum all player inputs for deterministic state update
        let total_inputs: u32 = inputs.iter().map(|input| input.inp).sum();

        if total_inputs % 2 == 0 {
            self.state += 2;
        } else {
            self.state -= 1;
        }
        self.frame += 1;
    }

    /// The saved byte image: frame then state, in `endianness`.
    #[must_use]
    pub fn to_bytes(self, endianness: Endianness) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8);
        let mut writer = BinaryBufferWriter::new(&mut bytes, endianness);
        writer.write_i32(self.frame).unwrap();
        writer.write_i32(self.state).unwrap();
        bytes
    }
}

pub struct GameStub {
    pub gs: StateStub,
    pub endianness: Endianness,
}

impl Default for GameStub {
    fn default() -> Self {
        Self::new()
    }
}

impl GameStub {
    #[allow(dead_code)]
    #[must_use]
    pub fn new() -> GameStub {
        GameStub {
            gs: StateStub::default(),
            endianness: Endianness::Big,
        }
    }

    #[allow(dead_code)]
    pub fn handle_requests(&mut self, requests: Vec<SessionRequest<StubConfig>>) {
        for request in requests {
            match request {
                SessionRequest::LoadGameState { cell, .. } => self.gs = cell.load().unwrap(),
                SessionRequest::SaveGameState { cell, frame } => self.save_game_state(&cell, frame),
                SessionRequest::AdvanceFrame { inputs } => self.gs.advance_frame(&inputs),
                _ => panic!("unexpected request"),
            }
        }
    }

    fn save_game_state(&mut self, cell: &StateCell<StateStub>, frame: Frame) {
        assert_eq!(self.gs.frame, frame.as_i32());
        assert!(cell.save(frame, self.gs.to_bytes(self.endianness), Some(self.gs)));
    }
}

/// A game stub that stops being deterministic at a configurable frame.
///
/// From `drift_from_frame` on, every simulated step also adds the number of steps taken so far,
/// a counter that lives outside the saved state. Loading a state does not rewind it, so a
/// resimulated frame never matches the first simulation of that frame.
pub struct DriftingGameStub {
    pub gs: StateStub,
    pub drift_from_frame: i32,
    steps: i32,
}

impl DriftingGameStub {
    #[allow(dead_code)]
    #[must_use]
    pub fn new() -> DriftingGameStub {
        Self::with_drift_from(0)
    }

    /// Creates a stub that drifts from the given frame onwards.
    #[allow(dead_code)]
    #[must_use]
    pub fn with_drift_from(frame: i32) -> DriftingGameStub {
        DriftingGameStub {
            gs: StateStub::default(),
            drift_from_frame: frame,
            steps: 0,
        }
    }

    #[allow(dead_code)]
    pub fn handle_requests(&mut self, requests: Vec<SessionRequest<StubConfig>>) {
        for request in requests {
            match request {
                SessionRequest::LoadGameState { cell, .. } => self.gs = cell.load().unwrap(),
                SessionRequest::SaveGameState { cell, frame } => {
                    assert!(cell.save(frame, self.gs.to_bytes(Endianness::Big), Some(self.gs)));
                },
                SessionRequest::AdvanceFrame { inputs } => {
                    self.gs.advance_frame(&inputs);
                    self.steps += 1;
                    if self.gs.frame > self.drift_from_frame {
                        self.gs.state += self.steps;
                    }
                },
                _ => panic!("unexpected request"),
            }
        }
    }
}

/// A game stub that never fulfils save requests.
pub struct ForgetfulGameStub {
    pub gs: StateStub,
}

impl ForgetfulGameStub {
    #[allow(dead_code)]
    #[must_use]
    pub fn new() -> ForgetfulGameStub {
        ForgetfulGameStub {
            gs: StateStub::default(),
        }
    }

    #[allow(dead_code)]
    pub fn handle_requests(&mut self, requests: Vec<SessionRequest<StubConfig>>) {
        for request in requests {
            match request {
                SessionRequest::LoadGameState { cell, .. } => {
                    self.gs = cell.load().unwrap_or_default();
                },
                SessionRequest::SaveGameState { .. } => {},
                SessionRequest::AdvanceFrame { inputs } => self.gs.advance_frame(&inputs),
                _ => panic!("unexpected request"),
            }
        }
    }
}

//! Confirmed inputs and the pipeline that records and replays them.
//!
//! Once every player's input for a frame is known, the frame's [`ConfirmedInputs`] are final.
//! Sessions hand them to an [`InputListener`] (usually a [`ListenerChain`]) which can keep them
//! in memory, write them to a file or forward them anywhere else. A recording is a sequence of
//! fixed-stride records, each exactly [`InputContext::confirmed_input_size`] bytes, optionally
//! deflated as a whole. [`InputProvider`]s turn such a recording back into confirmed inputs for
//! a [`ReplaySession`](crate::ReplaySession).
//!
//! ```
//! use rampart::input::{BinaryInputProvider, InputContext, InputListener, InputProvider, MemoryInputListener};
//! use rampart::serialization::IntegerSerializer;
//! use rampart::{ConfirmedInputs, Endianness, Frame};
//!
//! let context = InputContext::new(IntegerSerializer::<u16>::new(), 2, Endianness::Big)?;
//! let recording = MemoryInputListener::new();
//! let mut listener = recording.clone();
//!
//! listener.on_session_start(&context)?;
//! for frame in 0..3 {
//!     listener.on_confirmed(Frame::new(frame), &ConfirmedInputs::from_slice(&[frame as u16, 7]))?;
//! }
//! listener.on_session_close()?;
//!
//! let mut provider = BinaryInputProvider::compressed(recording.compressed_inputs()?);
//! assert_eq!(&*provider.inputs(&context)?, recording.inputs().as_slice());
//! # Ok::<(), rampart::RampartError>(())
//! ```

pub(crate) mod compression;
mod confirmed;
mod context;
mod generator;
mod listener;
mod provider;

pub use compression::{compress, decompress};
pub use confirmed::ConfirmedInputs;
pub use context::InputContext;
pub use generator::{InputGenerator, RandomInputGenerator};
pub use listener::{
    ClosureInputListener, FileInputListener, InputListener, ListenerChain, MemoryInputListener,
};
pub use provider::{BinaryInputProvider, FileInputProvider, InputProvider, MemoryInputProvider};

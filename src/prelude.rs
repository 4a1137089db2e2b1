//! Convenient re-exports for common usage.
//!
//! This module provides a "prelude" that re-exports the most commonly used types
//! from Rampart, allowing you to import them all at once.
//!
//! # Usage
//!
//! ```rust
//! use rampart::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Session types**: [`SyncTestSession`], [`ReplaySession`], [`SessionBuilder`]
//! - **Core traits**: [`Config`], [`BinarySerializer`], [`InputListener`], [`InputProvider`]
//! - **Fundamental types**: [`Frame`], [`FrameSpan`], [`FrameRange`], [`FrameRate`],
//!   [`PlayerHandle`], [`NULL_FRAME`]
//! - **Inputs**: [`ConfirmedInputs`], [`InputContext`], [`MemoryInputListener`]
//! - **Requests**: [`SessionRequest`], [`StateCell`]
//! - **Protocol**: [`PeerProtocol`], [`ProtocolStatus`]
//! - **Error handling**: [`RampartError`], [`RampartResult`]
//! - **Configuration**: [`Endianness`], [`ProtocolConfig`], [`SyncTestConfig`]
//!
//! # Example
//!
//! ```rust
//! use rampart::prelude::*;
//! use rampart::serialization::IntegerSerializer;
//!
//! // Create the config marker struct
//! struct MyConfig;
//!
//! impl Config for MyConfig {
//!     type Input = u16;
//!     type InputSerializer = IntegerSerializer<u16>;
//!     type State = Vec<u8>;
//! }
//!
//! let context = SessionBuilder::<MyConfig>::new().input_context()?;
//! assert_eq!(context.confirmed_input_size(), 4);
//! # Ok::<(), RampartError>(())
//! ```

// Core session types
pub use crate::sessions::builder::SessionBuilder;
pub use crate::sessions::replay_session::ReplaySession;
pub use crate::sessions::sync_test_session::SyncTestSession;

// Core traits
pub use crate::input::{InputListener, InputProvider};
pub use crate::serialization::BinarySerializer;
pub use crate::Config;

// Fundamental types and constants
pub use crate::{Frame, FrameRange, FrameRate, FrameSpan, PlayerHandle, NULL_FRAME};

// Inputs
pub use crate::input::MemoryInputListener;
pub use crate::{ConfirmedInputs, InputContext};

// Request handling
pub use crate::{SessionRequest, StateCell};

// Protocol
pub use crate::{PeerProtocol, ProtocolStatus};

// Error handling
pub use crate::{RampartError, RampartResult};

// Common configuration types
pub use crate::{Endianness, ProtocolConfig, SyncTestConfig};

//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `stubs`: a small deterministic game and non-deterministic variants of it
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::stubs::{GameStub, StubConfig, StubInput};
//! ```

pub mod stubs;

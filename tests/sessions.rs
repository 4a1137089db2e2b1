//! Session integration tests.
//!
//! This module contains integration tests for all session types:
//! - SyncTest sessions (consistent and drifting game stubs)
//! - Replay sessions fed by recordings of sync test sessions

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

// Session test modules
mod sessions {
    pub mod replay;
    pub mod synctest;
}

//! Shared test utilities for integration, chaos and property tests.
//!
//! This module provides:
//! - Recording mock `PeerTransport` with failure injection
//! - Tagged test cipher and seeded in-memory graph stores

#![allow(dead_code)]

pub mod fixtures;
pub mod mock_transport;

pub use fixtures::*;
pub use mock_transport::*;

//! Safety and cleanup
//!
//! Per-request workspace ownership and confined, idempotent teardown.

pub mod cleanup;
pub mod workspace;

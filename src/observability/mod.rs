//! Observability
//!
//! Structured pipeline events for operational visibility.

pub mod events;

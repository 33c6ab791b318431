//! Configuration
//!
//! Shared types, the error taxonomy, and `compilebox.json` loading.

pub mod settings;
pub mod types;

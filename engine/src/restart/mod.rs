//! Auto-Restart Engine subsystem (spec.md §4.5).

pub mod engine;

pub use engine::AutoRestartEngine;

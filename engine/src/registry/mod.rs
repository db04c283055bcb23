//! Process Registry subsystem (spec.md §4.2, §4.3).

pub mod categorize;
pub mod store;

pub use categorize::{categorize, ProcessCategory};
pub use store::ProcessRegistry;

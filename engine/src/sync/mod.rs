//! Registry Manager / sync reconciler subsystem (spec.md §4.3).

pub mod reconciler;

pub use reconciler::{RegistryManager, SyncConfig, SyncReport};

//! Ports: trait boundaries the domain depends on and adapters implement.

pub mod platform_adapter;
pub mod process_storage;

pub use platform_adapter::PlatformAdapter;
pub use process_storage::{CleanupReport, EventQuery, ProcessSnapshot, ProcessStorage};

//! Platform adapter implementations: the real, sysinfo/nix-backed adapter,
//! a synthetic mock for tests and unsupported hosts, and the selection
//! factory between them.

pub mod factory;
pub mod mock;
pub mod system;

pub use factory::{build_adapter, AdapterSelection};
pub use mock::MockAdapter;
pub use system::SystemAdapter;

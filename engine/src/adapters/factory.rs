//! Platform adapter factory: explicit override > auto-detect > mock
//! (spec.md §4.1, §6 `platformAdapter`).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Result, SupervisorError};
use crate::ports::PlatformAdapter;

use super::mock::MockAdapter;
use super::system::SystemAdapter;

#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdapterSelection {
    #[default]
    Auto,
    Darwin,
    Linux,
    Mock,
}

/// Builds the platform adapter according to selection policy. Returns an
/// error only when a real adapter was explicitly requested (`Darwin` /
/// `Linux`) on a host where that is not supported and falling back to mock
/// is disabled — spec.md §7's one fatal-error case.
pub fn build_adapter(
    selection: AdapterSelection,
    allow_mock_fallback: bool,
) -> Result<Arc<dyn PlatformAdapter>> {
    match selection {
        AdapterSelection::Mock => {
            info!("platform adapter: mock (explicit)");
            Ok(Arc::new(MockAdapter::new()))
        }
        AdapterSelection::Linux | AdapterSelection::Darwin => {
            if cfg!(unix) {
                info!(?selection, "platform adapter: system (explicit)");
                Ok(Arc::new(SystemAdapter::new()))
            } else if allow_mock_fallback {
                warn!(
                    ?selection,
                    "requested adapter unsupported on this host, falling back to mock"
                );
                Ok(Arc::new(MockAdapter::new()))
            } else {
                Err(SupervisorError::AdapterFailure(format!(
                    "platform adapter {:?} is not supported on this host and mock fallback is disabled",
                    selection
                )))
            }
        }
        AdapterSelection::Auto => {
            if cfg!(unix) {
                info!("platform adapter: system (auto-detected)");
                Ok(Arc::new(SystemAdapter::new()))
            } else {
                info!("platform adapter: mock (no supported adapter for this host)");
                Ok(Arc::new(MockAdapter::new()))
            }
        }
    }
}

impl std::fmt::Debug for AdapterSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Darwin => "darwin",
            Self::Linux => "linux",
            Self::Mock => "mock",
        };
        write!(f, "{}", s)
    }
}

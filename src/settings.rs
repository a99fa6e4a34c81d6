//! Per-request behavior policy.
//!
//! Settings are never cached by the client: the [`SettingsProvider`] is
//! invoked once at the start of every facade call, and the resulting
//! [`ExecutionMode`] snapshot governs that call until it finishes.

use crate::core::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How one family of requests should be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum RequestBehavior {
    /// Normal execution. The optional flag overrides
    /// [`CloudSettings::auto_retry_for_retriable_errors`] for this family.
    Regular(Option<bool>),
    /// Fail without contacting the service. `None` injects
    /// [`CloudError::simulated_default`].
    SimulatedFailure(Option<CloudError>),
    /// Always split oversized requests and retry transient failures.
    AutoSplitAndRetry,
}

impl Default for RequestBehavior {
    fn default() -> Self {
        Self::Regular(None)
    }
}

/// Request families with an independent behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationFamily {
    ModifyRecords,
    FetchRecords,
    FetchZoneChanges,
    FetchDatabaseChanges,
    Container,
}

impl fmt::Display for OperationFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ModifyRecords => "modify_records",
            Self::FetchRecords => "fetch_records",
            Self::FetchZoneChanges => "fetch_zone_changes",
            Self::FetchDatabaseChanges => "fetch_database_changes",
            Self::Container => "container",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSettings {
    pub modify_records_behavior: RequestBehavior,
    pub fetch_zone_changes_behavior: RequestBehavior,
    pub fetch_database_changes_behavior: RequestBehavior,
    /// Split modify requests larger than the configured batch size.
    pub auto_batch_too_large_modify_operations: bool,
    /// Retry transient operation-level failures under `Regular` behavior.
    pub auto_retry_for_retriable_errors: bool,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            modify_records_behavior: RequestBehavior::default(),
            fetch_zone_changes_behavior: RequestBehavior::default(),
            fetch_database_changes_behavior: RequestBehavior::default(),
            auto_batch_too_large_modify_operations: true,
            auto_retry_for_retriable_errors: true,
        }
    }
}

impl CloudSettings {
    pub fn behavior_for(&self, family: OperationFamily) -> RequestBehavior {
        match family {
            OperationFamily::ModifyRecords => self.modify_records_behavior.clone(),
            OperationFamily::FetchZoneChanges => self.fetch_zone_changes_behavior.clone(),
            OperationFamily::FetchDatabaseChanges => self.fetch_database_changes_behavior.clone(),
            OperationFamily::FetchRecords | OperationFamily::Container => {
                RequestBehavior::Regular(None)
            }
        }
    }

    /// Resolves the behavior of `family` into the snapshot one call runs with.
    ///
    /// Returns the injected error for `SimulatedFailure`.
    pub fn resolve(&self, family: OperationFamily) -> Result<ExecutionMode> {
        match self.behavior_for(family) {
            RequestBehavior::SimulatedFailure(injected) => {
                Err(injected.unwrap_or_else(CloudError::simulated_default))
            }
            RequestBehavior::AutoSplitAndRetry => Ok(ExecutionMode {
                split_oversized: true,
                retry_transient: true,
            }),
            RequestBehavior::Regular(retry_override) => Ok(ExecutionMode {
                split_oversized: family == OperationFamily::ModifyRecords
                    && self.auto_batch_too_large_modify_operations,
                retry_transient: retry_override.unwrap_or(self.auto_retry_for_retriable_errors),
            }),
        }
    }
}

/// Caller-supplied accessor returning the current settings.
pub type SettingsProvider = Arc<dyn Fn() -> CloudSettings + Send + Sync>;

/// Provider that always returns `settings`.
pub fn fixed_settings(settings: CloudSettings) -> SettingsProvider {
    Arc::new(move || settings.clone())
}

/// Execution switches captured at the start of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionMode {
    pub split_oversized: bool,
    pub retry_transient: bool,
}

impl ExecutionMode {
    pub const NO_RETRY: ExecutionMode = ExecutionMode {
        split_oversized: false,
        retry_transient: false,
    };
}

//! Recommended imports grouped by abstraction level.
//!
//! `app` covers what application code needs to talk to the service.
//! `advanced` is an explicit escape hatch for custom gateways and stores.

pub mod app {
    //! Stable surface for application code.
    pub use crate::{
        CancellationToken, CloudClient, CloudError, CloudSettings, ContainerApi, DatabaseApi,
        DatabaseScope, ErrorCode, QualityOfService, Record, RecordId, RequestBehavior, Result,
        Value, ZoneId,
    };
}

pub mod advanced {
    //! Building blocks for plugging in custom connections and token storage.
    pub use crate::connection::{ConnectionProvider, ScopeCache};
    pub use crate::gateway::{
        ContainerGateway, DatabaseChangesPage, DatabaseGateway, GatewayOutcome, ItemOutcome,
        ModifyBatch, ZoneChangesPage, ZoneChangesRequest,
    };
    pub use crate::orchestrator::{RetryController, RetryDecision};
    pub use crate::storage::{TokenKey, TokenStore};
}

// ============================================================================
// RecordFlow Library
// ============================================================================

pub mod connection;
pub mod core;
pub mod facade;
pub mod gateway;
pub mod orchestrator;
pub mod prelude;
pub mod result;
pub mod settings;
pub mod storage;

use log::debug;
use std::sync::Arc;

// Re-export main types for convenience
pub use crate::core::{
    ChangeToken, CloudError, DatabaseScope, DeletedRecord, ErrorCode, QualityOfService, Record,
    RecordId, Result, Value, ZoneId,
};
pub use crate::facade::{ContainerApi, DatabaseApi};
pub use crate::orchestrator::CancellationToken;
pub use crate::result::{
    FetchDatabaseChangesResult, FetchRecordsResult, FetchZoneChangesResult, ModifyRecordsResult,
    RecordFailure, RecordedResult,
};
pub use crate::settings::{CloudSettings, RequestBehavior, SettingsProvider, fixed_settings};

// Re-export connection API
pub use crate::connection::{ClientConfig, ConnectionProvider, RetryPolicy, ScopeCache, StaticConnections};
pub use crate::storage::{InMemoryTokenStore, TokenKey, TokenStore};

// ============================================================================
// High-level Client API
// ============================================================================

/// Process-wide entry point to a remote record service.
///
/// Hands out one [`DatabaseApi`] per scope and one [`ContainerApi`], each
/// built on first use from the [`ConnectionProvider`] and shared by every
/// later caller, concurrent ones included.
///
/// # Examples
///
/// ```
/// use recordflow::gateway::{ScriptedContainer, ScriptedDatabase};
/// use recordflow::{CloudClient, DatabaseScope, QualityOfService, Record, RecordId, StaticConnections};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let connections = StaticConnections::new(
///     Arc::new(ScriptedContainer::default()),
///     Arc::new(ScriptedDatabase::new()),
///     Arc::new(ScriptedDatabase::new()),
///     Arc::new(ScriptedDatabase::new()),
/// );
/// let client = CloudClient::builder(Arc::new(connections)).build().unwrap();
///
/// let db = client.database_api(DatabaseScope::Private).await.unwrap();
/// let note = Record::new("Note", RecordId::new("first")).with_field("title", "hello");
/// let result = db
///     .modify_records(vec![note], vec![], QualityOfService::default())
///     .await
///     .unwrap();
/// assert_eq!(result.saved_records.len(), 1);
/// # });
/// ```
pub struct CloudClient {
    connections: Arc<dyn ConnectionProvider>,
    settings: SettingsProvider,
    tokens: Arc<dyn TokenStore>,
    config: ClientConfig,
    databases: ScopeCache<DatabaseScope, DatabaseApi>,
    container: ScopeCache<(), ContainerApi>,
}

impl CloudClient {
    /// Client with default settings, config and an in-memory token store.
    pub fn new(connections: Arc<dyn ConnectionProvider>) -> Self {
        Self::from_parts(
            connections,
            fixed_settings(CloudSettings::default()),
            Arc::new(InMemoryTokenStore::new()),
            ClientConfig::default(),
        )
    }

    pub fn builder(connections: Arc<dyn ConnectionProvider>) -> CloudClientBuilder {
        CloudClientBuilder::new(connections)
    }

    fn from_parts(
        connections: Arc<dyn ConnectionProvider>,
        settings: SettingsProvider,
        tokens: Arc<dyn TokenStore>,
        config: ClientConfig,
    ) -> Self {
        Self {
            connections,
            settings,
            tokens,
            config,
            databases: ScopeCache::new(),
            container: ScopeCache::new(),
        }
    }

    /// Shared façade for `scope`, opening its connection on first use.
    ///
    /// If opening fails, every caller waiting on it gets the same error and
    /// the next call tries again.
    pub async fn database_api(&self, scope: DatabaseScope) -> Result<Arc<DatabaseApi>> {
        self.databases
            .get_or_try_init(scope, || async {
                let gateway = self.connections.database(scope).await?;
                debug!("opened {} database connection", scope);
                Ok(DatabaseApi::new(
                    scope,
                    gateway,
                    Arc::clone(&self.settings),
                    Arc::clone(&self.tokens),
                    &self.config,
                ))
            })
            .await
    }

    /// Shared container façade, opening its connection on first use.
    pub async fn container_api(&self) -> Result<Arc<ContainerApi>> {
        self.container
            .get_or_try_init((), || async {
                let gateway = self.connections.container().await?;
                debug!("opened container connection");
                Ok(ContainerApi::new(
                    gateway,
                    Arc::clone(&self.settings),
                    &self.config,
                ))
            })
            .await
    }

    /// Settings as the provider reports them right now.
    pub fn current_settings(&self) -> CloudSettings {
        (self.settings)()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }
}

/// Builder for [`CloudClient`]
///
/// # Examples
///
/// ```
/// use recordflow::{ClientConfig, CloudClient, CloudSettings, InMemoryTokenStore, StaticConnections};
/// use recordflow::gateway::{ScriptedContainer, ScriptedDatabase};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let connections = Arc::new(StaticConnections::new(
/// #     Arc::new(ScriptedContainer::default()),
/// #     Arc::new(ScriptedDatabase::new()),
/// #     Arc::new(ScriptedDatabase::new()),
/// #     Arc::new(ScriptedDatabase::new()),
/// # ));
/// let client = CloudClient::builder(connections)
///     .fixed_settings(CloudSettings {
///         auto_retry_for_retriable_errors: false,
///         ..CloudSettings::default()
///     })
///     .token_store(Arc::new(InMemoryTokenStore::new()))
///     .config(ClientConfig::new().max_batch_size(200))
///     .build()?;
/// assert_eq!(client.config().max_batch_size, 200);
/// # Ok(())
/// # }
/// ```
pub struct CloudClientBuilder {
    connections: Arc<dyn ConnectionProvider>,
    settings: SettingsProvider,
    tokens: Arc<dyn TokenStore>,
    config: ClientConfig,
}

impl CloudClientBuilder {
    fn new(connections: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            connections,
            settings: fixed_settings(CloudSettings::default()),
            tokens: Arc::new(InMemoryTokenStore::new()),
            config: ClientConfig::default(),
        }
    }

    /// Settings accessor consulted at the start of every call
    pub fn settings(mut self, settings: SettingsProvider) -> Self {
        self.settings = settings;
        self
    }

    /// Settings that never change
    pub fn fixed_settings(mut self, settings: CloudSettings) -> Self {
        self.settings = fixed_settings(settings);
        self
    }

    /// Where change tokens are persisted
    pub fn token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<CloudClient> {
        self.config.validate()?;
        Ok(CloudClient::from_parts(
            self.connections,
            self.settings,
            self.tokens,
            self.config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ScriptedContainer, ScriptedDatabase};

    fn connections() -> Arc<dyn ConnectionProvider> {
        Arc::new(StaticConnections::new(
            Arc::new(ScriptedContainer::new(RecordId::new("_me"))),
            Arc::new(ScriptedDatabase::new()),
            Arc::new(ScriptedDatabase::new()),
            Arc::new(ScriptedDatabase::new()),
        ))
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = CloudClient::builder(connections())
            .config(ClientConfig::new().max_batch_size(0))
            .build();
        assert!(matches!(result, Err(CloudError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_database_api_is_cached_per_scope() {
        let client = CloudClient::new(connections());

        let private = client.database_api(DatabaseScope::Private).await.unwrap();
        let again = client.database_api(DatabaseScope::Private).await.unwrap();
        let public = client.database_api(DatabaseScope::Public).await.unwrap();

        assert!(Arc::ptr_eq(&private, &again));
        assert!(!Arc::ptr_eq(&private, &public));
        assert_eq!(public.scope(), DatabaseScope::Public);
    }

    #[tokio::test]
    async fn test_container_api() {
        let client = CloudClient::new(connections());
        let container = client.container_api().await.unwrap();
        let id = container
            .user_record_id(QualityOfService::UserInitiated)
            .await
            .unwrap();
        assert_eq!(id, RecordId::new("_me"));
        assert!(Arc::ptr_eq(&container, &client.container_api().await.unwrap()));
    }
}

//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use recordflow::gateway::{ContainerGateway, DatabaseGateway, ScriptedContainer, ScriptedDatabase};
use recordflow::{
    ClientConfig, CloudClient, CloudError, CloudSettings, ConnectionProvider, DatabaseScope,
    InMemoryTokenStore, Result, SettingsProvider,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Config with millisecond backoff so retry scenarios stay fast.
pub fn fast_config() -> ClientConfig {
    ClientConfig::new().backoff(Duration::from_millis(1), Duration::from_millis(4))
}

/// Settings that tests can change between calls.
pub fn mutable_settings(initial: CloudSettings) -> (Arc<Mutex<CloudSettings>>, SettingsProvider) {
    let shared = Arc::new(Mutex::new(initial));
    let reader = Arc::clone(&shared);
    let provider: SettingsProvider = Arc::new(move || reader.lock().unwrap().clone());
    (shared, provider)
}

/// Provider backed by one scripted database for every scope.
///
/// Counts how often each kind of connection is opened and can be told to
/// fail the next openings.
pub struct CountingProvider {
    pub database: Arc<ScriptedDatabase>,
    pub container: Arc<ScriptedContainer>,
    pub database_opens: AtomicUsize,
    pub container_opens: AtomicUsize,
    open_delay: Duration,
    failures: Mutex<VecDeque<CloudError>>,
}

impl CountingProvider {
    pub fn new(database: Arc<ScriptedDatabase>) -> Self {
        Self {
            database,
            container: Arc::new(ScriptedContainer::default()),
            database_opens: AtomicUsize::new(0),
            container_opens: AtomicUsize::new(0),
            open_delay: Duration::from_millis(10),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn fail_next_open(&self, error: CloudError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn database_opens(&self) -> usize {
        self.database_opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for CountingProvider {
    async fn database(&self, _scope: DatabaseScope) -> Result<Arc<dyn DatabaseGateway>> {
        self.database_opens.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.open_delay).await;
        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(Arc::clone(&self.database) as Arc<dyn DatabaseGateway>),
        }
    }

    async fn container(&self) -> Result<Arc<dyn ContainerGateway>> {
        self.container_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.container) as Arc<dyn ContainerGateway>)
    }
}

/// Client over `database` with fast retries and the given settings.
pub fn client_with(
    database: Arc<ScriptedDatabase>,
    settings: SettingsProvider,
    tokens: Arc<InMemoryTokenStore>,
) -> CloudClient {
    CloudClient::builder(Arc::new(CountingProvider::new(database)))
        .settings(settings)
        .token_store(tokens)
        .config(fast_config())
        .build()
        .unwrap()
}

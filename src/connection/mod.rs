pub mod cache;
pub mod config;

use crate::core::{DatabaseScope, Result};
use crate::gateway::{ContainerGateway, DatabaseGateway};
use async_trait::async_trait;
use std::sync::Arc;

pub use cache::ScopeCache;
pub use config::{ClientConfig, RetryPolicy};

/// Source of raw connections, consulted once per scope by the facade cache.
///
/// Opening may fail (e.g. the remote container is unreachable); the cache
/// then reports the failure to every waiting caller and tries again on the
/// next request.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn database(&self, scope: DatabaseScope) -> Result<Arc<dyn DatabaseGateway>>;

    async fn container(&self) -> Result<Arc<dyn ContainerGateway>>;
}

/// Provider handing out connections that were opened up front.
pub struct StaticConnections {
    container: Arc<dyn ContainerGateway>,
    public: Arc<dyn DatabaseGateway>,
    private: Arc<dyn DatabaseGateway>,
    shared: Arc<dyn DatabaseGateway>,
}

impl StaticConnections {
    pub fn new(
        container: Arc<dyn ContainerGateway>,
        public: Arc<dyn DatabaseGateway>,
        private: Arc<dyn DatabaseGateway>,
        shared: Arc<dyn DatabaseGateway>,
    ) -> Self {
        Self {
            container,
            public,
            private,
            shared,
        }
    }
}

#[async_trait]
impl ConnectionProvider for StaticConnections {
    async fn database(&self, scope: DatabaseScope) -> Result<Arc<dyn DatabaseGateway>> {
        let gateway = match scope {
            DatabaseScope::Public => &self.public,
            DatabaseScope::Private => &self.private,
            DatabaseScope::Shared => &self.shared,
        };
        Ok(Arc::clone(gateway))
    }

    async fn container(&self) -> Result<Arc<dyn ContainerGateway>> {
        Ok(Arc::clone(&self.container))
    }
}

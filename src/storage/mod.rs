//! Change-token persistence used by the incremental fetch operations.

pub mod memory;

use crate::core::{ChangeToken, DatabaseScope, Result, ZoneId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use memory::{InMemoryTokenStore, TokenStoreStats};

/// What a stored change token resumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum TokenKey {
    Database { scope: DatabaseScope },
    Zone { scope: DatabaseScope, zone: ZoneId },
}

impl TokenKey {
    pub fn database(scope: DatabaseScope) -> Self {
        Self::Database { scope }
    }

    pub fn zone(scope: DatabaseScope, zone: ZoneId) -> Self {
        Self::Zone { scope, zone }
    }

    pub fn scope(&self) -> DatabaseScope {
        match self {
            Self::Database { scope } | Self::Zone { scope, .. } => *scope,
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { scope } => write!(f, "{scope}"),
            Self::Zone { scope, zone } => write!(f, "{scope}/{zone}"),
        }
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self, key: &TokenKey) -> Result<Option<ChangeToken>>;

    async fn save(&self, key: &TokenKey, token: ChangeToken) -> Result<()>;

    async fn clear(&self, key: &TokenKey) -> Result<()>;
}

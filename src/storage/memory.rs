use super::{TokenKey, TokenStore};
use crate::core::{ChangeToken, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Process-local token store. Tokens are lost when the process exits.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<TokenKey, ChangeToken>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    clears: AtomicUsize,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `tokens`.
    pub fn with_tokens(tokens: impl IntoIterator<Item = (TokenKey, ChangeToken)>) -> Self {
        Self {
            tokens: RwLock::new(tokens.into_iter().collect()),
            ..Self::default()
        }
    }

    pub async fn get(&self, key: &TokenKey) -> Option<ChangeToken> {
        self.tokens.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub fn stats(&self) -> TokenStoreStats {
        TokenStoreStats {
            loads: self.loads.load(Ordering::SeqCst),
            saves: self.saves.load(Ordering::SeqCst),
            clears: self.clears.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self, key: &TokenKey) -> Result<Option<ChangeToken>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.tokens.read().await.get(key).cloned())
    }

    async fn save(&self, key: &TokenKey, token: ChangeToken) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.tokens.write().await.insert(key.clone(), token);
        Ok(())
    }

    async fn clear(&self, key: &TokenKey) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.tokens.write().await.remove(key);
        Ok(())
    }
}

/// Operation counters of an [`InMemoryTokenStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenStoreStats {
    pub loads: usize,
    pub saves: usize,
    pub clears: usize,
}

impl std::fmt::Display for TokenStoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Token store: {} loads, {} saves, {} clears",
            self.loads, self.saves, self.clears
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DatabaseScope, ZoneId};

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = InMemoryTokenStore::new();
        let key = TokenKey::zone(DatabaseScope::Private, ZoneId::new("Notes"));

        assert_eq!(store.load(&key).await.unwrap(), None);
        store.save(&key, ChangeToken::new("t1")).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), Some(ChangeToken::new("t1")));

        store.clear(&key).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), None);

        assert_eq!(
            store.stats(),
            TokenStoreStats {
                loads: 3,
                saves: 1,
                clears: 1
            }
        );
    }

    #[tokio::test]
    async fn test_keys_are_isolated_by_scope() {
        let store = InMemoryTokenStore::with_tokens([(
            TokenKey::database(DatabaseScope::Private),
            ChangeToken::new("private-token"),
        )]);

        assert_eq!(store.get(&TokenKey::database(DatabaseScope::Shared)).await, None);
        assert_eq!(
            store.get(&TokenKey::database(DatabaseScope::Private)).await,
            Some(ChangeToken::new("private-token"))
        );
        assert_eq!(store.len().await, 1);
    }
}

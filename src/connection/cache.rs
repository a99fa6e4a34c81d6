//! Lazily constructed, shared-per-key instances.
//!
//! The first caller for a key becomes the constructor; every caller arriving
//! while construction runs subscribes to its outcome and receives the very
//! same `Arc` (or the very same error). Once a key is built, lookups take the
//! `ready` map's read path and never touch the construction gate again.

use crate::core::{CloudError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::broadcast;

type Outcome<V> = Result<Arc<V>>;

enum Slot<V> {
    Ready(Arc<V>),
    /// This caller constructs and broadcasts the outcome.
    Leader(broadcast::Sender<Outcome<V>>),
    /// Another caller is constructing; wait for its outcome.
    Follower(broadcast::Receiver<Outcome<V>>),
}

pub struct ScopeCache<K, V>
where
    K: Hash + Eq + Clone,
{
    ready: DashMap<K, Arc<V>>,
    in_flight: DashMap<K, broadcast::Sender<Outcome<V>>>,
}

impl<K, V> ScopeCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            ready: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Returns the instance for `key`, constructing it with `init` if needed.
    ///
    /// `init` runs at most once per successful construction across all
    /// callers. A failed construction is reported to everyone waiting on it
    /// and leaves the key empty, so a later call tries again.
    pub async fn get_or_try_init<F, Fut>(&self, key: K, init: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let mut init = Some(init);
        loop {
            if let Some(existing) = self.get(&key) {
                return Ok(existing);
            }

            match self.acquire(&key) {
                Slot::Ready(existing) => return Ok(existing),
                Slot::Follower(mut receiver) => match receiver.recv().await {
                    Ok(outcome) => return outcome,
                    // Constructor went away without an outcome; elect a new one.
                    Err(_) => continue,
                },
                Slot::Leader(sender) => {
                    let guard = InFlightGuard::new(&self.in_flight, key.clone());
                    let init = init.take().ok_or_else(|| {
                        CloudError::Configuration("cache initializer already consumed".to_string())
                    })?;

                    let outcome = init().await.map(Arc::new);
                    if let Ok(instance) = &outcome {
                        self.ready.insert(key.clone(), Arc::clone(instance));
                    }
                    guard.complete();
                    let _ = sender.send(outcome.clone());
                    return outcome;
                }
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.ready.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.ready.contains_key(key)
    }

    /// Number of constructed instances.
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    fn acquire(&self, key: &K) -> Slot<V> {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => Slot::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                // A constructor may have finished between the fast-path miss
                // and taking the entry; it publishes to `ready` before leaving
                // `in_flight`.
                if let Some(existing) = self.get(key) {
                    return Slot::Ready(existing);
                }
                let (sender, _receiver) = broadcast::channel(1);
                entry.insert(sender.clone());
                Slot::Leader(sender)
            }
        }
    }
}

impl<K, V> Default for ScopeCache<K, V>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the in-flight marker even if the constructing future is dropped.
struct InFlightGuard<'a, K, V>
where
    K: Hash + Eq + Clone,
{
    in_flight: &'a DashMap<K, broadcast::Sender<Outcome<V>>>,
    key: K,
    completed: bool,
}

impl<'a, K, V> InFlightGuard<'a, K, V>
where
    K: Hash + Eq + Clone,
{
    fn new(in_flight: &'a DashMap<K, broadcast::Sender<Outcome<V>>>, key: K) -> Self {
        Self {
            in_flight,
            key,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.in_flight.remove(&self.key);
        self.completed = true;
    }
}

impl<K, V> Drop for InFlightGuard<'_, K, V>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        if !self.completed {
            self.in_flight.remove(&self.key);
        }
    }
}

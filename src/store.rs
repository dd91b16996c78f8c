use std::{collections::HashSet, time::Duration};

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    item::{generate_id, ContentItem},
    persistence::{decode_items, encode_items, KeyValue, PersistenceError},
};

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Persistence key the whole collection is written under
    pub key: String,
    pub ttl: Duration,
}

/// What `load` found in persistence.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Number of live stories restored
    Restored(usize),
    Empty,
    /// Persisted data was unreadable; the store started empty.
    Recovered(PersistenceError),
}

/// Time-ordered stories with a fixed TTL, mirrored to a key/value backend.
///
/// The in-memory collection is the source of truth. Persistence failures are
/// logged and never undo an in-memory change.
pub struct ContentStore<K, C> {
    items: Vec<ContentItem>,
    backend: K,
    clock: C,
    settings: StoreSettings,
    rng: StdRng,
}

impl<K: KeyValue, C: Clock> ContentStore<K, C> {
    /// Build a store and restore whatever the backend holds.
    pub fn init(backend: K, clock: C, settings: StoreSettings) -> (Self, LoadOutcome) {
        let mut store = ContentStore {
            items: Vec::new(),
            backend,
            clock,
            settings,
            rng: StdRng::from_entropy(),
        };
        let outcome = store.load();
        (store, outcome)
    }

    /// Persist one last time and give the backend back.
    pub fn dispose(mut self) -> K {
        let _ = self.persist();
        self.backend
    }

    pub fn load(&mut self) -> LoadOutcome {
        let outcome = match self.backend.read(&self.settings.key).and_then(|data| {
            data.map(|data| decode_items(&data)).transpose()
        }) {
            Ok(Some(items)) => {
                self.items = drop_invalid(items);
                None
            }
            Ok(None) => {
                self.items.clear();
                Some(LoadOutcome::Empty)
            }
            Err(e) => {
                warn!(key = %self.settings.key, error = %e, "failed to load stories, starting empty");
                self.items.clear();
                Some(LoadOutcome::Recovered(e))
            }
        };
        self.evict();
        outcome.unwrap_or(LoadOutcome::Restored(self.items.len()))
    }

    pub fn add(&mut self, payload: String) -> ContentItem {
        let created_at = self.clock.now_millis();
        let mut id = generate_id(created_at, &mut self.rng);
        while self.items.iter().any(|item| item.id == id) {
            id = generate_id(created_at, &mut self.rng);
        }
        let item = ContentItem {
            id,
            payload,
            created_at,
            expires_at: created_at.saturating_add(self.ttl_millis()),
        };
        self.items.push(item.clone());
        debug!(id = %item.id, expires_at = item.expires_at, "added story");
        let _ = self.persist();
        item
    }

    /// Drop expired stories and persist the rest. Returns how many were dropped.
    pub fn evict(&mut self) -> usize {
        let now = self.clock.now_millis();
        let before = self.items.len();
        self.items.retain(|item| item.is_live(now));
        let removed = before - self.items.len();
        if removed > 0 {
            info!(removed, remaining = self.items.len(), "evicted expired stories");
        }
        let _ = self.persist();
        removed
    }

    /// Live stories in insertion order.
    pub fn list(&self) -> Vec<ContentItem> {
        let now = self.clock.now_millis();
        self.items
            .iter()
            .filter(|item| item.is_live(now))
            .cloned()
            .collect()
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn persist(&mut self) -> Result<(), PersistenceError> {
        let result = encode_items(&self.items)
            .and_then(|data| self.backend.write(&self.settings.key, &data));
        if let Err(e) = &result {
            warn!(key = %self.settings.key, error = %e, "failed to persist stories");
        }
        result
    }

    fn ttl_millis(&self) -> u64 {
        // Keeps expires_at > created_at even for sub-millisecond TTLs
        u64::try_from(self.settings.ttl.as_millis())
            .unwrap_or(u64::MAX)
            .max(1)
    }
}

/// Keep records with `expires_at > created_at`, first occurrence of each id only.
fn drop_invalid(items: Vec<ContentItem>) -> Vec<ContentItem> {
    let before = items.len();
    let mut seen = HashSet::new();
    let kept = items
        .into_iter()
        .filter(|item| item.expires_at > item.created_at && seen.insert(item.id.clone()))
        .collect::<Vec<_>>();
    if kept.len() < before {
        warn!(dropped = before - kept.len(), "ignoring invalid or duplicate stored stories");
    }
    kept
}

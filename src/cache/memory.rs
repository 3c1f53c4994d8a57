//! In-process cache store.
//!
//! Default store when no database path is configured; also what the test
//! suite runs against.

use super::{CacheError, CacheStore};
use crate::records::{CacheEntry, QueryKey};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<QueryKey, CacheEntry>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self, key: &QueryKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }
}

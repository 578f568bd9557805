//! Load and rewrite of the persisted alias mapping.
//!
//! Every rewrite reads the document fresh, applies the mutation to an
//! in-memory copy, serializes it in full and hands it to the storage backend
//! as one replacement. Readers go through [`ConfigCache`], which only ever
//! holds a fully written configuration.

use crate::error::StoreError;
use crate::storage::ConfigStorage;
use crate::types::{AliasMapping, ServerConfig};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{error, info};

/// Process-wide snapshot of the last configuration known to be on disk.
#[derive(Debug, Clone)]
pub struct ConfigCache(Arc<ArcSwap<ServerConfig>>);

impl ConfigCache {
    fn new(cfg: ServerConfig) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(cfg)))
    }

    pub fn snapshot(&self) -> Arc<ServerConfig> {
        self.0.load_full()
    }

    fn replace(&self, cfg: Arc<ServerConfig>) {
        self.0.store(cfg);
    }
}

/// Owner of the persisted configuration document.
///
/// A rewrite re-emits the whole document through `serde_yaml`. Values of
/// top-level keys other than `aliases` are kept, but comments, anchors and
/// the original key order are not.
pub struct ConfigStore<B> {
    backend: B,
    cache: ConfigCache,
}

impl<B: ConfigStorage> ConfigStore<B> {
    /// Load the configuration once and prime the cache.
    pub fn open(backend: B) -> Result<Self, StoreError> {
        let cfg = parse(&backend)?;
        Ok(Self {
            backend,
            cache: ConfigCache::new(cfg),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read the configuration from storage, bypassing the cache.
    pub fn load(&self) -> Result<ServerConfig, StoreError> {
        parse(&self.backend)
    }

    pub fn cached(&self) -> Arc<ServerConfig> {
        self.cache.snapshot()
    }

    /// Handle for read paths that outlive a borrow of the store.
    pub fn cache(&self) -> ConfigCache {
        self.cache.clone()
    }

    /// Apply `mutate` to a fresh copy of the alias mapping and persist it.
    ///
    /// On error the stored document and the cache are unchanged.
    pub fn rewrite<F>(&self, mutate: F) -> Result<Arc<ServerConfig>, StoreError>
    where
        F: FnOnce(&mut AliasMapping),
    {
        let mut candidate = self.load()?;
        mutate(&mut candidate.aliases);

        let contents = serde_yaml::to_string(&candidate).map_err(|e| {
            error!(error = %e, "serializing configuration failed");
            StoreError::Write(e.to_string())
        })?;
        if let Err(e) = self.backend.replace(&contents) {
            error!(path = %self.backend.location().display(), error = %e, "configuration write failed");
            return Err(e);
        }

        let candidate = Arc::new(candidate);
        self.cache.replace(Arc::clone(&candidate));
        info!(path = %self.backend.location().display(), "configuration rewritten");
        Ok(candidate)
    }
}

fn parse<B: ConfigStorage>(backend: &B) -> Result<ServerConfig, StoreError> {
    let raw = backend.read()?;
    serde_yaml::from_str(&raw).map_err(|e| StoreError::Unavailable {
        path: backend.location().to_path_buf(),
        reason: e.to_string(),
    })
}

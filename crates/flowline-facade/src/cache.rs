//! Per-instance facade caching.
//!
//! Collaborating services look up the facade of a running instance many
//! times. The cache is an explicit object handed to them through their call
//! context; entries are dropped with [`FacadeCache::evict_instance`] once the
//! process instance completes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use flowline_model::ProcessToken;

use crate::error::FacadeError;
use crate::facade::ProcessModelFacade;

/// Cache key: one entry per process instance and identity.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CacheKey {
  pub process_instance_id: String,
  pub user_id: String,
}

impl CacheKey {
  pub fn new(process_instance_id: impl Into<String>, user_id: impl Into<String>) -> Self {
    Self {
      process_instance_id: process_instance_id.into(),
      user_id: user_id.into(),
    }
  }

  pub fn for_token(token: &ProcessToken) -> Self {
    Self::new(&token.process_instance_id, &token.identity.user_id)
  }
}

#[derive(Clone, Default)]
pub struct FacadeCache {
  entries: Arc<RwLock<HashMap<CacheKey, Arc<ProcessModelFacade>>>>,
}

impl FacadeCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &CacheKey) -> Option<Arc<ProcessModelFacade>> {
    let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
    entries.get(key).cloned()
  }

  /// Get the cached facade, or build and cache it.
  ///
  /// A failing `build` leaves the cache untouched.
  pub fn get_or_try_insert_with<F>(
    &self,
    key: CacheKey,
    build: F,
  ) -> Result<Arc<ProcessModelFacade>, FacadeError>
  where
    F: FnOnce() -> Result<ProcessModelFacade, FacadeError>,
  {
    if let Some(facade) = self.get(&key) {
      return Ok(facade);
    }

    let facade = Arc::new(build()?);

    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    // Another caller may have raced us here; keep whichever entry landed first.
    Ok(entries.entry(key).or_insert(facade).clone())
  }

  /// Drop every entry of a finished process instance. Returns the number removed.
  pub fn evict_instance(&self, process_instance_id: &str) -> usize {
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    let before = entries.len();
    entries.retain(|key, _| key.process_instance_id != process_instance_id);
    before - entries.len()
  }

  pub fn len(&self) -> usize {
    self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

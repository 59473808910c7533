//! Pea scopes.
//!
//! `shared` and `prototype` are built into the factory. Any other scope name on a
//! definition is looked up in the [`ScopeRegistry`] and handled by a [`PeaScope`].

use crate::error::{PeaError, Result};
use crate::pea::Pea;

use dashmap::DashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

/// One instance per name for the lifetime of the container.
pub const SHARED_SCOPE: &str = "shared";
/// A new instance on every resolution.
pub const PROTOTYPE_SCOPE: &str = "prototype";

/// A custom lifetime strategy.
pub trait PeaScope: Send + Sync {
  /// Returns the instance of `pea_name` living in this scope, calling
  /// `object_factory` to build one when the scope holds none.
  fn get(&self, pea_name: &str, object_factory: &dyn Fn() -> Result<Pea>) -> Result<Pea>;

  /// Evicts the instance of `pea_name`, returning it if there was one.
  fn remove(&self, pea_name: &str) -> Option<Pea>;
}

/// Maps scope names to their strategies. The built-in names are reserved.
#[derive(Default)]
pub struct ScopeRegistry {
  scopes: DashMap<String, Arc<dyn PeaScope>>,
}

impl ScopeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register_scope(&self, scope_name: &str, scope: Arc<dyn PeaScope>) -> Result<()> {
    if scope_name.is_empty() {
      return Err(PeaError::InvalidArgument("scope name must not be empty".to_owned()));
    }
    if scope_name == SHARED_SCOPE || scope_name == PROTOTYPE_SCOPE {
      return Err(PeaError::ReservedScope(scope_name.to_owned()));
    }
    debug!(scope = scope_name, "registering pea scope");
    self.scopes.insert(scope_name.to_owned(), scope);
    Ok(())
  }

  pub fn registered_scope(&self, scope_name: &str) -> Option<Arc<dyn PeaScope>> {
    self.scopes.get(scope_name).map(|entry| Arc::clone(entry.value()))
  }

  pub fn registered_scope_names(&self) -> Vec<String> {
    self.scopes.iter().map(|entry| entry.key().clone()).collect()
  }
}

impl std::fmt::Debug for ScopeRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ScopeRegistry")
      .field("scopes", &self.registered_scope_names())
      .finish()
  }
}

/// Keeps one instance per name and per thread.
#[derive(Default)]
pub struct ThreadScope {
  peas: DashMap<(ThreadId, String), Pea>,
}

impl ThreadScope {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drops every instance created by the calling thread.
  pub fn clear_current_thread(&self) {
    let me = thread::current().id();
    self.peas.retain(|(owner, _), _| *owner != me);
  }
}

impl PeaScope for ThreadScope {
  fn get(&self, pea_name: &str, object_factory: &dyn Fn() -> Result<Pea>) -> Result<Pea> {
    let key = (thread::current().id(), pea_name.to_owned());
    if let Some(pea) = self.peas.get(&key) {
      return Ok(pea.value().clone());
    }
    // Build without holding a shard lock; the factory may come back to this scope.
    let pea = object_factory()?;
    Ok(self.peas.entry(key).or_insert(pea).value().clone())
  }

  fn remove(&self, pea_name: &str) -> Option<Pea> {
    self
      .peas
      .remove(&(thread::current().id(), pea_name.to_owned()))
      .map(|(_, pea)| pea)
  }
}

//! Core, non-public bookkeeping for resolution.

use crate::error::{PeaError, Result};

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_FACTORY_ID: AtomicUsize = AtomicUsize::new(1);

/// Hands out a process-unique id per factory so guards of different containers
/// never collide.
pub(crate) fn next_factory_id() -> usize {
  NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed)
}

thread_local! {
  // Peas currently being built outside the shared registry on this thread,
  // keyed by (factory id, pea name).
  static RESOLVING_STACK: RefCell<HashSet<(usize, String)>> = RefCell::new(HashSet::new());
}

/// An RAII guard detecting a pea that re-enters its own construction.
///
/// Shared peas are covered by the in-preparation marker of the shared registry;
/// this guard covers prototype and custom-scope peas, which are never marked there.
pub(crate) struct ResolutionGuard {
  key: (usize, String),
}

impl ResolutionGuard {
  pub(crate) fn enter(factory_id: usize, pea_name: &str) -> Result<Self> {
    let key = (factory_id, pea_name.to_owned());
    let inserted = RESOLVING_STACK.with(|stack| stack.borrow_mut().insert(key.clone()));
    if !inserted {
      return Err(PeaError::CircularDependency {
        pea_name: pea_name.to_owned(),
      });
    }
    Ok(Self { key })
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING_STACK.with(|stack| {
      stack.borrow_mut().remove(&self.key);
    });
  }
}

//! The registry of shared (singleton) peas.

use crate::error::{PeaError, Result};
use crate::pea::Pea;
use crate::types::{matches, Type};

use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};
use tracing::{trace, warn};

/// What a thread does when it asks for a shared pea another thread is still preparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrentPreparation {
  /// Wait until the other thread finishes, then use its result.
  ///
  /// Re-entry from the preparing thread itself, and waits that would close a
  /// cycle between threads, still fail with a circular dependency error.
  #[default]
  Block,
  /// Fail immediately with a circular dependency error.
  FailFast,
}

#[derive(Default)]
struct SharedState {
  completed: HashMap<String, Pea>,
  types: HashMap<String, Type>,
  in_preparation: HashMap<String, ThreadId>,
  // Which pea each blocked thread is waiting for.
  waiting: HashMap<ThreadId, String>,
}

impl SharedState {
  /// Whether `me` waiting on a pea prepared by `owner` would close a cycle.
  fn waits_on(&self, owner: ThreadId, me: ThreadId) -> bool {
    let mut current = owner;
    for _ in 0..=self.waiting.len() {
      if current == me {
        return true;
      }
      match self
        .waiting
        .get(&current)
        .and_then(|pea_name| self.in_preparation.get(pea_name))
      {
        Some(next) => current = *next,
        None => return false,
      }
    }
    false
  }

  fn insert(&mut self, pea_name: &str, pea: Pea) -> Result<()> {
    if self.completed.contains_key(pea_name) {
      return Err(PeaError::DuplicateSharedPea(pea_name.to_owned()));
    }
    self.types.insert(pea_name.to_owned(), pea.pea_type().clone());
    self.completed.insert(pea_name.to_owned(), pea);
    Ok(())
  }
}

/// Holds every completed shared pea and the names currently being prepared.
///
/// A name is never completed and in preparation at the same time. The internal
/// lock is only held for bookkeeping, never while a build function runs.
#[derive(Default)]
pub struct SharedPeaRegistry {
  state: Mutex<SharedState>,
  prepared: Condvar,
  mode: ConcurrentPreparation,
}

impl SharedPeaRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_concurrent_preparation(mode: ConcurrentPreparation) -> Self {
    Self {
      mode,
      ..Self::default()
    }
  }

  pub fn concurrent_preparation(&self) -> ConcurrentPreparation {
    self.mode
  }

  /// Registers a completed shared pea. Names are never silently overwritten.
  pub fn register_shared_pea(&self, pea_name: &str, pea: Pea) -> Result<()> {
    if pea_name.is_empty() || pea.is_nil() {
      return Err(PeaError::InvalidArgument(
        "pea name or shared pea must not be empty".to_owned(),
      ));
    }
    check_shape(&pea)?;
    self.state.lock().insert(pea_name, pea)
  }

  pub fn shared_pea(&self, pea_name: &str) -> Option<Pea> {
    self.state.lock().completed.get(pea_name).cloned()
  }

  pub fn contains_shared_pea(&self, pea_name: &str) -> bool {
    self.state.lock().completed.contains_key(pea_name)
  }

  pub fn shared_pea_names(&self) -> Vec<String> {
    self.state.lock().completed.keys().cloned().collect()
  }

  pub fn shared_pea_count(&self) -> usize {
    self.state.lock().completed.len()
  }

  pub fn remove_shared_pea(&self, pea_name: &str) -> Option<Pea> {
    let mut state = self.state.lock();
    state.types.remove(pea_name);
    state.completed.remove(pea_name)
  }

  /// Drops every completed shared pea. Preparations in flight are unaffected.
  pub fn clear(&self) {
    let mut state = self.state.lock();
    state.completed.clear();
    state.types.clear();
  }

  /// Names of every completed shared pea whose type satisfies `required`.
  pub fn shared_pea_names_for_type(&self, required: &Type) -> Vec<String> {
    let state = self.state.lock();
    state
      .types
      .iter()
      .filter(|(_, pea_type)| matches(pea_type, required))
      .map(|(pea_name, _)| pea_name.clone())
      .collect()
  }

  /// Every completed shared pea whose type satisfies `required`.
  pub fn shared_peas_by_type(&self, required: &Type) -> Vec<Pea> {
    let state = self.state.lock();
    state
      .types
      .iter()
      .filter(|(_, pea_type)| matches(pea_type, required))
      .filter_map(|(pea_name, _)| state.completed.get(pea_name).cloned())
      .collect()
  }

  /// The single completed shared pea satisfying `required`.
  ///
  /// Returns `Ok(None)` when nothing matches and an error when several peas
  /// match; ambiguity is never resolved silently.
  pub fn shared_pea_by_type(&self, required: &Type) -> Result<Option<Pea>> {
    let mut names = self.shared_pea_names_for_type(required);
    match names.len() {
      0 => Ok(None),
      1 => Ok(self.shared_pea(&names[0])),
      _ => {
        names.sort();
        Err(PeaError::NoUniquePea {
          type_name: required.name().to_owned(),
          candidates: names,
        })
      }
    }
  }

  /// Returns the shared pea called `pea_name`, building it with `build` first if needed.
  ///
  /// While `build` runs the name is marked as in preparation. Re-entering for the
  /// same name from the preparing thread fails with
  /// [`PeaError::CircularDependency`]; other threads block or fail according to
  /// [`ConcurrentPreparation`]. On success the pea is cached. On error or panic
  /// nothing is cached and the name can be prepared again later.
  pub fn get_or_create<F>(&self, pea_name: &str, build: F) -> Result<Pea>
  where
    F: FnOnce() -> Result<Pea>,
  {
    let me = thread::current().id();
    {
      let mut state = self.state.lock();
      loop {
        if let Some(pea) = state.completed.get(pea_name) {
          trace!(pea = pea_name, "shared pea cache hit");
          return Ok(pea.clone());
        }
        let Some(owner) = state.in_preparation.get(pea_name).copied() else {
          break;
        };
        if self.mode == ConcurrentPreparation::FailFast || state.waits_on(owner, me) {
          return Err(PeaError::CircularDependency {
            pea_name: pea_name.to_owned(),
          });
        }
        trace!(pea = pea_name, "waiting for shared pea prepared by another thread");
        state.waiting.insert(me, pea_name.to_owned());
        self.prepared.wait(&mut state);
        state.waiting.remove(&me);
      }
      state.in_preparation.insert(pea_name.to_owned(), me);
    }

    let marker = PreparationMarker {
      registry: self,
      pea_name,
      finished: false,
    };
    let pea = catch_preparation(pea_name, build)?;
    check_shape(&pea).map_err(|err| PeaError::preparation(pea_name, err))?;
    marker.complete(pea)
  }
}

impl std::fmt::Debug for SharedPeaRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.lock();
    f.debug_struct("SharedPeaRegistry")
      .field("completed", &state.completed.len())
      .field("in_preparation", &state.in_preparation.len())
      .field("mode", &self.mode)
      .finish()
  }
}

/// Clears the in-preparation mark of a name when its preparation ends, however it ends.
struct PreparationMarker<'a> {
  registry: &'a SharedPeaRegistry,
  pea_name: &'a str,
  finished: bool,
}

impl PreparationMarker<'_> {
  fn complete(mut self, pea: Pea) -> Result<Pea> {
    let mut state = self.registry.state.lock();
    state.in_preparation.remove(self.pea_name);
    self.finished = true;
    let inserted = state.insert(self.pea_name, pea.clone());
    drop(state);
    self.registry.prepared.notify_all();
    inserted.map(|()| pea)
  }
}

impl Drop for PreparationMarker<'_> {
  fn drop(&mut self) {
    if self.finished {
      return;
    }
    self.registry.state.lock().in_preparation.remove(self.pea_name);
    self.registry.prepared.notify_all();
  }
}

/// Only struct- and interface-shaped values can be shared.
fn check_shape(pea: &Pea) -> Result<()> {
  let pea_type = pea.pea_type().value_type();
  if pea_type.is_struct() || pea_type.is_interface() {
    Ok(())
  } else {
    Err(PeaError::InvalidArgument(format!(
      "shared pea must be an instance of a struct, got {}",
      pea.pea_type()
    )))
  }
}

/// Runs a build function, turning errors and panics into preparation failures.
pub(crate) fn catch_preparation<F>(pea_name: &str, build: F) -> Result<Pea>
where
  F: FnOnce() -> Result<Pea>,
{
  match panic::catch_unwind(AssertUnwindSafe(build)) {
    Ok(Ok(pea)) => Ok(pea),
    Ok(Err(err)) => Err(PeaError::preparation(pea_name, err)),
    Err(payload) => {
      let message = panic_message(payload.as_ref());
      warn!(pea = pea_name, panic = %message, "pea construction panicked");
      Err(PeaError::Preparation {
        pea_name: pea_name.to_owned(),
        message: format!("creation of pea is failed: {}", message),
        cause: None,
      })
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_owned()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic".to_owned()
  }
}

//! Initialization interceptors.

use crate::definition::PeaDefinitionRegistry;
use crate::error::{PeaError, Result};
use crate::factory::ConfigurablePeaFactory;
use crate::pea::Pea;

use parking_lot::RwLock;
use std::any::{type_name, TypeId};
use std::sync::Arc;
use tracing::debug;

/// A hook run around the initialization of every pea the factory builds.
///
/// Both hooks receive the pea produced by the previous step and may return it
/// unchanged or substitute another one (a wrapper, a proxy). Returning an error
/// aborts construction of the pea.
pub trait PeaProcessor: Send + Sync + 'static {
  fn before_pea_initialization(&self, pea_name: &str, pea: Pea) -> Result<Pea> {
    let _ = pea_name;
    Ok(pea)
  }

  fn after_pea_initialization(&self, pea_name: &str, pea: Pea) -> Result<Pea> {
    let _ = pea_name;
    Ok(pea)
  }
}

/// A setup hook run once definitions are registered, before shared peas are
/// pre-instantiated. It may add, replace or remove definitions.
pub trait PeaDefinitionRegistryProcessor: Send + Sync + 'static {
  fn after_pea_definition_registry_initialization(&self, registry: &PeaDefinitionRegistry) -> Result<()>;
}

/// A setup hook run after every [`PeaDefinitionRegistryProcessor`], before
/// shared peas are pre-instantiated. It receives the whole configurable factory.
pub trait PeaFactoryProcessor: Send + Sync + 'static {
  fn after_pea_factory_initialization(&self, factory: &dyn ConfigurablePeaFactory) -> Result<()>;
}

pub(crate) struct RegisteredProcessor {
  type_id: TypeId,
  type_name: &'static str,
  processor: Arc<dyn PeaProcessor>,
}

impl RegisteredProcessor {
  pub(crate) fn new<P: PeaProcessor>(processor: P) -> Self {
    Self {
      type_id: TypeId::of::<P>(),
      type_name: type_name::<P>(),
      processor: Arc::new(processor),
    }
  }
}

/// The processor chain, keyed by each processor's concrete type.
///
/// Processors run in registration order.
#[derive(Default)]
pub struct PeaProcessors {
  processors: RwLock<Vec<RegisteredProcessor>>,
}

impl PeaProcessors {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds `processor`. A second processor of the same concrete type is rejected.
  pub fn add_pea_processor<P: PeaProcessor>(&self, processor: P) -> Result<()> {
    self.add(RegisteredProcessor::new(processor))
  }

  pub(crate) fn add(&self, registered: RegisteredProcessor) -> Result<()> {
    let mut processors = self.processors.write();
    if processors.iter().any(|p| p.type_id == registered.type_id) {
      return Err(PeaError::DuplicateProcessor(registered.type_name.to_owned()));
    }
    debug!(processor = registered.type_name, "adding pea processor");
    processors.push(registered);
    Ok(())
  }

  /// Removes the processor of concrete type `P`, returning whether one was registered.
  pub fn remove_pea_processor<P: PeaProcessor>(&self) -> bool {
    let mut processors = self.processors.write();
    let before = processors.len();
    processors.retain(|p| p.type_id != TypeId::of::<P>());
    processors.len() != before
  }

  pub fn contains_pea_processor<P: PeaProcessor>(&self) -> bool {
    self
      .processors
      .read()
      .iter()
      .any(|p| p.type_id == TypeId::of::<P>())
  }

  pub fn pea_processors(&self) -> Vec<Arc<dyn PeaProcessor>> {
    self
      .processors
      .read()
      .iter()
      .map(|p| Arc::clone(&p.processor))
      .collect()
  }

  pub fn pea_processors_count(&self) -> usize {
    self.processors.read().len()
  }

  pub fn clear(&self) {
    self.processors.write().clear();
  }

  // Hooks run on a snapshot so a processor may itself resolve peas.
  pub(crate) fn apply_before_initialization(&self, pea_name: &str, pea: Pea) -> Result<Pea> {
    self
      .pea_processors()
      .iter()
      .try_fold(pea, |pea, processor| processor.before_pea_initialization(pea_name, pea))
  }

  pub(crate) fn apply_after_initialization(&self, pea_name: &str, pea: Pea) -> Result<Pea> {
    self
      .pea_processors()
      .iter()
      .try_fold(pea, |pea, processor| processor.after_pea_initialization(pea_name, pea))
  }
}

impl std::fmt::Debug for PeaProcessors {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let names: Vec<&str> = self.processors.read().iter().map(|p| p.type_name).collect();
    f.debug_struct("PeaProcessors").field("processors", &names).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Type;

  struct Noop;
  impl PeaProcessor for Noop {}

  struct Rejecting;
  impl PeaProcessor for Rejecting {
    fn after_pea_initialization(&self, pea_name: &str, _pea: Pea) -> Result<Pea> {
      Err(PeaError::InvalidArgument(format!("{} rejected", pea_name)))
    }
  }

  #[test]
  fn same_processor_type_is_rejected() {
    let processors = PeaProcessors::new();
    processors.add_pea_processor(Noop).unwrap();

    let err = processors.add_pea_processor(Noop).unwrap_err();
    assert!(matches!(err, PeaError::DuplicateProcessor(ref name) if name.ends_with("Noop")));
    assert_eq!(processors.pea_processors_count(), 1);

    assert!(processors.remove_pea_processor::<Noop>());
    assert!(!processors.remove_pea_processor::<Noop>());
    assert_eq!(processors.pea_processors_count(), 0);
  }

  #[test]
  fn hook_error_aborts_chain() {
    #[derive(Default)]
    struct Widget;
    let widget = Type::structure::<Widget>().build();

    let processors = PeaProcessors::new();
    processors.add_pea_processor(Noop).unwrap();
    processors.add_pea_processor(Rejecting).unwrap();

    let pea = processors
      .apply_before_initialization("widget", Pea::new(&widget, Widget))
      .unwrap();
    assert!(processors.apply_after_initialization("widget", pea).is_err());
  }
}

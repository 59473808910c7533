use crate::error::Result;
use crate::factory::{ConfigurablePeaFactory, DefaultPeaFactory, PeaFactory};
use crate::processor::{
  PeaDefinitionRegistryProcessor, PeaFactoryProcessor, PeaProcessor, PeaProcessors, RegisteredProcessor,
};
use crate::registry::{ConcurrentPreparation, SharedPeaRegistry};
use crate::scope::{PeaScope, ScopeRegistry};
use crate::types::Type;

use std::fmt;
use std::sync::Arc;

/// A builder for configuring a [`DefaultPeaFactory`] before first use.
///
/// Everything set here can also be changed on the factory later; the builder
/// exists so a container can be set up in one expression and so setup errors
/// (a duplicate processor, a reserved scope name) surface in one place.
pub struct PeaFactoryBuilder {
  parent: Option<Arc<dyn PeaFactory>>,
  concurrent_preparation: ConcurrentPreparation,
  processors: Vec<RegisteredProcessor>,
  scopes: Vec<(String, Arc<dyn PeaScope>)>,
  readable_types: Vec<Type>,
  type_scopes: Vec<(Type, String)>,
  registry_processors: Vec<Arc<dyn PeaDefinitionRegistryProcessor>>,
  factory_processors: Vec<Arc<dyn PeaFactoryProcessor>>,
}

// Manual Debug implementation for PeaFactoryBuilder.
impl fmt::Debug for PeaFactoryBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let scopes: Vec<&str> = self.scopes.iter().map(|(name, _)| name.as_str()).collect();
    f.debug_struct("PeaFactoryBuilder")
      .field("has_parent", &self.parent.is_some())
      .field("concurrent_preparation", &self.concurrent_preparation)
      .field("processors", &self.processors.len())
      .field("scopes", &scopes)
      .field("readable_types", &self.readable_types)
      .field("type_scopes", &self.type_scopes)
      .field("registry_processors", &self.registry_processors.len())
      .field("factory_processors", &self.factory_processors.len())
      .finish()
  }
}

impl Default for PeaFactoryBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl PeaFactoryBuilder {
  pub fn new() -> Self {
    Self {
      parent: None,
      concurrent_preparation: ConcurrentPreparation::default(),
      processors: Vec::new(),
      scopes: Vec::new(),
      readable_types: Vec::new(),
      type_scopes: Vec::new(),
      registry_processors: Vec::new(),
      factory_processors: Vec::new(),
    }
  }

  /// Sets the factory consulted when a name or type is unknown locally.
  pub fn parent(mut self, parent: Arc<dyn PeaFactory>) -> Self {
    self.parent = Some(parent);
    self
  }

  /// Sets how concurrent first access to the same shared pea is handled.
  ///
  /// Defaults to [`ConcurrentPreparation::Block`].
  pub fn concurrent_preparation(mut self, mode: ConcurrentPreparation) -> Self {
    self.concurrent_preparation = mode;
    self
  }

  /// Adds a processor. Processors run in the order they are added.
  pub fn processor<P: PeaProcessor>(mut self, processor: P) -> Self {
    self.processors.push(RegisteredProcessor::new(processor));
    self
  }

  /// Registers a custom scope under `scope_name`.
  pub fn scope(mut self, scope_name: impl Into<String>, scope: Arc<dyn PeaScope>) -> Self {
    self.scopes.push((scope_name.into(), scope));
    self
  }

  /// Marks a type as read-only. See [`ConfigurablePeaFactory::register_readable_type`].
  pub fn readable_type(mut self, readable: Type) -> Self {
    self.readable_types.push(readable);
    self
  }

  /// Places definitions of `pea_type` without a scope of their own in `scope_name`.
  pub fn type_scope(mut self, pea_type: Type, scope_name: impl Into<String>) -> Self {
    self.type_scopes.push((pea_type, scope_name.into()));
    self
  }

  /// Adds a processor run over the definitions before shared peas are pre-instantiated.
  pub fn definition_registry_processor<P: PeaDefinitionRegistryProcessor>(mut self, processor: P) -> Self {
    self.registry_processors.push(Arc::new(processor));
    self
  }

  /// Adds a processor run over the factory before shared peas are pre-instantiated.
  pub fn factory_processor<P: PeaFactoryProcessor>(mut self, processor: P) -> Self {
    self.factory_processors.push(Arc::new(processor));
    self
  }

  /// Builds the factory.
  ///
  /// # Errors
  ///
  /// Fails when two processors share a concrete type or a scope name is empty
  /// or reserved.
  pub fn build(self) -> Result<Arc<DefaultPeaFactory>> {
    let processors = PeaProcessors::new();
    for registered in self.processors {
      processors.add(registered)?;
    }
    let scopes = ScopeRegistry::new();
    for (scope_name, scope) in self.scopes {
      scopes.register_scope(&scope_name, scope)?;
    }

    let factory = DefaultPeaFactory::from_parts(
      SharedPeaRegistry::with_concurrent_preparation(self.concurrent_preparation),
      processors,
      scopes,
    );
    for readable in self.readable_types {
      factory.register_readable_type(readable);
    }
    for (pea_type, scope_name) in self.type_scopes {
      factory.register_type_to_scope(&pea_type, &scope_name)?;
    }
    for processor in self.registry_processors {
      factory.add_pea_definition_registry_processor(processor);
    }
    for processor in self.factory_processors {
      factory.add_pea_factory_processor(processor);
    }
    if let Some(parent) = self.parent {
      factory.set_parent_pea_factory(parent);
    }
    Ok(factory)
  }
}

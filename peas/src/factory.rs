//! The pea factory: resolution, construction and initialization.

use crate::builder::PeaFactoryBuilder;
use crate::core::{next_factory_id, ResolutionGuard};
use crate::definition::{PeaDefinition, PeaDefinitionHolder, PeaDefinitionRegistry};
use crate::error::{PeaError, Result};
use crate::pea::Pea;
use crate::processor::{PeaDefinitionRegistryProcessor, PeaFactoryProcessor, PeaProcessor, PeaProcessors};
use crate::registry::{catch_preparation, SharedPeaRegistry};
use crate::scope::{PeaScope, ScopeRegistry, PROTOTYPE_SCOPE, SHARED_SCOPE};
use crate::types::{matches, Type};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Read access to peas.
pub trait PeaFactory: Send + Sync {
  /// Resolves the pea registered under `name`.
  fn pea(&self, name: &str) -> Result<Pea>;

  /// Resolves `name` and checks that its type satisfies `required`.
  fn pea_by_name_and_type(&self, name: &str, required: &Type) -> Result<Pea>;

  /// Resolves `name`, building it from `args` instead of auto-resolved dependencies.
  ///
  /// A shared pea only consults `args` the first time it is built.
  fn pea_by_name_and_args(&self, name: &str, args: Vec<Pea>) -> Result<Pea>;

  /// Resolves the only pea whose type satisfies `required`.
  fn pea_by_type(&self, required: &Type) -> Result<Pea>;

  fn contains_pea(&self, name: &str) -> bool;
}

/// Implemented by peas that want a handle to the factory that built them.
///
/// The handle is weak; peas must not keep their container alive.
pub trait PeaFactoryAware: Send + Sync {
  fn set_pea_factory(&self, factory: Weak<dyn PeaFactory>);
}

/// Implemented by peas that need a setup step once their dependencies are injected.
pub trait PeaInitializer: Send + Sync {
  fn initialize(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// The setup-time surface of a factory.
pub trait ConfigurablePeaFactory: PeaFactory {
  fn pea_definition_registry(&self) -> &PeaDefinitionRegistry;

  fn shared_pea_registry(&self) -> &SharedPeaRegistry;

  fn register_pea_definition(&self, pea_name: &str, definition: PeaDefinition) {
    self
      .pea_definition_registry()
      .register_pea_definition(pea_name, definition);
  }

  /// Registers the holder's definition under its name and records its aliases.
  fn register_pea_definition_holder(&self, holder: &PeaDefinitionHolder);

  fn register_alias(&self, pea_name: &str, alias: &str) -> Result<()>;

  fn register_shared_pea(&self, pea_name: &str, pea: Pea) -> Result<()> {
    self.shared_pea_registry().register_shared_pea(pea_name, pea)
  }

  fn add_pea_processor<P: PeaProcessor>(&self, processor: P) -> Result<()>
  where
    Self: Sized;

  fn pea_processors_count(&self) -> usize;

  fn register_scope(&self, scope_name: &str, scope: Arc<dyn PeaScope>) -> Result<()>;

  fn registered_scope(&self, scope_name: &str) -> Option<Arc<dyn PeaScope>>;

  fn registered_scope_names(&self) -> Vec<String>;

  /// Marks `readable` as read-only: injected references to it become value copies.
  fn register_readable_type(&self, readable: Type);

  /// Assigns the scope used by definitions producing `pea_type` that set no scope themselves.
  fn register_type_to_scope(&self, pea_type: &Type, scope_name: &str) -> Result<()>;

  fn add_pea_definition_registry_processor(&self, processor: Arc<dyn PeaDefinitionRegistryProcessor>);

  fn add_pea_factory_processor(&self, processor: Arc<dyn PeaFactoryProcessor>);

  fn set_parent_pea_factory(&self, parent: Arc<dyn PeaFactory>);

  /// Runs the setup processors, then eagerly builds every shared pea that has a definition.
  fn pre_instantiate_shared_peas(&self) -> Result<()>;
}

/// The default thread-safe factory.
///
/// Each factory owns its registries, so any number of containers can live in one
/// process. Factories are always handled through an `Arc`. A factory made with
/// [`DefaultPeaFactory::clone_pea_factory`] shares its registries with the original.
pub struct DefaultPeaFactory {
  id: usize,
  this: Weak<DefaultPeaFactory>,
  definitions: Arc<PeaDefinitionRegistry>,
  shared_peas: Arc<SharedPeaRegistry>,
  processors: Arc<PeaProcessors>,
  scopes: Arc<ScopeRegistry>,
  type_scopes: DashMap<Type, String>,
  readable_types: RwLock<Vec<Type>>,
  aliases: DashMap<String, String>,
  registry_processors: RwLock<Vec<Arc<dyn PeaDefinitionRegistryProcessor>>>,
  factory_processors: RwLock<Vec<Arc<dyn PeaFactoryProcessor>>>,
  parent: RwLock<Option<Arc<dyn PeaFactory>>>,
}

impl DefaultPeaFactory {
  /// Creates a factory with default settings.
  pub fn new() -> Arc<Self> {
    Self::from_parts(SharedPeaRegistry::new(), PeaProcessors::new(), ScopeRegistry::new())
  }

  pub fn builder() -> PeaFactoryBuilder {
    PeaFactoryBuilder::new()
  }

  pub(crate) fn from_parts(
    shared_peas: SharedPeaRegistry,
    processors: PeaProcessors,
    scopes: ScopeRegistry,
  ) -> Arc<Self> {
    Self::assemble(
      next_factory_id(),
      Arc::new(PeaDefinitionRegistry::new()),
      Arc::new(shared_peas),
      Arc::new(processors),
      Arc::new(scopes),
    )
  }

  fn assemble(
    id: usize,
    definitions: Arc<PeaDefinitionRegistry>,
    shared_peas: Arc<SharedPeaRegistry>,
    processors: Arc<PeaProcessors>,
    scopes: Arc<ScopeRegistry>,
  ) -> Arc<Self> {
    Arc::new_cyclic(|this| Self {
      id,
      this: this.clone(),
      definitions,
      shared_peas,
      processors,
      scopes,
      type_scopes: DashMap::new(),
      readable_types: RwLock::new(Vec::new()),
      aliases: DashMap::new(),
      registry_processors: RwLock::new(Vec::new()),
      factory_processors: RwLock::new(Vec::new()),
      parent: RwLock::new(None),
    })
  }

  /// Creates a factory sharing this one's definitions, shared peas, processors
  /// and scopes.
  ///
  /// Type scopes, readable types, aliases, setup processors and the parent are
  /// copied, so the clone can be reconfigured without affecting this factory.
  pub fn clone_pea_factory(&self) -> Arc<Self> {
    let clone = Self::assemble(
      self.id,
      Arc::clone(&self.definitions),
      Arc::clone(&self.shared_peas),
      Arc::clone(&self.processors),
      Arc::clone(&self.scopes),
    );
    for entry in self.type_scopes.iter() {
      clone.type_scopes.insert(entry.key().clone(), entry.value().clone());
    }
    for entry in self.aliases.iter() {
      clone.aliases.insert(entry.key().clone(), entry.value().clone());
    }
    *clone.readable_types.write() = self.readable_types();
    *clone.registry_processors.write() = self.registry_processors.read().clone();
    *clone.factory_processors.write() = self.factory_processors.read().clone();
    *clone.parent.write() = self.parent_pea_factory();
    debug!(factory = self.id, "cloned pea factory");
    clone
  }

  pub fn pea_processors(&self) -> &PeaProcessors {
    &self.processors
  }

  pub fn readable_types(&self) -> Vec<Type> {
    self.readable_types.read().clone()
  }

  pub fn parent_pea_factory(&self) -> Option<Arc<dyn PeaFactory>> {
    self.parent.read().clone()
  }

  /// `name` followed by every alias target reached from it.
  fn alias_chain(&self, name: &str) -> Vec<String> {
    let mut chain = vec![name.to_owned()];
    // Alias cycles are rejected on registration, so the chain ends within this bound.
    for _ in 0..self.aliases.len() {
      let next = match chain.last().and_then(|link| self.aliases.get(link)) {
        Some(target) => target.value().clone(),
        None => break,
      };
      chain.push(next);
    }
    chain
  }

  /// Follows aliases until a name that is not an alias.
  fn canonical_name(&self, name: &str) -> String {
    self.alias_chain(name).pop().unwrap_or_else(|| name.to_owned())
  }

  fn insert_alias(&self, pea_name: &str, alias: &str) -> Result<()> {
    if pea_name.is_empty() || alias.is_empty() {
      return Err(PeaError::InvalidArgument("pea name and alias must not be empty".to_owned()));
    }
    if self.alias_chain(pea_name).iter().any(|link| link == alias) {
      return Err(PeaError::InvalidArgument(format!(
        "alias '{}' for '{}' would form a cycle",
        alias, pea_name
      )));
    }
    debug!(pea = pea_name, alias, "registering alias");
    self.aliases.insert(alias.to_owned(), pea_name.to_owned());
    Ok(())
  }

  /// The scope a definition lives in: its own, else the one registered for its
  /// type, else `shared`.
  fn scope_name(&self, definition: &PeaDefinition) -> String {
    if definition.has_explicit_scope() {
      return definition.scope().to_owned();
    }
    definition
      .effective_type()
      .and_then(|effective| {
        self
          .type_scopes
          .get(effective.value_type())
          .map(|scope| scope.value().clone())
      })
      .unwrap_or_else(|| SHARED_SCOPE.to_owned())
  }

  /// The single resolution routine behind every entry point.
  fn pea_with(&self, name: &str, required: Option<&Type>, args: Option<Vec<Pea>>) -> Result<Pea> {
    let name = match (name.is_empty(), required) {
      (false, _) => self.canonical_name(name),
      (true, Some(required)) => match self.unique_name_for_type(required)? {
        Some(found) => found,
        None => return self.parent_pea_by_type(required),
      },
      (true, None) => {
        return Err(PeaError::InvalidArgument(
          "pea name or required type must be given".to_owned(),
        ))
      }
    };

    if args.is_none() {
      if let Some(pea) = self.shared_peas.shared_pea(&name) {
        trace!(pea = %name, "resolved shared pea from cache");
        check_type(&pea, required)?;
        return Ok(pea);
      }
    }

    let Some(definition) = self.definitions.pea_definition(&name) else {
      return self.parent_pea(&name, required, args);
    };

    if let Some(required) = required {
      let effective = definition
        .effective_type()
        .ok_or_else(|| PeaError::InvalidConstructor(definition.type_name().to_owned()))?;
      if !matches(&effective, required) {
        return Err(mismatch(required, &effective));
      }
    }

    let scope_name = self.scope_name(&definition);
    let pea = match scope_name.as_str() {
      SHARED_SCOPE => self
        .shared_peas
        .get_or_create(&name, || self.create_pea(&name, &definition, args))?,
      PROTOTYPE_SCOPE => self.create_unshared_pea(&name, &definition, args)?,
      scope_name => {
        let scope = self
          .scopes
          .registered_scope(scope_name)
          .ok_or_else(|| PeaError::ScopeNotFound(scope_name.to_owned()))?;
        let args = Mutex::new(args);
        scope.get(&name, &|| {
          self.create_unshared_pea(&name, &definition, args.lock().take())
        })?
      }
    };
    check_type(&pea, required)?;
    Ok(pea)
  }

  /// Resolves the name of the only pea satisfying `required`.
  ///
  /// Definitions are searched first; peas registered directly as shared
  /// instances are only considered when no definition matches. `Ok(None)` means
  /// nothing matched locally but a parent factory can be asked.
  fn unique_name_for_type(&self, required: &Type) -> Result<Option<String>> {
    let mut names = self.definitions.pea_names_for_type(required);
    if names.is_empty() {
      names = self.shared_peas.shared_pea_names_for_type(required);
    }
    match names.len() {
      1 => Ok(names.pop()),
      0 if self.parent_pea_factory().is_some() => Ok(None),
      _ => {
        names.sort();
        Err(PeaError::NoUniquePea {
          type_name: required.name().to_owned(),
          candidates: names,
        })
      }
    }
  }

  fn parent_pea(&self, name: &str, required: Option<&Type>, args: Option<Vec<Pea>>) -> Result<Pea> {
    let Some(parent) = self.parent_pea_factory() else {
      return Err(PeaError::DefinitionNotFound(name.to_owned()));
    };
    trace!(pea = name, "delegating to parent pea factory");
    match (required, args) {
      (_, Some(args)) => parent.pea_by_name_and_args(name, args),
      (Some(required), None) => parent.pea_by_name_and_type(name, required),
      (None, None) => parent.pea(name),
    }
  }

  fn parent_pea_by_type(&self, required: &Type) -> Result<Pea> {
    match self.parent_pea_factory() {
      Some(parent) => parent.pea_by_type(required),
      None => Err(PeaError::NoUniquePea {
        type_name: required.name().to_owned(),
        candidates: Vec::new(),
      }),
    }
  }

  /// Builds a pea that is not cached by the shared registry.
  fn create_unshared_pea(&self, name: &str, definition: &PeaDefinition, args: Option<Vec<Pea>>) -> Result<Pea> {
    let _guard = ResolutionGuard::enter(self.id, name)?;
    catch_preparation(name, || self.create_pea(name, definition, args))
  }

  fn create_pea(&self, name: &str, definition: &PeaDefinition, args: Option<Vec<Pea>>) -> Result<Pea> {
    let pea_type = definition.pea_type();
    let raw = if pea_type.is_function() {
      if definition.effective_type().is_none() {
        return Err(PeaError::InvalidConstructor(pea_type.name().to_owned()));
      }
      let params = pea_type.parameter_types();
      let args = match args {
        None => self.resolve_arguments(name, params)?,
        Some(args) => check_arguments(name, params, args)?,
      };
      let mut results = pea_type.call(args)?;
      if results.len() != 1 {
        return Err(PeaError::InvalidConstructor(pea_type.name().to_owned()));
      }
      results.remove(0)
    } else {
      if args.as_ref().is_some_and(|args| !args.is_empty()) {
        return Err(PeaError::InvalidArgument(format!(
          "{} is not a constructor function and does not accept arguments",
          pea_type
        )));
      }
      pea_type
        .new_instance()
        .ok_or_else(|| PeaError::UnsupportedDefaultType(pea_type.name().to_owned()))?
    };
    debug!(pea = name, pea_type = raw.pea_type().name(), "created pea");
    self.initialize_pea(name, raw)
  }

  fn resolve_arguments(&self, name: &str, params: &[Type]) -> Result<Vec<Pea>> {
    params
      .iter()
      .map(|param| self.resolve_dependency(name, param))
      .collect()
  }

  /// Finds the value injected into a constructor parameter of type `param`.
  ///
  /// Each matching definition and each matching shared pea is one candidate;
  /// a shared pea cached under its own definition's name counts once. Nothing
  /// is built unless exactly one candidate remains.
  fn resolve_dependency(&self, name: &str, param: &Type) -> Result<Pea> {
    let mut candidates = self.definitions.pea_names_for_type(param);
    for shared in self.shared_peas.shared_pea_names_for_type(param) {
      if !candidates.contains(&shared) {
        candidates.push(shared);
      }
    }
    trace!(pea = name, dependency = param.name(), candidates = candidates.len(), "resolving dependency");

    match candidates.len() {
      0 => param.default_pea(),
      1 => {
        let pea = self.pea_with(&candidates[0], None, None)?;
        self.unwrap_readable(param, pea)
      }
      count => {
        candidates.sort();
        Err(PeaError::AmbiguousDependency {
          pea_name: name.to_owned(),
          type_name: param.name().to_owned(),
          count,
          candidates,
        })
      }
    }
  }

  /// Copies a pea held by reference when the parameter wants a value of a readable type.
  fn unwrap_readable(&self, param: &Type, candidate: Pea) -> Result<Pea> {
    let candidate_type = candidate.pea_type().clone();
    if !candidate_type.is_pointer() || param.is_pointer() {
      return Ok(candidate);
    }
    let readable = self
      .readable_types
      .read()
      .iter()
      .any(|readable| matches(&candidate_type, readable));
    if !readable {
      return Ok(candidate);
    }
    let value_type = candidate_type.value_type();
    value_type
      .copy_of(&candidate)
      .ok_or_else(|| PeaError::NotCopyable(value_type.name().to_owned()))
  }

  /// Runs the lifecycle of a freshly built pea: factory awareness, processors
  /// before, initializer, processors after.
  fn initialize_pea(&self, name: &str, pea: Pea) -> Result<Pea> {
    if let Some(aware) = pea.cast::<dyn PeaFactoryAware>() {
      let factory: Weak<dyn PeaFactory> = self.this.clone();
      aware.set_pea_factory(factory);
    }
    let pea = self.processors.apply_before_initialization(name, pea)?;
    if let Some(initializer) = pea.cast::<dyn PeaInitializer>() {
      initializer
        .initialize()
        .map_err(|err| PeaError::Preparation {
          pea_name: name.to_owned(),
          message: format!("initialization failed: {}", err),
          cause: None,
        })?;
    }
    self.processors.apply_after_initialization(name, pea)
  }
}

impl PeaFactory for DefaultPeaFactory {
  fn pea(&self, name: &str) -> Result<Pea> {
    if name.is_empty() {
      return Err(PeaError::InvalidArgument("pea name must not be empty".to_owned()));
    }
    self.pea_with(name, None, None)
  }

  fn pea_by_name_and_type(&self, name: &str, required: &Type) -> Result<Pea> {
    self.pea_with(name, Some(required), None)
  }

  fn pea_by_name_and_args(&self, name: &str, args: Vec<Pea>) -> Result<Pea> {
    if name.is_empty() {
      return Err(PeaError::InvalidArgument("pea name must not be empty".to_owned()));
    }
    self.pea_with(name, None, Some(args))
  }

  fn pea_by_type(&self, required: &Type) -> Result<Pea> {
    self.pea_with("", Some(required), None)
  }

  fn contains_pea(&self, name: &str) -> bool {
    let name = self.canonical_name(name);
    if self.shared_peas.contains_shared_pea(&name) || self.definitions.contains_pea_definition(&name) {
      return true;
    }
    self
      .parent_pea_factory()
      .is_some_and(|parent| parent.contains_pea(&name))
  }
}

impl ConfigurablePeaFactory for DefaultPeaFactory {
  fn pea_definition_registry(&self) -> &PeaDefinitionRegistry {
    &self.definitions
  }

  fn shared_pea_registry(&self) -> &SharedPeaRegistry {
    &self.shared_peas
  }

  fn register_pea_definition_holder(&self, holder: &PeaDefinitionHolder) {
    self
      .definitions
      .register_pea_definition(holder.pea_name(), holder.pea_definition().clone());
    for alias in holder.aliases() {
      if let Err(err) = self.insert_alias(holder.pea_name(), alias) {
        warn!(pea = holder.pea_name(), alias = %alias, error = %err, "skipping alias");
      }
    }
  }

  fn register_alias(&self, pea_name: &str, alias: &str) -> Result<()> {
    self.insert_alias(pea_name, alias)
  }

  fn add_pea_processor<P: PeaProcessor>(&self, processor: P) -> Result<()> {
    self.processors.add_pea_processor(processor)
  }

  fn pea_processors_count(&self) -> usize {
    self.processors.pea_processors_count()
  }

  fn register_scope(&self, scope_name: &str, scope: Arc<dyn PeaScope>) -> Result<()> {
    self.scopes.register_scope(scope_name, scope)
  }

  fn registered_scope(&self, scope_name: &str) -> Option<Arc<dyn PeaScope>> {
    self.scopes.registered_scope(scope_name)
  }

  fn registered_scope_names(&self) -> Vec<String> {
    self.scopes.registered_scope_names()
  }

  fn register_readable_type(&self, readable: Type) {
    let mut readable_types = self.readable_types.write();
    if !readable_types.contains(&readable) {
      debug!(readable_type = readable.name(), "registering readable type");
      readable_types.push(readable);
    }
  }

  fn register_type_to_scope(&self, pea_type: &Type, scope_name: &str) -> Result<()> {
    if scope_name.is_empty() {
      return Err(PeaError::InvalidArgument("scope name must not be empty".to_owned()));
    }
    debug!(pea_type = pea_type.name(), scope = scope_name, "registering type scope");
    self
      .type_scopes
      .insert(pea_type.value_type().clone(), scope_name.to_owned());
    Ok(())
  }

  fn add_pea_definition_registry_processor(&self, processor: Arc<dyn PeaDefinitionRegistryProcessor>) {
    self.registry_processors.write().push(processor);
  }

  fn add_pea_factory_processor(&self, processor: Arc<dyn PeaFactoryProcessor>) {
    self.factory_processors.write().push(processor);
  }

  fn set_parent_pea_factory(&self, parent: Arc<dyn PeaFactory>) {
    *self.parent.write() = Some(parent);
  }

  fn pre_instantiate_shared_peas(&self) -> Result<()> {
    // Snapshots, so setup processors may register further processors.
    let registry_processors = self.registry_processors.read().clone();
    for processor in registry_processors {
      processor.after_pea_definition_registry_initialization(&self.definitions)?;
    }
    let factory_processors = self.factory_processors.read().clone();
    for processor in factory_processors {
      processor.after_pea_factory_initialization(self)?;
    }

    let mut names = self.definitions.pea_definition_names();
    names.sort();
    for name in names {
      let shared = self
        .definitions
        .pea_definition(&name)
        .is_some_and(|definition| self.scope_name(&definition) == SHARED_SCOPE);
      if !shared {
        continue;
      }
      if let Err(err) = self.pea(&name) {
        warn!(pea = %name, error = %err, "pre-instantiation of shared pea failed");
        return Err(err);
      }
    }
    Ok(())
  }
}

impl fmt::Debug for DefaultPeaFactory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DefaultPeaFactory")
      .field("id", &self.id)
      .field("definitions", &self.definitions.pea_definition_count())
      .field("shared_peas", &self.shared_peas)
      .field("processors", &self.processors)
      .field("scopes", &self.scopes)
      .field("type_scopes", &self.type_scopes.len())
      .field("has_parent", &self.parent.read().is_some())
      .finish_non_exhaustive()
  }
}

fn check_type(pea: &Pea, required: Option<&Type>) -> Result<()> {
  match required {
    Some(required) if !matches(pea.pea_type(), required) => Err(mismatch(required, pea.pea_type())),
    _ => Ok(()),
  }
}

fn check_arguments(name: &str, params: &[Type], args: Vec<Pea>) -> Result<Vec<Pea>> {
  if args.len() != params.len() {
    return Err(PeaError::ArgumentCount {
      pea_name: name.to_owned(),
      expected: params.len(),
      actual: args.len(),
    });
  }
  for (arg, param) in args.iter().zip(params) {
    if !arg.is_nil() && !matches(arg.pea_type(), param) {
      return Err(mismatch(param, arg.pea_type()));
    }
  }
  Ok(args)
}

fn mismatch(expected: &Type, found: &Type) -> PeaError {
  PeaError::TypeMismatch {
    expected: expected.name().to_owned(),
    found: found.name().to_owned(),
  }
}

//! Pea definitions and the registry holding them.

use crate::error::{PeaError, Result};
use crate::scope::{PROTOTYPE_SCOPE, SHARED_SCOPE};
use crate::types::{matches, Type};

use dashmap::DashMap;
use tracing::debug;

/// The declarative description of a pea: what to build and how long it lives.
#[derive(Debug, Clone)]
pub struct PeaDefinition {
  pea_type: Type,
  // `None` until a scope is set; the factory then decides, defaulting to `shared`.
  scope: Option<String>,
}

impl PeaDefinition {
  /// A shared definition of `pea_type`, which is either a value type or a
  /// constructor function.
  pub fn new(pea_type: Type) -> Self {
    Self {
      pea_type,
      scope: None,
    }
  }

  /// Sets the scope; an empty name clears it again.
  pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
    let scope = scope.into();
    self.scope = (!scope.is_empty()).then_some(scope);
    self
  }

  pub fn type_name(&self) -> &str {
    self.pea_type.name()
  }

  pub fn pea_type(&self) -> &Type {
    &self.pea_type
  }

  /// The type of the instances this definition produces. See [`Type::effective_type`].
  pub fn effective_type(&self) -> Option<Type> {
    self.pea_type.effective_type()
  }

  /// The scope name, `shared` when none was set.
  pub fn scope(&self) -> &str {
    self.scope.as_deref().unwrap_or(SHARED_SCOPE)
  }

  /// Whether a scope was set on the definition itself rather than defaulted.
  pub fn has_explicit_scope(&self) -> bool {
    self.scope.is_some()
  }

  pub fn is_shared(&self) -> bool {
    self.scope() == SHARED_SCOPE
  }

  pub fn is_prototype(&self) -> bool {
    self.scope() == PROTOTYPE_SCOPE
  }
}

/// A definition bundled with the name it is registered under and its aliases.
#[derive(Debug, Clone)]
pub struct PeaDefinitionHolder {
  pea_name: String,
  definition: PeaDefinition,
  aliases: Vec<String>,
}

impl PeaDefinitionHolder {
  pub fn new(pea_name: impl Into<String>, definition: PeaDefinition) -> Result<Self> {
    Self::with_aliases(pea_name, definition, Vec::new())
  }

  pub fn with_aliases(
    pea_name: impl Into<String>,
    definition: PeaDefinition,
    aliases: Vec<String>,
  ) -> Result<Self> {
    let pea_name = pea_name.into();
    if pea_name.is_empty() {
      return Err(PeaError::InvalidArgument("pea name must not be empty".to_owned()));
    }
    Ok(Self {
      pea_name,
      definition,
      aliases,
    })
  }

  pub fn pea_name(&self) -> &str {
    &self.pea_name
  }

  pub fn pea_definition(&self) -> &PeaDefinition {
    &self.definition
  }

  pub fn aliases(&self) -> &[String] {
    &self.aliases
  }
}

/// Maps pea names to their definitions. Safe for concurrent use.
#[derive(Debug, Default)]
pub struct PeaDefinitionRegistry {
  definitions: DashMap<String, PeaDefinition>,
}

impl PeaDefinitionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `definition` under `pea_name`, replacing any previous one.
  pub fn register_pea_definition(&self, pea_name: &str, definition: PeaDefinition) {
    debug!(pea = pea_name, pea_type = definition.type_name(), scope = definition.scope(), "registering pea definition");
    self.definitions.insert(pea_name.to_owned(), definition);
  }

  pub fn remove_pea_definition(&self, pea_name: &str) -> Option<PeaDefinition> {
    self.definitions.remove(pea_name).map(|(_, definition)| definition)
  }

  pub fn contains_pea_definition(&self, pea_name: &str) -> bool {
    self.definitions.contains_key(pea_name)
  }

  pub fn pea_definition(&self, pea_name: &str) -> Option<PeaDefinition> {
    self.definitions.get(pea_name).map(|entry| entry.value().clone())
  }

  pub fn pea_definition_names(&self) -> Vec<String> {
    self.definitions.iter().map(|entry| entry.key().clone()).collect()
  }

  pub fn pea_definition_count(&self) -> usize {
    self.definitions.len()
  }

  /// Names of every definition whose produced type satisfies `required`.
  ///
  /// Constructor functions are matched through their single return type;
  /// functions returning zero or several values never match.
  pub fn pea_names_for_type(&self, required: &Type) -> Vec<String> {
    self
      .definitions
      .iter()
      .filter(|entry| {
        entry
          .value()
          .effective_type()
          .is_some_and(|candidate| matches(&candidate, required))
      })
      .map(|entry| entry.key().clone())
      .collect()
  }
}

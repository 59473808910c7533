use thiserror::Error;

/// The error type returned by every fallible container operation.
#[derive(Debug, Clone, Error)]
pub enum PeaError {
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("pea definition not found: {0}")]
  DefinitionNotFound(String),

  /// A lookup by type found zero or more than one candidate.
  #[error("no unique pea of type '{type_name}', candidates: {candidates:?}")]
  NoUniquePea {
    type_name: String,
    candidates: Vec<String>,
  },

  /// A constructor parameter is satisfied by more than one pea.
  #[error("unresolvable dependency of type '{type_name}' for pea '{pea_name}': {count} candidates {candidates:?}")]
  AmbiguousDependency {
    pea_name: String,
    type_name: String,
    count: usize,
    candidates: Vec<String>,
  },

  #[error("instance's type does not match the required type: expected '{expected}', found '{found}'")]
  TypeMismatch { expected: String, found: String },

  /// Construction of a pea failed, either through a returned error or a panic.
  #[error("{pea_name} : {message}")]
  Preparation {
    pea_name: String,
    message: String,
    cause: Option<Box<PeaError>>,
  },

  #[error("{pea_name} : pea is currently in preparation, maybe it has got circular dependency cycle")]
  CircularDependency { pea_name: String },

  #[error("no default value is defined for type '{0}'")]
  UnsupportedDefaultType(String),

  #[error("could not register shared pea with same name: {0}")]
  DuplicateSharedPea(String),

  #[error("you have already registered this processor : {0}")]
  DuplicateProcessor(String),

  #[error("pea '{pea_name}' expects {expected} constructor arguments, got {actual}")]
  ArgumentCount {
    pea_name: String,
    expected: usize,
    actual: usize,
  },

  #[error("'{0}' must be a constructor function with exactly one return value")]
  InvalidConstructor(String),

  #[error("readable type '{0}' has no copy function")]
  NotCopyable(String),

  #[error("existing scope '{0}' cannot be replaced")]
  ReservedScope(String),

  #[error("no scope registered with name '{0}'")]
  ScopeNotFound(String),
}

impl PeaError {
  /// Wraps a construction failure of `pea_name`.
  ///
  /// Circular dependency errors and errors that already describe a failed
  /// preparation are passed through untouched so the innermost pea name survives.
  pub(crate) fn preparation(pea_name: &str, err: PeaError) -> Self {
    match err {
      PeaError::CircularDependency { .. } | PeaError::Preparation { .. } => err,
      other => PeaError::Preparation {
        pea_name: pea_name.to_owned(),
        message: other.to_string(),
        cause: Some(Box::new(other)),
      },
    }
  }

  /// The name of the pea this error is about, if it carries one.
  pub fn pea_name(&self) -> Option<&str> {
    match self {
      PeaError::Preparation { pea_name, .. }
      | PeaError::CircularDependency { pea_name }
      | PeaError::AmbiguousDependency { pea_name, .. }
      | PeaError::ArgumentCount { pea_name, .. } => Some(pea_name),
      PeaError::DefinitionNotFound(name) | PeaError::DuplicateSharedPea(name) => Some(name),
      _ => None,
    }
  }

  /// Follows `Preparation` causes down to the error that started the failure.
  pub fn root_cause(&self) -> &PeaError {
    let mut current = self;
    while let PeaError::Preparation {
      cause: Some(cause), ..
    } = current
    {
      current = cause;
    }
    current
  }

  pub fn is_circular(&self) -> bool {
    matches!(self.root_cause(), PeaError::CircularDependency { .. })
  }
}

/// A specialized `Result` type for container operations.
pub type Result<T, E = PeaError> = std::result::Result<T, E>;

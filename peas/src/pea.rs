//! Type-tagged instance handles.

use crate::error::{PeaError, Result};
use crate::types::{Object, Type};

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// An instance managed by the container, tagged with its [`Type`].
///
/// Cloning a pea clones the inner `Arc`, so clones share identity. A pea without
/// an object is *nil*; it is what the container injects for absent interface,
/// pointer and collection dependencies.
#[derive(Clone)]
pub struct Pea {
  pea_type: Type,
  object: Option<Object>,
}

impl Pea {
  /// Wraps `value` as an instance of `pea_type`.
  pub fn new<T: Any + Send + Sync>(pea_type: &Type, value: T) -> Self {
    Self::from_arc(pea_type, Arc::new(value))
  }

  /// Wraps an already shared `value` as an instance of `pea_type`.
  pub fn from_arc<T: Any + Send + Sync>(pea_type: &Type, value: Arc<T>) -> Self {
    debug_assert!(
      pea_type.value_type().describes(TypeId::of::<T>()),
      "value of type {} tagged as {}",
      std::any::type_name::<T>(),
      pea_type
    );
    Self::from_object(pea_type.clone(), value)
  }

  /// The absent value of `pea_type`.
  pub fn nil(pea_type: &Type) -> Self {
    Self {
      pea_type: pea_type.clone(),
      object: None,
    }
  }

  pub(crate) fn from_object(pea_type: Type, object: Object) -> Self {
    Self {
      pea_type,
      object: Some(object),
    }
  }

  pub fn pea_type(&self) -> &Type {
    &self.pea_type
  }

  pub fn is_nil(&self) -> bool {
    self.object.is_none()
  }

  pub(crate) fn object(&self) -> Option<&Object> {
    self.object.as_ref()
  }

  /// Returns the concrete value, if this pea holds a `T`.
  pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
    self.object.clone()?.downcast::<T>().ok()
  }

  /// Views the value as the interface `I`, if its type declares it.
  pub fn cast<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
    let object = self.object.clone()?;
    let cast = self.pea_type.caster(TypeId::of::<I>())?;
    cast(object)?.downcast::<Arc<I>>().ok().map(|boxed| *boxed)
  }

  /// Whether both peas share the same instance. Two nil peas are never identical.
  pub fn ptr_eq(&self, other: &Pea) -> bool {
    match (&self.object, &other.object) {
      (Some(a), Some(b)) => std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ()),
      _ => false,
    }
  }
}

impl fmt::Debug for Pea {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pea")
      .field("type", &self.pea_type.name())
      .field("nil", &self.is_nil())
      .finish()
  }
}

/// The argument list handed to a constructor function.
pub struct Args {
  peas: Vec<Pea>,
}

impl Args {
  pub(crate) fn new(peas: Vec<Pea>) -> Self {
    Self { peas }
  }

  pub fn len(&self) -> usize {
    self.peas.len()
  }

  pub fn is_empty(&self) -> bool {
    self.peas.is_empty()
  }

  pub fn pea(&self, index: usize) -> Option<&Pea> {
    self.peas.get(index)
  }

  /// The argument at `index` as a concrete `T`. Nil arguments are an error.
  pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
    let pea = self.arg(index)?;
    pea.downcast::<T>().ok_or_else(|| mismatch::<T>(pea))
  }

  /// Like [`Args::get`], but a nil argument yields `None`.
  pub fn get_opt<T: Any + Send + Sync>(&self, index: usize) -> Result<Option<Arc<T>>> {
    let pea = self.arg(index)?;
    if pea.is_nil() {
      return Ok(None);
    }
    pea.downcast::<T>().map(Some).ok_or_else(|| mismatch::<T>(pea))
  }

  /// The argument at `index` viewed as the interface `I`. Nil arguments yield `None`.
  pub fn cast<I: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<I>>> {
    let pea = self.arg(index)?;
    if pea.is_nil() {
      return Ok(None);
    }
    pea.cast::<I>().map(Some).ok_or_else(|| mismatch::<I>(pea))
  }

  fn arg(&self, index: usize) -> Result<&Pea> {
    self.peas.get(index).ok_or_else(|| {
      PeaError::InvalidArgument(format!(
        "argument index {} out of range for {} arguments",
        index,
        self.peas.len()
      ))
    })
  }
}

fn mismatch<T: ?Sized>(pea: &Pea) -> PeaError {
  PeaError::TypeMismatch {
    expected: std::any::type_name::<T>().to_owned(),
    found: pea.pea_type().name().to_owned(),
  }
}

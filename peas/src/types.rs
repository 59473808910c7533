//! Runtime type descriptors.
//!
//! The container never inspects Rust types directly. Every pea carries a [`Type`]
//! handle that answers the questions resolution needs: what kind of type it is,
//! which interfaces (trait objects) it can be viewed as, which structs it embeds,
//! how to build its zero value and, for constructor functions, how to call it.
//!
//! Descriptors are built once, usually next to the type they describe, and cloned
//! freely afterwards; a clone is a reference-count bump.

use crate::error::{PeaError, Result};
use crate::factory::{PeaFactoryAware, PeaInitializer};
use crate::pea::{Args, Pea};

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type Object = Arc<dyn Any + Send + Sync>;

type ZeroFn = Arc<dyn Fn() -> Object + Send + Sync>;
type CopyFn = Arc<dyn Fn(&Object) -> Option<Object> + Send + Sync>;
type CastFn = Arc<dyn Fn(Object) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;
type InvokeFn = Arc<dyn Fn(&Args) -> Result<Vec<Pea>> + Send + Sync>;

/// The broad classification of a described type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
  /// A trait object such as `dyn Greeter`.
  Interface,
  Struct,
  /// A constructor function producing peas.
  Function,
  /// A shared reference to another described type.
  Pointer,
  /// Numbers, booleans, strings and other scalar values.
  Primitive,
  /// Vectors, maps and other containers. Their default is always nil.
  Collection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TypeKey {
  id: TypeId,
  indirection: u8,
}

struct TypeInfo {
  name: String,
  key: TypeKey,
  kind: Kind,
  elem: Option<Type>,
  zero: Option<ZeroFn>,
  copy: Option<CopyFn>,
  embedded: Vec<Type>,
  interfaces: Vec<(TypeId, CastFn)>,
  underlying: Option<Type>,
  params: Vec<Type>,
  returns: Vec<Type>,
  invoke: Option<InvokeFn>,
}

impl TypeInfo {
  fn bare(name: String, id: TypeId, kind: Kind) -> Self {
    Self {
      name,
      key: TypeKey { id, indirection: 0 },
      kind,
      elem: None,
      zero: None,
      copy: None,
      embedded: Vec::new(),
      interfaces: Vec::new(),
      underlying: None,
      params: Vec::new(),
      returns: Vec::new(),
      invoke: None,
    }
  }
}

/// A cheap-to-clone handle describing one runtime type.
///
/// Equality and hashing follow type identity, not the descriptor instance: two
/// separately built pointer types over the same element compare equal.
#[derive(Clone)]
pub struct Type(Arc<TypeInfo>);

impl Type {
  /// Starts describing a struct type `T`.
  pub fn structure<T: Any + Send + Sync>() -> TypeBuilder<T> {
    TypeBuilder::new(Kind::Struct)
  }

  /// Starts describing a primitive type `T`; its zero value is `T::default()`.
  pub fn primitive<T: Any + Send + Sync + Default>() -> TypeBuilder<T> {
    TypeBuilder::new(Kind::Primitive).default_zero()
  }

  /// Starts describing a collection type `T`.
  pub fn collection<T: Any + Send + Sync>() -> TypeBuilder<T> {
    TypeBuilder::new(Kind::Collection)
  }

  /// Describes the interface `I`, normally a trait object such as `dyn Greeter`.
  pub fn interface<I: ?Sized + Any>() -> Type {
    Type(Arc::new(TypeInfo::bare(
      type_name::<I>().to_owned(),
      TypeId::of::<I>(),
      Kind::Interface,
    )))
  }

  /// Starts describing a constructor function called `name`.
  pub fn function(name: impl Into<String>) -> FunctionBuilder {
    FunctionBuilder {
      name: name.into(),
      params: Vec::new(),
      returns: Vec::new(),
    }
  }

  /// Starts describing a constructor function whose single return type is `returns`.
  pub fn constructor(name: impl Into<String>, returns: &Type) -> FunctionBuilder {
    Type::function(name).returns(returns)
  }

  /// A pointer type whose element is `self`.
  pub fn pointer(&self) -> Type {
    let mut info = TypeInfo::bare(format!("*{}", self.0.name), self.0.key.id, Kind::Pointer);
    info.key.indirection = self.0.key.indirection.saturating_add(1);
    info.elem = Some(self.clone());
    Type(Arc::new(info))
  }

  pub fn name(&self) -> &str {
    &self.0.name
  }

  pub fn kind(&self) -> Kind {
    self.0.kind
  }

  pub fn is_interface(&self) -> bool {
    self.0.kind == Kind::Interface
  }

  pub fn is_struct(&self) -> bool {
    self.0.kind == Kind::Struct
  }

  pub fn is_function(&self) -> bool {
    self.0.kind == Kind::Function
  }

  pub fn is_pointer(&self) -> bool {
    self.0.kind == Kind::Pointer
  }

  pub fn is_primitive(&self) -> bool {
    self.0.kind == Kind::Primitive
  }

  pub fn is_collection(&self) -> bool {
    self.0.kind == Kind::Collection
  }

  /// The element type of a pointer.
  pub fn elem(&self) -> Option<&Type> {
    self.0.elem.as_ref()
  }

  /// Strips every level of pointer indirection.
  pub fn value_type(&self) -> &Type {
    let mut current = self;
    while let Some(elem) = current.elem() {
      current = elem;
    }
    current
  }

  /// Whether values of this type can be viewed as the interface `interface`.
  pub fn implements(&self, interface: &Type) -> bool {
    interface.is_interface()
      && self
        .value_type()
        .0
        .interfaces
        .iter()
        .any(|(id, _)| *id == interface.0.key.id)
  }

  /// Whether this struct embeds `base`, directly or through another embedded struct.
  pub fn embeds(&self, base: &Type) -> bool {
    let base = base.value_type();
    self
      .value_type()
      .0
      .embedded
      .iter()
      .any(|embedded| embedded == base || embedded.embeds(base))
  }

  /// Whether both types share the same underlying representation.
  pub fn convertible_to(&self, other: &Type) -> bool {
    self.underlying_key() == other.underlying_key()
  }

  fn underlying_key(&self) -> TypeKey {
    match &self.0.underlying {
      Some(underlying) => underlying.underlying_key(),
      None => self.0.key,
    }
  }

  pub fn parameter_types(&self) -> &[Type] {
    &self.0.params
  }

  pub fn return_types(&self) -> &[Type] {
    &self.0.returns
  }

  /// The type a definition of this type produces.
  ///
  /// Constructor functions yield their single return type; functions with zero
  /// or several return values yield `None`. Every other type is its own result.
  pub fn effective_type(&self) -> Option<Type> {
    if !self.is_function() {
      return Some(self.clone());
    }
    match self.0.returns.as_slice() {
      [single] => Some(single.clone()),
      _ => None,
    }
  }

  /// Builds the zero value of this type, if it has one.
  pub fn new_instance(&self) -> Option<Pea> {
    let zero = self.0.zero.as_ref()?;
    Some(Pea::from_object(self.clone(), zero()))
  }

  /// The value injected for a dependency of this type when nothing satisfies it.
  pub fn default_pea(&self) -> Result<Pea> {
    match self.0.kind {
      Kind::Interface | Kind::Collection | Kind::Pointer => Ok(Pea::nil(self)),
      Kind::Struct | Kind::Primitive => self
        .new_instance()
        .ok_or_else(|| PeaError::UnsupportedDefaultType(self.0.name.clone())),
      Kind::Function => Err(PeaError::UnsupportedDefaultType(self.0.name.clone())),
    }
  }

  /// Copies the value behind `pea` into a new value of this type.
  pub fn copy_of(&self, pea: &Pea) -> Option<Pea> {
    let copy = self.0.copy.as_ref()?;
    let object = copy(pea.object()?)?;
    Some(Pea::from_object(self.clone(), object))
  }

  /// Invokes a constructor function with `args`.
  pub fn call(&self, args: Vec<Pea>) -> Result<Vec<Pea>> {
    let invoke = self
      .0
      .invoke
      .as_ref()
      .ok_or_else(|| PeaError::InvalidConstructor(self.0.name.clone()))?;
    invoke(&Args::new(args))
  }

  pub(crate) fn caster(&self, interface: TypeId) -> Option<&CastFn> {
    self
      .value_type()
      .0
      .interfaces
      .iter()
      .find(|(id, _)| *id == interface)
      .map(|(_, cast)| cast)
  }

  pub(crate) fn describes(&self, id: TypeId) -> bool {
    self.0.key.id == id
  }
}

impl PartialEq for Type {
  fn eq(&self, other: &Self) -> bool {
    self.0.key == other.0.key
  }
}

impl Eq for Type {}

impl Hash for Type {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.0.key.hash(state);
  }
}

impl fmt::Debug for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Type({}, {:?})", self.0.name, self.0.kind)
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0.name)
  }
}

/// The matching rule shared by every type-based lookup in the container.
///
/// Pointer indirection is ignored on both sides. `candidate` satisfies `required`
/// when the two are the same type, share an underlying representation, when
/// `required` is an interface `candidate` implements, or when one of the two
/// structs embeds the other.
pub fn matches(candidate: &Type, required: &Type) -> bool {
  let candidate = candidate.value_type();
  let required = required.value_type();
  if candidate == required || candidate.convertible_to(required) {
    return true;
  }
  if required.is_interface() {
    return candidate.implements(required);
  }
  required.is_struct() && candidate.is_struct() && (candidate.embeds(required) || required.embeds(candidate))
}

/// Describes a value type `T`.
pub struct TypeBuilder<T> {
  info: TypeInfo,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> TypeBuilder<T> {
  fn new(kind: Kind) -> Self {
    Self {
      info: TypeInfo::bare(type_name::<T>().to_owned(), TypeId::of::<T>(), kind),
      _marker: PhantomData,
    }
  }

  /// Overrides the display name, which defaults to `std::any::type_name::<T>()`.
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.info.name = name.into();
    self
  }

  /// Sets the function producing the zero value of `T`.
  pub fn zero(mut self, zero: impl Fn() -> T + Send + Sync + 'static) -> Self {
    self.info.zero = Some(Arc::new(move || Arc::new(zero()) as Object));
    self
  }

  /// Records that `T` embeds the struct `base`.
  pub fn embeds(mut self, base: &Type) -> Self {
    self.info.embedded.push(base.value_type().clone());
    self
  }

  /// Records that `T` shares its representation with `underlying`.
  pub fn underlying(mut self, underlying: &Type) -> Self {
    self.info.underlying = Some(underlying.clone());
    self
  }

  /// Records that `T` can be viewed as the interface `I`.
  ///
  /// `cast` performs the unsizing, usually `|pea| pea as Arc<dyn MyTrait>`.
  pub fn implements<I>(mut self, cast: impl Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static) -> Self
  where
    I: ?Sized + Send + Sync + 'static,
  {
    let cast: CastFn = Arc::new(move |object: Object| {
      let concrete = object.downcast::<T>().ok()?;
      Some(Box::new(cast(concrete)) as Box<dyn Any + Send + Sync>)
    });
    self.info.interfaces.push((TypeId::of::<I>(), cast));
    self
  }

  /// Lets the container hand instances a handle to itself.
  pub fn factory_aware(self) -> Self
  where
    T: PeaFactoryAware,
  {
    self.implements::<dyn PeaFactoryAware>(as_factory_aware::<T>)
  }

  /// Lets the container call [`PeaInitializer::initialize`] on new instances.
  pub fn initializer(self) -> Self
  where
    T: PeaInitializer,
  {
    self.implements::<dyn PeaInitializer>(as_initializer::<T>)
  }

  pub fn build(self) -> Type {
    Type(Arc::new(self.info))
  }
}

impl<T: Any + Send + Sync + Default> TypeBuilder<T> {
  /// Uses `T::default()` as the zero value.
  pub fn default_zero(self) -> Self {
    self.zero(T::default)
  }
}

impl<T: Any + Send + Sync + Clone> TypeBuilder<T> {
  /// Allows the container to copy values of `T`, required for readable types.
  pub fn copyable(mut self) -> Self {
    self.info.copy = Some(Arc::new(|object: &Object| {
      let value = object.downcast_ref::<T>()?;
      Some(Arc::new(value.clone()) as Object)
    }));
    self
  }
}

fn as_factory_aware<T: PeaFactoryAware + 'static>(pea: Arc<T>) -> Arc<dyn PeaFactoryAware> {
  pea
}

fn as_initializer<T: PeaInitializer + 'static>(pea: Arc<T>) -> Arc<dyn PeaInitializer> {
  pea
}

/// Describes a constructor function.
pub struct FunctionBuilder {
  name: String,
  params: Vec<Type>,
  returns: Vec<Type>,
}

impl FunctionBuilder {
  /// Appends a parameter; arguments arrive in declaration order.
  pub fn param(mut self, param: &Type) -> Self {
    self.params.push(param.clone());
    self
  }

  /// Appends a return type.
  pub fn returns(mut self, returns: &Type) -> Self {
    self.returns.push(returns.clone());
    self
  }

  /// Finishes with a raw invoker producing every return value itself.
  pub fn build<F>(self, invoke: F) -> Type
  where
    F: Fn(&Args) -> Result<Vec<Pea>> + Send + Sync + 'static,
  {
    let mut info = TypeInfo::bare(self.name, TypeId::of::<F>(), Kind::Function);
    info.params = self.params;
    info.returns = self.returns;
    info.invoke = Some(Arc::new(invoke));
    Type(Arc::new(info))
  }

  /// Finishes with a constructor returning a plain `T`, tagged with the first
  /// declared return type.
  pub fn construct<T, F>(self, construct: F) -> Type
  where
    T: Any + Send + Sync,
    F: Fn(&Args) -> Result<T> + Send + Sync + 'static,
  {
    let returns = self.returns.first().cloned();
    let mut info = TypeInfo::bare(self.name, TypeId::of::<F>(), Kind::Function);
    info.params = self.params;
    info.returns = self.returns;
    info.invoke = Some(Arc::new(move |args: &Args| {
      let value = construct(args)?;
      Ok(match &returns {
        Some(ty) => vec![Pea::new(ty, value)],
        None => Vec::new(),
      })
    }));
    Type(Arc::new(info))
  }
}

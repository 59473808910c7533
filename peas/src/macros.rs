//! Public macros for ergonomic pea resolution.

/// Resolves a pea by name from a factory and unwraps it to a concrete type or a
/// trait object.
///
/// # Panics
///
/// Panics if the pea cannot be resolved or is not of the requested type. For a
/// non-panicking version, use [`maybe_resolve!`] or call the factory directly.
///
/// # Examples
///
/// ```
/// use fibre_peas::{resolve, ConfigurablePeaFactory, DefaultPeaFactory, PeaDefinition, Type};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
///
/// #[derive(Default)]
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter { fn greet(&self) -> String { "Hello!".to_string() } }
///
/// let greeter_type = Type::structure::<EnglishGreeter>()
///   .default_zero()
///   .implements(|greeter| greeter as Arc<dyn Greeter>)
///   .build();
///
/// let factory = DefaultPeaFactory::new();
/// factory.register_pea_definition("greeter", PeaDefinition::new(greeter_type));
///
/// let concrete = resolve!(factory, "greeter" => EnglishGreeter);
/// let greeter = resolve!(factory, "greeter" => trait Greeter);
/// assert_eq!(greeter.greet(), "Hello!");
/// # let _ = concrete;
/// ```
#[macro_export]
macro_rules! resolve {
  // Arm for resolving a trait object: resolve!(factory, "name" => trait MyTrait)
  ($factory:expr, $name:expr => trait $trait_ident:ident) => {
    match $crate::PeaFactory::pea(&*$factory, $name) {
      Ok(pea) => pea.cast::<dyn $trait_ident>().unwrap_or_else(|| {
        panic!(
          "Failed to resolve required trait pea '{}': it does not implement {}",
          $name,
          std::any::type_name::<dyn $trait_ident>()
        )
      }),
      Err(err) => panic!("Failed to resolve required trait pea '{}': {}", $name, err),
    }
  };

  // Arm for resolving a concrete type: resolve!(factory, "name" => MyService)
  ($factory:expr, $name:expr => $type:ty) => {
    match $crate::PeaFactory::pea(&*$factory, $name) {
      Ok(pea) => pea.downcast::<$type>().unwrap_or_else(|| {
        panic!(
          "Failed to resolve required pea '{}': it is not a {}",
          $name,
          std::any::type_name::<$type>()
        )
      }),
      Err(err) => panic!("Failed to resolve required pea '{}': {}", $name, err),
    }
  };
}

/// Like [`resolve!`], but evaluates to `None` instead of panicking.
///
/// # Examples
///
/// ```
/// use fibre_peas::{maybe_resolve, DefaultPeaFactory};
///
/// struct Missing;
/// let factory = DefaultPeaFactory::new();
/// assert!(maybe_resolve!(factory, "missing" => Missing).is_none());
/// ```
#[macro_export]
macro_rules! maybe_resolve {
  ($factory:expr, $name:expr => trait $trait_ident:ident) => {
    $crate::PeaFactory::pea(&*$factory, $name)
      .ok()
      .and_then(|pea| pea.cast::<dyn $trait_ident>())
  };

  ($factory:expr, $name:expr => $type:ty) => {
    $crate::PeaFactory::pea(&*$factory, $name)
      .ok()
      .and_then(|pea| pea.downcast::<$type>())
  };
}

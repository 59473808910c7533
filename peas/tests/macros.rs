//! Tests for the resolution macros `resolve!` and `maybe_resolve!`.

use fibre_peas::{maybe_resolve, resolve, ConfigurablePeaFactory, DefaultPeaFactory, PeaDefinition, Type};
use std::sync::Arc;

// --- Test Fixtures ---

struct MacroTestService {
  value: i32,
}

impl Default for MacroTestService {
  fn default() -> Self {
    Self { value: 42 }
  }
}

trait MacroTestTrait: Send + Sync {
  fn value(&self) -> i32;
}

impl MacroTestTrait for MacroTestService {
  fn value(&self) -> i32 {
    self.value
  }
}

// Registered, but implements nothing.
#[derive(Default)]
struct PlainService;

trait UnimplementedTrait: Send + Sync {}

fn factory() -> Arc<DefaultPeaFactory> {
  let service = Type::structure::<MacroTestService>()
    .default_zero()
    .implements(|service| service as Arc<dyn MacroTestTrait>)
    .build();
  let plain = Type::structure::<PlainService>().default_zero().build();

  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("service", PeaDefinition::new(service));
  factory.register_pea_definition("plain", PeaDefinition::new(plain));
  factory
}

// --- maybe_resolve! ---

#[test]
fn test_maybe_resolve() {
  let factory = factory();

  // Success cases
  assert_eq!(maybe_resolve!(factory, "service" => MacroTestService).unwrap().value, 42);
  assert_eq!(maybe_resolve!(factory, "service" => trait MacroTestTrait).unwrap().value(), 42);

  // Failure cases
  assert!(maybe_resolve!(factory, "missing" => MacroTestService).is_none());
  assert!(maybe_resolve!(factory, "missing" => trait MacroTestTrait).is_none());
  assert!(maybe_resolve!(factory, "plain" => MacroTestService).is_none());
  assert!(maybe_resolve!(factory, "plain" => trait UnimplementedTrait).is_none());
}

// --- resolve! ---

#[test]
fn test_resolve_success() {
  let factory = factory();

  let concrete = resolve!(factory, "service" => MacroTestService);
  let by_trait = resolve!(factory, "service" => trait MacroTestTrait);

  assert_eq!(concrete.value, 42);
  assert_eq!(by_trait.value(), 42);
}

#[test]
#[should_panic(expected = "Failed to resolve required pea 'missing'")]
fn test_resolve_panics_on_missing_pea() {
  let factory = factory();
  let _ = resolve!(factory, "missing" => MacroTestService);
}

#[test]
#[should_panic(expected = "Failed to resolve required trait pea 'missing'")]
fn test_resolve_trait_panics_on_missing_pea() {
  let factory = factory();
  let _ = resolve!(factory, "missing" => trait MacroTestTrait);
}

#[test]
#[should_panic(expected = "it is not a")]
fn test_resolve_panics_on_wrong_type() {
  let factory = factory();
  let _ = resolve!(factory, "plain" => MacroTestService);
}

#[test]
#[should_panic(expected = "it does not implement")]
fn test_resolve_panics_on_unimplemented_trait() {
  let factory = factory();
  let _ = resolve!(factory, "plain" => trait UnimplementedTrait);
}

use fibre_peas::{
  Args, ConcurrentPreparation, ConfigurablePeaFactory, DefaultPeaFactory, Pea, PeaDefinition,
  PeaDefinitionHolder, PeaDefinitionRegistry, PeaDefinitionRegistryProcessor, PeaError, PeaFactory,
  PeaFactoryAware, PeaFactoryProcessor, PeaInitializer, PeaProcessor, PeaScope, ThreadScope, Type,
  PROTOTYPE_SCOPE, SHARED_SCOPE,
};
use once_cell::sync::OnceCell;
use pretty_assertions::assert_eq;
use std::error::Error;
use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc, Barrier, Mutex, Weak,
};
use std::thread;
use std::time::Duration;

// --- Advanced Test Fixtures ---

#[derive(Default)]
struct Service {
  factory: OnceCell<Weak<dyn PeaFactory>>,
  initialized: AtomicBool,
}

impl PeaFactoryAware for Service {
  fn set_pea_factory(&self, factory: Weak<dyn PeaFactory>) {
    let _ = self.factory.set(factory);
  }
}

impl PeaInitializer for Service {
  fn initialize(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
    // The factory handle is always injected before initialization.
    if self.factory.get().is_none() {
      return Err("factory handle missing".into());
    }
    self.initialized.store(true, Ordering::SeqCst);
    Ok(())
  }
}

fn service_type() -> Type {
  Type::structure::<Service>()
    .default_zero()
    .factory_aware()
    .initializer()
    .build()
}

// Records what it sees around each initialization.
struct Recorder {
  events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
  fn record(&self, phase: &str, pea_name: &str, pea: &Pea) {
    let initialized = pea
      .downcast::<Service>()
      .map(|service| service.initialized.load(Ordering::SeqCst));
    self
      .events
      .lock()
      .unwrap()
      .push(format!("{}:{}:{:?}", phase, pea_name, initialized));
  }
}

impl PeaProcessor for Recorder {
  fn before_pea_initialization(&self, pea_name: &str, pea: Pea) -> fibre_peas::Result<Pea> {
    self.record("before", pea_name, &pea);
    Ok(pea)
  }

  fn after_pea_initialization(&self, pea_name: &str, pea: Pea) -> fibre_peas::Result<Pea> {
    self.record("after", pea_name, &pea);
    Ok(pea)
  }
}

#[derive(Default)]
struct Target;

struct Proxy {
  inner: Pea,
}

// Replaces the pea called "target" with a proxy around it.
struct Wrapping {
  proxy: Type,
}

impl PeaProcessor for Wrapping {
  fn after_pea_initialization(&self, pea_name: &str, pea: Pea) -> fibre_peas::Result<Pea> {
    if pea_name == "target" {
      return Ok(Pea::new(&self.proxy, Proxy { inner: pea }));
    }
    Ok(pea)
  }
}

struct Gatekeeper;

impl PeaProcessor for Gatekeeper {
  fn before_pea_initialization(&self, pea_name: &str, pea: Pea) -> fibre_peas::Result<Pea> {
    if pea_name == "forbidden" {
      return Err(PeaError::InvalidArgument(format!("{} is not allowed", pea_name)));
    }
    Ok(pea)
  }
}

type FactoryHandle = Arc<OnceCell<Weak<DefaultPeaFactory>>>;

fn upgrade(handle: &FactoryHandle) -> fibre_peas::Result<Arc<DefaultPeaFactory>> {
  handle
    .get()
    .and_then(Weak::upgrade)
    .ok_or_else(|| PeaError::InvalidArgument("factory dropped".to_string()))
}

// A constructor that waits for its peer once, then asks the factory for `other`.
fn reaching_for<T: Send + Sync + 'static>(
  handle: &FactoryHandle,
  barrier: &Arc<Barrier>,
  other: &'static str,
  value: fn() -> T,
) -> impl Fn(&Args) -> fibre_peas::Result<T> + Send + Sync + 'static {
  let handle = Arc::clone(handle);
  let barrier = Arc::clone(barrier);
  let first_time = AtomicBool::new(true);
  move |_: &Args| {
    if first_time.swap(false, Ordering::SeqCst) {
      barrier.wait();
    }
    upgrade(&handle)?.pea(other)?;
    Ok(value())
  }
}

// --- Concurrency ---

#[test]
fn test_concurrent_first_access_builds_shared_pea_once() {
  // Arrange
  struct Slow;
  let builds = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&builds);
  let slow = Type::structure::<Slow>().build();
  let new_slow = Type::constructor("new_slow", &slow).construct(move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(20));
    Ok(Slow)
  });
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("slow", PeaDefinition::new(new_slow));

  // Act
  let peas: Vec<Pea> = thread::scope(|s| {
    let handles: Vec<_> = (0..16).map(|_| s.spawn(|| factory.pea("slow").unwrap())).collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  // Assert
  assert_eq!(builds.load(Ordering::SeqCst), 1);
  assert!(peas.iter().all(|pea| pea.ptr_eq(&peas[0])));
}

#[test]
fn test_cross_thread_cycle_fails_instead_of_deadlocking() {
  struct Left;
  struct Right;

  let handle: FactoryHandle = Arc::new(OnceCell::new());
  let barrier = Arc::new(Barrier::new(2));
  let left = Type::structure::<Left>().build();
  let right = Type::structure::<Right>().build();
  let new_left =
    Type::constructor("new_left", &left).construct(reaching_for(&handle, &barrier, "right", || Left));
  let new_right =
    Type::constructor("new_right", &right).construct(reaching_for(&handle, &barrier, "left", || Right));

  let factory = DefaultPeaFactory::new();
  handle.set(Arc::downgrade(&factory)).unwrap();
  factory.register_pea_definition("left", PeaDefinition::new(new_left));
  factory.register_pea_definition("right", PeaDefinition::new(new_right));

  let (left_result, right_result) = thread::scope(|s| {
    let l = s.spawn(|| factory.pea("left"));
    let r = s.spawn(|| factory.pea("right"));
    (l.join().unwrap(), r.join().unwrap())
  });

  assert!(left_result.unwrap_err().is_circular());
  assert!(right_result.unwrap_err().is_circular());
  assert_eq!(factory.shared_pea_registry().shared_pea_count(), 0);
}

#[test]
fn test_fail_fast_mode_is_applied_to_the_factory() {
  let factory = DefaultPeaFactory::builder()
    .concurrent_preparation(ConcurrentPreparation::FailFast)
    .build()
    .unwrap();

  assert_eq!(
    factory.shared_pea_registry().concurrent_preparation(),
    ConcurrentPreparation::FailFast
  );
}

#[test]
fn test_panicking_constructor_can_be_retried() {
  #[derive(Debug)]
  struct Flaky;

  let attempts = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&attempts);
  let flaky = Type::structure::<Flaky>().build();
  let new_flaky = Type::constructor("new_flaky", &flaky).construct(move |_| {
    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
      panic!("first attempt fails");
    }
    Ok(Flaky)
  });
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("flaky", PeaDefinition::new(new_flaky));

  let err = factory.pea("flaky").unwrap_err();
  assert!(
    matches!(err, PeaError::Preparation { ref pea_name, ref message, .. }
      if pea_name == "flaky" && message.contains("first attempt fails"))
  );

  let pea = factory.pea("flaky").unwrap();
  assert!(pea.downcast::<Flaky>().is_some());
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

// --- Lifecycle ---

#[test]
fn test_factory_aware_pea_receives_its_factory_before_initialization() {
  // Arrange
  #[derive(Default)]
  struct Helper;
  let helper = Type::structure::<Helper>().default_zero().build();
  let events = Arc::new(Mutex::new(Vec::new()));
  let factory = DefaultPeaFactory::builder()
    .processor(Recorder {
      events: Arc::clone(&events),
    })
    .build()
    .unwrap();
  factory.register_pea_definition("service", PeaDefinition::new(service_type()));
  factory.register_pea_definition("helper", PeaDefinition::new(helper));

  // Act
  let service = factory.pea("service").unwrap().downcast::<Service>().unwrap();

  // Assert
  assert!(service.initialized.load(Ordering::SeqCst));
  let handle = service.factory.get().unwrap().upgrade().unwrap();
  assert!(handle.pea("helper").unwrap().downcast::<Helper>().is_some());
  assert_eq!(
    events.lock().unwrap().clone(),
    vec![
      "before:service:Some(false)".to_string(),
      "after:service:Some(true)".to_string(),
      "before:helper:None".to_string(),
      "after:helper:None".to_string(),
    ]
  );
}

#[test]
fn test_failing_initializer_aborts_construction() {
  #[derive(Default)]
  struct Broken;

  impl PeaInitializer for Broken {
    fn initialize(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
      Err("broken on purpose".into())
    }
  }

  let broken = Type::structure::<Broken>().default_zero().initializer().build();
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("broken", PeaDefinition::new(broken));

  let err = factory.pea("broken").unwrap_err();

  assert!(
    matches!(err, PeaError::Preparation { ref message, .. }
      if message.contains("initialization failed") && message.contains("broken on purpose"))
  );
  assert!(!factory.shared_pea_registry().contains_shared_pea("broken"));
}

// --- Processors ---

#[test]
fn test_processor_can_substitute_the_pea() {
  let target = Type::structure::<Target>().default_zero().build();
  let proxy = Type::structure::<Proxy>().build();
  let factory = DefaultPeaFactory::new();
  factory.add_pea_processor(Wrapping { proxy }).unwrap();
  factory.register_pea_definition("target", PeaDefinition::new(target.clone()));

  let first = factory.pea("target").unwrap();
  let second = factory.pea("target").unwrap();

  let proxy = first.downcast::<Proxy>().unwrap();
  assert_eq!(proxy.inner.pea_type(), &target);
  assert!(first.ptr_eq(&second));
}

#[test]
fn test_processor_error_aborts_construction() {
  let target = Type::structure::<Target>().default_zero().build();
  let factory = DefaultPeaFactory::new();
  factory.add_pea_processor(Gatekeeper).unwrap();
  factory.register_pea_definition("forbidden", PeaDefinition::new(target.clone()));
  factory.register_pea_definition("allowed", PeaDefinition::new(target));

  let err = factory.pea("forbidden").unwrap_err();

  assert!(matches!(err.root_cause(), PeaError::InvalidArgument(_)));
  assert!(factory.pea("allowed").is_ok());
  assert!(!factory.shared_pea_registry().contains_shared_pea("forbidden"));
}

#[test]
fn test_processors_are_unique_per_type() {
  let factory = DefaultPeaFactory::new();
  factory.add_pea_processor(Gatekeeper).unwrap();

  let err = factory.add_pea_processor(Gatekeeper).unwrap_err();

  assert!(matches!(err, PeaError::DuplicateProcessor(_)));
  assert_eq!(factory.pea_processors_count(), 1);
  assert!(factory.pea_processors().remove_pea_processor::<Gatekeeper>());
  assert_eq!(factory.pea_processors_count(), 0);
}

// --- Scopes ---

#[test]
fn test_thread_scope_keeps_one_instance_per_thread() {
  // Arrange
  #[derive(Default)]
  struct Session;
  let session = Type::structure::<Session>().default_zero().build();
  let scope = Arc::new(ThreadScope::new());
  let factory = DefaultPeaFactory::builder()
    .scope("thread", scope.clone())
    .build()
    .unwrap();
  factory.register_pea_definition("session", PeaDefinition::new(session).with_scope("thread"));

  // Act
  let p1 = factory.pea("session").unwrap();
  let p2 = factory.pea("session").unwrap();
  let other = thread::scope(|s| s.spawn(|| factory.pea("session").unwrap()).join().unwrap());

  // Assert
  assert!(p1.ptr_eq(&p2));
  assert!(!p1.ptr_eq(&other));
  assert!(!factory.shared_pea_registry().contains_shared_pea("session"));

  let removed = scope.remove("session").unwrap();
  assert!(removed.ptr_eq(&p1));
  let p3 = factory.pea("session").unwrap();
  assert!(!p3.ptr_eq(&p1));
}

#[test]
fn test_unknown_scope_is_reported() {
  let target = Type::structure::<Target>().default_zero().build();
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("target", PeaDefinition::new(target).with_scope("request"));

  let err = factory.pea("target").unwrap_err();

  assert!(matches!(err, PeaError::ScopeNotFound(ref scope) if scope == "request"));
}

#[test]
fn test_type_scope_applies_to_definitions_without_scope() {
  // Arrange
  let target = Type::structure::<Target>().default_zero().build();
  let new_target = Type::constructor("new_target", &target).construct(|_| Ok(Target));
  let factory = DefaultPeaFactory::builder()
    .type_scope(target.clone(), PROTOTYPE_SCOPE)
    .build()
    .unwrap();
  factory.register_pea_definition("byValue", PeaDefinition::new(target.clone()));
  factory.register_pea_definition("byConstructor", PeaDefinition::new(new_target));
  factory.register_pea_definition("pinned", PeaDefinition::new(target).with_scope(SHARED_SCOPE));

  // Act & Assert: the type's scope applies unless the definition names its own.
  for name in ["byValue", "byConstructor"] {
    let p1 = factory.pea(name).unwrap();
    let p2 = factory.pea(name).unwrap();
    assert!(!p1.ptr_eq(&p2), "{} should be a prototype", name);
  }
  let p1 = factory.pea("pinned").unwrap();
  let p2 = factory.pea("pinned").unwrap();
  assert!(p1.ptr_eq(&p2));
  assert_eq!(factory.shared_pea_registry().shared_pea_names(), vec!["pinned".to_string()]);
}

#[test]
fn test_type_scope_can_name_a_custom_scope() {
  // Arrange
  #[derive(Default)]
  struct Session;
  let session = Type::structure::<Session>().default_zero().build();
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("session", PeaDefinition::new(session.clone()));
  factory.register_type_to_scope(&session, "thread").unwrap();

  // Act
  let err = factory.pea("session").unwrap_err();
  factory
    .register_scope("thread", Arc::new(ThreadScope::new()))
    .unwrap();
  let pea = factory.pea("session").unwrap();

  // Assert
  assert!(matches!(err, PeaError::ScopeNotFound(ref scope) if scope == "thread"));
  assert!(pea.ptr_eq(&factory.pea("session").unwrap()));
  assert!(!factory.shared_pea_registry().contains_shared_pea("session"));
  assert!(factory.register_type_to_scope(&session, "").is_err());
}

// --- Parent factories and aliases ---

#[test]
fn test_child_factory_falls_back_to_parent() {
  #[derive(Default)]
  struct SharedConfig;
  let settings = Type::structure::<SharedConfig>().default_zero().build();
  let parent = DefaultPeaFactory::new();
  parent.register_pea_definition("settings", PeaDefinition::new(settings.clone()));
  let child = DefaultPeaFactory::builder().parent(parent.clone()).build().unwrap();

  let from_parent = parent.pea("settings").unwrap();
  let by_name = child.pea("settings").unwrap();
  let by_type = child.pea_by_type(&settings).unwrap();

  assert!(by_name.ptr_eq(&from_parent));
  assert!(by_type.ptr_eq(&from_parent));
  assert!(child.contains_pea("settings"));
  assert!(matches!(
    child.pea("missing"),
    Err(PeaError::DefinitionNotFound(_))
  ));
}

#[test]
fn test_child_definitions_shadow_parent() {
  #[derive(Default)]
  struct SharedConfig;
  let settings = Type::structure::<SharedConfig>().default_zero().build();
  let parent = DefaultPeaFactory::new();
  parent.register_pea_definition("settings", PeaDefinition::new(settings.clone()));
  let child = DefaultPeaFactory::new();
  child.set_parent_pea_factory(parent.clone());
  child.register_pea_definition("settings", PeaDefinition::new(settings));

  let from_parent = parent.pea("settings").unwrap();
  let from_child = child.pea("settings").unwrap();

  assert!(!from_child.ptr_eq(&from_parent));
}

#[test]
fn test_aliases_resolve_to_the_same_pea() {
  let target = Type::structure::<Target>().default_zero().build();
  let factory = DefaultPeaFactory::new();
  let holder = PeaDefinitionHolder::with_aliases(
    "dataSource",
    PeaDefinition::new(target),
    vec!["db".to_string(), "primary".to_string()],
  )
  .unwrap();
  factory.register_pea_definition_holder(&holder);
  factory.register_alias("dataSource", "main").unwrap();

  let pea = factory.pea("dataSource").unwrap();

  for alias in ["db", "primary", "main"] {
    assert!(factory.contains_pea(alias));
    assert!(factory.pea(alias).unwrap().ptr_eq(&pea));
  }
  assert!(factory.register_alias("main", "main").is_err());
  assert!(factory.register_alias("", "other").is_err());
}

#[test]
fn test_alias_chains_resolve_and_cycles_are_rejected() {
  // Arrange
  let target = Type::structure::<Target>().default_zero().build();
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("dataSource", PeaDefinition::new(target));
  factory.register_alias("dataSource", "db").unwrap();
  factory.register_alias("db", "primary").unwrap();

  // Act
  let pea = factory.pea("dataSource").unwrap();
  let through_chain = factory.pea("primary").unwrap();

  // Assert
  assert!(through_chain.ptr_eq(&pea));
  assert!(factory.contains_pea("primary"));
  for (pea_name, alias) in [("primary", "dataSource"), ("primary", "db"), ("db", "db")] {
    let err = factory.register_alias(pea_name, alias).unwrap_err();
    assert!(matches!(err, PeaError::InvalidArgument(_)), "{} -> {}", alias, pea_name);
  }
  assert!(factory.pea("primary").unwrap().ptr_eq(&pea));
}

// --- Readable types ---

#[derive(Debug, Clone, Default, PartialEq)]
struct Settings {
  level: u32,
}

struct Reader {
  settings: Arc<Settings>,
}

fn reader_types() -> (Type, Type) {
  let settings = Type::structure::<Settings>().copyable().build();
  let reader = Type::structure::<Reader>().build();
  let new_reader = Type::constructor("new_reader", &reader)
    .param(&settings)
    .construct(|args| {
      Ok(Reader {
        settings: args.get::<Settings>(0)?,
      })
    });
  (settings, new_reader)
}

#[test]
fn test_readable_type_is_injected_as_a_copy() {
  let (settings, new_reader) = reader_types();
  let factory = DefaultPeaFactory::builder()
    .readable_type(settings.clone())
    .build()
    .unwrap();
  factory
    .register_shared_pea("settings", Pea::new(&settings.pointer(), Settings { level: 3 }))
    .unwrap();
  factory.register_pea_definition("reader", PeaDefinition::new(new_reader));

  let reader = factory.pea("reader").unwrap().downcast::<Reader>().unwrap();
  let shared = factory.pea("settings").unwrap().downcast::<Settings>().unwrap();

  assert_eq!(*reader.settings, Settings { level: 3 });
  assert!(!Arc::ptr_eq(&reader.settings, &shared));
}

#[test]
fn test_non_readable_pointer_is_shared() {
  let (settings, new_reader) = reader_types();
  let factory = DefaultPeaFactory::new();
  factory
    .register_shared_pea("settings", Pea::new(&settings.pointer(), Settings { level: 3 }))
    .unwrap();
  factory.register_pea_definition("reader", PeaDefinition::new(new_reader));

  let reader = factory.pea("reader").unwrap().downcast::<Reader>().unwrap();
  let shared = factory.pea("settings").unwrap().downcast::<Settings>().unwrap();

  assert!(Arc::ptr_eq(&reader.settings, &shared));
}

#[test]
fn test_readable_type_without_copy_is_rejected() {
  struct Frozen;
  struct Holder;

  let frozen = Type::structure::<Frozen>().build();
  let holder = Type::structure::<Holder>().build();
  let new_holder = Type::constructor("new_holder", &holder)
    .param(&frozen)
    .construct(|_| Ok(Holder));
  let factory = DefaultPeaFactory::new();
  factory.register_readable_type(frozen.clone());
  factory
    .register_shared_pea("frozen", Pea::new(&frozen.pointer(), Frozen))
    .unwrap();
  factory.register_pea_definition("holder", PeaDefinition::new(new_holder));

  let err = factory.pea("holder").unwrap_err();

  assert!(matches!(err.root_cause(), PeaError::NotCopyable(_)));
}

// --- Container management ---

#[test]
fn test_pre_instantiation_builds_only_shared_peas() {
  struct Eager;
  struct Lazy;

  let builds = Arc::new(Mutex::new(Vec::new()));
  let eager = Type::structure::<Eager>().build();
  let lazy = Type::structure::<Lazy>().build();
  let log = Arc::clone(&builds);
  let new_eager = Type::constructor("new_eager", &eager).construct(move |_| {
    log.lock().unwrap().push("eager");
    Ok(Eager)
  });
  let log = Arc::clone(&builds);
  let new_lazy = Type::constructor("new_lazy", &lazy).construct(move |_| {
    log.lock().unwrap().push("lazy");
    Ok(Lazy)
  });
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("eager", PeaDefinition::new(new_eager));
  factory.register_pea_definition("lazy", PeaDefinition::new(new_lazy).with_scope(PROTOTYPE_SCOPE));

  factory.pre_instantiate_shared_peas().unwrap();

  assert_eq!(builds.lock().unwrap().clone(), vec!["eager"]);
  assert!(factory.shared_pea_registry().contains_shared_pea("eager"));
  assert!(!factory.shared_pea_registry().contains_shared_pea("lazy"));
}

#[test]
fn test_pre_instantiation_reports_failures() {
  struct NoZero;

  let no_zero = Type::structure::<NoZero>().build();
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("broken", PeaDefinition::new(no_zero));

  let err = factory.pre_instantiate_shared_peas().unwrap_err();

  assert_eq!(err.pea_name(), Some("broken"));
}

// Registers a definition the application never declared itself.
struct LateDefinitions {
  target: Type,
}

impl PeaDefinitionRegistryProcessor for LateDefinitions {
  fn after_pea_definition_registry_initialization(
    &self,
    registry: &PeaDefinitionRegistry,
  ) -> fibre_peas::Result<()> {
    registry.register_pea_definition("late", PeaDefinition::new(self.target.clone()));
    Ok(())
  }
}

// Records the definitions each factory holds when it is handed over.
struct Inspector {
  seen: Arc<Mutex<Vec<String>>>,
  fail: bool,
}

impl PeaFactoryProcessor for Inspector {
  fn after_pea_factory_initialization(
    &self,
    factory: &dyn ConfigurablePeaFactory,
  ) -> fibre_peas::Result<()> {
    if self.fail {
      return Err(PeaError::InvalidArgument("factory rejected".to_string()));
    }
    let mut names = factory.pea_definition_registry().pea_definition_names();
    names.sort();
    self.seen.lock().unwrap().extend(names);
    Ok(())
  }
}

#[test]
fn test_setup_processors_run_before_pre_instantiation() {
  // Arrange
  let target = Type::structure::<Target>().default_zero().build();
  let seen = Arc::new(Mutex::new(Vec::new()));
  let factory = DefaultPeaFactory::builder()
    .definition_registry_processor(LateDefinitions { target: target.clone() })
    .factory_processor(Inspector {
      seen: Arc::clone(&seen),
      fail: false,
    })
    .build()
    .unwrap();
  factory.register_pea_definition("early", PeaDefinition::new(target));

  // Act
  factory.pre_instantiate_shared_peas().unwrap();

  // Assert: the factory processor already sees the added definition.
  assert_eq!(seen.lock().unwrap().clone(), vec!["early", "late"]);
  assert!(factory.shared_pea_registry().contains_shared_pea("early"));
  assert!(factory.shared_pea_registry().contains_shared_pea("late"));
}

#[test]
fn test_failing_factory_processor_aborts_pre_instantiation() {
  // Arrange
  let target = Type::structure::<Target>().default_zero().build();
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("target", PeaDefinition::new(target));
  factory.add_pea_factory_processor(Arc::new(Inspector {
    seen: Arc::new(Mutex::new(Vec::new())),
    fail: true,
  }));

  // Act
  let err = factory.pre_instantiate_shared_peas().unwrap_err();

  // Assert
  assert!(matches!(err, PeaError::InvalidArgument(_)));
  assert!(!factory.shared_pea_registry().contains_shared_pea("target"));
}

#[test]
fn test_cloned_factory_shares_registries() {
  // Arrange
  let target = Type::structure::<Target>().default_zero().build();
  let original = DefaultPeaFactory::new();
  original.register_pea_definition("target", PeaDefinition::new(target.clone()));
  original.register_alias("target", "main").unwrap();
  let built = original.pea("target").unwrap();

  // Act
  let clone = original.clone_pea_factory();
  clone.register_pea_definition("added", PeaDefinition::new(target.clone()));
  clone.register_alias("added", "extra").unwrap();
  clone.register_type_to_scope(&target, PROTOTYPE_SCOPE).unwrap();

  // Assert: definitions and shared peas are shared, configuration is copied.
  assert!(clone.pea("main").unwrap().ptr_eq(&built));
  assert!(original.pea_definition_registry().contains_pea_definition("added"));
  assert!(!original.contains_pea("extra"));
  let p1 = original.pea("added").unwrap();
  assert!(p1.ptr_eq(&original.pea("added").unwrap()));
  assert!(clone.shared_pea_registry().contains_shared_pea("added"));
}

#[test]
fn test_containers_are_isolated() {
  let target = Type::structure::<Target>().default_zero().build();
  let first = DefaultPeaFactory::new();
  let second = DefaultPeaFactory::new();
  first.register_pea_definition("target", PeaDefinition::new(target.clone()));
  second.register_pea_definition("target", PeaDefinition::new(target));

  let a = first.pea("target").unwrap();
  let b = second.pea("target").unwrap();

  assert!(!a.ptr_eq(&b));
  first.shared_pea_registry().clear();
  assert!(second.shared_pea_registry().contains_shared_pea("target"));
  assert!(!first.shared_pea_registry().contains_shared_pea("target"));
}

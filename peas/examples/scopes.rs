use fibre_peas::{ConfigurablePeaFactory, DefaultPeaFactory, PeaDefinition, PeaFactory, Type, PROTOTYPE_SCOPE};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

// A simple component that gets a unique ID upon creation.
struct RequestTracker {
  id: usize,
}

// A global, thread-safe counter to generate unique IDs.
static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn main() -> fibre_peas::Result<()> {
  // Run with RUST_LOG=fibre_peas=debug to watch the container at work.
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let tracker = Type::structure::<RequestTracker>().build();
  let new_tracker = Type::constructor("new_tracker", &tracker).construct(|_| {
    println!("Creating RequestTracker...");
    Ok(RequestTracker {
      id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
    })
  });

  let factory = DefaultPeaFactory::new();
  // --- Shared Registration ---
  // The constructor will only be called ONCE for this name.
  factory.register_pea_definition("shared_tracker", PeaDefinition::new(new_tracker.clone()));
  // --- Prototype Registration ---
  // The constructor will be called EVERY time the pea is resolved.
  factory.register_pea_definition(
    "prototype_tracker",
    PeaDefinition::new(new_tracker).with_scope(PROTOTYPE_SCOPE),
  );

  println!("--- Resolving Shared Peas ---");
  let s1 = factory.pea("shared_tracker")?;
  let s2 = factory.pea("shared_tracker")?;
  let (t1, t2) = (downcast(&s1), downcast(&s2));
  println!("Shared 1 ID: {}, Shared 2 ID: {}", t1.id, t2.id);
  assert_eq!(t1.id, 0);
  assert!(Arc::ptr_eq(&t1, &t2), "Shared instances should be identical");
  println!("Shared instances are the same pointer, as expected.\n");

  println!("--- Resolving Prototype Peas ---");
  let p1 = downcast(&factory.pea("prototype_tracker")?);
  let p2 = downcast(&factory.pea("prototype_tracker")?);
  println!("Prototype 1 ID: {}, Prototype 2 ID: {}", p1.id, p2.id);
  assert_eq!(p1.id, 1);
  assert_eq!(p2.id, 2);
  assert!(!Arc::ptr_eq(&p1, &p2), "Prototype instances should be different");
  println!("Prototype instances are different pointers, as expected.");
  Ok(())
}

fn downcast(pea: &fibre_peas::Pea) -> Arc<RequestTracker> {
  pea.downcast::<RequestTracker>().expect("pea should hold a RequestTracker")
}

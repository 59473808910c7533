use fibre_peas::{ConfigurablePeaFactory, DefaultPeaFactory, Pea, PeaDefinition, PeaFactory, Type};

struct DataSource {
  label: String,
}

struct AppName(String);

struct Processor {
  output: String,
}

// Configures a child container and runs some logic against it.
// By accepting the child, it can be tested with a controlled environment.
fn process_data(container: &DefaultPeaFactory, data_source: &Type) -> fibre_peas::Result<String> {
  let processor = Type::structure::<Processor>().build();
  let new_processor = Type::constructor("new_processor", &processor)
    .param(data_source)
    .construct(|args| {
      let source = args.get::<DataSource>(0)?;
      Ok(Processor {
        output: format!("Processed: {}", source.label.to_uppercase()),
      })
    });
  container.register_pea_definition("processor", PeaDefinition::new(new_processor));

  let processor = container.pea("processor")?;
  Ok(processor
    .downcast::<Processor>()
    .map(|processor| processor.output.clone())
    .unwrap_or_default())
}

fn main() -> fibre_peas::Result<()> {
  let data_source = Type::structure::<DataSource>().build();
  let app_name = Type::structure::<AppName>().build();

  // --- A parent container holding shared infrastructure ---
  let parent = DefaultPeaFactory::new();
  parent.register_shared_pea("appName", Pea::new(&app_name, AppName("fibre".to_string())))?;

  // --- A child container that only adds what it needs ---
  println!("--- Running with a child container ---");
  let child = DefaultPeaFactory::builder().parent(parent.clone()).build()?;
  child.register_shared_pea(
    "dataSource",
    Pea::new(
      &data_source,
      DataSource {
        label: "child data".to_string(),
      },
    ),
  )?;
  let result = process_data(&child, &data_source)?;

  println!("Result: {}", result);
  assert_eq!(result, "Processed: CHILD DATA");

  // --- Verify Isolation ---
  // The pea registered in the child should NOT exist in the parent container.
  assert!(
    !parent.contains_pea("processor"),
    "Pea should not have leaked into the parent container!"
  );
  // The child still sees everything the parent holds.
  let name = child.pea_by_name_and_type("appName", &app_name)?;
  assert!(name.ptr_eq(&parent.pea("appName")?));
  if let Some(name) = name.downcast::<AppName>() {
    println!("Application name inherited from the parent: {}", name.0);
  }

  println!("\nVerified that the child container is isolated from its parent.");
  Ok(())
}

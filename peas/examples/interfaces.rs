use fibre_peas::{resolve, ConfigurablePeaFactory, DefaultPeaFactory, PeaDefinition, Type};
use std::sync::Arc;

// 1. Define the abstraction (the trait)
trait Logger: Send + Sync {
  fn log(&self, message: &str);
}

// 2. Define a concrete implementation
#[derive(Default)]
struct ConsoleLogger;

impl Logger for ConsoleLogger {
  fn log(&self, message: &str) {
    println!("[CONSOLE LOG]: {}", message);
  }
}

// 3. Define a component that depends on the abstraction
struct ReportService {
  logger: Arc<dyn Logger>,
}

impl ReportService {
  fn generate_report(&self) {
    self.logger.log("Starting report generation.");
    self.logger.log("Finished report generation.");
  }
}

fn main() {
  // --- Description ---
  // The container only knows what it is told: ConsoleLogger can be viewed as `dyn Logger`.
  let logger = Type::interface::<dyn Logger>();
  let console_logger = Type::structure::<ConsoleLogger>()
    .default_zero()
    .implements(|console| console as Arc<dyn Logger>)
    .build();
  let report_service = Type::structure::<ReportService>().build();

  // ReportService's constructor declares its dependency instead of looking it up.
  let new_report_service = Type::constructor("new_report_service", &report_service)
    .param(&logger)
    .construct(|args| {
      let logger = args
        .cast::<dyn Logger>(0)?
        .unwrap_or_else(|| Arc::new(ConsoleLogger) as Arc<dyn Logger>);
      Ok(ReportService { logger })
    });

  // --- Registration ---
  let factory = DefaultPeaFactory::new();
  factory.register_pea_definition("consoleLogger", PeaDefinition::new(console_logger));
  factory.register_pea_definition("reportService", PeaDefinition::new(new_report_service));

  // --- Resolution and Usage ---
  println!("Resolving the high-level service...");
  let service = resolve!(factory, "reportService" => ReportService);

  println!("Using the service...");
  service.generate_report();

  // The injected logger is the shared `consoleLogger` pea.
  let shared_logger = resolve!(factory, "consoleLogger" => trait Logger);
  assert!(Arc::ptr_eq(&shared_logger, &service.logger));
}

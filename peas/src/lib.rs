//! # Fibre Peas
//!
//! A thread-safe Inversion of Control (IoC) container that wires components
//! ("peas") together by type.
//!
//! Peas are described by [`PeaDefinition`]s: a [`Type`] (a value type or a
//! constructor function) and a scope. When a pea is requested, the factory
//! resolves every constructor parameter against the registered definitions and
//! shared instances, builds the pea, runs its lifecycle hooks and, for the
//! `shared` scope, caches it for the lifetime of the container.
//!
//! ## Core Concepts
//!
//! - **[`Type`]**: a runtime descriptor telling the container what a type is,
//!   which interfaces (trait objects) it implements and which structs it embeds.
//! - **[`DefaultPeaFactory`]**: the container. Each factory owns its registries;
//!   there is no global instance.
//! - **Scopes**: `shared` (one instance per container), `prototype` (a new
//!   instance per request) or any custom [`PeaScope`].
//! - **[`PeaProcessor`]s**: hooks run before and after a pea's initializer.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_peas::{ConfigurablePeaFactory, DefaultPeaFactory, PeaDefinition, PeaFactory, Type};
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!   fn greet(&self) -> String;
//! }
//!
//! #[derive(Clone, Default)]
//! struct Message(String);
//!
//! struct EnglishGreeter {
//!   message: Arc<Message>,
//! }
//!
//! impl Greeter for EnglishGreeter {
//!   fn greet(&self) -> String {
//!     self.message.0.clone()
//!   }
//! }
//!
//! let message = Type::structure::<Message>().default_zero().build();
//! let greeter = Type::structure::<EnglishGreeter>()
//!   .implements(|greeter| greeter as Arc<dyn Greeter>)
//!   .build();
//! let new_greeter = Type::constructor("new_greeter", &greeter)
//!   .param(&message)
//!   .construct(|args| Ok(EnglishGreeter { message: args.get::<Message>(0)? }));
//!
//! let factory = DefaultPeaFactory::new();
//! factory.register_shared_pea("message", fibre_peas::Pea::new(&message, Message("Hello, World!".into())))?;
//! factory.register_pea_definition("greeter", PeaDefinition::new(new_greeter));
//!
//! // Resolve by interface: the only pea implementing `dyn Greeter` is chosen.
//! let pea = factory.pea_by_type(&Type::interface::<dyn Greeter>())?;
//! let service = pea.cast::<dyn Greeter>().unwrap();
//! assert_eq!(service.greet(), "Hello, World!");
//! # Ok::<(), fibre_peas::PeaError>(())
//! ```

mod builder;
mod core;
mod definition;
mod error;
mod factory;
mod macros;
mod pea;
mod processor;
mod registry;
mod scope;
mod types;

pub use builder::PeaFactoryBuilder;
pub use definition::{PeaDefinition, PeaDefinitionHolder, PeaDefinitionRegistry};
pub use error::{PeaError, Result};
pub use factory::{ConfigurablePeaFactory, DefaultPeaFactory, PeaFactory, PeaFactoryAware, PeaInitializer};
pub use pea::{Args, Pea};
pub use processor::{PeaDefinitionRegistryProcessor, PeaFactoryProcessor, PeaProcessor, PeaProcessors};
pub use registry::{ConcurrentPreparation, SharedPeaRegistry};
pub use scope::{PeaScope, ScopeRegistry, ThreadScope, PROTOTYPE_SCOPE, SHARED_SCOPE};
pub use types::{matches, FunctionBuilder, Kind, Type, TypeBuilder};

//! tabfhir Core
//!
//! Converts tabular FHIR field mappings into transaction bundles.
//! This crate provides the path model, the tree builder, reference linking,
//! bundle assembly, input ingestion and configuration.

pub mod config;
pub mod error;
pub mod export;
pub mod ids;
pub mod ingest;
pub mod model;
pub mod path;
pub mod result;

// Re-export commonly used types
pub use config::{ConfigLoader, TabfhirConfig};
pub use error::{ErrorKind, TabfhirError};
pub use export::{
    BuildError, Converter, HandlerRegistry, ReferenceLinker, SpecialHandler, SubjectOutcome,
    TransactionBundle, TreeBuilder,
};
pub use ids::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use ingest::{ConversionInput, InputIssue, IssueSeverity, load_input};
pub use model::{FieldMapping, ResourceDefinition, ResourceDocument, ResourceLinkSpec};
pub use path::{PathError, PathExpression, PathSegment, Qualifier};
pub use result::{Result, ResultExt};

/// Initialize the tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tabfhir=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

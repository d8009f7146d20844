//! Bundle export
//!
//! Turns field mappings into resource documents and wraps them into
//! transaction bundles.
//!
//! ## Modules
//!
//! - `tree_builder` - path-driven writes into a document tree
//! - `special_handlers` - prefix-keyed overrides of the default traversal
//! - `leaf_formatter` - value shaping by declared type
//! - `reference_linker` - implicit and authored cross-resource references
//! - `bundle_assembler` - transaction bundle envelope
//! - `converter` - per-subject orchestration

pub mod bundle_assembler;
pub mod converter;
pub mod leaf_formatter;
pub mod reference_linker;
pub mod special_handlers;
pub mod tree_builder;

pub use bundle_assembler::{BundleAssembler, BundleEntry, BundleRequest, TransactionBundle};
pub use converter::{ConversionStats, Converter, SubjectOutcome};
pub use leaf_formatter::{FormatError, LeafFormatter, TypedLeafFormatter, ValueType};
pub use reference_linker::{
    ARRAY_REFERENCE_FIELDS, DEFAULT_LINK_RULES, LinkReport, LinkRule, ReferenceLinker,
};
pub use special_handlers::{
    CodeableConceptHandler, HandlerContext, HandlerKind, HandlerRegistry, QuantityHandler,
    SpecialHandler,
};
pub use tree_builder::{BuildError, TreeBuilder, kind_name};

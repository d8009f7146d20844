//! Special-handler registry
//!
//! Some document shapes are awkward to express with the generic path
//! algorithm (a value-set column that has to expand into several fields, a
//! quantity string that carries its unit). A [`SpecialHandler`] registered for
//! a path prefix takes full ownership of every matching write at the key the
//! prefix ends on; the tree builder consults the registry before any default
//! traversal.

use super::leaf_formatter::{codeable_concept, format_value, parse_coding, raw_text};
use super::tree_builder::{BuildError, kind_name};
use super::{FormatError, ValueType};
use crate::model::{FieldMapping, ResourceDefinition};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

/// Everything a handler may inspect about the write it took over
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    /// Full path expression as authored
    pub path: &'a str,
    pub definition: &'a ResourceDefinition,
    pub field: &'a FieldMapping,
    pub value_type: &'a ValueType,
}

/// Override logic for a family of paths
pub trait SpecialHandler: Send + Sync {
    /// Name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Write `value` under `key`, returning the mutated node
    fn assign(
        &self,
        context: &HandlerContext<'_>,
        node: JsonValue,
        key: &str,
        value: &JsonValue,
    ) -> Result<JsonValue, BuildError>;
}

/// Built-in handler kinds selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerKind {
    /// `system|code|display` expanded into a CodeableConcept
    CodeableConcept,
    /// `<number> <unit>` expanded into a UCUM Quantity
    Quantity,
}

impl HandlerKind {
    pub fn create(self) -> Box<dyn SpecialHandler> {
        match self {
            HandlerKind::CodeableConcept => Box::new(CodeableConceptHandler),
            HandlerKind::Quantity => Box::new(QuantityHandler),
        }
    }
}

/// Prefix-keyed handler lookup
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<(String, Box<dyn SpecialHandler>)>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Observation value handlers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("Observation.valueQuantity", Box::new(QuantityHandler));
        registry.register(
            "Observation.valueCodeableConcept",
            Box::new(CodeableConceptHandler),
        );
        registry
    }

    /// Register a handler for a path prefix
    ///
    /// Earlier registrations win when several prefixes match.
    pub fn register(&mut self, prefix: impl Into<String>, handler: Box<dyn SpecialHandler>) {
        let prefix = prefix.into();
        debug!("Registering special handler '{}' for '{}'", handler.name(), prefix);
        self.handlers.push((prefix, handler));
    }

    /// First handler whose prefix equals the path or starts it at a segment boundary
    pub fn find(&self, path: &str) -> Option<(&str, &dyn SpecialHandler)> {
        self.handlers
            .iter()
            .find(|(prefix, _)| covers(prefix, path))
            .map(|(prefix, handler)| (prefix.as_str(), handler.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(prefix, handler)| (prefix, handler.name())))
            .finish()
    }
}

/// `prefix` covers `path` when the remainder starts a new segment or qualifier
fn covers(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['.', '[']))
}

fn insert(node: JsonValue, key: &str, value: JsonValue) -> Result<JsonValue, BuildError> {
    match node {
        JsonValue::Object(mut map) => {
            map.insert(key.to_string(), value);
            Ok(JsonValue::Object(map))
        }
        other => Err(BuildError::TypeMismatch {
            segment: key.to_string(),
            expected: "object",
            found: kind_name(&other),
        }),
    }
}

/// Expands `system|code|display` into a CodeableConcept
///
/// The field's value-set column supplies the coding system when the value
/// carries none.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeableConceptHandler;

impl SpecialHandler for CodeableConceptHandler {
    fn name(&self) -> &str {
        "codeable-concept"
    }

    fn assign(
        &self,
        context: &HandlerContext<'_>,
        node: JsonValue,
        key: &str,
        value: &JsonValue,
    ) -> Result<JsonValue, BuildError> {
        if value.is_object() {
            return insert(node, key, value.clone());
        }
        let text = raw_text(value);
        let coding = parse_coding(&text, context.field.value_set.as_deref()).ok_or_else(|| {
            FormatError::new("CodeableConcept", text.clone(), "expected system|code|display")
        })?;
        insert(node, key, codeable_concept(coding))
    }
}

/// Expands `<number> <unit>` into a UCUM Quantity
#[derive(Debug, Default, Clone, Copy)]
pub struct QuantityHandler;

impl SpecialHandler for QuantityHandler {
    fn name(&self) -> &str {
        "quantity"
    }

    fn assign(
        &self,
        _context: &HandlerContext<'_>,
        node: JsonValue,
        key: &str,
        value: &JsonValue,
    ) -> Result<JsonValue, BuildError> {
        let quantity = format_value(value, &ValueType::Quantity)?;
        insert(node, key, quantity)
    }
}

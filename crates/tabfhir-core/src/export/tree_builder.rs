//! Tree Builder
//!
//! Writes one field value into a resource document by walking the field's
//! path expression, creating intermediate objects and arrays on the way.
//!
//! # Algorithm
//!
//! Recursive descent over `(node, remaining segments)`. Every step takes the
//! node by value and returns the (possibly new) node; the caller writes the
//! result back into the parent slot.
//!
//! 1. A special handler whose prefix covers the path takes over the write at
//!    the key the prefix ends on
//! 2. Leading `$` and resource-type segments are skipped
//! 3. The terminal segment hands the value to the leaf formatter
//! 4. `key[n]`, `[n]` and `key[name=value]` ensure arrays and pick an element
//! 5. Plain segments ensure an object
//!
//! Arrays are extended with `{}` placeholders until `len == n + 1`; existing
//! elements are never truncated. A key first seen as an object and later
//! qualified is promoted to an (empty) array.
//!
//! # Example
//!
//! ```rust
//! use tabfhir_core::export::TreeBuilder;
//! use tabfhir_core::model::{FieldMapping, ResourceDefinition};
//! use serde_json::json;
//!
//! let builder = TreeBuilder::default();
//! let definition = ResourceDefinition::new("PatientEntity", "Patient");
//! let field = FieldMapping::new("PatientEntity", "Patient.name[use=official].family", "string");
//!
//! let node = builder.apply(json!({}), &definition, &field, &json!("Smith")).unwrap();
//! assert_eq!(node, json!({"name": [{"use": "official", "family": "Smith"}]}));
//! ```

use super::leaf_formatter::{FormatError, LeafFormatter, TypedLeafFormatter, ValueType};
use super::special_handlers::{HandlerContext, HandlerRegistry, SpecialHandler};
use crate::model::{FieldMapping, ResourceDefinition, ResourceDocument};
use crate::path::{PathError, PathExpression, PathSegment, Qualifier};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{trace, warn};

/// Key the formatter writes under when the destination is an array slot
const SLOT_KEY: &str = "$slot";

/// Errors raised while applying a path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The path could not be tokenized
    #[error(transparent)]
    Path(#[from] PathError),

    /// A container of the wrong shape was found
    #[error("Expected {expected} at '{segment}', found {found}")]
    TypeMismatch {
        segment: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Nothing is left to assign once the root segments are skipped
    #[error("Path '{path}' has no segment to assign after the root")]
    NoTerminal { path: String },

    /// The leaf formatter or a handler rejected the value
    #[error(transparent)]
    Value(#[from] FormatError),
}

impl BuildError {
    /// Structural errors abort the document; value errors only skip the field
    pub fn is_structural(&self) -> bool {
        !matches!(self, BuildError::Value(_))
    }
}

/// Human-readable name of a JSON node kind
pub fn kind_name(node: &JsonValue) -> &'static str {
    match node {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Map::new())
}

/// One field write in flight
struct Assignment<'a> {
    context: HandlerContext<'a>,
    value: &'a JsonValue,
    /// Handler that owns the key the claimed prefix ends on
    handler: Option<&'a dyn SpecialHandler>,
}

/// Path-driven document builder
pub struct TreeBuilder {
    handlers: HandlerRegistry,
    formatter: Box<dyn LeafFormatter>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new(HandlerRegistry::with_defaults(), Box::new(TypedLeafFormatter))
    }
}

impl TreeBuilder {
    pub fn new(handlers: HandlerRegistry, formatter: Box<dyn LeafFormatter>) -> Self {
        Self {
            handlers,
            formatter,
        }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Write one field value into a document
    ///
    /// On error the document is left exactly as it was.
    pub fn assign(
        &self,
        document: &mut ResourceDocument,
        definition: &ResourceDefinition,
        field: &FieldMapping,
        value: &JsonValue,
    ) -> Result<(), BuildError> {
        let built = self.apply(document.resource.clone(), definition, field, value)?;
        document.resource = built;
        Ok(())
    }

    /// Apply a field's path to a node and return the mutated node
    pub fn apply(
        &self,
        node: JsonValue,
        definition: &ResourceDefinition,
        field: &FieldMapping,
        value: &JsonValue,
    ) -> Result<JsonValue, BuildError> {
        let path = PathExpression::parse(&field.path)?;
        let value_type = ValueType::from_tag(&field.value_type);
        let mut assignment = Assignment {
            context: HandlerContext {
                path: path.as_str(),
                definition,
                field,
                value_type: &value_type,
            },
            value,
            handler: None,
        };

        let Some((prefix, handler)) = self.handlers.find(path.as_str()) else {
            return self.build(&assignment, node, path.segments(), true);
        };

        trace!(
            "Path '{}' handled by '{}' (prefix '{}')",
            path,
            handler.name(),
            prefix
        );
        let claimed = PathExpression::parse(prefix)?;
        if let Some(last) = claimed.segments().last()
            && last.qualifier.is_some()
        {
            return Err(BuildError::TypeMismatch {
                segment: last.to_string(),
                expected: "unqualified handler prefix",
                found: "qualifier",
            });
        }
        let segments = path
            .segments()
            .get(..claimed.segments().len())
            .unwrap_or(path.segments());
        assignment.handler = Some(handler);
        self.build(&assignment, node, segments, true)
    }

    fn build(
        &self,
        assignment: &Assignment<'_>,
        node: JsonValue,
        segments: &[PathSegment],
        leading: bool,
    ) -> Result<JsonValue, BuildError> {
        let Some((segment, rest)) = segments.split_first() else {
            return Err(BuildError::NoTerminal {
                path: assignment.context.path.to_string(),
            });
        };

        if leading && segment.is_root_skip(&assignment.context.definition.resource_type) {
            trace!("Skipping root segment '{}'", segment);
            return self.build(assignment, node, rest, true);
        }

        trace!("Applying segment '{}' ({} remaining)", segment, rest.len());

        if rest.is_empty() {
            match assignment.handler {
                Some(handler) => hand_off(assignment, handler, node, segment),
                None => self.assign_terminal(assignment, node, segment),
            }
        } else {
            self.descend(assignment, node, segment, rest)
        }
    }

    fn assign_terminal(
        &self,
        assignment: &Assignment<'_>,
        node: JsonValue,
        segment: &PathSegment,
    ) -> Result<JsonValue, BuildError> {
        let value_type = assignment.context.value_type;

        match (&segment.key, &segment.qualifier) {
            (Some(key), None) => {
                let mut map = expect_object(node, segment)?;
                self.formatter
                    .assign_leaf(&mut map, key, assignment.value, value_type)?;
                Ok(JsonValue::Object(map))
            }
            (Some(key), Some(Qualifier::Index(index))) => {
                let mut map = expect_object(node, segment)?;
                let formatted = self.format_slot(assignment)?;
                let items = ensure_array(&mut map, key, segment)?;
                extend_to(items, *index);
                items[*index] = formatted;
                Ok(JsonValue::Object(map))
            }
            (None, Some(Qualifier::Index(index))) => {
                let mut items = coerce_to_array(node, segment)?;
                extend_to(&mut items, *index);
                items[*index] = self.format_slot(assignment)?;
                Ok(JsonValue::Array(items))
            }
            (Some(key), Some(Qualifier::Predicate { name, value })) => {
                let mut map = expect_object(node, segment)?;
                let formatted = match self.format_slot(assignment)? {
                    JsonValue::Object(fields) => fields,
                    other => {
                        return Err(BuildError::TypeMismatch {
                            segment: segment.to_string(),
                            expected: "object value",
                            found: kind_name(&other),
                        });
                    }
                };
                let items = predicate_array(&mut map, key, name, segment)?;
                let position = find_or_create(items, name, value);
                match &mut items[position] {
                    JsonValue::Object(element) => {
                        for (field, field_value) in formatted {
                            element.insert(field, field_value);
                        }
                    }
                    other => {
                        return Err(BuildError::TypeMismatch {
                            segment: segment.to_string(),
                            expected: "object",
                            found: kind_name(other),
                        });
                    }
                }
                Ok(JsonValue::Object(map))
            }
            (None, Some(Qualifier::Predicate { .. })) | (None, None) => {
                Err(BuildError::TypeMismatch {
                    segment: segment.to_string(),
                    expected: "field name",
                    found: "bare qualifier",
                })
            }
        }
    }

    fn descend(
        &self,
        assignment: &Assignment<'_>,
        node: JsonValue,
        segment: &PathSegment,
        rest: &[PathSegment],
    ) -> Result<JsonValue, BuildError> {
        match (&segment.key, &segment.qualifier) {
            (Some(key), None) => {
                let mut map = expect_object(node, segment)?;
                let child = std::mem::take(map.entry(key.clone()).or_insert_with(empty_object));
                let built = self.build(assignment, child, rest, false)?;
                map.insert(key.clone(), built);
                Ok(JsonValue::Object(map))
            }
            (None, Some(Qualifier::Index(index))) => {
                let mut items = coerce_to_array(node, segment)?;
                extend_to(&mut items, *index);
                let child = std::mem::take(&mut items[*index]);
                items[*index] = self.build(assignment, child, rest, false)?;
                Ok(JsonValue::Array(items))
            }
            (Some(key), Some(Qualifier::Index(index))) => {
                let mut map = expect_object(node, segment)?;
                let items = ensure_array(&mut map, key, segment)?;
                extend_to(items, *index);
                let child = std::mem::take(&mut items[*index]);
                items[*index] = self.build(assignment, child, rest, false)?;
                Ok(JsonValue::Object(map))
            }
            (Some(key), Some(Qualifier::Predicate { name, value })) => {
                let mut map = expect_object(node, segment)?;
                let items = predicate_array(&mut map, key, name, segment)?;
                let position = find_or_create(items, name, value);
                let child = std::mem::take(&mut items[position]);
                items[position] = self.build(assignment, child, rest, false)?;
                Ok(JsonValue::Object(map))
            }
            (None, Some(Qualifier::Predicate { .. })) | (None, None) => {
                Err(BuildError::TypeMismatch {
                    segment: segment.to_string(),
                    expected: "field name",
                    found: "bare qualifier",
                })
            }
        }
    }

    /// Format the value for an array slot via a scratch map
    fn format_slot(&self, assignment: &Assignment<'_>) -> Result<JsonValue, BuildError> {
        let mut scratch = Map::new();
        self.formatter.assign_leaf(
            &mut scratch,
            SLOT_KEY,
            assignment.value,
            assignment.context.value_type,
        )?;
        scratch.remove(SLOT_KEY).ok_or_else(|| {
            BuildError::Value(FormatError::new(
                assignment.context.value_type.to_string(),
                super::leaf_formatter::raw_text(assignment.value),
                "formatter produced no value",
            ))
        })
    }
}

impl std::fmt::Debug for TreeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

/// Let a handler write the whole value at the segment's key
fn hand_off(
    assignment: &Assignment<'_>,
    handler: &dyn SpecialHandler,
    node: JsonValue,
    segment: &PathSegment,
) -> Result<JsonValue, BuildError> {
    let Some(key) = segment.key.as_deref() else {
        return Err(BuildError::TypeMismatch {
            segment: segment.to_string(),
            expected: "field name",
            found: "bare qualifier",
        });
    };
    handler.assign(&assignment.context, node, key, assignment.value)
}

fn expect_object(node: JsonValue, segment: &PathSegment) -> Result<Map<String, JsonValue>, BuildError> {
    match node {
        JsonValue::Object(map) => Ok(map),
        // A slot freshly taken out of its parent
        JsonValue::Null => Ok(Map::new()),
        other => Err(BuildError::TypeMismatch {
            segment: segment.to_string(),
            expected: "object",
            found: kind_name(&other),
        }),
    }
}

/// The node itself must be an array; an empty object is coerced
fn coerce_to_array(node: JsonValue, segment: &PathSegment) -> Result<Vec<JsonValue>, BuildError> {
    match node {
        JsonValue::Array(items) => Ok(items),
        JsonValue::Object(map) if map.is_empty() => Ok(Vec::new()),
        JsonValue::Null => Ok(Vec::new()),
        other => Err(BuildError::TypeMismatch {
            segment: segment.to_string(),
            expected: "array",
            found: kind_name(&other),
        }),
    }
}

/// Ensure `map[key]` is an array, promoting an object to a fresh array
fn ensure_array<'m>(
    map: &'m mut Map<String, JsonValue>,
    key: &str,
    segment: &PathSegment,
) -> Result<&'m mut Vec<JsonValue>, BuildError> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| JsonValue::Array(Vec::new()));

    if slot.is_object() {
        if slot.as_object().is_some_and(|object| !object.is_empty()) {
            warn!(
                "Promoting '{}' from object to array discards its fields: {}",
                key, slot
            );
        }
        *slot = JsonValue::Array(Vec::new());
    }

    match slot {
        JsonValue::Array(items) => Ok(items),
        other => Err(BuildError::TypeMismatch {
            segment: segment.to_string(),
            expected: "array",
            found: kind_name(other),
        }),
    }
}

/// Array searched by a predicate, redirected into `coding` for coded values
fn predicate_array<'m>(
    map: &'m mut Map<String, JsonValue>,
    key: &str,
    name: &str,
    segment: &PathSegment,
) -> Result<&'m mut Vec<JsonValue>, BuildError> {
    if key == "coding" || !matches!(name, "code" | "system") {
        return ensure_array(map, key, segment);
    }

    trace!("Redirecting predicate on '{}' into '{}.coding'", name, key);
    let slot = map.entry(key.to_string()).or_insert_with(empty_object);
    let concept = match slot {
        JsonValue::Array(items) => {
            if items.is_empty() {
                items.push(empty_object());
            }
            &mut items[0]
        }
        other => other,
    };
    match concept {
        JsonValue::Object(concept) => ensure_array(concept, "coding", segment),
        other => Err(BuildError::TypeMismatch {
            segment: segment.to_string(),
            expected: "object",
            found: kind_name(other),
        }),
    }
}

/// Grow an array with `{}` placeholders until `index` is addressable
fn extend_to(items: &mut Vec<JsonValue>, index: usize) {
    if items.len() < index + 1 {
        items.resize_with(index + 1, empty_object);
    }
}

fn predicate_matches(element: &JsonValue, name: &str, value: &str) -> bool {
    match element.get(name) {
        Some(JsonValue::String(text)) => text == value,
        Some(JsonValue::Number(number)) => number.to_string() == value,
        Some(JsonValue::Bool(flag)) => flag.to_string() == value,
        _ => false,
    }
}

/// Position of the first element whose `name` equals `value`, appending one if absent
fn find_or_create(items: &mut Vec<JsonValue>, name: &str, value: &str) -> usize {
    if let Some(position) = items
        .iter()
        .position(|element| predicate_matches(element, name, value))
    {
        return position;
    }

    let mut element = Map::new();
    element.insert(name.to_string(), JsonValue::String(value.to_string()));
    items.push(JsonValue::Object(element));
    items.len() - 1
}

//! Path expression model
//!
//! Tokenizes the compact dotted paths used in field mappings
//! (`$.name[use=official].given[0]`) into segments and classifies the
//! bracketed qualifier each segment carries.
//!
//! Dots inside a qualifier do not split segments, so predicates such as
//! `coding[system=http://loinc.org].code` keep their full value.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Literal root marker accepted at the start of a path
pub const ROOT_MARKER: &str = "$";

/// Errors produced while tokenizing a path expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Empty path expression")]
    EmptyPath,

    #[error("Empty segment in path '{path}'")]
    EmptySegment { path: String },

    #[error("Unclosed qualifier bracket in segment '{segment}' of path '{path}'")]
    UnclosedBracket { path: String, segment: String },

    #[error("Unexpected characters after qualifier in segment '{segment}' of path '{path}'")]
    TrailingCharacters { path: String, segment: String },

    #[error("Qualifier '[{qualifier}]' in path '{path}' is neither an index nor a predicate")]
    InvalidQualifier { path: String, qualifier: String },

    #[error("Bare qualifier '[{qualifier}]' in path '{path}' must be a non-negative integer")]
    BareQualifier { path: String, qualifier: String },
}

/// Bracketed qualifier attached to a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    /// Positional array index: `[0]`
    Index(usize),
    /// Equality predicate: `[use=official]`
    Predicate { name: String, value: String },
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Index(index) => write!(f, "[{index}]"),
            Qualifier::Predicate { name, value } => write!(f, "[{name}={value}]"),
        }
    }
}

/// Classification of a segment by the qualifier it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// `key`
    Plain,
    /// `[n]`
    BareIndex,
    /// `key[n]`
    KeyedIndex,
    /// `key[name=value]`
    Predicate,
}

/// One dot-delimited unit of a path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Field name; `None` for a bare `[n]` segment
    pub key: Option<String>,
    pub qualifier: Option<Qualifier>,
}

impl PathSegment {
    /// Plain field segment without a qualifier
    pub fn field(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            qualifier: None,
        }
    }

    /// Keyed positional segment (`key[n]`)
    pub fn indexed(key: impl Into<String>, index: usize) -> Self {
        Self {
            key: Some(key.into()),
            qualifier: Some(Qualifier::Index(index)),
        }
    }

    /// Keyed predicate segment (`key[name=value]`)
    pub fn predicate(
        key: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: Some(key.into()),
            qualifier: Some(Qualifier::Predicate {
                name: name.into(),
                value: value.into(),
            }),
        }
    }

    /// Bare positional segment (`[n]`)
    pub fn bare_index(index: usize) -> Self {
        Self {
            key: None,
            qualifier: Some(Qualifier::Index(index)),
        }
    }

    pub fn kind(&self) -> SegmentKind {
        match (&self.key, &self.qualifier) {
            (_, None) => SegmentKind::Plain,
            (None, Some(_)) => SegmentKind::BareIndex,
            (Some(_), Some(Qualifier::Index(_))) => SegmentKind::KeyedIndex,
            (Some(_), Some(Qualifier::Predicate { .. })) => SegmentKind::Predicate,
        }
    }

    /// Whether this segment is a root marker or echoes the resource type
    ///
    /// Only meaningful for leading segments; the builder never asks otherwise.
    pub fn is_root_skip(&self, resource_type: &str) -> bool {
        self.qualifier.is_none()
            && self
                .key
                .as_deref()
                .is_some_and(|key| key == ROOT_MARKER || key == resource_type)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(key) = &self.key {
            write!(f, "{key}")?;
        }
        if let Some(qualifier) = &self.qualifier {
            write!(f, "{qualifier}")?;
        }
        Ok(())
    }
}

/// A tokenized path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpression {
    raw: String,
    segments: Vec<PathSegment>,
}

impl PathExpression {
    /// Parse a dotted path into segments
    ///
    /// Examples:
    /// - `"name.family"` -> `[name, family]`
    /// - `"$.name[0].family"` -> `[$, name[0], family]`
    /// - `"Patient.name[use=official].given[0]"` -> `[Patient, name[use=official], given[0]]`
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::EmptyPath);
        }

        let mut segments = Vec::new();
        for text in split_segments(trimmed) {
            segments.push(parse_segment(trimmed, text)?);
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl FromStr for PathExpression {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split on dots that are not inside a bracketed qualifier
fn split_segments(path: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, ch) in path.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                parts.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&path[start..]);
    parts
}

fn parse_segment(path: &str, text: &str) -> Result<PathSegment, PathError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PathError::EmptySegment {
            path: path.to_string(),
        });
    }

    let Some(open) = text.find('[') else {
        return Ok(PathSegment::field(text));
    };

    let close = text.rfind(']').filter(|close| *close > open).ok_or_else(|| {
        PathError::UnclosedBracket {
            path: path.to_string(),
            segment: text.to_string(),
        }
    })?;
    if close != text.len() - 1 {
        return Err(PathError::TrailingCharacters {
            path: path.to_string(),
            segment: text.to_string(),
        });
    }

    let key = text[..open].trim();
    let key = (!key.is_empty()).then(|| key.to_string());
    let raw_qualifier = text[open + 1..close].trim();

    let qualifier = match raw_qualifier.split_once('=') {
        Some((name, value)) if key.is_some() => {
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                return Err(PathError::InvalidQualifier {
                    path: path.to_string(),
                    qualifier: raw_qualifier.to_string(),
                });
            }
            Qualifier::Predicate {
                name: name.to_string(),
                value: value.to_string(),
            }
        }
        Some(_) => {
            return Err(PathError::BareQualifier {
                path: path.to_string(),
                qualifier: raw_qualifier.to_string(),
            });
        }
        None => match raw_qualifier.parse::<usize>() {
            Ok(index) => Qualifier::Index(index),
            Err(_) if key.is_none() => {
                return Err(PathError::BareQualifier {
                    path: path.to_string(),
                    qualifier: raw_qualifier.to_string(),
                });
            }
            Err(_) => {
                return Err(PathError::InvalidQualifier {
                    path: path.to_string(),
                    qualifier: raw_qualifier.to_string(),
                });
            }
        },
    };

    Ok(PathSegment {
        key,
        qualifier: Some(qualifier),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_path() {
        let path = PathExpression::parse("name.family").unwrap();

        assert_eq!(path.segments().len(), 2);
        assert_eq!(path.segments()[0], PathSegment::field("name"));
        assert_eq!(path.segments()[1], PathSegment::field("family"));
    }

    #[test]
    fn test_parse_root_marker_and_index() {
        let path = PathExpression::parse("$.name[0].family").unwrap();

        assert_eq!(path.segments()[0], PathSegment::field("$"));
        assert!(path.segments()[0].is_root_skip("Patient"));
        assert_eq!(path.segments()[1], PathSegment::indexed("name", 0));
        assert_eq!(path.segments()[1].kind(), SegmentKind::KeyedIndex);
    }

    #[test]
    fn test_parse_predicate_keeps_dots_in_value() {
        let path = PathExpression::parse("code.coding[system=http://loinc.org].code").unwrap();

        assert_eq!(path.segments().len(), 3);
        assert_eq!(
            path.segments()[1],
            PathSegment::predicate("coding", "system", "http://loinc.org")
        );
        assert_eq!(path.segments()[1].kind(), SegmentKind::Predicate);
    }

    #[test]
    fn test_parse_bare_index() {
        let path = PathExpression::parse("line.[2]").unwrap();

        assert_eq!(path.segments()[1], PathSegment::bare_index(2));
        assert_eq!(path.segments()[1].kind(), SegmentKind::BareIndex);
    }

    #[test]
    fn test_resource_type_echo_is_root_skip() {
        let path = PathExpression::parse("Patient.birthDate").unwrap();

        assert!(path.segments()[0].is_root_skip("Patient"));
        assert!(!path.segments()[0].is_root_skip("Encounter"));
        assert!(!path.segments()[1].is_root_skip("Patient"));
    }

    #[test]
    fn test_bare_non_numeric_qualifier_is_error() {
        let err = PathExpression::parse("name.[x]").unwrap_err();
        assert!(matches!(err, PathError::BareQualifier { .. }));
    }

    #[test]
    fn test_keyed_non_numeric_qualifier_is_error() {
        let err = PathExpression::parse("name[first]").unwrap_err();
        assert_eq!(
            err,
            PathError::InvalidQualifier {
                path: "name[first]".to_string(),
                qualifier: "first".to_string(),
            }
        );
    }

    #[test]
    fn test_negative_index_is_error() {
        assert!(PathExpression::parse("name[-1].family").is_err());
    }

    #[test]
    fn test_malformed_paths() {
        assert_eq!(PathExpression::parse("  ").unwrap_err(), PathError::EmptyPath);
        assert!(matches!(
            PathExpression::parse("name..family").unwrap_err(),
            PathError::EmptySegment { .. }
        ));
        assert!(matches!(
            PathExpression::parse("name[0.family").unwrap_err(),
            PathError::UnclosedBracket { .. }
        ));
        assert!(matches!(
            PathExpression::parse("name[0]x.family").unwrap_err(),
            PathError::TrailingCharacters { .. }
        ));
    }

    #[test]
    fn test_display_round_trips_segment_text() {
        let path = PathExpression::parse("Patient.name[use=official].given[0]").unwrap();
        let rendered: Vec<String> = path.segments().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["Patient", "name[use=official]", "given[0]"]);
    }
}

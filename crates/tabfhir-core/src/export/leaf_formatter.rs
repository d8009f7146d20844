//! Leaf value formatting
//!
//! Shapes a raw source value according to its declared value-type tag and
//! writes it at `node[key]`. The tree builder only calls this at terminal
//! segments and never looks inside the written value.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value as JsonValue};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// UCUM code system used for quantities
pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"];

/// A value could not be shaped for its declared type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot format '{value}' as {value_type}: {reason}")]
pub struct FormatError {
    pub value_type: String,
    pub value: String,
    pub reason: String,
}

impl FormatError {
    pub fn new(
        value_type: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            value_type: value_type.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Declared value type of a field mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    String,
    Code,
    Id,
    Uri,
    Boolean,
    Integer,
    Decimal,
    Date,
    DateTime,
    Coding,
    CodeableConcept,
    Quantity,
    Reference,
    /// Unknown tag; values pass through as strings
    Other(String),
}

impl ValueType {
    /// Parse a type tag; matching is case-insensitive and never fails
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "string" | "markdown" => ValueType::String,
            "code" => ValueType::Code,
            "id" => ValueType::Id,
            "uri" | "url" | "canonical" | "oid" => ValueType::Uri,
            "boolean" | "bool" => ValueType::Boolean,
            "integer" | "int" | "positiveint" | "unsignedint" => ValueType::Integer,
            "decimal" | "number" => ValueType::Decimal,
            "date" => ValueType::Date,
            "datetime" | "instant" => ValueType::DateTime,
            "coding" => ValueType::Coding,
            "codeableconcept" => ValueType::CodeableConcept,
            "quantity" => ValueType::Quantity,
            "reference" => ValueType::Reference,
            _ => ValueType::Other(tag.trim().to_string()),
        }
    }
}

impl FromStr for ValueType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Code => "code",
            ValueType::Id => "id",
            ValueType::Uri => "uri",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Decimal => "decimal",
            ValueType::Date => "date",
            ValueType::DateTime => "dateTime",
            ValueType::Coding => "Coding",
            ValueType::CodeableConcept => "CodeableConcept",
            ValueType::Quantity => "Quantity",
            ValueType::Reference => "Reference",
            ValueType::Other(tag) => tag.as_str(),
        };
        f.write_str(name)
    }
}

/// Writes a formatted leaf value into a map
pub trait LeafFormatter: Send + Sync {
    fn assign_leaf(
        &self,
        node: &mut Map<String, JsonValue>,
        key: &str,
        value: &JsonValue,
        value_type: &ValueType,
    ) -> Result<(), FormatError>;
}

/// Default formatter covering the FHIR primitive and common complex types
#[derive(Debug, Default, Clone, Copy)]
pub struct TypedLeafFormatter;

impl LeafFormatter for TypedLeafFormatter {
    fn assign_leaf(
        &self,
        node: &mut Map<String, JsonValue>,
        key: &str,
        value: &JsonValue,
        value_type: &ValueType,
    ) -> Result<(), FormatError> {
        let formatted = format_value(value, value_type)?;
        node.insert(key.to_string(), formatted);
        Ok(())
    }
}

const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// Shape one raw value for its declared type
pub fn format_value(value: &JsonValue, value_type: &ValueType) -> Result<JsonValue, FormatError> {
    // Pre-shaped structures from JSON input are written as given
    if value.is_object() || value.is_array() {
        return Ok(value.clone());
    }

    let text = raw_text(value);
    let fail = |reason: &str| FormatError::new(value_type.to_string(), text.clone(), reason);

    match value_type {
        ValueType::Boolean => match value {
            JsonValue::Bool(flag) => Ok(JsonValue::Bool(*flag)),
            _ => match text.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(JsonValue::Bool(true)),
                "false" | "no" | "n" | "0" => Ok(JsonValue::Bool(false)),
                _ => Err(fail("expected a boolean")),
            },
        },
        ValueType::Integer => {
            if let Some(int) = value.as_i64() {
                return Ok(JsonValue::Number(int.into()));
            }
            if let Some(float) = value.as_f64()
                && float.fract() == 0.0
            {
                // i64::MAX is not representable; 2^63 is the exclusive upper bound
                if !(I64_LOWER..I64_UPPER).contains(&float) {
                    return Err(fail("integer out of range"));
                }
                return Ok(JsonValue::Number((float as i64).into()));
            }
            text.parse::<i64>()
                .map(|int| JsonValue::Number(int.into()))
                .map_err(|_| fail("expected an integer"))
        }
        ValueType::Decimal => {
            if let JsonValue::Number(number) = value {
                return Ok(JsonValue::Number(number.clone()));
            }
            decimal(&text).ok_or_else(|| fail("expected a decimal"))
        }
        ValueType::Date => format_date(&text)
            .map(JsonValue::String)
            .ok_or_else(|| fail("unrecognized date")),
        ValueType::DateTime => format_date_time(&text)
            .map(JsonValue::String)
            .ok_or_else(|| fail("unrecognized dateTime")),
        ValueType::Coding => parse_coding(&text, None)
            .map(JsonValue::Object)
            .ok_or_else(|| fail("expected system|code|display")),
        ValueType::CodeableConcept => parse_coding(&text, None)
            .map(codeable_concept)
            .ok_or_else(|| fail("expected system|code|display")),
        ValueType::Quantity => parse_quantity(&text)
            .map(JsonValue::Object)
            .ok_or_else(|| fail("expected '<number> <unit>'")),
        ValueType::Reference => {
            if text.is_empty() {
                return Err(fail("empty reference"));
            }
            let mut reference = Map::new();
            reference.insert("reference".to_string(), JsonValue::String(text.clone()));
            Ok(JsonValue::Object(reference))
        }
        ValueType::String
        | ValueType::Code
        | ValueType::Id
        | ValueType::Uri
        | ValueType::Other(_) => {
            if text.is_empty() {
                return Err(fail("empty value"));
            }
            Ok(JsonValue::String(text.clone()))
        }
    }
}

/// Render a scalar as trimmed text
pub fn raw_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.trim().to_string(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn decimal(text: &str) -> Option<JsonValue> {
    let parsed = text.parse::<f64>().ok()?;
    Number::from_f64(parsed).map(JsonValue::Number)
}

fn format_date(text: &str) -> Option<String> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date().format("%Y-%m-%d").to_string());
        }
    }
    // FHIR partial dates: YYYY and YYYY-MM
    let partial = match text.len() {
        4 => text.chars().all(|c| c.is_ascii_digit()),
        7 => NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").is_ok(),
        _ => false,
    };
    partial.then(|| text.to_string())
}

fn format_date_time(text: &str) -> Option<String> {
    if DateTime::parse_from_rfc3339(text).is_ok() {
        return Some(text.to_string());
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    format_date(text)
}

/// Parse `system|code|display` (or `code`, or `system|code`) into a Coding
///
/// `default_system` fills in the system when the value carries none.
pub fn parse_coding(text: &str, default_system: Option<&str>) -> Option<Map<String, JsonValue>> {
    let parts: Vec<&str> = text.split('|').map(str::trim).collect();
    let (system, code, display) = match parts.as_slice() {
        [code] => (None, *code, None),
        [system, code] => (Some(*system), *code, None),
        [system, code, display] => (Some(*system), *code, Some(*display)),
        _ => return None,
    };
    if code.is_empty() {
        return None;
    }

    let mut coding = Map::new();
    if let Some(system) = system.filter(|s| !s.is_empty()).or(default_system) {
        coding.insert("system".to_string(), JsonValue::String(system.to_string()));
    }
    coding.insert("code".to_string(), JsonValue::String(code.to_string()));
    if let Some(display) = display.filter(|d| !d.is_empty()) {
        coding.insert("display".to_string(), JsonValue::String(display.to_string()));
    }
    Some(coding)
}

/// Wrap a Coding in a CodeableConcept, copying its display into `text`
pub fn codeable_concept(coding: Map<String, JsonValue>) -> JsonValue {
    let mut concept = Map::new();
    let text = coding.get("display").cloned();
    concept.insert(
        "coding".to_string(),
        JsonValue::Array(vec![JsonValue::Object(coding)]),
    );
    if let Some(text) = text {
        concept.insert("text".to_string(), text);
    }
    JsonValue::Object(concept)
}

/// Parse `"<number> <unit>"` into a UCUM Quantity
pub fn parse_quantity(text: &str) -> Option<Map<String, JsonValue>> {
    let mut parts = text.splitn(2, char::is_whitespace);
    let number = decimal(parts.next()?.trim())?;
    let unit = parts.next().map(str::trim).filter(|unit| !unit.is_empty());

    let mut quantity = Map::new();
    quantity.insert("value".to_string(), number);
    if let Some(unit) = unit {
        quantity.insert("unit".to_string(), JsonValue::String(unit.to_string()));
        quantity.insert("system".to_string(), JsonValue::String(UCUM_SYSTEM.to_string()));
        quantity.insert("code".to_string(), JsonValue::String(unit.to_string()));
    }
    Some(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assign(value: JsonValue, tag: &str) -> Result<JsonValue, FormatError> {
        let mut node = Map::new();
        TypedLeafFormatter.assign_leaf(&mut node, "field", &value, &ValueType::from_tag(tag))?;
        Ok(node.remove("field").unwrap())
    }

    #[test]
    fn test_value_type_tags_are_case_insensitive() {
        assert_eq!(ValueType::from_tag("CodeableConcept"), ValueType::CodeableConcept);
        assert_eq!(ValueType::from_tag("codeableconcept"), ValueType::CodeableConcept);
        assert_eq!(ValueType::from_tag("DATETIME"), ValueType::DateTime);
        assert_eq!(ValueType::from_tag("positiveInt"), ValueType::Integer);
        assert_eq!(
            ValueType::from_tag("Annotation"),
            ValueType::Other("Annotation".to_string())
        );
    }

    #[test]
    fn test_string_value_is_trimmed() {
        assert_eq!(assign(json!("  Dickerson "), "string").unwrap(), json!("Dickerson"));
    }

    #[test]
    fn test_numbers_as_strings() {
        assert_eq!(assign(json!(42), "string").unwrap(), json!("42"));
    }

    #[test]
    fn test_boolean_values() {
        assert_eq!(assign(json!("Yes"), "boolean").unwrap(), json!(true));
        assert_eq!(assign(json!(false), "boolean").unwrap(), json!(false));
        assert!(assign(json!("maybe"), "boolean").is_err());
    }

    #[test]
    fn test_integer_values() {
        assert_eq!(assign(json!("17"), "integer").unwrap(), json!(17));
        assert_eq!(assign(json!(3.0), "integer").unwrap(), json!(3));
        let err = assign(json!("seventeen"), "integer").unwrap_err();
        assert_eq!(err.value_type, "integer");
        assert_eq!(err.value, "seventeen");
    }

    #[test]
    fn test_integer_rejects_whole_floats_outside_i64() {
        for value in [json!(1e19), json!(-1e19), json!(u64::MAX)] {
            let err = assign(value, "integer").unwrap_err();
            assert_eq!(err.reason, "integer out of range");
        }
        assert_eq!(assign(json!(-9.0e18), "integer").unwrap(), json!(-9_000_000_000_000_000_000_i64));
    }

    #[test]
    fn test_decimal_values() {
        assert_eq!(assign(json!("98.6"), "decimal").unwrap(), json!(98.6));
        assert_eq!(assign(json!(120), "decimal").unwrap(), json!(120));
    }

    #[test]
    fn test_date_normalization() {
        assert_eq!(assign(json!("1970-01-31"), "date").unwrap(), json!("1970-01-31"));
        assert_eq!(assign(json!("01/31/1970"), "date").unwrap(), json!("1970-01-31"));
        assert_eq!(
            assign(json!("1970-01-31 08:30:00"), "date").unwrap(),
            json!("1970-01-31")
        );
        assert_eq!(assign(json!("1970"), "date").unwrap(), json!("1970"));
        assert_eq!(assign(json!("1970-02"), "date").unwrap(), json!("1970-02"));
        assert!(assign(json!("yesterday"), "date").is_err());
    }

    #[test]
    fn test_date_time_normalization() {
        assert_eq!(
            assign(json!("2024-05-01T10:00:00+02:00"), "dateTime").unwrap(),
            json!("2024-05-01T10:00:00+02:00")
        );
        assert_eq!(
            assign(json!("2024-05-01 10:00:00"), "dateTime").unwrap(),
            json!("2024-05-01T10:00:00")
        );
        assert_eq!(assign(json!("2024-05-01"), "dateTime").unwrap(), json!("2024-05-01"));
    }

    #[test]
    fn test_coding_and_codeable_concept() {
        assert_eq!(
            assign(json!("http://loinc.org|8480-6|Systolic"), "Coding").unwrap(),
            json!({"system": "http://loinc.org", "code": "8480-6", "display": "Systolic"})
        );
        assert_eq!(
            assign(json!("http://snomed.info/sct|38341003"), "CodeableConcept").unwrap(),
            json!({"coding": [{"system": "http://snomed.info/sct", "code": "38341003"}]})
        );
        assert_eq!(
            assign(json!("||"), "Coding").unwrap_err().value_type,
            "Coding".to_string()
        );
    }

    #[test]
    fn test_quantity() {
        assert_eq!(
            assign(json!("120 mm[Hg]"), "Quantity").unwrap(),
            json!({"value": 120.0, "unit": "mm[Hg]", "system": UCUM_SYSTEM, "code": "mm[Hg]"})
        );
        assert!(assign(json!("high"), "Quantity").is_err());
    }

    #[test]
    fn test_reference() {
        assert_eq!(
            assign(json!("Organization/acme"), "Reference").unwrap(),
            json!({"reference": "Organization/acme"})
        );
    }

    #[test]
    fn test_preshaped_object_passes_through() {
        let value = json!({"system": "phone", "value": "555-0100"});
        assert_eq!(assign(value.clone(), "ContactPoint").unwrap(), value);
    }

    #[test]
    fn test_parse_coding_uses_default_system() {
        let coding = parse_coding("male", Some("http://hl7.org/fhir/administrative-gender")).unwrap();
        assert_eq!(coding["system"], "http://hl7.org/fhir/administrative-gender");
        assert_eq!(coding["code"], "male");
    }
}

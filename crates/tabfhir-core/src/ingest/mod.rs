//! Input ingestion
//!
//! Reads resource definitions, resource links and field mappings from a
//! directory of CSV sheets, an `.xlsx` workbook or a JSON record file, and
//! normalizes them into a [`ConversionInput`].

pub mod csv_workbook;
pub mod json_input;
pub mod xlsx_workbook;

use crate::config::InputConfiguration;
use crate::error::TabfhirError;
use crate::model::{FieldMapping, ResourceDefinition, ResourceLinkSpec};
use crate::path::PathExpression;
use crate::result::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Everything one conversion run needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionInput {
    #[serde(default, rename = "resourceDefinitions")]
    pub definitions: Vec<ResourceDefinition>,
    #[serde(default, rename = "resourceLinks")]
    pub links: Vec<ResourceLinkSpec>,
    #[serde(default, rename = "fieldMappings")]
    pub fields: Vec<FieldMapping>,
}

impl ConversionInput {
    /// Number of subjects, i.e. the longest value list
    pub fn subject_count(&self) -> usize {
        self.fields
            .iter()
            .map(|field| field.values.len())
            .max()
            .unwrap_or(0)
    }

    pub fn definition(&self, entity_name: &str) -> Option<&ResourceDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.entity_name == entity_name)
    }

    /// Field mappings owned by an entity, in input order
    pub fn fields_for<'a>(&'a self, entity_name: &'a str) -> impl Iterator<Item = &'a FieldMapping> {
        self.fields
            .iter()
            .filter(move |field| field.entity_name == entity_name)
    }

    /// Static checks that need no subject data
    ///
    /// Errors are problems a conversion would fail on; warnings are skipped
    /// at conversion time.
    pub fn validate(&self) -> Vec<InputIssue> {
        let mut issues = Vec::new();
        let mut entities = HashSet::new();

        for definition in &self.definitions {
            if !entities.insert(definition.entity_name.as_str()) {
                issues.push(InputIssue::error(
                    &definition.entity_name,
                    "duplicate entity name in resource definitions",
                ));
            }
            if definition.resource_type.trim().is_empty() {
                issues.push(InputIssue::error(&definition.entity_name, "missing resource type"));
            }
            if self.fields_for(&definition.entity_name).next().is_none() {
                issues.push(InputIssue::warning(
                    &definition.entity_name,
                    "no field mappings; only identity fields will be written",
                ));
            }
        }

        let mut seen_fields = HashSet::new();
        for field in &self.fields {
            if let Err(err) = PathExpression::parse(&field.path) {
                issues.push(InputIssue::error(&field.entity_name, err.to_string()));
            }
            if !entities.contains(field.entity_name.as_str()) {
                issues.push(InputIssue::warning(
                    &field.entity_name,
                    format!("field '{}' belongs to an undefined entity", field.field_name),
                ));
            }
            if !seen_fields.insert((field.entity_name.as_str(), field.field_name.as_str())) {
                issues.push(InputIssue::warning(
                    &field.entity_name,
                    format!("duplicate field '{}'", field.field_name),
                ));
            }
        }

        for link in &self.links {
            for endpoint in [&link.origin_entity, &link.destination_entity] {
                if !entities.contains(endpoint.as_str()) {
                    issues.push(InputIssue::warning(
                        &link.origin_entity,
                        format!(
                            "link '{}' refers to undefined entity '{}'",
                            link.reference_path, endpoint
                        ),
                    ));
                }
            }
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// One problem found by [`ConversionInput::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputIssue {
    pub severity: IssueSeverity,
    pub entity: String,
    pub message: String,
}

impl InputIssue {
    fn error(entity: &str, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            entity: entity.to_string(),
            message: message.into(),
        }
    }

    fn warning(entity: &str, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            entity: entity.to_string(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

impl fmt::Display for InputIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entity, self.message)
    }
}

/// Load input from a CSV sheet directory, an `.xlsx` workbook or a `.json`
/// record file
pub fn load_input(path: &Path, config: &InputConfiguration) -> Result<ConversionInput> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let input = if path.is_dir() {
        csv_workbook::read_workbook(path, config)?
    } else if !path.exists() {
        return Err(TabfhirError::io_error(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "input not found"),
        ));
    } else {
        match extension.as_deref() {
            Some("json") => json_input::read_json_file(path)?,
            Some("xlsx") => xlsx_workbook::read_xlsx(path, config)?,
            _ => {
                return Err(TabfhirError::ingest_error(
                    path.display().to_string(),
                    "expected a directory of CSV sheets, an .xlsx workbook or a .json record file",
                ));
            }
        }
    };

    info!(
        "Loaded {} definitions, {} links, {} fields ({} subjects) from {}",
        input.definitions.len(),
        input.links.len(),
        input.fields.len(),
        input.subject_count(),
        path.display()
    );
    Ok(input)
}

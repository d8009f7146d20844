//! Configuration types for tabfhir

use crate::error::TabfhirError;
use crate::export::{HandlerKind, HandlerRegistry, ReferenceLinker};
use crate::result::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_DEFINITIONS_FILE: &str = "ResourceDefinitions.csv";
pub const DEFAULT_LINKS_FILE: &str = "ResourceLinks.csv";
pub const DEFAULT_PATIENT_DATA_FILE: &str = "PatientData.csv";
pub const DEFAULT_OUTPUT_FILE_NAME: &str = "bundle-{subject}.json";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabfhirConfig {
    /// JSON schema reference
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[schemars(description = "Sheet names of a CSV workbook directory or .xlsx workbook")]
    pub input: Option<InputConfiguration>,

    #[schemars(description = "Reference linking behaviour")]
    pub linker: Option<LinkerConfiguration>,

    #[schemars(description = "Special handlers for path prefixes")]
    pub handlers: Option<HandlersConfiguration>,

    #[schemars(description = "Bundle output settings")]
    pub output: Option<OutputConfiguration>,
}

/// Workbook sheet names
///
/// An `.xlsx` workbook uses the same names without the extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputConfiguration {
    #[schemars(description = "Resource definitions sheet (default: ResourceDefinitions.csv)")]
    pub definitions_file: Option<String>,

    #[schemars(description = "Resource links sheet (default: ResourceLinks.csv)")]
    pub links_file: Option<String>,

    #[schemars(description = "Patient data sheet (default: PatientData.csv)")]
    pub patient_data_file: Option<String>,
}

impl InputConfiguration {
    pub fn definitions_file(&self) -> &str {
        self.definitions_file
            .as_deref()
            .unwrap_or(DEFAULT_DEFINITIONS_FILE)
    }

    pub fn links_file(&self) -> &str {
        self.links_file.as_deref().unwrap_or(DEFAULT_LINKS_FILE)
    }

    pub fn patient_data_file(&self) -> &str {
        self.patient_data_file
            .as_deref()
            .unwrap_or(DEFAULT_PATIENT_DATA_FILE)
    }

    /// Worksheet name of the definitions sheet inside an `.xlsx` workbook
    pub fn definitions_sheet(&self) -> &str {
        sheet_name(self.definitions_file())
    }

    pub fn links_sheet(&self) -> &str {
        sheet_name(self.links_file())
    }

    pub fn patient_data_sheet(&self) -> &str {
        sheet_name(self.patient_data_file())
    }
}

/// File name without its extension
fn sheet_name(file: &str) -> &str {
    Path::new(file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file)
}

/// A `(source type, destination type, field)` triple
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkRuleConfig {
    pub source_type: String,
    pub destination_type: String,
    pub field: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkerConfiguration {
    #[schemars(description = "Infer 1:1 links between singleton resource types (default: true)")]
    pub infer_default_links: Option<bool>,

    #[schemars(description = "Inference rules added after the built-in catalog")]
    pub default_links: Option<Vec<LinkRuleConfig>>,

    #[schemars(description = "Additional reference fields that hold a list of references")]
    pub array_references: Option<Vec<LinkRuleConfig>>,
}

/// One prefix-to-handler binding
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HandlerRegistration {
    pub prefix: String,
    pub kind: HandlerKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HandlersConfiguration {
    #[schemars(description = "Register the built-in Observation value handlers (default: true)")]
    pub use_default_handlers: Option<bool>,

    #[schemars(description = "Handlers registered after the built-in ones")]
    pub register: Option<Vec<HandlerRegistration>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfiguration {
    #[schemars(description = "Pretty-print bundle JSON (default: true)")]
    pub pretty: Option<bool>,

    #[schemars(description = "Bundle file name pattern; {subject} is replaced by the subject index")]
    pub file_name: Option<String>,
}

impl OutputConfiguration {
    pub fn pretty(&self) -> bool {
        self.pretty.unwrap_or(true)
    }

    /// Bundle file name for one subject
    pub fn file_name_for(&self, subject: usize) -> String {
        self.file_name
            .as_deref()
            .unwrap_or(DEFAULT_OUTPUT_FILE_NAME)
            .replace("{subject}", &subject.to_string())
    }
}

impl TabfhirConfig {
    /// Load from a `.json` or `.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| TabfhirError::io_error(path, e))?;
        let ext = path.extension().and_then(|e| e.to_str());

        match ext {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| TabfhirError::config_error(format!("{}: {e}", path.display()))),
            Some("toml") => toml::from_str(&content)
                .map_err(|e| TabfhirError::config_error(format!("{}: {e}", path.display()))),
            _ => Err(TabfhirError::config_error(format!(
                "Unsupported config file extension for '{}' (expected .json or .toml)",
                path.display()
            ))),
        }
    }

    /// Fully populated configuration, as written by `config init`
    pub fn with_defaults() -> Self {
        Self {
            schema: None,
            input: Some(InputConfiguration {
                definitions_file: Some(DEFAULT_DEFINITIONS_FILE.to_string()),
                links_file: Some(DEFAULT_LINKS_FILE.to_string()),
                patient_data_file: Some(DEFAULT_PATIENT_DATA_FILE.to_string()),
            }),
            linker: Some(LinkerConfiguration {
                infer_default_links: Some(true),
                default_links: Some(Vec::new()),
                array_references: Some(Vec::new()),
            }),
            handlers: Some(HandlersConfiguration {
                use_default_handlers: Some(true),
                register: Some(Vec::new()),
            }),
            output: Some(OutputConfiguration {
                pretty: Some(true),
                file_name: Some(DEFAULT_OUTPUT_FILE_NAME.to_string()),
            }),
        }
    }

    pub fn input_config(&self) -> InputConfiguration {
        self.input.clone().unwrap_or_default()
    }

    pub fn output_config(&self) -> OutputConfiguration {
        self.output.clone().unwrap_or_default()
    }

    /// Handler registry described by the `handlers` section
    pub fn handler_registry(&self) -> HandlerRegistry {
        let section = self.handlers.clone().unwrap_or_default();
        let mut registry = if section.use_default_handlers.unwrap_or(true) {
            HandlerRegistry::with_defaults()
        } else {
            HandlerRegistry::new()
        };
        for registration in section.register.unwrap_or_default() {
            registry.register(registration.prefix, registration.kind.create());
        }
        registry
    }

    /// Reference linker described by the `linker` section
    pub fn reference_linker(&self) -> ReferenceLinker {
        let section = self.linker.clone().unwrap_or_default();
        let mut linker =
            ReferenceLinker::new().with_inference(section.infer_default_links.unwrap_or(true));
        for rule in section.default_links.unwrap_or_default() {
            linker = linker.with_rule(&rule.source_type, &rule.destination_type, &rule.field);
        }
        for rule in section.array_references.unwrap_or_default() {
            linker = linker.with_array_field(&rule.source_type, &rule.destination_type, &rule.field);
        }
        linker
    }
}

//! Per-subject conversion
//!
//! For one subject index: initialize a document per resource definition,
//! write every field value through the [`TreeBuilder`], wire references with
//! the [`ReferenceLinker`] and wrap the result in a transaction bundle.
//!
//! A structural error aborts the subject; value errors and null values only
//! skip the field.

use super::bundle_assembler::{BundleAssembler, TransactionBundle};
use super::leaf_formatter::TypedLeafFormatter;
use super::reference_linker::{LinkReport, ReferenceLinker};
use super::tree_builder::TreeBuilder;
use crate::config::TabfhirConfig;
use crate::error::TabfhirError;
use crate::ids::IdGenerator;
use crate::ingest::ConversionInput;
use crate::model::ResourceDocument;
use crate::result::Result;
use tracing::{debug, info, warn};

/// Counters for one converted subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    pub documents: usize,
    pub fields_written: usize,
    /// Null values and value errors
    pub fields_skipped: usize,
    pub links: LinkReport,
}

/// Bundle and counters for one subject
#[derive(Debug, Clone)]
pub struct SubjectOutcome {
    pub subject: usize,
    pub bundle: TransactionBundle,
    pub stats: ConversionStats,
}

/// Converts subjects of a [`ConversionInput`] into bundles
#[derive(Debug, Default)]
pub struct Converter {
    builder: TreeBuilder,
    linker: ReferenceLinker,
    assembler: BundleAssembler,
}

impl Converter {
    pub fn new(builder: TreeBuilder, linker: ReferenceLinker) -> Self {
        Self {
            builder,
            linker,
            assembler: BundleAssembler::new(),
        }
    }

    /// Converter with the handlers and linker rules of a configuration
    pub fn from_config(config: &TabfhirConfig) -> Self {
        Self::new(
            TreeBuilder::new(config.handler_registry(), Box::new(TypedLeafFormatter)),
            config.reference_linker(),
        )
    }

    pub fn builder(&self) -> &TreeBuilder {
        &self.builder
    }

    pub fn linker(&self) -> &ReferenceLinker {
        &self.linker
    }

    /// Convert one subject into a transaction bundle
    pub fn convert_subject(
        &self,
        input: &ConversionInput,
        subject: usize,
        ids: &mut dyn IdGenerator,
    ) -> Result<SubjectOutcome> {
        let mut stats = ConversionStats::default();
        let mut documents = Vec::with_capacity(input.definitions.len());

        for definition in &input.definitions {
            let mut document = ResourceDocument::initialize(definition, ids);
            debug!(
                "Subject {}: building {} for '{}'",
                subject,
                document.reference(),
                definition.entity_name
            );

            let mut has_fields = false;
            for field in input.fields_for(&definition.entity_name) {
                has_fields = true;
                let Some(value) = field.value_at(subject) else {
                    warn!(
                        "Subject {}: no value for '{}.{}', skipped",
                        subject, definition.entity_name, field.field_name
                    );
                    stats.fields_skipped += 1;
                    continue;
                };

                match self.builder.assign(&mut document, definition, field, value) {
                    Ok(()) => stats.fields_written += 1,
                    Err(err) if err.is_structural() => {
                        return Err(TabfhirError::structural(
                            &definition.entity_name,
                            &field.path,
                            err,
                        ));
                    }
                    Err(err) => {
                        warn!(
                            "Subject {}: '{}.{}' skipped: {}",
                            subject, definition.entity_name, field.field_name, err
                        );
                        stats.fields_skipped += 1;
                    }
                }
            }

            if !has_fields {
                warn!(
                    "No field mappings for entity '{}'; writing identity fields only",
                    definition.entity_name
                );
            }
            documents.push(document);
        }

        stats.documents = documents.len();
        stats.links = self.linker.link(&mut documents, &input.links);
        let bundle = self.assembler.assemble(documents, ids);

        info!(
            "Subject {}: {} documents, {} fields written, {} skipped, {} references",
            subject,
            stats.documents,
            stats.fields_written,
            stats.fields_skipped,
            stats.links.applied
        );

        Ok(SubjectOutcome {
            subject,
            bundle,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ids::SequentialIdGenerator;
    use crate::model::{FieldMapping, ResourceDefinition, ResourceLinkSpec};
    use serde_json::json;

    fn input() -> ConversionInput {
        ConversionInput {
            definitions: vec![
                ResourceDefinition::new("PatientEntity", "Patient"),
                ResourceDefinition::new("EncounterEntity", "Encounter"),
            ],
            links: Vec::new(),
            fields: vec![
                FieldMapping::new("PatientEntity", "$.name[0].family", "string")
                    .with_values(vec![json!("Dickerson"), json!("Smith")]),
                FieldMapping::new("PatientEntity", "Patient.birthDate", "date")
                    .with_values(vec![json!("01/31/1970"), json!(null)]),
                FieldMapping::new("EncounterEntity", "$.status", "code")
                    .with_values(vec![json!("finished")]),
            ],
        }
    }

    #[test]
    fn test_convert_subject_builds_linked_bundle() {
        let outcome = Converter::default()
            .convert_subject(&input(), 0, &mut SequentialIdGenerator::new(0))
            .unwrap();

        let bundle = serde_json::to_value(&outcome.bundle).unwrap();
        let patient = &bundle["entry"][0]["resource"];
        let encounter = &bundle["entry"][1]["resource"];

        assert_eq!(patient["name"], json!([{"family": "Dickerson"}]));
        assert_eq!(patient["birthDate"], "1970-01-31");
        assert_eq!(encounter["status"], "finished");
        assert_eq!(
            encounter["subject"]["reference"],
            format!("Patient/{}", patient["id"].as_str().unwrap())
        );
        assert_eq!(outcome.stats.fields_written, 3);
        assert_eq!(outcome.stats.links.inferred, 1);
    }

    #[test]
    fn test_null_and_missing_values_are_skipped() {
        let outcome = Converter::default()
            .convert_subject(&input(), 1, &mut SequentialIdGenerator::new(1))
            .unwrap();

        let patient = &outcome.bundle.entry[0].resource;
        assert!(patient.get("birthDate").is_none());
        assert!(outcome.bundle.entry[1].resource.get("status").is_none());
        assert_eq!(outcome.stats.fields_written, 1);
        assert_eq!(outcome.stats.fields_skipped, 2);
    }

    #[test]
    fn test_value_error_skips_field() {
        let mut input = input();
        input.fields.push(
            FieldMapping::new("PatientEntity", "$.multipleBirthInteger", "integer")
                .with_values(vec![json!("twins")]),
        );

        let outcome = Converter::default()
            .convert_subject(&input, 0, &mut SequentialIdGenerator::new(0))
            .unwrap();

        assert!(outcome.bundle.entry[0].resource.get("multipleBirthInteger").is_none());
        assert_eq!(outcome.stats.fields_skipped, 1);
    }

    #[test]
    fn test_structural_error_aborts_subject() {
        let mut input = input();
        input.fields.push(
            FieldMapping::new("EncounterEntity", "$.class.[x]", "string")
                .with_values(vec![json!("AMB")]),
        );

        let err = Converter::default()
            .convert_subject(&input, 0, &mut SequentialIdGenerator::new(0))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Structural);
        assert!(err.to_string().contains("EncounterEntity"));
    }

    #[test]
    fn test_entity_without_fields_keeps_identity() {
        let mut input = input();
        input
            .definitions
            .push(ResourceDefinition::new("OrgEntity", "Organization"));
        input.links.push(ResourceLinkSpec::new(
            "EncounterEntity",
            "OrgEntity",
            "serviceProvider",
        ));

        let outcome = Converter::default()
            .convert_subject(&input, 0, &mut SequentialIdGenerator::new(0))
            .unwrap();

        let organization = &outcome.bundle.entry[2].resource;
        assert_eq!(organization.as_object().unwrap().len(), 2);
        assert!(outcome.bundle.entry[1].resource.get("serviceprovider").is_some());
    }

    #[test]
    fn test_deterministic_ids_are_reproducible() {
        let converter = Converter::default();
        let first = converter
            .convert_subject(&input(), 0, &mut SequentialIdGenerator::new(7))
            .unwrap();
        let second = converter
            .convert_subject(&input(), 0, &mut SequentialIdGenerator::new(7))
            .unwrap();

        assert_eq!(first.bundle, second.bundle);
    }
}

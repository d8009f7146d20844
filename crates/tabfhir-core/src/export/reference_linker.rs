//! Reference Linker
//!
//! Wires cross-resource references once every document of a subject exists.
//!
//! Two passes:
//! 1. **Inference**: for each rule in [`DEFAULT_LINK_RULES`], when exactly one
//!    document of the source type and exactly one of the destination type are
//!    present, a link is synthesized between them.
//! 2. **Application**: every link (synthesized first, then authored) writes
//!    `{"reference": "<Type>/<id>"}` into the origin document. Fields listed in
//!    [`ARRAY_REFERENCE_FIELDS`] accumulate references in an array; all other
//!    fields are overwritten.

use crate::model::{ResourceDocument, ResourceLinkSpec};
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// `(source type, destination type, field)` triple, all lower case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkRule {
    pub source_type: &'static str,
    pub destination_type: &'static str,
    pub field: &'static str,
}

impl LinkRule {
    pub const fn new(
        source_type: &'static str,
        destination_type: &'static str,
        field: &'static str,
    ) -> Self {
        Self {
            source_type,
            destination_type,
            field,
        }
    }

    fn triple(&self) -> Triple {
        triple(self.source_type, self.destination_type, self.field)
    }
}

/// Links inferred when both ends occur exactly once
pub const DEFAULT_LINK_RULES: &[LinkRule] = &[
    LinkRule::new("encounter", "patient", "subject"),
    LinkRule::new("observation", "patient", "subject"),
    LinkRule::new("observation", "encounter", "encounter"),
    LinkRule::new("condition", "patient", "subject"),
    LinkRule::new("condition", "encounter", "encounter"),
    LinkRule::new("procedure", "patient", "subject"),
    LinkRule::new("procedure", "encounter", "encounter"),
    LinkRule::new("diagnosticreport", "patient", "subject"),
    LinkRule::new("diagnosticreport", "encounter", "encounter"),
    LinkRule::new("diagnosticreport", "observation", "result"),
    LinkRule::new("medicationrequest", "patient", "subject"),
    LinkRule::new("specimen", "patient", "subject"),
    LinkRule::new("observation", "specimen", "specimen"),
    LinkRule::new("immunization", "patient", "patient"),
    LinkRule::new("allergyintolerance", "patient", "patient"),
];

/// Reference fields holding a list of references
pub const ARRAY_REFERENCE_FIELDS: &[LinkRule] = &[
    LinkRule::new("diagnosticreport", "observation", "result"),
    LinkRule::new("diagnosticreport", "specimen", "specimen"),
    LinkRule::new("diagnosticreport", "imagingstudy", "imagingstudy"),
    LinkRule::new("observation", "observation", "hasmember"),
    LinkRule::new("observation", "observation", "derivedfrom"),
    LinkRule::new("careplan", "goal", "goal"),
];

type Triple = (String, String, String);

fn triple(source_type: &str, destination_type: &str, field: &str) -> Triple {
    (
        source_type.trim().to_lowercase(),
        destination_type.trim().to_lowercase(),
        field.trim().to_lowercase(),
    )
}

/// Outcome counters for one linking run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Links synthesized by the inference pass
    pub inferred: usize,
    /// References written into documents
    pub applied: usize,
    /// Links dropped because an endpoint entity was missing
    pub skipped: usize,
}

/// Occurrences of one resource type within a subject
struct TypeCount<'a> {
    count: usize,
    entity_name: &'a str,
}

/// Cross-resource reference writer
#[derive(Debug, Clone)]
pub struct ReferenceLinker {
    infer_defaults: bool,
    rules: Vec<Triple>,
    array_fields: HashSet<Triple>,
}

impl Default for ReferenceLinker {
    fn default() -> Self {
        Self {
            infer_defaults: true,
            rules: DEFAULT_LINK_RULES.iter().map(LinkRule::triple).collect(),
            array_fields: ARRAY_REFERENCE_FIELDS.iter().map(LinkRule::triple).collect(),
        }
    }
}

impl ReferenceLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the inference pass
    pub fn with_inference(mut self, enabled: bool) -> Self {
        self.infer_defaults = enabled;
        self
    }

    /// Add an inference rule after the built-in catalog
    pub fn with_rule(mut self, source_type: &str, destination_type: &str, field: &str) -> Self {
        let rule = triple(source_type, destination_type, field);
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
        self
    }

    /// Mark an additional triple as array-valued
    pub fn with_array_field(mut self, source_type: &str, destination_type: &str, field: &str) -> Self {
        self.array_fields
            .insert(triple(source_type, destination_type, field));
        self
    }

    pub fn infers_defaults(&self) -> bool {
        self.infer_defaults
    }

    pub fn is_array_field(&self, source_type: &str, destination_type: &str, field: &str) -> bool {
        self.array_fields
            .contains(&triple(source_type, destination_type, field))
    }

    /// Synthesize links from the cardinality heuristic
    ///
    /// A rule is not synthesized when an authored link already fills the same
    /// field of the same origin entity.
    pub fn infer_links(
        &self,
        documents: &[ResourceDocument],
        authored: &[ResourceLinkSpec],
    ) -> Vec<ResourceLinkSpec> {
        if !self.infer_defaults {
            return Vec::new();
        }

        let mut index: HashMap<String, TypeCount<'_>> = HashMap::new();
        for document in documents {
            index
                .entry(document.resource_type.to_lowercase())
                .and_modify(|entry| entry.count += 1)
                .or_insert(TypeCount {
                    count: 1,
                    entity_name: &document.entity_name,
                });
        }

        let singleton = |resource_type: &str| {
            index
                .get(resource_type)
                .filter(|entry| entry.count == 1)
                .map(|entry| entry.entity_name)
        };

        let mut inferred: Vec<ResourceLinkSpec> = Vec::new();
        for (source_type, destination_type, field) in &self.rules {
            let (Some(origin), Some(destination)) =
                (singleton(source_type), singleton(destination_type))
            else {
                continue;
            };

            let authored_already = authored
                .iter()
                .any(|link| link.origin_entity == origin && link.reference_path == *field);
            if authored_already {
                debug!(
                    "Skipping inferred link {}.{} -> {}: authored link present",
                    origin, field, destination
                );
                continue;
            }

            let link = ResourceLinkSpec::new(origin, destination, field);
            if !inferred.contains(&link) {
                debug!("Inferred link {}.{} -> {}", origin, field, destination);
                inferred.push(link);
            }
        }
        inferred
    }

    /// Infer and apply every link for one subject's documents
    pub fn link(&self, documents: &mut [ResourceDocument], authored: &[ResourceLinkSpec]) -> LinkReport {
        let inferred = self.infer_links(documents, authored);
        let mut report = LinkReport {
            inferred: inferred.len(),
            ..LinkReport::default()
        };

        for link in inferred.iter().chain(authored) {
            if self.apply_link(documents, link) {
                report.applied += 1;
            } else {
                report.skipped += 1;
            }
        }
        report
    }

    /// Write one reference; returns false when the link was skipped
    fn apply_link(&self, documents: &mut [ResourceDocument], link: &ResourceLinkSpec) -> bool {
        let find = |entity: &str| {
            documents
                .iter()
                .position(|document| document.entity_name == entity)
        };

        let Some(origin) = find(&link.origin_entity) else {
            warn!(
                "Link origin entity '{}' not found; skipping '{}' reference to '{}'",
                link.origin_entity, link.reference_path, link.destination_entity
            );
            return false;
        };
        let Some(destination) = find(&link.destination_entity) else {
            warn!(
                "Link destination entity '{}' not found; skipping '{}' reference from '{}'",
                link.destination_entity, link.reference_path, link.origin_entity
            );
            return false;
        };

        let destination_type = documents[destination].resource_type.clone();
        let reference = reference_value(&documents[destination]);
        let field = link.reference_path.to_lowercase();

        let document = &mut documents[origin];
        let is_array = self.is_array_field(&document.resource_type, &destination_type, &field);
        let JsonValue::Object(root) = &mut document.resource else {
            warn!(
                "Document for '{}' is not an object; skipping '{}' reference",
                document.entity_name, field
            );
            return false;
        };

        if is_array {
            append_reference(root, &field, reference);
        } else {
            root.insert(field.clone(), reference);
        }
        debug!(
            "Linked {}.{} -> {}/{}",
            link.origin_entity, field, destination_type, documents[destination].id
        );
        true
    }
}

fn reference_value(document: &ResourceDocument) -> JsonValue {
    let mut reference = Map::new();
    reference.insert("reference".to_string(), JsonValue::String(document.reference()));
    JsonValue::Object(reference)
}

fn append_reference(root: &mut Map<String, JsonValue>, field: &str, reference: JsonValue) {
    let slot = root
        .entry(field.to_string())
        .or_insert_with(|| JsonValue::Array(Vec::new()));
    match slot {
        JsonValue::Array(items) => items.push(reference),
        existing => {
            let previous = std::mem::take(existing);
            *existing = JsonValue::Array(vec![previous, reference]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdGenerator;
    use crate::model::ResourceDefinition;
    use serde_json::json;

    fn documents(entities: &[(&str, &str)]) -> Vec<ResourceDocument> {
        let mut ids = SequentialIdGenerator::new(0);
        entities
            .iter()
            .map(|(entity, resource_type)| {
                ResourceDocument::initialize(&ResourceDefinition::new(*entity, *resource_type), &mut ids)
            })
            .collect()
    }

    #[test]
    fn test_single_patient_and_encounter_infers_subject() {
        let mut docs = documents(&[("PatientEntity", "Patient"), ("EncounterEntity", "Encounter")]);
        let patient_ref = docs[0].reference();

        let report = ReferenceLinker::new().link(&mut docs, &[]);

        assert_eq!(report.inferred, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(docs[1].resource["subject"], json!({"reference": patient_ref}));
        assert!(docs[0].resource.get("subject").is_none());
    }

    #[test]
    fn test_two_observations_suppress_result_inference() {
        let docs = documents(&[
            ("Obs1", "Observation"),
            ("Obs2", "Observation"),
            ("Report", "DiagnosticReport"),
        ]);

        let inferred = ReferenceLinker::new().infer_links(&docs, &[]);
        assert!(inferred.iter().all(|link| link.reference_path != "result"));
    }

    #[test]
    fn test_second_destination_suppresses_inference() {
        let docs = documents(&[
            ("PatientA", "Patient"),
            ("PatientB", "Patient"),
            ("EncounterEntity", "Encounter"),
        ]);
        assert!(ReferenceLinker::new().infer_links(&docs, &[]).is_empty());
    }

    #[test]
    fn test_second_source_suppresses_inference() {
        let docs = documents(&[
            ("PatientEntity", "Patient"),
            ("VisitA", "Encounter"),
            ("VisitB", "Encounter"),
            ("ConditionEntity", "Condition"),
        ]);

        let inferred = ReferenceLinker::new().infer_links(&docs, &[]);

        assert!(
            inferred
                .iter()
                .all(|link| link.origin_entity != "VisitA" && link.origin_entity != "VisitB")
        );
        assert!(inferred.iter().all(|link| link.destination_entity == "PatientEntity"));
        assert_eq!(
            inferred,
            vec![ResourceLinkSpec::new("ConditionEntity", "PatientEntity", "subject")]
        );
    }

    #[test]
    fn test_single_observation_report_infers_array_result() {
        let mut docs = documents(&[("Obs", "Observation"), ("Report", "DiagnosticReport")]);
        let obs_ref = docs[0].reference();

        ReferenceLinker::new().link(&mut docs, &[]);

        assert_eq!(docs[1].resource["result"], json!([{"reference": obs_ref}]));
    }

    #[test]
    fn test_array_references_accumulate() {
        let mut docs = documents(&[
            ("Obs1", "Observation"),
            ("Obs2", "Observation"),
            ("Report", "DiagnosticReport"),
        ]);
        let (first, second) = (docs[0].reference(), docs[1].reference());
        let authored = vec![
            ResourceLinkSpec::new("Report", "Obs1", "result"),
            ResourceLinkSpec::new("Report", "Obs2", "Result"),
        ];

        let report = ReferenceLinker::new().link(&mut docs, &authored);

        assert_eq!(report.applied, 2);
        assert_eq!(
            docs[2].resource["result"],
            json!([{"reference": first}, {"reference": second}])
        );
    }

    #[test]
    fn test_single_references_overwrite() {
        let mut docs = documents(&[
            ("PatientA", "Patient"),
            ("PatientB", "Patient"),
            ("EncounterEntity", "Encounter"),
        ]);
        let second = docs[1].reference();
        let authored = vec![
            ResourceLinkSpec::new("EncounterEntity", "PatientA", "subject"),
            ResourceLinkSpec::new("EncounterEntity", "PatientB", "subject"),
        ];

        ReferenceLinker::new().link(&mut docs, &authored);

        assert_eq!(docs[2].resource["subject"], json!({"reference": second}));
    }

    #[test]
    fn test_missing_entity_is_skipped() {
        let mut docs = documents(&[("EncounterEntity", "Encounter")]);
        let authored = vec![ResourceLinkSpec::new("EncounterEntity", "Ghost", "subject")];

        let report = ReferenceLinker::new().link(&mut docs, &authored);

        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 0);
        assert!(docs[0].resource.get("subject").is_none());
    }

    #[test]
    fn test_authored_link_suppresses_matching_inference() {
        let docs = documents(&[("PatientEntity", "Patient"), ("EncounterEntity", "Encounter")]);
        let authored = vec![ResourceLinkSpec::new("EncounterEntity", "PatientEntity", "Subject")];

        assert!(ReferenceLinker::new().infer_links(&docs, &authored).is_empty());
    }

    #[test]
    fn test_inference_can_be_disabled() {
        let mut docs = documents(&[("PatientEntity", "Patient"), ("EncounterEntity", "Encounter")]);

        let report = ReferenceLinker::new().with_inference(false).link(&mut docs, &[]);

        assert_eq!(report, LinkReport::default());
        assert!(docs[1].resource.get("subject").is_none());
    }

    #[test]
    fn test_extra_rule_and_array_field() {
        let mut docs = documents(&[("Plan", "CarePlan"), ("Goal", "Goal")]);
        let goal_ref = docs[1].reference();

        ReferenceLinker::new()
            .with_rule("CarePlan", "Goal", "goal")
            .link(&mut docs, &[]);

        assert_eq!(docs[0].resource["goal"], json!([{"reference": goal_ref}]));

        let linker = ReferenceLinker::new().with_array_field("Encounter", "Location", "Location");
        assert!(linker.is_array_field("encounter", "location", "location"));
    }

    #[test]
    fn test_field_names_are_lower_cased() {
        let mut docs = documents(&[("Enc", "Encounter"), ("Org", "Organization")]);
        let link = ResourceLinkSpec {
            origin_entity: "Enc".to_string(),
            destination_entity: "Org".to_string(),
            reference_path: "ServiceProvider".to_string(),
        };

        ReferenceLinker::new().link(&mut docs, &[link]);

        assert!(docs[0].resource.get("serviceprovider").is_some());
        assert!(docs[0].resource.get("ServiceProvider").is_none());
    }
}

//! Integration tests for workbook ingestion through bundle assembly

use serde_json::{Value as JsonValue, json};
use std::fs;
use std::path::Path;
use tabfhir_core::config::InputConfiguration;
use tabfhir_core::export::{
    BuildError, HandlerContext, HandlerRegistry, LeafFormatter, SpecialHandler, TypedLeafFormatter,
};
use tabfhir_core::{
    ConfigLoader, Converter, ErrorKind, FieldMapping, ReferenceLinker, ResourceDefinition,
    SequentialIdGenerator, TreeBuilder, load_input,
};
use tempfile::TempDir;

fn write_workbook(dir: &Path) {
    fs::write(
        dir.join("ResourceDefinitions.csv"),
        "Entity Name,ResourceType,Profile(s)\n\
         Name of the entity,FHIR resource type,Comma separated profiles\n\
         PatientEntity,Patient,http://hl7.org/fhir/us/core/StructureDefinition/us-core-patient\n\
         EncounterEntity,Encounter,\n\
         VitalsEntity,Observation,\n",
    )
    .unwrap();
    fs::write(
        dir.join("ResourceLinks.csv"),
        "OriginResource,ReferencePath,DestinationResource\n\
         Origin entity,Field,Destination entity\n\
         VitalsEntity,Subject,PatientEntity\n",
    )
    .unwrap();
    fs::write(
        dir.join("PatientData.csv"),
        "Entity To Query,,PatientEntity,PatientEntity,PatientEntity,EncounterEntity,VitalsEntity,VitalsEntity\n\
         JsonPath,,Patient.name[use=official].family,Patient.name[use=official].given[0],$.gender,$.status,Observation.code[code=8867-4].display,Observation.valueQuantity\n\
         Type,,string,string,code,code,string,Quantity\n\
         Value Set,,,,,,,\n\
         Data Element,,Family,Given,Gender,Status,Code,Heart rate\n\
         1,First,Dickerson,John,male,finished,Heart rate,72 /min\n\
         2,Second,Smith,,female,,Heart rate,\n",
    )
    .unwrap();
}

fn resources(bundle: &JsonValue) -> Vec<&JsonValue> {
    bundle["entry"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| &entry["resource"])
        .collect()
}

#[test]
fn test_workbook_to_bundle() {
    let dir = TempDir::new().unwrap();
    write_workbook(dir.path());

    let input = load_input(dir.path(), &InputConfiguration::default()).unwrap();
    assert_eq!(input.subject_count(), 2);

    let outcome = Converter::default()
        .convert_subject(&input, 0, &mut SequentialIdGenerator::new(0))
        .unwrap();
    let bundle = serde_json::to_value(&outcome.bundle).unwrap();
    let docs = resources(&bundle);

    assert_eq!(bundle["type"], "transaction");
    assert_eq!(docs.len(), 3);

    let patient = docs[0];
    assert_eq!(
        patient["meta"]["profile"][0],
        "http://hl7.org/fhir/us/core/StructureDefinition/us-core-patient"
    );
    assert_eq!(
        patient["name"],
        json!([{"use": "official", "family": "Dickerson", "given": ["John"]}])
    );
    assert_eq!(patient["gender"], "male");

    let patient_ref = format!("Patient/{}", patient["id"].as_str().unwrap());
    let encounter = docs[1];
    assert_eq!(encounter["subject"], json!({"reference": patient_ref}));

    let vitals = docs[2];
    assert_eq!(vitals["subject"], json!({"reference": patient_ref}));
    assert_eq!(vitals["encounter"]["reference"], format!("Encounter/{}", encounter["id"].as_str().unwrap()));
    assert_eq!(
        vitals["code"],
        json!({"coding": [{"code": "8867-4", "display": "Heart rate"}]})
    );
    assert_eq!(vitals["valueQuantity"]["value"], json!(72.0));
    assert_eq!(vitals["valueQuantity"]["unit"], "/min");
}

#[test]
fn test_second_subject_skips_empty_cells() {
    let dir = TempDir::new().unwrap();
    write_workbook(dir.path());
    let input = load_input(dir.path(), &InputConfiguration::default()).unwrap();

    let outcome = Converter::default()
        .convert_subject(&input, 1, &mut SequentialIdGenerator::new(1))
        .unwrap();
    let bundle = serde_json::to_value(&outcome.bundle).unwrap();
    let docs = resources(&bundle);

    assert_eq!(docs[0]["name"], json!([{"use": "official", "family": "Smith"}]));
    assert!(docs[1].get("status").is_none());
    assert!(docs[2].get("valueQuantity").is_none());
}

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn test_xlsx_workbook_to_bundle() {
    let input = load_input(&fixture("workbook.xlsx"), &InputConfiguration::default()).unwrap();

    assert_eq!(input.definitions.len(), 2);
    assert_eq!(input.links.len(), 1);
    assert_eq!(input.fields.len(), 4);
    assert_eq!(input.subject_count(), 2);
    assert_eq!(input.fields[1].values, vec![json!("1970-01-31"), JsonValue::Null]);

    let outcome = Converter::default()
        .convert_subject(&input, 0, &mut SequentialIdGenerator::new(0))
        .unwrap();
    let bundle = serde_json::to_value(&outcome.bundle).unwrap();
    let docs = resources(&bundle);

    let patient = docs[0];
    assert_eq!(patient["name"], json!([{"family": "Dickerson"}]));
    assert_eq!(patient["birthDate"], "1970-01-31");
    assert_eq!(patient["multipleBirthInteger"], json!(2));
    assert_eq!(
        docs[1]["subject"]["reference"],
        format!("Patient/{}", patient["id"].as_str().unwrap())
    );
    assert_eq!(docs[1]["status"], "finished");
}

#[test]
fn test_xlsx_sheet_names_follow_config() {
    let input = InputConfiguration {
        patient_data_file: Some("Subjects.csv".to_string()),
        ..InputConfiguration::default()
    };

    let err = load_input(&fixture("workbook.xlsx"), &input).unwrap_err();
    assert!(err.to_string().contains("Subjects"));
}

#[test]
fn test_config_changes_linking() {
    let dir = TempDir::new().unwrap();
    write_workbook(dir.path());
    fs::write(
        dir.path().join(".tabfhirrc.json"),
        r#"{"linker": {"inferDefaultLinks": false}}"#,
    )
    .unwrap();

    let config = ConfigLoader::load(None, Some(dir.path())).unwrap();
    let input = load_input(dir.path(), &config.input_config()).unwrap();
    let outcome = Converter::from_config(&config)
        .convert_subject(&input, 0, &mut SequentialIdGenerator::new(0))
        .unwrap();

    let docs: Vec<&JsonValue> = outcome.bundle.entry.iter().map(|e| &e.resource).collect();
    assert!(docs[1].get("subject").is_none());
    // The authored link still applies
    assert!(docs[2].get("subject").is_some());
    assert!(docs[2].get("encounter").is_none());
}

#[test]
fn test_structural_error_reports_entity_and_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("input.json");
    fs::write(
        &path,
        r#"{
            "resourceDefinitions": [{"entityName": "PatientEntity", "resourceType": "Patient"}],
            "fieldMappings": [
                {"entityName": "PatientEntity", "jsonpath": "$.name.[x]", "valueType": "string", "values": ["x"]}
            ]
        }"#,
    )
    .unwrap();

    let input = load_input(&path, &InputConfiguration::default()).unwrap();
    let err = Converter::default()
        .convert_subject(&input, 0, &mut SequentialIdGenerator::new(0))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Structural);
    assert!(err.to_string().contains("$.name.[x]"));
}

/// Writes the value upper-cased under `<key>Upper`
struct ShoutHandler;

impl SpecialHandler for ShoutHandler {
    fn name(&self) -> &str {
        "shout"
    }

    fn assign(
        &self,
        context: &HandlerContext<'_>,
        node: JsonValue,
        key: &str,
        value: &JsonValue,
    ) -> Result<JsonValue, BuildError> {
        let mut node = node;
        let text = value.as_str().unwrap_or_default().to_uppercase();
        node[format!("{key}Upper")] = json!(text);
        node["handledPath"] = json!(context.path);
        Ok(node)
    }
}

#[test]
fn test_custom_handler_replaces_traversal() {
    let mut registry = HandlerRegistry::new();
    registry.register("Patient.name", Box::new(ShoutHandler));
    let builder = TreeBuilder::new(registry, Box::new(TypedLeafFormatter));

    let definition = ResourceDefinition::new("PatientEntity", "Patient");
    let field = FieldMapping::new("PatientEntity", "Patient.name[0].family", "string");
    let node = builder
        .apply(json!({}), &definition, &field, &json!("smith"))
        .unwrap();

    assert_eq!(
        node,
        json!({"nameUpper": "SMITH", "handledPath": "Patient.name[0].family"})
    );
}

/// Wraps every leaf in `{"raw": ...}`
struct RawFormatter;

impl LeafFormatter for RawFormatter {
    fn assign_leaf(
        &self,
        node: &mut serde_json::Map<String, JsonValue>,
        key: &str,
        value: &JsonValue,
        _value_type: &tabfhir_core::export::ValueType,
    ) -> Result<(), tabfhir_core::export::FormatError> {
        node.insert(key.to_string(), json!({ "raw": value }));
        Ok(())
    }
}

#[test]
fn test_custom_leaf_formatter_is_used_for_slots() {
    let builder = TreeBuilder::new(HandlerRegistry::new(), Box::new(RawFormatter));
    let definition = ResourceDefinition::new("PatientEntity", "Patient");
    let field = FieldMapping::new("PatientEntity", "name[0].given[1]", "string");

    let node = builder
        .apply(json!({}), &definition, &field, &json!("Ann"))
        .unwrap();

    assert_eq!(node, json!({"name": [{"given": [{}, {"raw": "Ann"}]}]}));
}

#[test]
fn test_linker_without_inference_only_applies_authored() {
    let dir = TempDir::new().unwrap();
    write_workbook(dir.path());
    let input = load_input(dir.path(), &InputConfiguration::default()).unwrap();
    let converter = Converter::new(TreeBuilder::default(), ReferenceLinker::new().with_inference(false));

    let outcome = converter
        .convert_subject(&input, 0, &mut SequentialIdGenerator::new(0))
        .unwrap();

    assert_eq!(outcome.stats.links.inferred, 0);
    assert_eq!(outcome.stats.links.applied, 1);
}

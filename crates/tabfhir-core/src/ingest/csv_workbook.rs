//! CSV workbook directory reader
//!
//! A workbook is a directory holding one CSV per sheet:
//!
//! - `ResourceDefinitions.csv`: header row, a description row, then one
//!   definition per row (`Entity Name`, `ResourceType`, `Profile(s)`)
//! - `ResourceLinks.csv`: header row, a description row, then one link per
//!   row (`OriginResource`, `ReferencePath`, `DestinationResource`)
//! - `PatientData.csv`: five metadata rows (entity, path, value type, value
//!   set, data element) starting at the third column, then one row per subject

use crate::config::InputConfiguration;
use crate::error::TabfhirError;
use crate::model::{FieldMapping, ResourceDefinition, ResourceLinkSpec};
use crate::result::Result;
use csv::ReaderBuilder;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

use super::ConversionInput;

/// Rows before data starts in the definition and link sheets
const TABLE_DATA_START: usize = 2;
/// Metadata rows at the top of the patient data sheet
const PATIENT_METADATA_ROWS: usize = 5;
/// Label columns at the left of the patient data sheet
const PATIENT_LABEL_COLUMNS: usize = 2;

pub(super) type Rows = Vec<Vec<String>>;

pub(super) fn normalize_cell(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

/// Header key: lower case without whitespace
fn normalize_header(raw: &str) -> String {
    normalize_cell(raw)
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn cell(row: &[String], column: usize) -> &str {
    row.get(column).map(String::as_str).unwrap_or("")
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|value| value.is_empty())
}

/// Read every record of a headerless CSV, keeping row positions
pub fn read_rows<R: Read>(reader: R, source: &Path) -> Result<Rows> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| TabfhirError::CsvError {
            path: source.to_path_buf(),
            source: e,
        })?;
        rows.push(record.iter().map(normalize_cell).collect());
    }
    Ok(rows)
}

fn read_sheet(path: &Path) -> Result<Rows> {
    let file = std::fs::File::open(path).map_err(|e| TabfhirError::io_error(path, e))?;
    read_rows(file, path)
}

/// Read a workbook directory
///
/// The links sheet is optional; the other two are required.
pub fn read_workbook(dir: &Path, config: &InputConfiguration) -> Result<ConversionInput> {
    let definitions_path = dir.join(config.definitions_file());
    let links_path = dir.join(config.links_file());
    let patient_path = dir.join(config.patient_data_file());

    let definitions = parse_definitions(&read_sheet(&definitions_path)?, &definitions_path)?;
    let links = if links_path.is_file() {
        parse_links(&read_sheet(&links_path)?, &links_path)?
    } else {
        debug!("No links sheet at {}", links_path.display());
        Vec::new()
    };
    let fields = parse_patient_data(&read_sheet(&patient_path)?, &patient_path)?;

    Ok(ConversionInput {
        definitions,
        links,
        fields,
    })
}

/// Locate required header columns in the first row
fn header_columns<const N: usize>(
    rows: &[Vec<String>],
    names: [&str; N],
    source: &Path,
) -> Result<[usize; N]> {
    let headers: Vec<String> = rows
        .first()
        .map(|row| row.iter().map(|value| normalize_header(value)).collect())
        .unwrap_or_default();

    let mut columns = [0usize; N];
    for (slot, name) in columns.iter_mut().zip(names) {
        let wanted = normalize_header(name);
        *slot = headers
            .iter()
            .position(|header| *header == wanted)
            .ok_or_else(|| {
                TabfhirError::ingest_error(
                    source.display().to_string(),
                    format!("missing required column '{name}'"),
                )
            })?;
    }
    Ok(columns)
}

/// Parse the resource definitions sheet
pub fn parse_definitions(rows: &[Vec<String>], source: &Path) -> Result<Vec<ResourceDefinition>> {
    let [entity, resource_type, profiles] =
        header_columns(rows, ["Entity Name", "ResourceType", "Profile(s)"], source)?;

    let mut definitions = Vec::new();
    for (index, row) in rows.iter().enumerate().skip(TABLE_DATA_START) {
        if is_blank(row) {
            continue;
        }
        let entity_name = cell(row, entity);
        if entity_name.is_empty() {
            warn!("{} row {}: missing entity name, skipped", source.display(), index + 1);
            continue;
        }

        let profile_list = cell(row, profiles)
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
        definitions.push(
            ResourceDefinition::new(entity_name, cell(row, resource_type))
                .with_profiles(profile_list),
        );
    }
    Ok(definitions)
}

/// Parse the resource links sheet
pub fn parse_links(rows: &[Vec<String>], source: &Path) -> Result<Vec<ResourceLinkSpec>> {
    let [origin_col, path_col, destination_col] = header_columns(
        rows,
        ["OriginResource", "ReferencePath", "DestinationResource"],
        source,
    )?;

    let mut links = Vec::new();
    for (index, row) in rows.iter().enumerate().skip(TABLE_DATA_START) {
        if is_blank(row) {
            continue;
        }
        let (origin, path, destination) = (
            cell(row, origin_col),
            cell(row, path_col),
            cell(row, destination_col),
        );
        if origin.is_empty() || path.is_empty() || destination.is_empty() {
            warn!("{} row {}: incomplete link, skipped", source.display(), index + 1);
            continue;
        }
        links.push(ResourceLinkSpec::new(origin, destination, path));
    }
    Ok(links)
}

/// Parse the patient data sheet into one field mapping per column
pub fn parse_patient_data(rows: &[Vec<String>], source: &Path) -> Result<Vec<FieldMapping>> {
    if rows.len() < PATIENT_METADATA_ROWS {
        return Err(TabfhirError::ingest_error(
            source.display().to_string(),
            format!(
                "expected {PATIENT_METADATA_ROWS} metadata rows, found {}",
                rows.len()
            ),
        ));
    }

    let (metadata, subjects) = rows.split_at(PATIENT_METADATA_ROWS);
    let subjects: Vec<&Vec<String>> = subjects.iter().filter(|row| !is_blank(row)).collect();
    let width = metadata.iter().map(Vec::len).max().unwrap_or(0);

    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    for column in PATIENT_LABEL_COLUMNS..width {
        let entity = cell(&metadata[0], column);
        let path = cell(&metadata[1], column);
        if entity.is_empty() || path.is_empty() {
            debug!("{} column {}: no entity or path, skipped", source.display(), column + 1);
            continue;
        }

        let element = match cell(&metadata[4], column) {
            "" => path,
            name => name,
        };
        if !seen.insert((entity.to_string(), element.to_string())) {
            warn!(
                "{} column {}: duplicate data element '{}' for '{}', skipped",
                source.display(),
                column + 1,
                element,
                entity
            );
            continue;
        }

        let values = subjects
            .iter()
            .map(|row| match cell(row, column) {
                "" => JsonValue::Null,
                text => JsonValue::String(text.to_string()),
            })
            .collect();

        let value_set = cell(&metadata[3], column);
        let mut field = FieldMapping::new(entity, path, cell(&metadata[2], column)).with_values(values);
        field.field_name = element.to_string();
        field.value_set = (!value_set.is_empty()).then(|| value_set.to_string());
        fields.push(field);
    }
    Ok(fields)
}

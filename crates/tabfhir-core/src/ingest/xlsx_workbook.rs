//! Excel workbook reader
//!
//! An `.xlsx` file carries the same three sheets as a CSV workbook
//! directory, named after the configured sheet files without their
//! extension (`ResourceDefinitions`, `ResourceLinks`, `PatientData`). Cell
//! positions are absolute from `A1`, so the row and column conventions of
//! the CSV sheets apply unchanged.

use crate::config::InputConfiguration;
use crate::error::TabfhirError;
use crate::result::Result;
use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use chrono::Timelike;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, warn};

use super::ConversionInput;
use super::csv_workbook::{Rows, normalize_cell, parse_definitions, parse_links, parse_patient_data};

/// Read an `.xlsx` workbook
///
/// The links sheet is optional; the other two are required.
pub fn read_xlsx(path: &Path, config: &InputConfiguration) -> Result<ConversionInput> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e: calamine::XlsxError| TabfhirError::ingest_error(path.display().to_string(), e.to_string()))?;
    let sheets = workbook.sheet_names();
    debug!("Workbook {} has sheets {:?}", path.display(), sheets);

    let definitions_sheet = config.definitions_sheet();
    let links_sheet = config.links_sheet();
    let patient_sheet = config.patient_data_sheet();

    let definitions = parse_definitions(
        &sheet_rows(&mut workbook, path, definitions_sheet)?,
        &path.join(definitions_sheet),
    )?;
    let links = if sheets.iter().any(|name| name == links_sheet) {
        parse_links(&sheet_rows(&mut workbook, path, links_sheet)?, &path.join(links_sheet))?
    } else {
        debug!("No '{}' sheet in {}", links_sheet, path.display());
        Vec::new()
    };
    let fields = parse_patient_data(
        &sheet_rows(&mut workbook, path, patient_sheet)?,
        &path.join(patient_sheet),
    )?;

    Ok(ConversionInput {
        definitions,
        links,
        fields,
    })
}

fn sheet_rows<RS: Read + Seek>(workbook: &mut Xlsx<RS>, path: &Path, sheet: &str) -> Result<Rows> {
    let range = workbook.worksheet_range(sheet).map_err(|e| {
        TabfhirError::ingest_error(path.display().to_string(), format!("sheet '{sheet}': {e}"))
    })?;
    Ok(range_rows(&range, sheet))
}

/// Cell text laid out from `A1`
///
/// A range starts at its first used cell; the leading empty rows and columns
/// are restored so row and column indices match the sheet.
fn range_rows(range: &Range<Data>, sheet: &str) -> Rows {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };

    let mut rows: Rows = vec![Vec::new(); start_row as usize];
    for (offset, row) in range.rows().enumerate() {
        let mut cells = vec![String::new(); start_col as usize];
        for (column, data) in row.iter().enumerate() {
            let position = (start_row as usize + offset, start_col as usize + column);
            cells.push(cell_text(data, sheet, position));
        }
        rows.push(cells);
    }
    rows
}

/// Text of one cell as a CSV export would show it
///
/// Dates become ISO-8601 so the leaf formatter reads them like typed text.
fn cell_text(data: &Data, sheet: &str, (row, column): (usize, usize)) -> String {
    match data {
        Data::DateTime(datetime) if datetime.is_datetime() => match datetime.as_datetime() {
            Some(value) if value.num_seconds_from_midnight() == 0 => {
                value.format("%Y-%m-%d").to_string()
            }
            Some(value) => value.format("%Y-%m-%dT%H:%M:%S").to_string(),
            None => datetime.to_string(),
        },
        Data::Error(error) => {
            warn!(
                "Sheet '{}' row {} column {}: cell error {}, read as empty",
                sheet,
                row + 1,
                column + 1,
                error
            );
            String::new()
        }
        other => normalize_cell(&other.to_string()),
    }
}

//! JSON record file reader

use super::ConversionInput;
use crate::error::TabfhirError;
use crate::result::Result;
use std::path::Path;

/// Read a `{resourceDefinitions, resourceLinks, fieldMappings}` file
pub fn read_json_file(path: &Path) -> Result<ConversionInput> {
    let text = std::fs::read_to_string(path).map_err(|e| TabfhirError::io_error(path, e))?;
    parse_json(&text).map_err(|e| match e {
        TabfhirError::JsonError(source) => {
            TabfhirError::ingest_error(path.display().to_string(), source.to_string())
        }
        other => other,
    })
}

/// Parse record JSON, filling in field names from paths where absent
pub fn parse_json(text: &str) -> Result<ConversionInput> {
    let mut input: ConversionInput = serde_json::from_str(text)?;
    for field in &mut input.fields {
        if field.field_name.is_empty() {
            field.field_name = field.path.clone();
        }
    }
    Ok(input)
}

//! Configuration system for tabfhir
//!
//! Settings are optional; every section falls back to built-in defaults.
//!
//! ## Configuration Files
//!
//! Searched for in each directory, in order:
//! - `.tabfhirrc.json`
//! - `.tabfhirrc.toml`
//! - `tabfhir.toml`
//!
//! Discovery starts at the input's directory and walks up to the
//! filesystem root.
//!
//! ## Example Configuration
//!
//! ```json
//! {
//!   "input": {
//!     "definitionsFile": "ResourceDefinitions.csv",
//!     "linksFile": "ResourceLinks.csv",
//!     "patientDataFile": "PatientData.csv"
//!   },
//!   "linker": {
//!     "inferDefaultLinks": true,
//!     "defaultLinks": [
//!       { "sourceType": "carePlan", "destinationType": "goal", "field": "goal" }
//!     ]
//!   },
//!   "handlers": {
//!     "useDefaultHandlers": true,
//!     "register": [
//!       { "prefix": "Condition.code", "kind": "codeable-concept" }
//!     ]
//!   },
//!   "output": {
//!     "pretty": true,
//!     "fileName": "bundle-{subject}.json"
//!   }
//! }
//! ```

mod loader;
mod tabfhir_config;

pub use loader::{CONFIG_FILE_NAMES, ConfigLoader};
pub use tabfhir_config::{
    HandlerRegistration, HandlersConfiguration, InputConfiguration, LinkRuleConfig,
    LinkerConfiguration, OutputConfiguration, TabfhirConfig,
};

//! Transaction bundle assembly
//!
//! Wraps finished documents into a FHIR `Bundle` of type `transaction`, one
//! `PUT` entry per document.

use crate::ids::IdGenerator;
use crate::model::ResourceDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

pub const BUNDLE_RESOURCE_TYPE: &str = "Bundle";
pub const BUNDLE_TYPE: &str = "transaction";
pub const REQUEST_METHOD: &str = "PUT";

/// Request descriptor attached to each entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRequest {
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub full_url: String,
    pub resource: JsonValue,
    pub request: BundleRequest,
}

/// Batch submission envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBundle {
    pub resource_type: String,
    pub id: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

impl TransactionBundle {
    pub fn len(&self) -> usize {
        self.entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_empty()
    }

    /// Serialize to JSON text
    pub fn to_json_string(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

/// Builds transaction bundles from documents
#[derive(Debug, Default, Clone, Copy)]
pub struct BundleAssembler;

impl BundleAssembler {
    pub fn new() -> Self {
        Self
    }

    /// One entry per document, in document order
    pub fn assemble(
        &self,
        documents: Vec<ResourceDocument>,
        ids: &mut dyn IdGenerator,
    ) -> TransactionBundle {
        let entry: Vec<BundleEntry> = documents.into_iter().map(|doc| self.entry(doc)).collect();
        let bundle = TransactionBundle {
            resource_type: BUNDLE_RESOURCE_TYPE.to_string(),
            id: ids.next_id(),
            bundle_type: BUNDLE_TYPE.to_string(),
            entry,
        };
        debug!("Assembled bundle {} with {} entries", bundle.id, bundle.len());
        bundle
    }

    pub fn entry(&self, document: ResourceDocument) -> BundleEntry {
        BundleEntry {
            full_url: format!("urn:uuid:{}", document.id),
            request: BundleRequest {
                method: REQUEST_METHOD.to_string(),
                url: document.reference(),
            },
            resource: document.resource,
        }
    }
}

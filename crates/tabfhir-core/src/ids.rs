//! Identifier generation for documents and bundles
//!
//! Every run allocates fresh identifiers by default. Callers that need
//! reproducible output inject a [`SequentialIdGenerator`] instead.

use uuid::Uuid;

/// Source of unique identifiers
pub trait IdGenerator {
    /// Produce the next identifier
    fn next_id(&mut self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic UUID-formatted identifiers
///
/// The high 64 bits carry the namespace (usually the subject index), the low
/// 64 bits a counter starting at 1.
#[derive(Debug, Clone)]
pub struct SequentialIdGenerator {
    namespace: u64,
    counter: u64,
}

impl SequentialIdGenerator {
    pub fn new(namespace: u64) -> Self {
        Self {
            namespace,
            counter: 0,
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&mut self) -> String {
        self.counter += 1;
        Uuid::from_u128((u128::from(self.namespace) << 64) | u128::from(self.counter)).to_string()
    }
}

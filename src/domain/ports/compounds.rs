//! Compound port - structure lookup, similarity search and class enumeration.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// A named compound with its structure string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundRecord {
    pub name: String,
    pub structure: String,
    /// Database key usable as a similarity seed (e.g. a `PubChem` CID).
    pub key: Option<String>,
}

#[async_trait]
pub trait CompoundSource: Send + Sync {
    /// Resolve a compound name to its structure. `None` when unknown.
    async fn lookup(&self, name: &str) -> DomainResult<Option<CompoundRecord>>;

    /// Compounds structurally related to the seed, at most `limit`.
    async fn similar(&self, seed_key: &str, limit: usize) -> DomainResult<Vec<CompoundRecord>>;

    /// Names of compounds in a therapeutic class, skipping `exclude`.
    async fn enumerate_class(
        &self,
        class_name: &str,
        exclude: &[String],
        limit: usize,
    ) -> DomainResult<Vec<String>>;
}

//! Literature port - target and drug discovery for a subject.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::DrugCandidate;

/// What the literature stage found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteratureReport {
    pub protein_targets: Vec<String>,
    pub drugs: Vec<DrugCandidate>,
    pub review_text: String,
}

/// Source of protein targets, known drugs and the narrative review.
///
/// An empty `protein_targets` list is treated by the pipeline as a fatal
/// stage failure.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    async fn discover(&self, subject: &str) -> DomainResult<LiteratureReport>;
}

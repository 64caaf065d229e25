//! Hypothesis port - the external reasoner consulted after each docking round.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DockingResult, ExpansionRecord};

/// Bounded summary of the run handed to the reasoner.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningRequest {
    pub subject: String,
    pub round: u32,
    pub max_rounds: u32,
    /// Best results so far, ranked. Never the full set.
    pub top_results: Vec<DockingResult>,
    pub total_results: usize,
    pub targets: Vec<String>,
    pub history: Vec<ExpansionRecord>,
    pub hypotheses: Vec<String>,
}

#[async_trait]
pub trait HypothesisSource: Send + Sync {
    /// Return the raw decision payload. Normalization happens in the caller.
    async fn decide(&self, request: &ReasoningRequest) -> DomainResult<Value>;
}

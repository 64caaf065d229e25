//! CLI command implementations.

pub mod resume;
pub mod run;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::{
    ChatClient, JsonStateStore, PipelineCompounds, PubChemClient, RcsbStructureSource,
    RunPodBackend,
};
use crate::cli::output::{hits_table, CommandOutput, HitRow};
use crate::domain::models::{Config, RunState};
use crate::services::PipelineCollaborators;

/// Hits shown after a run or resume.
const SUMMARY_HITS: usize = 10;

/// Wire the live HTTP collaborators and the JSON state store.
pub fn live_collaborators(config: &Config) -> Result<PipelineCollaborators> {
    let chat = Arc::new(
        ChatClient::new(&config.chat, &config.retry).context("chat collaborator misconfigured")?,
    );
    let pubchem = Arc::new(
        PubChemClient::new(&config.pubchem, &config.retry).context("PubChem client setup failed")?,
    );
    let structures_dir = Path::new(&config.output_dir).join(&config.rcsb.structures_dir);
    let structures = Arc::new(
        RcsbStructureSource::new(&config.rcsb, structures_dir, Arc::clone(&pubchem), &config.retry)
            .context("structure source setup failed")?,
    );
    let backend = Arc::new(
        RunPodBackend::new(&config.backend, &config.retry)
            .context("docking backend misconfigured")?,
    );

    Ok(PipelineCollaborators {
        literature: chat.clone(),
        structures,
        compounds: Arc::new(PipelineCompounds::new(pubchem, Arc::clone(&chat))),
        hypothesis: chat.clone(),
        backend,
        report: chat,
        store: Arc::new(JsonStateStore::in_dir(&config.output_dir)),
    })
}

/// Summary printed when `run` or `resume` finishes.
#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub run_id: String,
    pub subject: String,
    pub status: String,
    pub rounds: u32,
    pub total_results: usize,
    pub targets_docked: usize,
    pub targets_without_structure: usize,
    pub expansions: usize,
    pub output_dir: String,
    pub top_hits: Vec<HitRow>,
}

impl RunOutput {
    pub fn from_state(state: &RunState, output_dir: &str) -> Self {
        Self {
            run_id: state.run_id.to_string(),
            subject: state.subject.clone(),
            status: state.status.to_string(),
            rounds: state.round,
            total_results: state.accumulated_results.len(),
            targets_docked: state
                .targets
                .iter()
                .filter(|t| !state.results_for_target(&t.id).is_empty())
                .count(),
            targets_without_structure: state.targets.iter().filter(|t| !t.has_structure()).count(),
            expansions: state
                .expansion_history
                .iter()
                .filter(|r| r.action.is_expansion())
                .count(),
            output_dir: output_dir.to_string(),
            top_hits: HitRow::top(state, SUMMARY_HITS),
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        [
            format!("Run {} for '{}': {}", self.run_id, self.subject, self.status),
            format!(
                "{} docking round(s), {} expansion(s), {} result(s) across {} target(s)",
                self.rounds, self.expansions, self.total_results, self.targets_docked
            ),
            format!("{} target(s) had no usable structure", self.targets_without_structure),
            format!("Artifacts written to {}", self.output_dir),
            String::new(),
            hits_table(&self.top_hits),
        ]
        .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

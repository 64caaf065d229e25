//! `dockloop status` - inspect the persisted run without advancing it.

use anyhow::Result;
use serde::Serialize;

use crate::adapters::JsonStateStore;
use crate::cli::output::{hits_table, output, targets_table, CommandOutput, HitRow, TargetRow};
use crate::domain::models::{Config, RunState};
use crate::domain::ports::StateStore;

#[derive(Debug, Serialize)]
pub struct ExpansionRow {
    pub round: u32,
    pub action: String,
    pub rationale: String,
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub run_id: String,
    pub subject: String,
    pub status: String,
    pub round: u32,
    pub max_rounds: Option<u32>,
    pub updated_at: String,
    pub total_results: usize,
    pub targets: Vec<TargetRow>,
    pub expansions: Vec<ExpansionRow>,
    pub top_hits: Vec<HitRow>,
}

impl StatusOutput {
    pub fn from_state(state: &RunState, top: usize) -> Self {
        Self {
            run_id: state.run_id.to_string(),
            subject: state.subject.clone(),
            status: state.status.to_string(),
            round: state.round,
            max_rounds: state.max_rounds,
            updated_at: state.updated_at.to_rfc3339(),
            total_results: state.accumulated_results.len(),
            targets: TargetRow::all(state),
            expansions: state
                .expansion_history
                .iter()
                .map(|r| ExpansionRow {
                    round: r.round,
                    action: r.action.to_string(),
                    rationale: r.rationale.clone(),
                })
                .collect(),
            top_hits: HitRow::top(state, top),
        }
    }
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Run:      {}", self.run_id),
            format!("Subject:  {}", self.subject),
            format!("Status:   {}", self.status),
            match self.max_rounds {
                Some(cap) => format!("Round:    {} (cap {cap})", self.round),
                None => format!("Round:    {}", self.round),
            },
            format!("Updated:  {}", self.updated_at),
            format!("Results:  {}", self.total_results),
            String::new(),
            targets_table(&self.targets),
        ];
        if !self.expansions.is_empty() {
            lines.push(String::new());
            lines.push("Decisions:".to_string());
            for e in &self.expansions {
                lines.push(format!("  round {} {}: {}", e.round, e.action, e.rationale));
            }
        }
        lines.push(String::new());
        lines.push(hits_table(&self.top_hits));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(top: usize, config: &Config, json_mode: bool) -> Result<()> {
    let store = JsonStateStore::in_dir(&config.output_dir);
    let state = store.load().await?;
    output(&StatusOutput::from_state(&state, top), json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ExpansionDecision, RunStatus};

    #[test]
    fn test_status_output_lists_decisions() {
        let mut state = RunState::new("glioma");
        state.status = RunStatus::DockingRoundComplete(1);
        state.round = 1;
        state.max_rounds = Some(3);
        state.record_decision(&ExpansionDecision::proceed(1, "signal is weak"));

        let out = StatusOutput::from_state(&state, 5);
        assert_eq!(out.status, "docking_round_1_complete");
        assert_eq!(out.expansions.len(), 1);
        let human = out.to_human();
        assert!(human.contains("signal is weak"));
        assert!(human.contains("(cap 3)"));
        assert_eq!(out.to_json()["round"], 1);
        assert_eq!(out.to_json()["max_rounds"], 3);
    }

    #[tokio::test]
    async fn test_status_without_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().display().to_string(),
            ..Config::default()
        };
        assert!(execute(5, &config, true).await.is_err());
    }
}

//! Derived artifacts rebuilt from the run state.
//!
//! None of these files is ever read back by the pipeline. They are regenerated
//! from `accumulated_results` whenever they are needed, so a stale file left by
//! a crash cannot leak into a resumed run.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DockingResult, RunState, TargetFailure};

pub const DOCKING_RESULTS_FILE: &str = "docking_results.json";
pub const REVIEW_FILE: &str = "review.md";
pub const RESULTS_FILE: &str = "results.md";
pub const PAPER_FILE: &str = "final_paper.md";

/// Write `bytes` to `path` via a sibling temp file, fsync, then rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> DomainResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Ranked results and failures for one target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    pub target: String,
    pub structure_id: Option<String>,
    pub structure_file: Option<PathBuf>,
    pub ligand_count: usize,
    pub failures: Vec<TargetFailure>,
    pub results: Vec<DockingResult>,
}

/// Contents of `docking_results.json`.
#[derive(Debug, Clone, Serialize)]
pub struct DockingSummary {
    pub subject: String,
    pub rounds: u32,
    pub total_results: usize,
    pub targets: Vec<TargetSummary>,
}

impl DockingSummary {
    pub fn from_state(state: &RunState) -> Self {
        let targets = state
            .targets
            .iter()
            .map(|t| TargetSummary {
                target: t.id.clone(),
                structure_id: t.structure_id.clone(),
                structure_file: t.structure_file.clone(),
                ligand_count: t.ligands.len(),
                failures: t.failures.clone(),
                results: state.results_for_target(&t.id).into_iter().cloned().collect(),
            })
            .collect();
        Self {
            subject: state.subject.clone(),
            rounds: state.round,
            total_results: state.accumulated_results.len(),
            targets,
        }
    }
}

/// Writes derived artifacts under one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// Rebuild `docking_results.json` from the state.
    pub async fn write_docking_results(&self, state: &RunState) -> DomainResult<PathBuf> {
        let path = self.path(DOCKING_RESULTS_FILE);
        let json = serde_json::to_string_pretty(&DockingSummary::from_state(state))?;
        write_atomic(&path, json.as_bytes()).await?;
        debug!(path = %path.display(), "docking results written");
        Ok(path)
    }

    pub async fn write_text(&self, name: &str, text: &str) -> DomainResult<PathBuf> {
        let path = self.path(name);
        write_atomic(&path, text.as_bytes()).await?;
        debug!(path = %path.display(), "artifact written");
        Ok(path)
    }
}

/// Plain markdown results report, used when no report writer output is available.
pub fn render_results_markdown(state: &RunState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Docking Results: {}\n", state.subject);
    let _ = writeln!(
        out,
        "{} results across {} targets in {} docking rounds.\n",
        state.accumulated_results.len(),
        state.targets.len(),
        state.round
    );

    for target in &state.targets {
        let _ = writeln!(out, "## {}\n", target.id);
        match &target.structure_id {
            Some(id) => {
                let _ = writeln!(out, "Structure: {id}\n");
            }
            None => {
                let _ = writeln!(out, "No structure available.\n");
            }
        }

        let results = state.results_for_target(&target.id);
        if !results.is_empty() {
            out.push_str("| Rank | Ligand | Confidence | Round | Provenance |\n");
            out.push_str("|---|---|---|---|---|\n");
            for (rank, r) in results.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "| {} | {} | {:.3} | {} | {} |",
                    rank + 1,
                    r.ligand_name,
                    r.confidence_score,
                    r.round,
                    r.provenance
                );
            }
            out.push('\n');
        }

        for failure in &target.failures {
            let _ = writeln!(
                out,
                "- Round {}: {} ({})",
                failure.round, failure.kind, failure.detail
            );
        }
        if !target.failures.is_empty() {
            out.push('\n');
        }
    }
    out
}

/// "Autonomous Reasoning History" section pairing hypotheses with decisions.
///
/// Empty when no round was reasoned about.
pub fn reasoning_history_section(state: &RunState) -> String {
    if state.expansion_history.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\n## Autonomous Reasoning History\n\n");
    for (i, record) in state.expansion_history.iter().enumerate() {
        let hypothesis = state.hypotheses.get(i).map_or("", String::as_str);
        let _ = writeln!(out, "### Round {}", record.round);
        let _ = writeln!(out, "- Hypothesis: {hypothesis}");
        let _ = writeln!(out, "- Action: {}", record.action);
        let _ = writeln!(out, "- Rationale: {}\n", record.rationale);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ExpansionDecision, Ligand, Target};

    #[tokio::test]
    async fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "second");
        assert!(!dir.path().join("nested").join("out.json.tmp").exists());
    }

    #[test]
    fn test_history_section_pairs_entries() {
        let mut state = RunState::new("AML");
        assert!(reasoning_history_section(&state).is_empty());

        let mut decision = ExpansionDecision::proceed(1, "strong FLT3 hits");
        decision.hypothesis = "FLT3 inhibitors dominate".into();
        state.record_decision(&decision);

        let section = reasoning_history_section(&state);
        assert!(section.contains("## Autonomous Reasoning History"));
        assert!(section.contains("- Hypothesis: FLT3 inhibitors dominate"));
        assert!(section.contains("- Action: proceed"));
    }

    #[test]
    fn test_markdown_lists_failures() {
        let mut state = RunState::new("AML");
        let mut target = Target::new("FLT3");
        target.add_ligand(Ligand::new("gilteritinib", "C"));
        target.record_failure(crate::domain::models::TargetFailure::new(
            0,
            crate::domain::models::TargetFailureKind::NoStructure,
            "no entry",
        ));
        state.targets.push(target);

        let md = render_results_markdown(&state);
        assert!(md.contains("## FLT3"));
        assert!(md.contains("no_structure"));
    }
}

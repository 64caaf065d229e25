//! Output formatting utilities for the CLI.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

use crate::domain::models::{DockingResult, RunState, Target};

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Borderless table with upper-case headers.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// One ranked docking hit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HitRow {
    pub rank: usize,
    pub ligand: String,
    pub target: String,
    pub confidence: f64,
    pub round: u32,
    pub approval_status: String,
}

impl HitRow {
    pub fn top(state: &RunState, n: usize) -> Vec<Self> {
        state
            .top_results(n)
            .into_iter()
            .enumerate()
            .map(|(i, r)| Self::from_result(i + 1, r))
            .collect()
    }

    fn from_result(rank: usize, result: &DockingResult) -> Self {
        Self {
            rank,
            ligand: result.ligand_name.clone(),
            target: result.target_id.clone(),
            confidence: result.confidence_score,
            round: result.round,
            approval_status: result.approval_status.clone(),
        }
    }
}

pub fn hits_table(hits: &[HitRow]) -> String {
    if hits.is_empty() {
        return "No docking results yet.".to_string();
    }
    let mut table = list_table(&["#", "ligand", "target", "confidence", "round", "status"]);
    for hit in hits {
        table.add_row(vec![
            hit.rank.to_string(),
            truncate(&hit.ligand, 40),
            hit.target.clone(),
            format!("{:.4}", hit.confidence),
            hit.round.to_string(),
            truncate(&hit.approval_status, 24),
        ]);
    }
    table.to_string()
}

/// Per-target progress.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TargetRow {
    pub target: String,
    pub structure: Option<String>,
    pub ligands: usize,
    pub results: usize,
    pub failures: Vec<String>,
}

impl TargetRow {
    pub fn all(state: &RunState) -> Vec<Self> {
        state
            .targets
            .iter()
            .map(|t| Self::from_target(state, t))
            .collect()
    }

    fn from_target(state: &RunState, target: &Target) -> Self {
        Self {
            target: target.id.clone(),
            structure: target.structure_id.clone(),
            ligands: target.ligands.len(),
            results: state.results_for_target(&target.id).len(),
            failures: target
                .failures
                .iter()
                .map(|f| format!("round {} {}: {}", f.round, f.kind, f.detail))
                .collect(),
        }
    }
}

pub fn targets_table(rows: &[TargetRow]) -> String {
    if rows.is_empty() {
        return "No targets yet.".to_string();
    }
    let mut table = list_table(&["target", "structure", "ligands", "results", "failures"]);
    for row in rows {
        table.add_row(vec![
            row.target.clone(),
            row.structure.clone().unwrap_or_else(|| "-".to_string()),
            row.ligands.to_string(),
            row.results.to_string(),
            row.failures
                .last()
                .map_or_else(|| "-".to_string(), |f| truncate(f, 48)),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Ligand, TargetFailure, TargetFailureKind};

    fn result(name: &str, score: f64) -> DockingResult {
        DockingResult {
            ligand_name: name.into(),
            confidence_score: score,
            confidence_raw: 0.0,
            target_id: "KRAS".into(),
            structure_id: Some("6OIM".into()),
            round: 1,
            structure: "C".into(),
            mechanism: String::new(),
            approval_status: "Approved".into(),
            provenance: String::new(),
        }
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ßßßßßßßß", 6), "ßßß...");
    }

    #[test]
    fn test_hits_are_ranked() {
        let mut state = RunState::new("glioma");
        state.append_results([result("low", 0.1), result("high", 0.9)]);
        let hits = HitRow::top(&state, 5);
        assert_eq!(hits[0].ligand, "high");
        assert_eq!(hits[0].rank, 1);
        assert!(hits_table(&hits).contains("high"));
    }

    #[test]
    fn test_target_rows_show_failures() {
        let mut state = RunState::new("glioma");
        let mut target = Target::new("EGFR");
        target.add_ligand(Ligand::new("erlotinib", "C#C"));
        target.record_failure(TargetFailure::new(0, TargetFailureKind::NoStructure, "no hits"));
        state.targets.push(target);

        let rows = TargetRow::all(&state);
        assert_eq!(rows[0].ligands, 1);
        assert_eq!(rows[0].failures, vec!["round 0 no_structure: no hits"]);
        assert!(targets_table(&rows).contains("EGFR"));
    }
}

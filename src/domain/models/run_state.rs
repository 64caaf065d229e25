//! Run state: the single unit of truth for one pipeline execution.
//!
//! Persisted as one JSON document per run and atomically rewritten on every
//! checkpoint. `accumulated_results`, `hypotheses` and `expansion_history` are
//! append-only logs; nothing in this module edits or reorders them in place.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::decision::{ExpansionAction, ExpansionDecision, ExpansionSeed};

/// Lifecycle status of a run.
///
/// ```text
/// initialized → literature_complete → structures_complete
///   → docking_round_<n>_complete (n increasing) → report_complete → complete
/// ```
///
/// Serialized as the lifecycle string. Anything unrecognized deserializes to
/// [`RunStatus::Unknown`] so a corrupted status never strands a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Initialized,
    LiteratureComplete,
    StructuresComplete,
    DockingRoundComplete(u32),
    ReportComplete,
    Complete,
    Unknown(String),
}

impl RunStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::LiteratureComplete => write!(f, "literature_complete"),
            Self::StructuresComplete => write!(f, "structures_complete"),
            Self::DockingRoundComplete(round) => write!(f, "docking_round_{round}_complete"),
            Self::ReportComplete => write!(f, "report_complete"),
            Self::Complete => write!(f, "complete"),
            Self::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "initialized" => Self::Initialized,
            "literature_complete" => Self::LiteratureComplete,
            "structures_complete" => Self::StructuresComplete,
            "report_complete" => Self::ReportComplete,
            "complete" => Self::Complete,
            other => other
                .strip_prefix("docking_round_")
                .and_then(|rest| rest.strip_suffix("_complete"))
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map_or_else(|| Self::Unknown(other.to_string()), Self::DockingRoundComplete),
        };
        Ok(status)
    }
}

impl Serialize for RunStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let Ok(status) = raw.parse::<Self>();
        Ok(status)
    }
}

/// A drug named by the literature stage together with the proteins it may act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugCandidate {
    pub drug: String,
    #[serde(default)]
    pub proteins: Vec<String>,
    #[serde(default)]
    pub mechanism: String,
    #[serde(default)]
    pub fda_status: String,
}

/// A candidate compound.
///
/// Identity within a [`Target`] is the structure string, not the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ligand {
    pub name: String,
    /// Canonical structure string. Empty means undockable.
    pub structure: String,
    #[serde(default)]
    pub mechanism: String,
    #[serde(default)]
    pub approval_status: String,
    #[serde(default)]
    pub provenance: String,
}

impl Ligand {
    pub fn new(name: impl Into<String>, structure: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            structure: structure.into(),
            mechanism: String::new(),
            approval_status: String::new(),
            provenance: String::new(),
        }
    }

    pub fn with_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.mechanism = mechanism.into();
        self
    }

    pub fn with_approval_status(mut self, status: impl Into<String>) -> Self {
        self.approval_status = status.into();
        self
    }

    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        self.provenance = provenance.into();
        self
    }

    pub fn is_dockable(&self) -> bool {
        !self.structure.trim().is_empty()
    }
}

/// Why a target produced nothing in some stage or round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFailureKind {
    NoStructure,
    NoDockableLigands,
    StructureUnreadable,
    BatchFailed,
    NoResults,
}

impl fmt::Display for TargetFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoStructure => "no_structure",
            Self::NoDockableLigands => "no_dockable_ligands",
            Self::StructureUnreadable => "structure_unreadable",
            Self::BatchFailed => "batch_failed",
            Self::NoResults => "no_results",
        };
        f.write_str(s)
    }
}

/// A non-fatal, target-level failure. Round 0 is the structure stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    pub round: u32,
    pub kind: TargetFailureKind,
    pub detail: String,
}

impl TargetFailure {
    pub fn new(round: u32, kind: TargetFailureKind, detail: impl Into<String>) -> Self {
        Self {
            round,
            kind,
            detail: detail.into(),
        }
    }
}

/// One protein structure under study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    /// Identifier of the chosen structure (e.g. a PDB id).
    #[serde(default)]
    pub structure_id: Option<String>,
    /// Local structure file. Absent when retrieval failed.
    #[serde(default)]
    pub structure_file: Option<PathBuf>,
    #[serde(default)]
    pub ligands: Vec<Ligand>,
    #[serde(default)]
    pub failures: Vec<TargetFailure>,
}

impl Target {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            structure_id: None,
            structure_file: None,
            ligands: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn with_structure(
        mut self,
        structure_id: impl Into<String>,
        structure_file: impl Into<PathBuf>,
    ) -> Self {
        self.structure_id = Some(structure_id.into());
        self.structure_file = Some(structure_file.into());
        self
    }

    pub const fn has_structure(&self) -> bool {
        self.structure_file.is_some()
    }

    /// Whether a ligand with this structure string is already attached.
    pub fn contains_structure(&self, structure: &str) -> bool {
        self.ligands.iter().any(|l| l.structure == structure)
    }

    /// Attach a ligand unless it is undockable or its structure is already present.
    ///
    /// Returns whether the ligand was added.
    pub fn add_ligand(&mut self, ligand: Ligand) -> bool {
        if !ligand.is_dockable() || self.contains_structure(&ligand.structure) {
            return false;
        }
        self.ligands.push(ligand);
        true
    }

    /// Ligands that may be sent to docking.
    pub fn dockable_ligands(&self) -> Vec<Ligand> {
        self.ligands.iter().filter(|l| l.is_dockable()).cloned().collect()
    }

    pub fn record_failure(&mut self, failure: TargetFailure) {
        self.failures.push(failure);
    }

    /// Copy of this target carrying only the given ligands.
    pub fn with_only(&self, ligands: Vec<Ligand>) -> Self {
        Self {
            id: self.id.clone(),
            structure_id: self.structure_id.clone(),
            structure_file: self.structure_file.clone(),
            ligands,
            failures: Vec::new(),
        }
    }
}

/// One scored docking outcome. Immutable once appended to the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingResult {
    /// Original, human-meaningful ligand name (never a dispatch identifier).
    pub ligand_name: String,
    /// Externally normalized confidence in `[0, 1]`.
    pub confidence_score: f64,
    pub confidence_raw: f64,
    pub target_id: String,
    #[serde(default)]
    pub structure_id: Option<String>,
    pub round: u32,
    #[serde(default)]
    pub structure: String,
    #[serde(default)]
    pub mechanism: String,
    #[serde(default)]
    pub approval_status: String,
    #[serde(default)]
    pub provenance: String,
}

/// One `expansion_history` entry: the logged form of an [`ExpansionDecision`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionRecord {
    pub round: u32,
    pub action: ExpansionAction,
    pub rationale: String,
    #[serde(default)]
    pub seed: ExpansionSeed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_scope: Option<Vec<String>>,
}

/// Canonical state for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub subject: String,
    pub status: RunStatus,
    #[serde(default)]
    pub round: u32,
    /// Expansion round cap fixed when the run started. Absent in state files
    /// written before the cap was recorded.
    #[serde(default)]
    pub max_rounds: Option<u32>,
    #[serde(default)]
    pub protein_targets: Vec<String>,
    #[serde(default)]
    pub drugs: Vec<DrugCandidate>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub accumulated_results: Vec<DockingResult>,
    #[serde(default)]
    pub hypotheses: Vec<String>,
    #[serde(default)]
    pub expansion_history: Vec<ExpansionRecord>,
    #[serde(default)]
    pub review_text: String,
    #[serde(default)]
    pub report_text: String,
    #[serde(default)]
    pub final_text: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// Fresh state at `initialized`.
    pub fn new(subject: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            subject: subject.into(),
            status: RunStatus::Initialized,
            round: 0,
            max_rounds: None,
            protein_targets: Vec::new(),
            drugs: Vec::new(),
            targets: Vec::new(),
            accumulated_results: Vec::new(),
            hypotheses: Vec::new(),
            expansion_history: Vec::new(),
            review_text: String::new(),
            report_text: String::new(),
            final_text: String::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn target(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }

    pub fn target_mut(&mut self, id: &str) -> Option<&mut Target> {
        self.targets.iter_mut().find(|t| t.id == id)
    }

    /// Append a completed round's results. Never rewrites earlier entries.
    pub fn append_results(&mut self, results: impl IntoIterator<Item = DockingResult>) {
        self.accumulated_results.extend(results);
    }

    /// Log a reasoning outcome: exactly one hypothesis and one history entry.
    pub fn record_decision(&mut self, decision: &ExpansionDecision) {
        self.hypotheses.push(decision.hypothesis.clone());
        self.expansion_history.push(decision.to_record());
    }

    /// The history entry logged for `round`, if reasoning already ran for it.
    pub fn decision_for_round(&self, round: u32) -> Option<&ExpansionRecord> {
        self.expansion_history.iter().rev().find(|r| r.round == round)
    }

    /// Results ranked by confidence (descending); ties keep accumulation order.
    pub fn ranked_results(&self) -> Vec<&DockingResult> {
        let mut ranked: Vec<&DockingResult> = self.accumulated_results.iter().collect();
        ranked.sort_by(|a, b| b.confidence_score.total_cmp(&a.confidence_score));
        ranked
    }

    pub fn top_results(&self, n: usize) -> Vec<&DockingResult> {
        let mut ranked = self.ranked_results();
        ranked.truncate(n);
        ranked
    }

    /// Ranked results for one target.
    pub fn results_for_target(&self, target_id: &str) -> Vec<&DockingResult> {
        self.ranked_results()
            .into_iter()
            .filter(|r| r.target_id == target_id)
            .collect()
    }

    /// Every ligand name that already has a docking result.
    pub fn seen_ligand_names(&self) -> BTreeSet<String> {
        self.accumulated_results
            .iter()
            .map(|r| r.ligand_name.clone())
            .collect()
    }

    /// Whether every protein from the literature stage has a target entry.
    pub fn structures_retrieved(&self) -> bool {
        !self.protein_targets.is_empty()
            && self
                .protein_targets
                .iter()
                .all(|p| self.targets.iter().any(|t| &t.id == p))
    }

    /// Status implied by the content of the state, used when `status` is unreadable.
    ///
    /// Picks the latest status whose prerequisites are all present, so the run
    /// re-enters at the earliest stage that still has work to do.
    pub fn infer_status(&self) -> RunStatus {
        if !self.final_text.is_empty() {
            RunStatus::Complete
        } else if !self.report_text.is_empty() {
            RunStatus::ReportComplete
        } else if self.round > 0 && self.structures_retrieved() {
            RunStatus::DockingRoundComplete(self.round)
        } else if self.structures_retrieved() {
            RunStatus::StructuresComplete
        } else if !self.protein_targets.is_empty() {
            RunStatus::LiteratureComplete
        } else {
            RunStatus::Initialized
        }
    }
}

//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use dockloop::adapters::mock::{
    MemoryStateStore, MockCollaborators, MockCompoundSource, MockDockingBackend,
    MockLiteratureSource, MockReportWriter, MockStructureSource, ScriptedHypothesisSource,
};
use dockloop::domain::models::{Config, DockingResult, Ligand, RunState};
use dockloop::domain::ports::StructureRecord;
use dockloop::services::Pipeline;

pub const SUBJECT: &str = "pancreatic cancer";

/// Write a small PDB file named after `id`.
pub fn write_structure(dir: &Path, id: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{id}.pdb"));
    std::fs::write(
        &path,
        format!("HEADER    {id}\nATOM      1  CA  GLY A   1       0.000   0.000   0.000\nEND\n"),
    )
    .unwrap();
    path
}

/// Structure record with `(name, structure, cid)` ligands.
pub fn record(dir: &Path, id: &str, ligands: &[(&str, &str, u32)]) -> StructureRecord {
    StructureRecord {
        structure_id: Some(id.to_string()),
        structure_file: Some(write_structure(dir, id)),
        ligands: ligands
            .iter()
            .map(|(name, structure, cid)| {
                Ligand::new(*name, *structure)
                    .with_mechanism("known inhibitor")
                    .with_approval_status("FDA-approved")
                    .with_provenance(format!("pubchem_cid_{cid}"))
            })
            .collect(),
    }
}

pub fn similarity(seed: &str) -> Value {
    json!({
        "action": "expand_by_similarity",
        "seed_keys": [seed],
        "rationale": format!("explore the shape space around CID {seed}"),
        "hypothesis": "shape similarity drives binding"
    })
}

pub fn class(name: &str) -> Value {
    json!({
        "action": "expand_by_class",
        "drug_class": name,
        "rationale": "kinase inhibitors cluster at the top",
        "hypothesis": "class effect"
    })
}

pub fn test_config(output_dir: &Path, max_rounds: u32) -> Config {
    let mut config = Config {
        output_dir: output_dir.display().to_string(),
        max_rounds,
        ..Config::default()
    };
    config.dispatch.batch_size = 2;
    config.dispatch.max_concurrency = 2;
    config.dispatch.poll_interval_secs = 1;
    config.dispatch.job_timeout_secs = 5;
    config
}

/// A temp directory plus a full set of mocks.
pub struct World {
    pub dir: TempDir,
    pub mocks: MockCollaborators,
    pub config: Config,
}

impl World {
    pub fn new(
        literature: MockLiteratureSource,
        structures: MockStructureSource,
        compounds: MockCompoundSource,
        hypothesis: ScriptedHypothesisSource,
        backend: MockDockingBackend,
        max_rounds: u32,
        dir: TempDir,
    ) -> Self {
        let config = test_config(&dir.path().join("out"), max_rounds);
        Self {
            mocks: MockCollaborators {
                literature: Arc::new(literature),
                structures: Arc::new(structures),
                compounds: Arc::new(compounds),
                hypothesis: Arc::new(hypothesis),
                backend: Arc::new(backend),
                report: Arc::new(MockReportWriter::new()),
                store: Arc::new(MemoryStateStore::new()),
            },
            config,
            dir,
        }
    }

    /// Three targets (TP53 has no structure), a similarity expansion after
    /// round 1 and a class expansion after round 2.
    pub fn standard(max_rounds: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pdb_dir = dir.path().join("pdb");
        let structures = MockStructureSource::new()
            .with_record(
                "KRAS",
                record(
                    &pdb_dir,
                    "6OIM",
                    &[("sotorasib", "CC1=CC=NC1", 137_278_711), ("adagrasib", "CN1CCC1", 138_611_145)],
                ),
            )
            .with_record(
                "EGFR",
                record(
                    &pdb_dir,
                    "1M17",
                    &[("erlotinib", "COCCOC1=C", 176_870), ("gefitinib", "COC1=C(C=C2)", 123_631)],
                ),
            );
        let compounds = MockCompoundSource::new()
            .with_similar(
                "137278711",
                vec![("analog-a", "CC1=CC=NC1O", "901"), ("analog-b", "CC1=CC=NC1N", "902")],
            )
            .with_class("kinase inhibitors", &["imatinib", "dasatinib", "erlotinib"])
            .with_structure("imatinib", "CC1=C(C=C(C=C1)NC)", "5291")
            .with_structure("dasatinib", "CC1=NC(=CC(=N1))", "3062316");
        let hypothesis = ScriptedHypothesisSource::by_round([
            (1, similarity("137278711")),
            (2, class("kinase inhibitors")),
            (3, similarity("901")),
        ]);
        Self::new(
            MockLiteratureSource::with_targets(&["KRAS", "EGFR", "TP53"]),
            structures,
            compounds,
            hypothesis,
            MockDockingBackend::new(),
            max_rounds,
            dir,
        )
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.mocks.pipeline_collaborators(), &self.config)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.output_dir)
    }
}

/// Order-independent identity of a run's results.
pub fn result_keys(state: &RunState) -> Vec<(u32, String, String, u64)> {
    let mut keys: Vec<_> = state
        .accumulated_results
        .iter()
        .map(|r: &DockingResult| {
            (
                r.round,
                r.target_id.clone(),
                r.ligand_name.clone(),
                r.confidence_score.to_bits(),
            )
        })
        .collect();
    keys.sort();
    keys
}

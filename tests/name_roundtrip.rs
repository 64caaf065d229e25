//! Ligand names survive sanitization: results carry the original names.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dockloop::adapters::mock::{mock_score, MockDockingBackend};
use dockloop::domain::models::{Ligand, Target};
use dockloop::services::{DispatcherConfig, JobDispatcher, RoundExecutor};

#[tokio::test]
async fn test_hostile_names_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let pdb = common::write_structure(dir.path(), "6OIM");

    let names = vec![
        "a".repeat(300),
        String::new(),
        "valid-name".to_string(),
        "valid-name".to_string(),
        "lig1".to_string(),
        "path/with:colons*and?stars".to_string(),
        "(R)-2-[4-(2-methylpropyl)phenyl]propanoic acid \"ibuprofen\"".to_string(),
        "tab\tand\nnewline".to_string(),
    ];
    let mut target = Target::new("KRAS").with_structure("6OIM", pdb);
    for (i, name) in names.iter().enumerate() {
        assert!(target.add_ligand(Ligand::new(name.clone(), format!("C{}N", "C".repeat(i)))));
    }
    let target_ligands = target.ligands.clone();

    let backend = Arc::new(MockDockingBackend::new());
    let dispatcher = JobDispatcher::new(
        backend.clone(),
        DispatcherConfig {
            batch_size: 3,
            max_concurrency: 2,
            poll_interval: Duration::from_millis(5),
            ..DispatcherConfig::default()
        },
    );
    let report = RoundExecutor::new(dispatcher).execute(1, &[target]).await;

    assert!(report.failures.is_empty());
    assert_eq!(report.results.len(), names.len());

    // Each result carries the name and structure of the ligand that was
    // actually docked, so the two "valid-name" entries cannot swap.
    let originals: BTreeSet<(String, String)> = target_ligands
        .iter()
        .map(|l| (l.name.clone(), l.structure.clone()))
        .collect();
    let returned: BTreeSet<(String, String)> = report
        .results
        .iter()
        .map(|r| (r.ligand_name.clone(), r.structure.clone()))
        .collect();
    assert_eq!(returned, originals);
    for result in &report.results {
        assert!(
            (result.confidence_score - mock_score(&result.structure)).abs() < f64::EPSILON,
            "{:?} carries another ligand's score",
            result.ligand_name
        );
    }

    let ids: Vec<String> = backend
        .submitted()
        .await
        .into_iter()
        .flatten()
        .map(|item| item.name)
        .collect();
    let unique: BTreeSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
    assert!(ids.iter().all(|id| !id.is_empty() && id.chars().count() <= 80));
    assert!(ids
        .iter()
        .all(|id| !id.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\n', '\t'])));
}

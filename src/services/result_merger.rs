//! Restores ligand identity on raw backend scores and ranks them.

use std::collections::HashSet;

use tracing::warn;

use crate::domain::models::{DockingResult, Ligand, RawScore, Target};
use crate::services::job_dispatcher::DispatchManifest;

/// Sort results by confidence, highest first. Equal scores keep their order.
pub fn rank_results(results: &mut [DockingResult]) {
    results.sort_by(|a, b| b.confidence_score.total_cmp(&a.confidence_score));
}

/// Turn dispatch-keyed scores into ranked [`DockingResult`]s for one target.
///
/// `ligands` must be the exact slice the manifest was built from. Scores with
/// an identifier the manifest does not know are dropped, and only the first
/// score per identifier is kept. Confidence values are copied through untouched.
pub fn merge_results(
    target: &Target,
    round: u32,
    ligands: &[Ligand],
    manifest: &DispatchManifest,
    scores: Vec<RawScore>,
) -> Vec<DockingResult> {
    let mut seen = HashSet::new();
    let mut indexed: Vec<(usize, DockingResult)> = scores
        .into_iter()
        .filter_map(|score| {
            let Some((index, ligand)) = manifest
                .index_of(&score.name)
                .and_then(|i| ligands.get(i).map(|l| (i, l)))
            else {
                warn!(target_id = %target.id, dispatch_id = %score.name, "dropping score for unknown dispatch id");
                return None;
            };
            if !seen.insert(index) {
                warn!(target_id = %target.id, dispatch_id = %score.name, "dropping repeated score");
                return None;
            }
            Some((
                index,
                DockingResult {
                    ligand_name: ligand.name.clone(),
                    confidence_score: score.confidence_score,
                    confidence_raw: score.confidence_raw,
                    target_id: target.id.clone(),
                    structure_id: target.structure_id.clone(),
                    round,
                    structure: ligand.structure.clone(),
                    mechanism: ligand.mechanism.clone(),
                    approval_status: ligand.approval_status.clone(),
                    provenance: ligand.provenance.clone(),
                },
            ))
        })
        .collect();

    // Submission order first, so the stable score sort breaks ties by it.
    indexed.sort_by_key(|(index, _)| *index);
    let mut results: Vec<DockingResult> = indexed.into_iter().map(|(_, r)| r).collect();
    rank_results(&mut results);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(name: &str, value: f64) -> RawScore {
        RawScore {
            name: name.to_string(),
            confidence_score: value,
            confidence_raw: value,
            all_poses: None,
        }
    }

    #[test]
    fn test_merge_restores_names_and_orders() {
        let target = Target::new("EGFR").with_structure("1M17", "/tmp/1M17.pdb");
        let ligands = vec![
            Ligand::new("erlotinib/HCl", "C1").with_provenance("pubchem_cid_176870"),
            Ligand::new("gefitinib", "C2"),
            Ligand::new("lapatinib", "C3"),
        ];
        let manifest = DispatchManifest::build(&ligands, 80);

        // Backend answers out of order, with one tie and one unknown id.
        let scores = vec![
            score("lapatinib", 0.4),
            score("ghost", 0.99),
            score("gefitinib", 0.7),
            score("erlotinib_HCl", 0.4),
        ];
        let results = merge_results(&target, 2, &ligands, &manifest, scores);

        let names: Vec<_> = results.iter().map(|r| r.ligand_name.as_str()).collect();
        assert_eq!(names, vec!["gefitinib", "erlotinib/HCl", "lapatinib"]);
        assert_eq!(results[1].provenance, "pubchem_cid_176870");
        assert!(results.iter().all(|r| r.round == 2 && r.target_id == "EGFR"));
        assert_eq!(results[0].structure_id.as_deref(), Some("1M17"));
    }

    #[test]
    fn test_repeated_dispatch_id_keeps_first_score() {
        let target = Target::new("KRAS");
        let ligands = vec![Ligand::new("sotorasib", "C1"), Ligand::new("adagrasib", "C2")];
        let manifest = DispatchManifest::build(&ligands, 80);

        let scores = vec![
            score("sotorasib", 0.3),
            score("adagrasib", 0.5),
            score("sotorasib", 0.9),
        ];
        let results = merge_results(&target, 1, &ligands, &manifest, scores);

        assert_eq!(results.len(), ligands.len());
        let names: Vec<_> = results.iter().map(|r| r.ligand_name.as_str()).collect();
        assert_eq!(names, vec!["adagrasib", "sotorasib"]);
        assert!((results[1].confidence_score - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scores_are_not_rescaled() {
        let target = Target::new("KRAS");
        let ligands = vec![Ligand::new("sotorasib", "C")];
        let manifest = DispatchManifest::build(&ligands, 80);
        let results = merge_results(
            &target,
            1,
            &ligands,
            &manifest,
            vec![RawScore {
                name: "sotorasib".into(),
                confidence_score: 0.123,
                confidence_raw: -1.7,
                all_poses: None,
            }],
        );
        assert!((results[0].confidence_score - 0.123).abs() < f64::EPSILON);
        assert!((results[0].confidence_raw + 1.7).abs() < f64::EPSILON);
    }
}

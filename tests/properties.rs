//! Property tests for ranking, deduplication, the round cap and dispatch ids.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use dockloop::adapters::mock::ScriptedHypothesisSource;
use dockloop::domain::models::{DockingResult, Ligand, RunState, Target};
use dockloop::services::{rank_results, DispatchManifest, ExpansionReasoner};

fn result(index: usize, score: f64) -> DockingResult {
    DockingResult {
        ligand_name: format!("lig-{index}"),
        confidence_score: score,
        confidence_raw: 0.0,
        target_id: "KRAS".into(),
        structure_id: None,
        round: 1,
        structure: String::new(),
        mechanism: String::new(),
        approval_status: String::new(),
        provenance: String::new(),
    }
}

const ACTIONS: &[&str] = &[
    "expand_by_similarity",
    "expand_by_class",
    "expand_3d_similar",
    "proceed",
    "nonsense",
];

proptest! {
    #[test]
    fn ranking_is_descending_and_stable(scores in prop::collection::vec(0u8..20, 0..60)) {
        let mut results: Vec<DockingResult> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| result(i, f64::from(*s) / 20.0))
            .collect();
        rank_results(&mut results);

        for pair in results.windows(2) {
            prop_assert!(pair[0].confidence_score >= pair[1].confidence_score);
            if (pair[0].confidence_score - pair[1].confidence_score).abs() < f64::EPSILON {
                let a: usize = pair[0].ligand_name[4..].parse().unwrap();
                let b: usize = pair[1].ligand_name[4..].parse().unwrap();
                prop_assert!(a < b, "ties must keep submission order");
            }
        }
    }

    #[test]
    fn adding_ligands_never_duplicates_structures(
        structures in prop::collection::vec("[CNO=()]{0,6}", 0..40)
    ) {
        let mut target = Target::new("KRAS");
        for (i, structure) in structures.iter().enumerate() {
            let before = target.ligands.len();
            let added = target.add_ligand(Ligand::new(format!("l{i}"), structure.clone()));
            prop_assert_eq!(target.ligands.len(), before + usize::from(added));
        }
        let distinct: HashSet<&str> = structures
            .iter()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .collect();
        prop_assert_eq!(target.ligands.len(), distinct.len());
    }

    #[test]
    fn rounds_never_exceed_cap(
        max_rounds in 0u32..5,
        choices in prop::collection::vec(0usize..ACTIONS.len(), 1..12),
    ) {
        let scripted = choices
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let round = u32::try_from(i).unwrap() + 1;
                (round, json!({"action": ACTIONS[*c], "seed_keys": ["1"]}))
            })
            .collect::<Vec<_>>();
        let source = Arc::new(ScriptedHypothesisSource::by_round(scripted));
        let reasoner = ExpansionReasoner::new(source, 30, max_rounds);

        let mut state = RunState::new("glioma");
        state.round = 1;
        let final_round = tokio_test::block_on(async {
            loop {
                let decision = reasoner.evaluate(&mut state).await;
                if !decision.action.is_expansion() {
                    break state.round;
                }
                state.round += 1;
            }
        });

        prop_assert!(final_round <= max_rounds + 1);
        prop_assert_eq!(state.expansion_history.len(), final_round as usize);
    }

    #[test]
    fn dispatch_ids_are_unique_and_bounded(
        names in prop::collection::vec("\\PC{0,120}", 1..40),
        max_len in 16usize..100,
    ) {
        let ligands: Vec<Ligand> = names.iter().map(|n| Ligand::new(n.clone(), "CCO")).collect();
        let manifest = DispatchManifest::build(&ligands, max_len);

        prop_assert_eq!(manifest.len(), ligands.len());
        let mut seen = HashSet::new();
        for index in 0..ligands.len() {
            let id = manifest.id_for(index).unwrap();
            prop_assert!(!id.is_empty());
            prop_assert!(id.chars().count() <= max_len, "{} longer than {}", id, max_len);
            prop_assert!(seen.insert(id.to_string()), "duplicate id {}", id);
            prop_assert_eq!(manifest.index_of(id), Some(index));
        }
    }
}

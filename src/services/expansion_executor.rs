//! Expansion executor: turns an expansion decision into new ligands on the run.
//!
//! Resolution asks the [`CompoundSource`] for candidates; planning dedups them
//! against each target by structure string. Nothing touches the run state
//! unless at least one target gains a ligand.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::models::{
    seed_key_from_provenance, ExpansionDecision, ExpansionSeed, Ligand, ReasoningConfig,
    RunState, Target, CID_PROVENANCE_PREFIX,
};
use crate::domain::ports::{CompoundRecord, CompoundSource};

/// What an expansion decision turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpansionOutcome {
    /// Nothing new for any dockable target. The loop must proceed.
    NoNewLigands,
    /// Ligands were attached and `round` advanced. `targets` carry only the new ligands.
    Ready { round: u32, targets: Vec<Target> },
}

pub struct ExpansionExecutor {
    compounds: Arc<dyn CompoundSource>,
    config: ReasoningConfig,
}

impl ExpansionExecutor {
    pub fn new(compounds: Arc<dyn CompoundSource>, config: ReasoningConfig) -> Self {
        Self { compounds, config }
    }

    /// Resolve the decision, attach new ligands and advance the round.
    #[instrument(skip(self, decision, state), fields(action = %decision.action, round = state.round))]
    pub async fn execute(
        &self,
        decision: &ExpansionDecision,
        state: &mut RunState,
    ) -> ExpansionOutcome {
        let candidates = self.resolve(decision, state).await;
        let plan = plan_additions(state, decision.target_scope.as_deref(), &candidates);

        let added: usize = plan.iter().map(|t| t.ligands.len()).sum();
        if added == 0 {
            info!(candidates = candidates.len(), "expansion produced no new ligands");
            return ExpansionOutcome::NoNewLigands;
        }

        for addition in &plan {
            if let Some(target) = state.target_mut(&addition.id) {
                for ligand in &addition.ligands {
                    target.add_ligand(ligand.clone());
                }
            }
        }
        state.round += 1;

        info!(
            added,
            targets = plan.len(),
            round = state.round,
            "expansion ligands attached"
        );
        ExpansionOutcome::Ready {
            round: state.round,
            targets: plan,
        }
    }

    /// Candidate ligands for a decision, before per-target dedup.
    pub async fn resolve(&self, decision: &ExpansionDecision, state: &RunState) -> Vec<Ligand> {
        match &decision.seed {
            ExpansionSeed::Similarity { keys } => {
                let seeds = if keys.is_empty() {
                    fallback_seeds(state, self.config.fallback_seed_count)
                } else {
                    keys.clone()
                };
                self.resolve_similarity(&seeds).await
            }
            ExpansionSeed::Class { class_name, names } => {
                self.resolve_class(class_name.as_deref(), names, state).await
            }
            ExpansionSeed::None => Vec::new(),
        }
    }

    async fn resolve_similarity(&self, seeds: &[String]) -> Vec<Ligand> {
        info!(seeds = ?seeds, "expanding by structural similarity");
        let mut ligands = Vec::new();
        for seed in seeds {
            let similar = match self
                .compounds
                .similar(seed, self.config.similar_per_seed)
                .await
            {
                Ok(similar) => similar,
                Err(e) => {
                    warn!(seed = %seed, error = %e, "similarity search failed");
                    continue;
                }
            };
            ligands.extend(similar.into_iter().map(|record| similarity_ligand(record, seed)));
        }
        ligands
    }

    async fn resolve_class(
        &self,
        class_name: Option<&str>,
        names: &[String],
        state: &RunState,
    ) -> Vec<Ligand> {
        let class_label = class_name.unwrap_or("unspecified class");
        let names = if names.is_empty() {
            let Some(class) = class_name else {
                warn!("class expansion without a class or names");
                return Vec::new();
            };
            let exclude: Vec<String> = state.seen_ligand_names().into_iter().collect();
            match self
                .compounds
                .enumerate_class(class, &exclude, self.config.class_name_limit)
                .await
            {
                Ok(names) => names,
                Err(e) => {
                    warn!(class = %class, error = %e, "class enumeration failed");
                    return Vec::new();
                }
            }
        } else {
            names.to_vec()
        };

        info!(class = %class_label, names = ?names, "expanding by class");
        let mut ligands = Vec::new();
        for name in names.iter().take(self.config.class_name_limit) {
            match self.compounds.lookup(name).await {
                Ok(Some(record)) if !record.structure.is_empty() => {
                    let provenance = record.key.as_ref().map_or_else(
                        || "class_expansion".to_string(),
                        |key| format!("{CID_PROVENANCE_PREFIX}{key}"),
                    );
                    ligands.push(
                        Ligand::new(name.clone(), record.structure)
                            .with_mechanism(format!("Class expansion: {class_label}"))
                            .with_approval_status("FDA-approved (class expansion)")
                            .with_provenance(provenance),
                    );
                }
                Ok(_) => warn!(name = %name, "no structure found for class member"),
                Err(e) => warn!(name = %name, error = %e, "structure lookup failed"),
            }
        }
        ligands
    }
}

fn similarity_ligand(record: CompoundRecord, seed: &str) -> Ligand {
    let key = record.key.clone().unwrap_or_else(|| record.name.clone());
    Ligand::new(record.name, record.structure)
        .with_mechanism(format!("3D-similar to CID {seed}"))
        .with_approval_status("Unknown, requires verification")
        .with_provenance(format!("similarity_cid_{key}_from_{seed}"))
}

/// Seed keys taken from the provenance of the best results so far.
pub fn fallback_seeds(state: &RunState, limit: usize) -> Vec<String> {
    let mut seeds: Vec<String> = Vec::new();
    for result in state.ranked_results() {
        if seeds.len() >= limit {
            break;
        }
        if let Some(key) = seed_key_from_provenance(&result.provenance) {
            if !seeds.contains(&key) {
                seeds.push(key);
            }
        }
    }
    seeds
}

/// Per-target net-new ligands for the candidates.
///
/// Only structure-bearing targets are considered. A scope restricts fan-out to
/// the named targets; a scope naming no known target falls back to all.
/// Returned targets hold only their new ligands, in candidate order.
pub fn plan_additions(
    state: &RunState,
    scope: Option<&[String]>,
    candidates: &[Ligand],
) -> Vec<Target> {
    let dockable: Vec<&Target> = state.targets.iter().filter(|t| t.has_structure()).collect();

    let scoped: Vec<&Target> = match scope {
        Some(ids) => {
            let wanted: BTreeSet<String> = ids.iter().map(|s| s.to_ascii_uppercase()).collect();
            let matched: Vec<&Target> = dockable
                .iter()
                .copied()
                .filter(|t| wanted.contains(&t.id.to_ascii_uppercase()))
                .collect();
            if matched.is_empty() {
                warn!(scope = ?ids, "expansion scope matches no dockable target, fanning out to all");
                dockable
            } else {
                matched
            }
        }
        None => dockable,
    };

    scoped
        .into_iter()
        .filter_map(|target| {
            let mut probe = target.clone();
            let fresh: Vec<Ligand> = candidates
                .iter()
                .filter(|ligand| probe.add_ligand((*ligand).clone()))
                .cloned()
                .collect();
            (!fresh.is_empty()).then(|| target.with_only(fresh))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockCompoundSource;
    use crate::domain::models::{DockingResult, ExpansionAction};

    fn docked_state() -> RunState {
        let mut state = RunState::new("breast cancer");
        state.protein_targets = vec!["ESR1".into(), "HER2".into(), "PIK3CA".into()];
        let mut esr1 = Target::new("ESR1").with_structure("1ERE", "/s/1ERE.pdb");
        esr1.add_ligand(Ligand::new("tamoxifen", "CCC(=C(c1ccccc1)"));
        let her2 = Target::new("HER2").with_structure("3PP0", "/s/3PP0.pdb");
        let pik3ca = Target::new("PIK3CA");
        state.targets = vec![esr1, her2, pik3ca];
        state.round = 1;
        state.append_results(vec![DockingResult {
            ligand_name: "tamoxifen".into(),
            confidence_score: 0.8,
            confidence_raw: 1.2,
            target_id: "ESR1".into(),
            structure_id: Some("1ERE".into()),
            round: 1,
            structure: "CCC(=C(c1ccccc1)".into(),
            mechanism: String::new(),
            approval_status: String::new(),
            provenance: "pubchem_cid_2733526".into(),
        }]);
        state
    }

    #[test]
    fn test_plan_dedups_by_structure_and_skips_structureless() {
        let state = docked_state();
        let candidates = vec![
            Ligand::new("tamoxifen citrate", "CCC(=C(c1ccccc1)"),
            Ligand::new("fulvestrant", "C[C@]12CC"),
        ];
        let plan = plan_additions(&state, None, &candidates);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].id, "ESR1");
        assert_eq!(plan[0].ligands.len(), 1);
        assert_eq!(plan[0].ligands[0].name, "fulvestrant");
        assert_eq!(plan[1].id, "HER2");
        assert_eq!(plan[1].ligands.len(), 2);
    }

    #[test]
    fn test_plan_respects_scope() {
        let state = docked_state();
        let candidates = vec![Ligand::new("fulvestrant", "C[C@]12CC")];
        let scope = vec!["her2".to_string()];
        let plan = plan_additions(&state, Some(&scope), &candidates);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, "HER2");
    }

    #[test]
    fn test_fallback_seeds_from_provenance() {
        let state = docked_state();
        assert_eq!(fallback_seeds(&state, 5), vec!["2733526".to_string()]);
        assert!(fallback_seeds(&state, 0).is_empty());
    }

    #[tokio::test]
    async fn test_execute_similarity_uses_fallback_seed() {
        let compounds = Arc::new(MockCompoundSource::new().with_similar(
            "2733526",
            vec![("toremifene", "ClCCC(=C", "3005573")],
        ));
        let executor = ExpansionExecutor::new(compounds, ReasoningConfig::default());
        let mut state = docked_state();
        let decision = ExpansionDecision {
            round: 1,
            action: ExpansionAction::ExpandBySimilarity,
            rationale: String::new(),
            hypothesis: String::new(),
            seed: ExpansionSeed::Similarity { keys: Vec::new() },
            target_scope: None,
        };

        let outcome = executor.execute(&decision, &mut state).await;
        let ExpansionOutcome::Ready { round, targets } = outcome else {
            panic!("expected new ligands");
        };
        assert_eq!(round, 2);
        assert_eq!(state.round, 2);
        assert_eq!(targets.len(), 2);
        assert_eq!(
            targets[0].ligands[0].provenance,
            "similarity_cid_3005573_from_2733526"
        );
        assert_eq!(state.target("HER2").unwrap().ligands.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_without_new_ligands_leaves_state() {
        let compounds = Arc::new(MockCompoundSource::new().with_structure(
            "tamoxifen",
            "CCC(=C(c1ccccc1)",
            "2733526",
        ));
        let executor = ExpansionExecutor::new(compounds, ReasoningConfig::default());
        let mut state = docked_state();
        state.target_mut("HER2").unwrap().add_ligand(Ligand::new("tamoxifen", "CCC(=C(c1ccccc1)"));
        let before = state.clone();

        let decision = ExpansionDecision {
            round: 1,
            action: ExpansionAction::ExpandByClass,
            rationale: String::new(),
            hypothesis: String::new(),
            seed: ExpansionSeed::Class {
                class_name: Some("SERMs".into()),
                names: vec!["tamoxifen".into()],
            },
            target_scope: None,
        };

        assert_eq!(
            executor.execute(&decision, &mut state).await,
            ExpansionOutcome::NoNewLigands
        );
        assert_eq!(state, before);
    }
}

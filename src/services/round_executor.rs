//! Docking round executor.
//!
//! Docks each target in turn through the [`JobDispatcher`] and the result
//! merger. A target that yields nothing is recorded and skipped; it never
//! stops its siblings.

use tracing::{info, instrument, warn};

use crate::domain::models::{DockingResult, Target, TargetFailure, TargetFailureKind};
use crate::services::job_dispatcher::JobDispatcher;
use crate::services::result_merger::merge_results;

/// Outcome of one docking round across all targets handed in.
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    pub round: u32,
    /// Per-target ranked results, concatenated in target order.
    pub results: Vec<DockingResult>,
    /// `(target id, failure)` pairs to record on the run state.
    pub failures: Vec<(String, TargetFailure)>,
}

impl RoundReport {
    pub fn failed_targets(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.failures.iter().map(|(id, _)| id.as_str()).collect();
        ids.dedup();
        ids
    }
}

pub struct RoundExecutor {
    dispatcher: JobDispatcher,
}

impl RoundExecutor {
    pub const fn new(dispatcher: JobDispatcher) -> Self {
        Self { dispatcher }
    }

    pub const fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    /// Dock every target's ligands and tag results with `round`.
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn execute(&self, round: u32, targets: &[Target]) -> RoundReport {
        let mut report = RoundReport {
            round,
            ..RoundReport::default()
        };

        for target in targets {
            let mut fail = |kind: TargetFailureKind, detail: String| {
                warn!(target_id = %target.id, round, kind = %kind, %detail, "target produced no results");
                report
                    .failures
                    .push((target.id.clone(), TargetFailure::new(round, kind, detail)));
            };

            let Some(structure_file) = target.structure_file.as_deref() else {
                fail(
                    TargetFailureKind::NoStructure,
                    "no structure file".to_string(),
                );
                continue;
            };

            let ligands = target.dockable_ligands();
            if ligands.is_empty() {
                fail(
                    TargetFailureKind::NoDockableLigands,
                    "no ligands with a structure string".to_string(),
                );
                continue;
            }

            let dispatch = match self.dispatcher.dispatch(structure_file, &ligands).await {
                Ok(dispatch) => dispatch,
                Err(e) => {
                    fail(TargetFailureKind::StructureUnreadable, e.to_string());
                    continue;
                }
            };

            for failure in &dispatch.batch_failures {
                fail(TargetFailureKind::BatchFailed, failure.to_string());
            }

            let results = merge_results(target, round, &ligands, &dispatch.manifest, dispatch.scores);
            if results.is_empty() {
                fail(
                    TargetFailureKind::NoResults,
                    format!("{} batches returned no scores", dispatch.batch_count),
                );
                continue;
            }

            info!(
                target_id = %target.id,
                round,
                results = results.len(),
                best = results.first().map_or(0.0, |r| r.confidence_score),
                "target docked"
            );
            report.results.extend(results);
        }

        report
    }
}

//! Pipeline state machine.
//!
//! Owns the [`RunState`] for one run and drives it through
//!
//! ```text
//! initialized → literature_complete → structures_complete
//!   → docking_round_<n>_complete ... → report_complete → complete
//! ```
//!
//! The state is checkpointed after every unit of progress: each target during
//! structure retrieval, each completed docking round, each reasoning decision
//! and each completed stage. Resuming re-enters the loop at the persisted
//! status; anything derived (result files) is rebuilt from the state.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Config, ExpansionDecision, RunState, RunStatus, Target, TargetFailure, TargetFailureKind,
};
use crate::domain::ports::{
    CompoundSource, DockingBackend, HypothesisSource, LiteratureSource, ReportWriter, StateStore,
    StructureSource,
};
use crate::services::artifacts::{
    reasoning_history_section, render_results_markdown, ArtifactWriter, PAPER_FILE, RESULTS_FILE,
    REVIEW_FILE,
};
use crate::services::expansion_executor::{ExpansionExecutor, ExpansionOutcome};
use crate::services::expansion_reasoner::ExpansionReasoner;
use crate::services::job_dispatcher::{DispatcherConfig, JobDispatcher};
use crate::services::round_executor::{RoundExecutor, RoundReport};

/// Every external collaborator the pipeline talks to.
#[derive(Clone)]
pub struct PipelineCollaborators {
    pub literature: Arc<dyn LiteratureSource>,
    pub structures: Arc<dyn StructureSource>,
    pub compounds: Arc<dyn CompoundSource>,
    pub hypothesis: Arc<dyn HypothesisSource>,
    pub backend: Arc<dyn DockingBackend>,
    pub report: Arc<dyn ReportWriter>,
    pub store: Arc<dyn StateStore>,
}

pub struct Pipeline {
    literature: Arc<dyn LiteratureSource>,
    structures: Arc<dyn StructureSource>,
    report: Arc<dyn ReportWriter>,
    store: Arc<dyn StateStore>,
    reasoner: ExpansionReasoner,
    expander: ExpansionExecutor,
    rounds: RoundExecutor,
    artifacts: ArtifactWriter,
}

impl Pipeline {
    pub fn new(collaborators: PipelineCollaborators, config: &Config) -> Self {
        let dispatcher = JobDispatcher::new(
            collaborators.backend,
            DispatcherConfig::from(&config.dispatch),
        );
        Self {
            literature: collaborators.literature,
            structures: collaborators.structures,
            report: collaborators.report,
            store: collaborators.store,
            reasoner: ExpansionReasoner::new(
                collaborators.hypothesis,
                config.reasoning.top_n,
                config.max_rounds,
            ),
            expander: ExpansionExecutor::new(collaborators.compounds, config.reasoning.clone()),
            rounds: RoundExecutor::new(dispatcher),
            artifacts: ArtifactWriter::new(PathBuf::from(&config.output_dir)),
        }
    }

    /// Fresh state at `initialized`, carrying this pipeline's round cap.
    pub fn create(&self, subject: impl Into<String>) -> RunState {
        let mut state = RunState::new(subject);
        state.max_rounds = Some(self.reasoner.max_rounds());
        state
    }

    pub async fn persist(&self, state: &mut RunState) -> DomainResult<()> {
        state.touch();
        self.store.save(state).await
    }

    /// Start a new run for `subject` and drive it to completion.
    #[instrument(skip(self))]
    pub async fn run(&self, subject: &str) -> DomainResult<RunState> {
        let mut state = self.create(subject);
        info!(run_id = %state.run_id, max_rounds = ?state.max_rounds, "starting run");
        self.persist(&mut state).await?;
        self.drive(state).await
    }

    /// Load the last checkpoint and continue from its status.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> DomainResult<RunState> {
        let mut state = self.store.load().await?;
        let configured = self.reasoner.max_rounds();
        match state.max_rounds {
            None => state.max_rounds = Some(configured),
            Some(recorded) if recorded != configured => {
                info!(recorded, configured, "keeping the round cap the run started with");
            }
            Some(_) => {}
        }
        info!(run_id = %state.run_id, status = %state.status, round = state.round, "resuming run");
        if state.round > 0 {
            self.artifacts.write_docking_results(&state).await?;
        }
        self.drive(state).await
    }

    /// Advance `state` until it is complete or a stage fails fatally.
    pub async fn drive(&self, mut state: RunState) -> DomainResult<RunState> {
        loop {
            match state.status.clone() {
                RunStatus::Initialized => self.literature_stage(&mut state).await?,
                RunStatus::LiteratureComplete => self.structure_stage(&mut state).await?,
                RunStatus::StructuresComplete => self.initial_docking(&mut state).await?,
                RunStatus::DockingRoundComplete(_) => self.after_round(&mut state).await?,
                RunStatus::ReportComplete => self.paper_stage(&mut state).await?,
                RunStatus::Complete => {
                    info!(
                        run_id = %state.run_id,
                        rounds = state.round,
                        results = state.accumulated_results.len(),
                        "run complete"
                    );
                    return Ok(state);
                }
                RunStatus::Unknown(raw) => {
                    let inferred = state.infer_status();
                    warn!(status = %raw, inferred = %inferred, "unrecognized status, resuming from inferred stage");
                    state.status = inferred;
                }
            }
        }
    }

    #[instrument(skip(self, state), fields(subject = %state.subject))]
    async fn literature_stage(&self, state: &mut RunState) -> DomainResult<()> {
        let report = self
            .literature
            .discover(&state.subject)
            .await
            .map_err(|e| DomainError::fatal("literature", e.to_string()))?;

        let mut seen = BTreeSet::new();
        let proteins: Vec<String> = report
            .protein_targets
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty() && seen.insert(p.to_ascii_uppercase()))
            .collect();
        if proteins.is_empty() {
            return Err(DomainError::fatal(
                "literature",
                format!("no protein targets found for '{}'", state.subject),
            ));
        }

        info!(
            targets = proteins.len(),
            drugs = report.drugs.len(),
            "literature stage complete"
        );
        state.protein_targets = proteins;
        state.drugs = report.drugs;
        state.review_text = report.review_text;
        self.artifacts.write_text(REVIEW_FILE, &state.review_text).await?;

        state.status = RunStatus::LiteratureComplete;
        self.persist(state).await
    }

    #[instrument(skip(self, state), fields(targets = state.protein_targets.len()))]
    async fn structure_stage(&self, state: &mut RunState) -> DomainResult<()> {
        for protein in state.protein_targets.clone() {
            if state.target(&protein).is_some() {
                continue;
            }

            let drugs: Vec<_> = state
                .drugs
                .iter()
                .filter(|d| d.proteins.iter().any(|p| p.eq_ignore_ascii_case(&protein)))
                .cloned()
                .collect();

            let mut target = Target::new(protein.clone());
            match self.structures.retrieve(&protein, &drugs).await {
                Ok(record) => {
                    target.structure_id = record.structure_id;
                    target.structure_file = record.structure_file;
                    for ligand in record.ligands {
                        target.add_ligand(ligand);
                    }
                    if !target.has_structure() {
                        target.record_failure(TargetFailure::new(
                            0,
                            TargetFailureKind::NoStructure,
                            "no suitable structure found",
                        ));
                    }
                }
                Err(e) => {
                    target.record_failure(TargetFailure::new(
                        0,
                        TargetFailureKind::NoStructure,
                        e.to_string(),
                    ));
                }
            }

            if target.has_structure() {
                info!(target_id = %target.id, structure = ?target.structure_id, ligands = target.ligands.len(), "structure retrieved");
            } else {
                warn!(target_id = %target.id, "target skipped: no structure");
            }
            state.targets.push(target);
            self.persist(state).await?;
        }

        state.status = RunStatus::StructuresComplete;
        self.persist(state).await
    }

    #[instrument(skip(self, state))]
    async fn initial_docking(&self, state: &mut RunState) -> DomainResult<()> {
        state.round = 1;
        let targets: Vec<Target> = state
            .targets
            .iter()
            .filter(|t| t.has_structure())
            .cloned()
            .collect();
        let report = self.rounds.execute(1, &targets).await;
        self.complete_round(state, report).await
    }

    /// Consult (or replay) the decision for the current round and act on it.
    #[instrument(skip(self, state), fields(round = state.round))]
    async fn after_round(&self, state: &mut RunState) -> DomainResult<()> {
        let round = state.round;
        let reasoner = self.reasoner_for(state);
        let decision = if let Some(record) = state.decision_for_round(round) {
            info!(action = %record.action, "replaying recorded decision");
            let decision = ExpansionDecision::from_record(record, "");
            if reasoner.is_capped(round) && decision.action.is_expansion() {
                decision.cap(reasoner.max_rounds())
            } else {
                decision
            }
        } else {
            let decision = reasoner.evaluate(state).await;
            self.persist(state).await?;
            decision
        };

        if !decision.action.is_expansion() {
            return self.report_stage(state).await;
        }

        match self.expander.execute(&decision, state).await {
            ExpansionOutcome::NoNewLigands => {
                info!("no net-new ligands, proceeding to report");
                self.report_stage(state).await
            }
            ExpansionOutcome::Ready { round, targets } => {
                let report = self.rounds.execute(round, &targets).await;
                self.complete_round(state, report).await
            }
        }
    }

    /// Reasoner capped at the run's own limit rather than the configured one.
    fn reasoner_for(&self, state: &RunState) -> ExpansionReasoner {
        let max_rounds = state.max_rounds.unwrap_or_else(|| self.reasoner.max_rounds());
        self.reasoner.with_max_rounds(max_rounds)
    }

    /// Fold a finished round into the state and checkpoint it.
    async fn complete_round(&self, state: &mut RunState, report: RoundReport) -> DomainResult<()> {
        let round = report.round;
        info!(
            round,
            results = report.results.len(),
            failed_targets = report.failed_targets().len(),
            "docking round complete"
        );
        state.append_results(report.results);
        for (target_id, failure) in report.failures {
            if let Some(target) = state.target_mut(&target_id) {
                target.record_failure(failure);
            }
        }
        state.status = RunStatus::DockingRoundComplete(round);
        self.artifacts.write_docking_results(state).await?;
        self.persist(state).await
    }

    #[instrument(skip(self, state))]
    async fn report_stage(&self, state: &mut RunState) -> DomainResult<()> {
        self.artifacts.write_docking_results(state).await?;

        let body = match self.report.write_report(state).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => render_results_markdown(state),
            Err(e) => {
                warn!(error = %e, "report writer failed, using plain results report");
                render_results_markdown(state)
            }
        };
        state.report_text = format!("{body}{}", reasoning_history_section(state));
        self.artifacts.write_text(RESULTS_FILE, &state.report_text).await?;

        state.status = RunStatus::ReportComplete;
        self.persist(state).await
    }

    #[instrument(skip(self, state))]
    async fn paper_stage(&self, state: &mut RunState) -> DomainResult<()> {
        let paper = match self.report.write_paper(state).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback_paper(state),
            Err(e) => {
                warn!(error = %e, "paper writer failed, concatenating review and report");
                fallback_paper(state)
            }
        };
        state.final_text = paper;
        self.artifacts.write_text(PAPER_FILE, &state.final_text).await?;

        state.status = RunStatus::Complete;
        self.persist(state).await
    }
}

fn fallback_paper(state: &RunState) -> String {
    format!(
        "# {}\n\n{}\n\n{}\n",
        state.subject, state.review_text, state.report_text
    )
}

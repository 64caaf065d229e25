//! Deterministic in-memory collaborators for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DockingJob, DrugCandidate, JobPoll, JobStatus, RawScore, RunState, WorkItem,
};
use crate::domain::ports::{
    CompoundRecord, CompoundSource, DockingBackend, HypothesisSource, LiteratureReport,
    LiteratureSource, ReasoningRequest, ReportWriter, StateStore, StructureRecord,
    StructureSource,
};

/// Deterministic confidence in `[0, 1)` derived from a structure string.
pub fn mock_score(structure: &str) -> f64 {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in structure.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    #[allow(clippy::cast_precision_loss)]
    let score = (hash % 1000) as f64 / 1000.0;
    score
}

/// Literature source returning a fixed report.
pub struct MockLiteratureSource {
    report: Option<LiteratureReport>,
    error: Option<String>,
    calls: AtomicUsize,
}

impl MockLiteratureSource {
    pub fn new(report: LiteratureReport) -> Self {
        Self {
            report: Some(report),
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Report naming `proteins`, each with one linked drug `<protein>-drug`.
    pub fn with_targets(proteins: &[&str]) -> Self {
        Self::new(LiteratureReport {
            protein_targets: proteins.iter().map(ToString::to_string).collect(),
            drugs: proteins
                .iter()
                .map(|p| DrugCandidate {
                    drug: format!("{p}-drug"),
                    proteins: vec![(*p).to_string()],
                    mechanism: format!("{p} inhibitor"),
                    fda_status: "FDA-approved".to_string(),
                })
                .collect(),
            review_text: "# Review\n\nMock literature review.".to_string(),
        })
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            report: None,
            error: Some(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiteratureSource for MockLiteratureSource {
    async fn discover(&self, _subject: &str) -> DomainResult<LiteratureReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match (&self.report, &self.error) {
            (_, Some(message)) => Err(DomainError::collaborator("literature", message.clone())),
            (Some(report), None) => Ok(report.clone()),
            (None, None) => Ok(LiteratureReport::default()),
        }
    }
}

/// Structure source backed by a fixed map. Unknown proteins have no structure.
#[derive(Default)]
pub struct MockStructureSource {
    records: HashMap<String, StructureRecord>,
    errors: HashMap<String, String>,
    calls: RwLock<Vec<String>>,
}

impl MockStructureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, protein: impl Into<String>, record: StructureRecord) -> Self {
        self.records.insert(protein.into(), record);
        self
    }

    pub fn with_error(mut self, protein: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.insert(protein.into(), message.into());
        self
    }

    /// Proteins requested so far, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl StructureSource for MockStructureSource {
    async fn retrieve(
        &self,
        protein: &str,
        _drugs: &[DrugCandidate],
    ) -> DomainResult<StructureRecord> {
        self.calls.write().await.push(protein.to_string());
        if let Some(message) = self.errors.get(protein) {
            return Err(DomainError::collaborator("structures", message.clone()));
        }
        Ok(self.records.get(protein).cloned().unwrap_or_default())
    }
}

/// Compound source backed by fixed lookup, similarity and class tables.
#[derive(Default)]
pub struct MockCompoundSource {
    structures: HashMap<String, CompoundRecord>,
    similar: HashMap<String, Vec<CompoundRecord>>,
    classes: HashMap<String, Vec<String>>,
}

impl MockCompoundSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_structure(mut self, name: &str, structure: &str, key: &str) -> Self {
        self.structures.insert(
            name.to_ascii_lowercase(),
            CompoundRecord {
                name: name.to_string(),
                structure: structure.to_string(),
                key: Some(key.to_string()),
            },
        );
        self
    }

    /// `compounds` are `(name, structure, key)` triples.
    pub fn with_similar(mut self, seed: &str, compounds: Vec<(&str, &str, &str)>) -> Self {
        self.similar.insert(
            seed.to_string(),
            compounds
                .into_iter()
                .map(|(name, structure, key)| CompoundRecord {
                    name: name.to_string(),
                    structure: structure.to_string(),
                    key: Some(key.to_string()),
                })
                .collect(),
        );
        self
    }

    pub fn with_class(mut self, class: &str, names: &[&str]) -> Self {
        self.classes.insert(
            class.to_ascii_lowercase(),
            names.iter().map(ToString::to_string).collect(),
        );
        self
    }
}

#[async_trait]
impl CompoundSource for MockCompoundSource {
    async fn lookup(&self, name: &str) -> DomainResult<Option<CompoundRecord>> {
        Ok(self.structures.get(&name.to_ascii_lowercase()).cloned())
    }

    async fn similar(&self, seed_key: &str, limit: usize) -> DomainResult<Vec<CompoundRecord>> {
        Ok(self
            .similar
            .get(seed_key)
            .map(|records| records.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn enumerate_class(
        &self,
        class_name: &str,
        exclude: &[String],
        limit: usize,
    ) -> DomainResult<Vec<String>> {
        let excluded: HashSet<String> = exclude.iter().map(|s| s.to_ascii_lowercase()).collect();
        Ok(self
            .classes
            .get(&class_name.to_ascii_lowercase())
            .map(|names| {
                names
                    .iter()
                    .filter(|n| !excluded.contains(&n.to_ascii_lowercase()))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Hypothesis source with scripted, per-round answers.
pub struct ScriptedHypothesisSource {
    by_round: HashMap<u32, Value>,
    default: Value,
    error: Option<String>,
    requests: RwLock<Vec<ReasoningRequest>>,
}

impl ScriptedHypothesisSource {
    /// Same payload every round.
    pub fn always(payload: Value) -> Self {
        Self {
            by_round: HashMap::new(),
            default: payload,
            error: None,
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Per-round payloads; rounds not listed answer `proceed`.
    pub fn by_round(payloads: impl IntoIterator<Item = (u32, Value)>) -> Self {
        Self {
            by_round: payloads.into_iter().collect(),
            default: json!({"action": "proceed", "rationale": "scripted default"}),
            error: None,
            requests: RwLock::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            by_round: HashMap::new(),
            default: Value::Null,
            error: Some(message.into()),
            requests: RwLock::new(Vec::new()),
        }
    }

    pub async fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl HypothesisSource for ScriptedHypothesisSource {
    async fn decide(&self, request: &ReasoningRequest) -> DomainResult<Value> {
        self.requests.write().await.push(request.clone());
        if let Some(message) = &self.error {
            return Err(DomainError::collaborator("hypothesis", message.clone()));
        }
        Ok(self
            .by_round
            .get(&request.round)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockOutcome {
    Complete,
    Fail,
    Hang,
}

#[derive(Debug, Clone)]
struct MockJob {
    items: Vec<WorkItem>,
    polls_left: u32,
    outcome: MockOutcome,
    finished: bool,
}

/// Docking backend with deterministic scores, failure injection and in-flight tracking.
///
/// A job's outcome is picked by the dispatch ids it carries: any id listed
/// with [`fail_on`](Self::fail_on) fails the whole job, any id listed with
/// [`hang_on`](Self::hang_on) keeps it running forever, and any id listed with
/// [`reject_on`](Self::reject_on) makes submission itself fail.
#[derive(Default)]
pub struct MockDockingBackend {
    jobs: RwLock<HashMap<String, MockJob>>,
    submitted: RwLock<Vec<Vec<WorkItem>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pending_polls: u32,
    fail_ids: HashSet<String>,
    hang_ids: HashSet<String>,
    reject_ids: HashSet<String>,
}

impl MockDockingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `Running` this many times before the terminal status.
    #[must_use]
    pub const fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    #[must_use]
    pub fn fail_on(mut self, dispatch_id: impl Into<String>) -> Self {
        self.fail_ids.insert(dispatch_id.into());
        self
    }

    #[must_use]
    pub fn hang_on(mut self, dispatch_id: impl Into<String>) -> Self {
        self.hang_ids.insert(dispatch_id.into());
        self
    }

    #[must_use]
    pub fn reject_on(mut self, dispatch_id: impl Into<String>) -> Self {
        self.reject_ids.insert(dispatch_id.into());
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every submitted batch, in submission order.
    pub async fn submitted(&self) -> Vec<Vec<WorkItem>> {
        self.submitted.read().await.clone()
    }

    pub async fn submitted_structures(&self) -> Vec<String> {
        self.submitted
            .read()
            .await
            .iter()
            .flatten()
            .map(|item| item.structure.clone())
            .collect()
    }

    fn finish(&self, job: &mut MockJob) {
        if !job.finished {
            job.finished = true;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl DockingBackend for MockDockingBackend {
    async fn submit(&self, job: &DockingJob) -> DomainResult<String> {
        if job.items.iter().any(|i| self.reject_ids.contains(&i.name)) {
            return Err(DomainError::Backend("submission rejected".to_string()));
        }

        let outcome = if job.items.iter().any(|i| self.hang_ids.contains(&i.name)) {
            MockOutcome::Hang
        } else if job.items.iter().any(|i| self.fail_ids.contains(&i.name)) {
            MockOutcome::Fail
        } else {
            MockOutcome::Complete
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let id = Uuid::new_v4().to_string();
        self.submitted.write().await.push(job.items.clone());
        self.jobs.write().await.insert(
            id.clone(),
            MockJob {
                items: job.items.clone(),
                polls_left: self.pending_polls,
                outcome,
                finished: false,
            },
        );
        Ok(id)
    }

    async fn poll(&self, job_id: &str) -> DomainResult<JobPoll> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| DomainError::Backend(format!("unknown job {job_id}")))?;

        if job.outcome == MockOutcome::Hang {
            return Ok(JobPoll::pending(JobStatus::Running));
        }
        if job.polls_left > 0 {
            job.polls_left -= 1;
            return Ok(JobPoll::pending(JobStatus::Running));
        }

        self.finish(job);
        match job.outcome {
            MockOutcome::Fail => Ok(JobPoll {
                status: JobStatus::Failed,
                scores: Vec::new(),
                error: Some("mock failure".to_string()),
            }),
            _ => Ok(JobPoll {
                status: JobStatus::Completed,
                scores: job
                    .items
                    .iter()
                    .map(|item| {
                        let score = mock_score(&item.structure);
                        RawScore {
                            name: item.name.clone(),
                            confidence_score: score,
                            confidence_raw: score.mul_add(4.0, -2.0),
                            all_poses: None,
                        }
                    })
                    .collect(),
                error: None,
            }),
        }
    }
}

/// Report writer returning short deterministic markdown.
#[derive(Default)]
pub struct MockReportWriter {
    fail: bool,
}

impl MockReportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl ReportWriter for MockReportWriter {
    async fn write_report(&self, state: &RunState) -> DomainResult<String> {
        if self.fail {
            return Err(DomainError::collaborator("report", "mock failure"));
        }
        Ok(format!(
            "# Results: {}\n\n{} docking results.",
            state.subject,
            state.accumulated_results.len()
        ))
    }

    async fn write_paper(&self, state: &RunState) -> DomainResult<String> {
        if self.fail {
            return Err(DomainError::collaborator("paper", "mock failure"));
        }
        Ok(format!("# Paper: {}\n\n{}", state.subject, state.report_text))
    }
}

/// In-memory state store that can simulate a crash after N checkpoints.
#[derive(Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<RunState>>,
    saves: AtomicUsize,
    crash_after: RwLock<Option<usize>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: RunState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
            ..Self::default()
        }
    }

    /// Fail every save after the first `saves` successful ones.
    pub async fn crash_after_saves(&self, saves: usize) {
        *self.crash_after.write().await = Some(saves);
    }

    pub async fn clear_crash(&self) {
        *self.crash_after.write().await = None;
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Option<RunState> {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> DomainResult<RunState> {
        self.state
            .read()
            .await
            .clone()
            .ok_or_else(|| DomainError::StateNotFound("<memory>".into()))
    }

    async fn save(&self, state: &RunState) -> DomainResult<()> {
        if let Some(limit) = *self.crash_after.read().await {
            if self.saves.load(Ordering::SeqCst) >= limit {
                return Err(DomainError::Persistence("simulated crash".to_string()));
            }
        }
        *self.state.write().await = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared handles to every mock, for wiring a pipeline in tests.
pub struct MockCollaborators {
    pub literature: Arc<MockLiteratureSource>,
    pub structures: Arc<MockStructureSource>,
    pub compounds: Arc<MockCompoundSource>,
    pub hypothesis: Arc<ScriptedHypothesisSource>,
    pub backend: Arc<MockDockingBackend>,
    pub report: Arc<MockReportWriter>,
    pub store: Arc<MemoryStateStore>,
}

impl MockCollaborators {
    pub fn pipeline_collaborators(&self) -> crate::services::PipelineCollaborators {
        crate::services::PipelineCollaborators {
            literature: self.literature.clone(),
            structures: self.structures.clone(),
            compounds: self.compounds.clone(),
            hypothesis: self.hypothesis.clone(),
            backend: self.backend.clone(),
            report: self.report.clone(),
            store: self.store.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_score_is_stable_and_bounded() {
        let a = mock_score("CCO");
        assert!((a - mock_score("CCO")).abs() < f64::EPSILON);
        assert!((0.0..1.0).contains(&a));
    }

    #[tokio::test]
    async fn test_memory_store_crash() {
        let store = MemoryStateStore::new();
        store.crash_after_saves(1).await;
        let state = RunState::new("x");

        assert!(store.save(&state).await.is_ok());
        assert!(store.save(&state).await.is_err());
        store.clear_crash().await;
        assert!(store.save(&state).await.is_ok());
        assert_eq!(store.save_count(), 2);
    }
}

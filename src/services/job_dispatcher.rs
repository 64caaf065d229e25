//! Job dispatcher: batched, concurrency-capped docking submissions.
//!
//! Each batch is owned end-to-end by one spawned worker (submit, then poll
//! until terminal). A batch that fails, times out or is cancelled yields a
//! [`BatchFailure`] and zero scores; its siblings keep running.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::Semaphore;
use tokio::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BatchFailure, DispatchConfig, DockingJob, JobStatus, Ligand, RawScore, WorkItem,
};
use crate::domain::ports::DockingBackend;

/// Characters never allowed in a dispatch identifier.
const UNSAFE_ID_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Length of the name prefix kept in index-qualified identifiers.
const SHORT_PREFIX_LEN: usize = 30;

/// Runtime settings for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub samples_per_item: u32,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub max_id_len: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for DispatcherConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrency: config.max_concurrency,
            samples_per_item: config.samples_per_item,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            job_timeout: Duration::from_secs(config.job_timeout_secs),
            max_id_len: config.max_id_len,
        }
    }
}

/// Sanitize one ligand name into a storage-safe identifier of at most `max_len` chars.
///
/// Unsafe characters become `_`. Names that end up empty become `lig<idx>`;
/// names still too long become `lig<idx>_<prefix>`. Collisions are resolved by
/// [`DispatchManifest::build`], not here.
pub fn sanitize_name(name: &str, index: usize, max_len: usize) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if UNSAFE_ID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned.is_empty() {
        return format!("lig{index}");
    }
    if cleaned.chars().count() <= max_len {
        return cleaned;
    }

    let head = format!("lig{index}_");
    let room = max_len.saturating_sub(head.len()).min(SHORT_PREFIX_LEN);
    let prefix: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(room)
        .collect();
    format!("{head}{prefix}")
}

/// Bidirectional mapping between dispatch identifiers and ligand positions.
#[derive(Debug, Clone, Default)]
pub struct DispatchManifest {
    ids: Vec<String>,
    by_id: HashMap<String, usize>,
}

impl DispatchManifest {
    /// Assign a unique identifier to every ligand, in order.
    pub fn build(ligands: &[Ligand], max_len: usize) -> Self {
        let mut manifest = Self {
            ids: Vec::with_capacity(ligands.len()),
            by_id: HashMap::with_capacity(ligands.len()),
        };

        for (index, ligand) in ligands.iter().enumerate() {
            let base = sanitize_name(&ligand.name, index, max_len);
            let mut id = base.clone();
            let mut suffix = 2usize;
            while manifest.by_id.contains_key(&id) {
                let tail = format!("_{suffix}");
                let keep = max_len.saturating_sub(tail.len());
                id = format!("{}{tail}", base.chars().take(keep).collect::<String>());
                suffix += 1;
            }
            manifest.by_id.insert(id.clone(), index);
            manifest.ids.push(id);
        }
        manifest
    }

    pub fn id_for(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Everything one dispatch call produced.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Scores from every successful batch, concatenated in batch order.
    pub scores: Vec<RawScore>,
    pub batch_failures: Vec<BatchFailure>,
    pub batch_count: usize,
    pub elapsed: Duration,
    pub manifest: DispatchManifest,
}

impl DispatchReport {
    pub fn all_failed(&self) -> bool {
        self.batch_count > 0 && self.batch_failures.len() == self.batch_count
    }
}

/// Submits ligand batches to a [`DockingBackend`] under a concurrency cap.
pub struct JobDispatcher {
    backend: Arc<dyn DockingBackend>,
    config: DispatcherConfig,
}

impl JobDispatcher {
    pub fn new(backend: Arc<dyn DockingBackend>, config: DispatcherConfig) -> Self {
        Self { backend, config }
    }

    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Dock `ligands` against the structure in `structure_file`.
    ///
    /// Only an unreadable structure file is an error; backend trouble is
    /// reported through [`DispatchReport::batch_failures`].
    #[instrument(skip(self, ligands), fields(structure = %structure_file.display(), ligands = ligands.len()))]
    pub async fn dispatch(
        &self,
        structure_file: &Path,
        ligands: &[Ligand],
    ) -> DomainResult<DispatchReport> {
        let started = Instant::now();
        let bytes = tokio::fs::read(structure_file).await.map_err(|e| {
            DomainError::Persistence(format!(
                "cannot read structure file {}: {e}",
                structure_file.display()
            ))
        })?;
        let encoded = STANDARD.encode(bytes);

        let manifest = DispatchManifest::build(ligands, self.config.max_id_len);
        let items: Vec<WorkItem> = ligands
            .iter()
            .enumerate()
            .filter_map(|(index, ligand)| {
                manifest.id_for(index).map(|id| WorkItem {
                    name: id.to_string(),
                    structure: ligand.structure.clone(),
                })
            })
            .collect();

        let batches: Vec<Vec<WorkItem>> = items
            .chunks(self.config.batch_size.max(1))
            .map(<[WorkItem]>::to_vec)
            .collect();
        let batch_count = batches.len();
        let permits = batch_count.min(self.config.max_concurrency).max(1);

        info!(batches = batch_count, permits, "dispatching docking batches");

        let semaphore = Arc::new(Semaphore::new(permits));
        let mut handles = Vec::with_capacity(batch_count);

        for (batch_index, batch) in batches.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| DomainError::ValidationFailed("Semaphore error".to_string()))?;

            let backend = self.backend.clone();
            let config = self.config.clone();
            let job = DockingJob {
                structure_encoded: encoded.clone(),
                items: batch,
                samples_per_item: config.samples_per_item,
            };

            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_batch(backend.as_ref(), &job, batch_index, &config).await
            });
            handles.push(handle);
        }

        let mut scores = Vec::new();
        let mut batch_failures = Vec::new();
        for (batch_index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(batch_scores)) => scores.extend(batch_scores),
                Ok(Err(failure)) => {
                    warn!(batch = batch_index, status = %failure.status, detail = %failure.detail, "docking batch failed");
                    batch_failures.push(failure);
                }
                Err(join_err) => {
                    warn!(batch = batch_index, error = %join_err, "docking worker aborted");
                    batch_failures.push(BatchFailure {
                        batch_index,
                        status: JobStatus::Failed,
                        detail: format!("worker aborted: {join_err}"),
                    });
                }
            }
        }

        let elapsed = started.elapsed();
        info!(
            scores = scores.len(),
            failed_batches = batch_failures.len(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "dispatch finished"
        );

        Ok(DispatchReport {
            scores,
            batch_failures,
            batch_count,
            elapsed,
            manifest,
        })
    }
}

/// Submit one batch and poll it to a terminal state.
async fn run_batch(
    backend: &dyn DockingBackend,
    job: &DockingJob,
    batch_index: usize,
    config: &DispatcherConfig,
) -> Result<Vec<RawScore>, BatchFailure> {
    let job_id = backend.submit(job).await.map_err(|e| BatchFailure {
        batch_index,
        status: JobStatus::Failed,
        detail: format!("submission failed: {e}"),
    })?;
    debug!(batch = batch_index, job_id = %job_id, items = job.items.len(), "batch submitted");

    let deadline = Instant::now() + config.job_timeout;
    loop {
        match backend.poll(&job_id).await {
            Ok(poll) if poll.status == JobStatus::Completed => return Ok(poll.scores),
            Ok(poll) if poll.status.is_terminal() => {
                return Err(BatchFailure {
                    batch_index,
                    status: poll.status,
                    detail: poll
                        .error
                        .unwrap_or_else(|| format!("job {job_id} ended {}", poll.status)),
                });
            }
            Ok(poll) => debug!(batch = batch_index, status = %poll.status, "batch pending"),
            Err(e) => warn!(batch = batch_index, job_id = %job_id, error = %e, "status check failed"),
        }

        if Instant::now() >= deadline {
            return Err(BatchFailure {
                batch_index,
                status: JobStatus::TimedOut,
                detail: format!(
                    "job {job_id} not finished after {}s",
                    config.job_timeout.as_secs()
                ),
            });
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ligand(name: &str) -> Ligand {
        Ligand::new(name, "CCO")
    }

    #[test]
    fn test_sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_name("a/b:c*d", 0, 80), "a_b_c_d");
        assert_eq!(sanitize_name("  ", 4, 80), "lig4");
    }

    #[test]
    fn test_sanitize_long_name_is_index_qualified() {
        let long = "x".repeat(300);
        let id = sanitize_name(&long, 7, 80);
        assert!(id.starts_with("lig7_"));
        assert!(id.chars().count() <= 80);
    }

    #[test]
    fn test_manifest_resolves_duplicates() {
        let ligands = vec![
            ligand(&"a".repeat(300)),
            ligand(""),
            ligand("valid-name"),
            ligand("valid-name"),
        ];
        let manifest = DispatchManifest::build(&ligands, 80);

        assert_eq!(manifest.len(), 4);
        assert_eq!(manifest.id_for(2), Some("valid-name"));
        assert_eq!(manifest.id_for(3), Some("valid-name_2"));
        for index in 0..4 {
            let id = manifest.id_for(index).unwrap();
            assert!(id.chars().count() <= 80);
            assert_eq!(manifest.index_of(id), Some(index));
        }
    }

    #[test]
    fn test_manifest_collision_with_generated_id() {
        let ligands = vec![ligand("lig1"), ligand("")];
        let manifest = DispatchManifest::build(&ligands, 80);
        assert_eq!(manifest.id_for(0), Some("lig1"));
        assert_eq!(manifest.id_for(1), Some("lig1_2"));
    }
}

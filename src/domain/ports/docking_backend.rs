//! Docking backend port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DockingJob, JobPoll};

/// Asynchronous batch docking service.
///
/// A job is submitted once and then polled until its status is terminal.
#[async_trait]
pub trait DockingBackend: Send + Sync {
    /// Submit a batch and return the backend's job id.
    async fn submit(&self, job: &DockingJob) -> DomainResult<String>;

    /// Fetch the current status of a job.
    async fn poll(&self, job_id: &str) -> DomainResult<JobPoll>;
}

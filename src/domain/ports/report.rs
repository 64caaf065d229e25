//! Report port - markdown synthesis of a finished run.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::RunState;

#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Results report covering every docking round.
    async fn write_report(&self, state: &RunState) -> DomainResult<String>;

    /// Final paper combining the review and the report.
    async fn write_paper(&self, state: &RunState) -> DomainResult<String>;
}

//! State store port - durable checkpoints of the run state.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::RunState;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last checkpoint. Missing state is `DomainError::StateNotFound`.
    async fn load(&self) -> DomainResult<RunState>;

    /// Replace the checkpoint atomically. Readers never see a partial write.
    async fn save(&self, state: &RunState) -> DomainResult<()>;
}

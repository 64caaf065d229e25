//! JSON file state store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RunState;
use crate::domain::ports::StateStore;
use crate::services::artifacts::write_atomic;

pub const STATE_FILE: &str = "pipeline_state.json";

/// Persists the run state as one pretty-printed JSON document.
///
/// Every save goes to `<file>.tmp`, is fsynced and then renamed over the
/// previous checkpoint.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<output_dir>/pipeline_state.json`.
    pub fn in_dir(output_dir: impl AsRef<Path>) -> Self {
        Self::new(output_dir.as_ref().join(STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> DomainResult<RunState> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DomainError::StateNotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_str(&raw)?;
        Ok(state)
    }

    async fn save(&self, state: &RunState) -> DomainResult<()> {
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path, json.as_bytes()).await?;
        debug!(path = %self.path.display(), status = %state.status, "state checkpointed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Ligand, RunStatus, Target};

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::in_dir(dir.path());

        let mut state = RunState::new("pancreatic cancer");
        state.status = RunStatus::DockingRoundComplete(2);
        state.round = 2;
        let mut target = Target::new("KRAS").with_structure("6OIM", "structures/6OIM.pdb");
        target.add_ligand(Ligand::new("sotorasib", "CC1=CC").with_provenance("pubchem_cid_137278711"));
        state.targets.push(target);

        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state);
        assert!(!dir.path().join("pipeline_state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_state_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::in_dir(dir.path());
        assert!(matches!(
            store.load().await,
            Err(DomainError::StateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_status_loads_as_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::in_dir(dir.path());
        let state = RunState::new("glioma");
        let mut value = serde_json::to_value(&state).unwrap();
        value["status"] = serde_json::json!("docking_round_??");
        tokio::fs::write(store.path(), value.to_string()).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.status, RunStatus::Unknown("docking_round_??".into()));
    }
}

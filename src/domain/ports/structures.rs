//! Structure port - protein structure and initial ligand retrieval.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DrugCandidate, Ligand};

/// Retrieval outcome for one protein.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureRecord {
    pub structure_id: Option<String>,
    /// Absent when no usable structure was found.
    pub structure_file: Option<PathBuf>,
    pub ligands: Vec<Ligand>,
}

#[async_trait]
pub trait StructureSource: Send + Sync {
    /// Find a structure for `protein` and the ligands worth docking against it.
    ///
    /// `drugs` are the literature drugs linked to this protein.
    async fn retrieve(&self, protein: &str, drugs: &[DrugCandidate])
        -> DomainResult<StructureRecord>;
}

//! dockloop - iterative docking pipeline for drug repurposing
//!
//! A run starts from a research subject, mines the literature for protein
//! targets and known drugs, retrieves a structure per target, docks the
//! candidate ligands on a remote backend and then lets a reasoning
//! collaborator decide, round by round, whether to widen the ligand set
//! (3-D similarity or drug-class expansion) or to write up the results. The
//! expansion loop is hard-capped and every step is checkpointed so a run can
//! be resumed after a crash.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): run state, decisions and the collaborator ports
//! - **Service Layer** (`services`): the pipeline state machine and the docking loop
//! - **Adapters** (`adapters`): HTTP collaborators, JSON state store, test doubles
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, DockingResult, ExpansionAction, ExpansionDecision, Ligand, RunState, RunStatus,
    Target,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Pipeline, PipelineCollaborators};

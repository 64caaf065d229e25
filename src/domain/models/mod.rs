pub mod config;
pub mod decision;
pub mod docking;
pub mod run_state;

pub use config::{
    BackendConfig, ChatConfig, Config, DispatchConfig, LoggingConfig, PubChemConfig, RcsbConfig,
    ReasoningConfig, RetryConfig,
};
pub use decision::{
    seed_key_from_provenance, ExpansionAction, ExpansionDecision, ExpansionSeed,
    CID_PROVENANCE_PREFIX,
};
pub use docking::{BatchFailure, DockingJob, JobPoll, JobStatus, RawScore, WorkItem};
pub use run_state::{
    DockingResult, DrugCandidate, ExpansionRecord, Ligand, RunState, RunStatus, Target,
    TargetFailure, TargetFailureKind,
};

//! Pipeline services: the resumable state machine and the docking loop it
//! drives.

pub mod artifacts;
pub mod expansion_executor;
pub mod expansion_reasoner;
pub mod job_dispatcher;
pub mod pipeline;
pub mod result_merger;
pub mod round_executor;

pub use artifacts::ArtifactWriter;
pub use expansion_executor::{ExpansionExecutor, ExpansionOutcome};
pub use expansion_reasoner::ExpansionReasoner;
pub use job_dispatcher::{DispatchManifest, DispatchReport, DispatcherConfig, JobDispatcher};
pub use pipeline::{Pipeline, PipelineCollaborators};
pub use result_merger::{merge_results, rank_results};
pub use round_executor::{RoundExecutor, RoundReport};

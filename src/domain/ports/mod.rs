//! Port trait definitions (Hexagonal Architecture)
//!
//! Every external collaborator of the pipeline sits behind one of these async
//! traits. Adapters in `crate::adapters` implement them against real services;
//! `crate::adapters::mock` implements them in memory for tests.

pub mod compounds;
pub mod docking_backend;
pub mod hypothesis;
pub mod literature;
pub mod report;
pub mod state_store;
pub mod structures;

pub use compounds::{CompoundRecord, CompoundSource};
pub use docking_backend::DockingBackend;
pub use hypothesis::{HypothesisSource, ReasoningRequest};
pub use literature::{LiteratureReport, LiteratureSource};
pub use report::ReportWriter;
pub use state_store::StateStore;
pub use structures::{StructureRecord, StructureSource};

//! Adapters for the external collaborators and local persistence.

pub mod chat;
pub mod compounds;
pub mod http;
pub mod json_store;
pub mod mock;
pub mod pubchem;
pub mod rcsb;
pub mod runpod;

pub use chat::ChatClient;
pub use compounds::PipelineCompounds;
pub use json_store::JsonStateStore;
pub use pubchem::PubChemClient;
pub use rcsb::RcsbStructureSource;
pub use runpod::RunPodBackend;

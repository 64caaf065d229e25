//! Domain layer for the dockloop pipeline
//!
//! Run state, decisions and the port traits every collaborator implements.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};

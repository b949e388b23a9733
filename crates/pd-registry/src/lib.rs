//! # pd-registry
//!
//! Storage contract for recorded runs and registered model versions, plus two
//! backends: a process-local [`InMemoryRegistry`] and a [`JsonFileRegistry`]
//! that survives across pipeline invocations. [`RetryPolicy`] wraps calls
//! into either backend.

mod file;
mod memory;
mod registry;
mod retry;
mod run;
mod state;
mod version;

pub use file::JsonFileRegistry;
pub use memory::InMemoryRegistry;
pub use registry::{Registry, RegistryResult};
pub use retry::RetryPolicy;
pub use run::{ArtifactRef, NewRun, Run, RunId};
pub use version::{ModelVersion, Stage};

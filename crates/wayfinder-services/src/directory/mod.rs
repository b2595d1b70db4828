//! The built-in directory (`yp`) service.

pub(crate) mod service;
mod store;

pub use service::DirectoryService;
pub use store::{InMemoryDirectory, LivenessProbe, TransportProbe};

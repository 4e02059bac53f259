//! Tether Core - Foundation types shared by the agent runtime
//!
//! This crate provides the error taxonomy, container/process identifiers and
//! the service status model used by the namespace manager and the reporter.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod status;
pub mod types;

pub use error::{Error, Result};
pub use status::{ServiceState, ServiceStatus};
pub use types::{ContainerId, ProcessId};

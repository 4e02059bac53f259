//! Container engine abstraction
//!
//! The agent only needs one thing from the container engine at its core:
//! resolving a container to the PID of its init process. Lifecycle operations
//! live with the engine binding itself.
//!
//! - [`StaticEngine`] - in-memory lookups for tests and explicit PIDs
//! - `DockerEngine` - Docker engine API (feature `docker`)

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

#[cfg(feature = "docker")]
pub mod docker;
pub mod engine;

#[cfg(feature = "docker")]
pub use docker::DockerEngine;
pub use engine::{Engine, InspectResponse, StaticEngine};

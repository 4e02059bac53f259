//! Network namespace switching for container-scoped work
//!
//! Network namespaces are a per-thread kernel attribute. This crate runs a
//! unit of work with one OS thread temporarily moved into a container's
//! network namespace:
//! - [`ThreadPin`] - exclusive claim on the current OS thread
//! - [`NamespaceBackend`] - capture / open / enter operations
//! - [`NetnsManager`] - resolve, switch, run, restore or quarantine

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod backend;
pub mod manager;
pub mod pin;

pub use backend::{LinuxNamespaces, MockNamespaces, NamespaceBackend, NetnsHandle, net_namespace_id};
pub use manager::NetnsManager;
pub use pin::ThreadPin;

// Re-export commonly used types
pub use tether_core::{ContainerId, ProcessId};

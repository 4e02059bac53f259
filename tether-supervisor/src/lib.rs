//! Desired-versus-observed status reconciliation
//!
//! A [`Reporter`] holds the desired application release and the latest
//! observed status of every service, and runs two periodic loops that push
//! only what changed to a [`StatusSink`]:
//! - application status, once every desired service runs the desired release
//! - per-service status, whenever release, state or error message changes

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod reconcile;
pub mod reporter;
pub mod sink;

pub use config::ReporterConfig;
pub use reconcile::{ApplicationSnapshot, diff_service_statuses, plan_application_report};
pub use reporter::Reporter;
pub use sink::{RecordingSink, Report, StatusSink};

// Re-export commonly used types
pub use tether_core::{ServiceState, ServiceStatus};

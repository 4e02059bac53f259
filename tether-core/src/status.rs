//! Observed service status model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a service as observed on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Nothing known yet
    #[default]
    Unknown,
    /// Image pull in progress
    PullingImage,
    /// Container being created
    CreatingContainer,
    /// Previous release's container being stopped
    StoppingPreviousContainer,
    /// Previous release's container being removed
    RemovingPreviousContainer,
    /// Container being started
    StartingContainer,
    /// Container running
    Running,
    /// Container exited
    Exited,
}

impl ServiceState {
    /// Wire name of the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::PullingImage => "pulling_image",
            Self::CreatingContainer => "creating_container",
            Self::StoppingPreviousContainer => "stopping_previous_container",
            Self::RemovingPreviousContainer => "removing_previous_container",
            Self::StartingContainer => "starting_container",
            Self::Running => "running",
            Self::Exited => "exited",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest observed status of one service
///
/// Two statuses are equal when release, state and error message all match;
/// that equality drives what gets reported upstream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Release the service is currently running
    pub current_release_id: String,
    /// Observed lifecycle state
    pub current_state: ServiceState,
    /// Last container error, empty if none
    #[serde(default)]
    pub error_message: String,
}

impl ServiceStatus {
    /// Create a status with no error message
    #[must_use]
    pub fn new(release: impl Into<String>, state: ServiceState) -> Self {
        Self {
            current_release_id: release.into(),
            current_state: state,
            error_message: String::new(),
        }
    }

    /// Attach an error message
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }
}

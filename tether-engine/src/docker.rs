//! Docker engine lookups over the local engine socket

use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::InspectContainerOptions;
use tether_core::{ContainerId, Error, ProcessId, Result};

use crate::engine::{Engine, InspectResponse};

/// Engine backed by the local Docker daemon
#[derive(Debug, Clone)]
pub struct DockerEngine {
    client: Docker,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` or the default local socket
    ///
    /// # Errors
    /// Returns error if the client cannot be configured
    pub fn connect() -> Result<Self> {
        let client = Docker::connect_with_local_defaults().map_err(|e| Error::Engine {
            message: format!("Failed to connect to Docker: {e}"),
        })?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    #[must_use]
    pub const fn from_client(client: Docker) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn inspect_container(&self, id: &ContainerId) -> Result<InspectResponse> {
        let container = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| Error::Engine {
                message: format!("Failed to inspect container {id}: {e}"),
            })?;

        let state = container.state.unwrap_or_default();
        let raw_pid = state.pid.unwrap_or_default();
        let pid = i32::try_from(raw_pid).map_err(|_| Error::Engine {
            message: format!("Container {id} reported out of range PID {raw_pid}"),
        })?;

        tracing::debug!(container_id = %id, pid, "Inspected container");

        Ok(InspectResponse {
            pid: ProcessId::from_raw(pid),
            running: state.running.unwrap_or(false),
        })
    }
}

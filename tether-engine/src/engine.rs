//! Engine trait and in-memory implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::{ContainerId, Error, ProcessId, Result};
use tokio::sync::RwLock;

/// Result of inspecting a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectResponse {
    /// PID of the container's init process (0 when not running)
    pub pid: ProcessId,
    /// Whether the engine considers the container running
    pub running: bool,
}

impl InspectResponse {
    /// Response for a running container
    #[must_use]
    pub const fn running(pid: ProcessId) -> Self {
        Self { pid, running: true }
    }
}

/// Container engine lookups
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the namespace manager shares one
/// engine across concurrent calls.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Inspect a container by ID or name
    ///
    /// # Errors
    /// Returns error if the container does not exist or the engine is unreachable
    async fn inspect_container(&self, id: &ContainerId) -> Result<InspectResponse>;
}

/// Engine backed by an in-memory table
///
/// # Example
/// ```
/// use tether_core::{ContainerId, ProcessId};
/// use tether_engine::{Engine, StaticEngine};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let id = ContainerId::new("web").unwrap();
/// let engine = StaticEngine::new();
/// engine.insert(id.clone(), ProcessId::from_raw(1234)).await;
///
/// let inspect = engine.inspect_container(&id).await.unwrap();
/// assert_eq!(inspect.pid.as_raw(), 1234);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticEngine {
    containers: Arc<RwLock<HashMap<ContainerId, InspectResponse>>>,
}

impl StaticEngine {
    /// Create an empty engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine that knows a single running container
    #[must_use]
    pub fn with_container(id: ContainerId, pid: ProcessId) -> Self {
        let containers = HashMap::from([(id, InspectResponse::running(pid))]);
        Self {
            containers: Arc::new(RwLock::new(containers)),
        }
    }

    /// Register a running container
    pub async fn insert(&self, id: ContainerId, pid: ProcessId) {
        self.set(id, InspectResponse::running(pid)).await;
    }

    /// Register a container with an explicit inspect response
    pub async fn set(&self, id: ContainerId, response: InspectResponse) {
        self.containers.write().await.insert(id, response);
    }

    /// Forget a container
    pub async fn remove(&self, id: &ContainerId) {
        self.containers.write().await.remove(id);
    }
}

#[async_trait]
impl Engine for StaticEngine {
    async fn inspect_container(&self, id: &ContainerId) -> Result<InspectResponse> {
        let response = self.containers.read().await.get(id).copied();

        response.ok_or_else(|| {
            tracing::debug!(container_id = %id, "Static engine: no such container");
            Error::Engine {
                message: format!("No such container: {id}"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_engine_lookup() {
        let id = ContainerId::new("web").unwrap();
        let engine = StaticEngine::with_container(id.clone(), ProcessId::from_raw(42));

        let inspect = engine.inspect_container(&id).await.unwrap();
        assert_eq!(inspect, InspectResponse::running(ProcessId::from_raw(42)));

        engine.remove(&id).await;
        let err = engine.inspect_container(&id).await.unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));
    }

    #[tokio::test]
    async fn test_static_engine_stopped_container() {
        let id = ContainerId::new("db").unwrap();
        let engine = StaticEngine::new();
        engine
            .set(
                id.clone(),
                InspectResponse {
                    pid: ProcessId::from_raw(0),
                    running: false,
                },
            )
            .await;

        let inspect = engine.inspect_container(&id).await.unwrap();
        assert!(!inspect.running);
        assert!(!inspect.pid.is_live());
    }
}

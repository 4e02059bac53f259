//! Running work inside a container's network namespace

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tether_core::{ContainerId, Error, ProcessId, Result};
use tether_engine::Engine;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::backend::{LinuxNamespaces, NamespaceBackend};
use crate::pin::ThreadPin;

/// Attempts made to move a thread back to its original namespace
const RESTORE_ATTEMPTS: usize = 2;

/// Runs closures with one OS thread switched into a container's network namespace
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use tether_engine::StaticEngine;
/// use tether_netns::{ContainerId, NetnsManager, ProcessId};
///
/// # #[tokio::main]
/// # async fn main() -> tether_core::Result<()> {
/// let id = ContainerId::new("web").unwrap();
/// let engine = StaticEngine::with_container(id.clone(), ProcessId::from_raw(1234));
/// let manager = NetnsManager::new(Arc::new(engine));
///
/// let interfaces = manager
///     .run_in_container_namespace(&id, || std::fs::read_to_string("/proc/net/dev"))
///     .await??;
/// println!("{interfaces}");
/// # Ok(())
/// # }
/// ```
pub struct NetnsManager<B: NamespaceBackend = LinuxNamespaces> {
    engine: Arc<dyn Engine>,
    backend: Arc<B>,
    quarantined: Arc<AtomicUsize>,
}

impl NetnsManager<LinuxNamespaces> {
    /// Create a manager using the kernel's namespaces
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_backend(engine, LinuxNamespaces)
    }
}

impl<B: NamespaceBackend> NetnsManager<B> {
    /// Create a manager with a specific namespace backend
    #[must_use]
    pub fn with_backend(engine: Arc<dyn Engine>, backend: B) -> Self {
        Self {
            engine,
            backend: Arc::new(backend),
            quarantined: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the namespace backend
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of threads retired after failing to restore their namespace
    #[must_use]
    pub fn quarantined_threads(&self) -> usize {
        self.quarantined.load(Ordering::Relaxed)
    }

    /// Resolve a container to the PID of a live process
    ///
    /// # Errors
    /// Returns [`Error::ContainerNotRunning`] if the engine lookup fails or the
    /// container has no live process
    pub async fn resolve_pid(&self, container_id: &ContainerId) -> Result<ProcessId> {
        let inspect = self
            .engine
            .inspect_container(container_id)
            .await
            .map_err(|e| Error::ContainerNotRunning {
                container_id: container_id.to_string(),
                reason: e.to_string(),
            })?;

        if !inspect.running || !inspect.pid.is_live() {
            return Err(Error::ContainerNotRunning {
                container_id: container_id.to_string(),
                reason: format!(
                    "no live process (pid {}, running: {})",
                    inspect.pid, inspect.running
                ),
            });
        }

        Ok(inspect.pid)
    }

    /// Run `work` inside the network namespace of `container_id`.
    ///
    /// The switch happens on a dedicated OS thread, so no runtime worker ever
    /// changes namespace. If that thread cannot be restored it is quarantined
    /// and exits once the result has been handed back.
    ///
    /// # Errors
    /// - [`Error::ContainerNotRunning`] if the container has no live process
    /// - [`Error::NamespaceUnavailable`] if the switch could not be made; `work`
    ///   has not run
    /// - [`Error::WorkerLost`] if `work` panicked
    pub async fn run_in_container_namespace<F, R>(
        &self,
        container_id: &ContainerId,
        work: F,
    ) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let pid = self.resolve_pid(container_id).await?;

        debug!(container_id = %container_id, pid = pid.as_raw(), "Resolved container PID");

        let backend = Arc::clone(&self.backend);
        let quarantined = Arc::clone(&self.quarantined);
        let (tx, rx) = oneshot::channel();

        let _worker = std::thread::Builder::new()
            .name(format!("netns-{pid}"))
            .spawn(move || {
                let result = ThreadPin::acquire().and_then(|pin| {
                    switch_and_run(backend.as_ref(), &quarantined, pin, pid, work)
                });
                let _ = tx.send(result);
            })?;

        rx.await.map_err(|_| Error::WorkerLost)?
    }

    /// Run `work` on the already pinned calling thread inside `pid`'s namespace.
    ///
    /// The pin is consumed: it is released when the thread is back in its
    /// original namespace and quarantined otherwise.
    ///
    /// # Errors
    /// Returns [`Error::NamespaceUnavailable`] if the switch could not be made;
    /// `work` has not run
    pub fn run_in_pid_namespace<F, R>(&self, pin: ThreadPin, pid: ProcessId, work: F) -> Result<R>
    where
        F: FnOnce() -> R,
    {
        if !pid.is_live() {
            return Err(Error::namespace(format!("invalid pid {pid}")));
        }
        switch_and_run(self.backend.as_ref(), &self.quarantined, pin, pid, work)
    }
}

impl<B: NamespaceBackend> std::fmt::Debug for NetnsManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetnsManager")
            .field("quarantined", &self.quarantined_threads())
            .finish_non_exhaustive()
    }
}

fn switch_and_run<B, F, R>(
    backend: &B,
    quarantined: &AtomicUsize,
    pin: ThreadPin,
    pid: ProcessId,
    work: F,
) -> Result<R>
where
    B: NamespaceBackend,
    F: FnOnce() -> R,
{
    let original = backend.current(&pin).inspect_err(|e| {
        error!(pid = pid.as_raw(), error = %e, "Failed to capture current network namespace");
    })?;

    let target = backend.open_pid(pid).inspect_err(|e| {
        error!(pid = pid.as_raw(), error = %e, "Failed to open container network namespace");
    })?;

    backend.enter(&pin, &target).inspect_err(|e| {
        error!(pid = pid.as_raw(), error = %e, "Failed to enter container network namespace");
    })?;

    debug!(pid = pid.as_raw(), namespace = ?target, "Entered container network namespace");

    let outcome = panic::catch_unwind(AssertUnwindSafe(work));

    if restore(backend, &pin, &original) {
        pin.release();
    } else {
        let total = quarantined.fetch_add(1, Ordering::Relaxed) + 1;
        error!(
            pid = pid.as_raw(),
            namespace = ?original,
            quarantined_threads = total,
            "Could not restore original network namespace, quarantining thread"
        );
        pin.quarantine();
    }

    drop(target);
    drop(original);

    match outcome {
        Ok(output) => Ok(output),
        Err(payload) => panic::resume_unwind(payload),
    }
}

fn restore<B: NamespaceBackend>(backend: &B, pin: &ThreadPin, original: &B::Handle) -> bool {
    for attempt in 1..=RESTORE_ATTEMPTS {
        match backend.enter(pin, original) {
            Ok(()) => {
                if attempt > 1 {
                    warn!(attempt, "Restored original network namespace on retry");
                }
                return true;
            }
            Err(e) => {
                warn!(attempt, error = %e, "Failed to restore original network namespace");
            }
        }
    }
    false
}

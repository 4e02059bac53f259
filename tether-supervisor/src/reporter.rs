//! Periodic status reconciliation against a [`StatusSink`]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tether_core::{Result, ServiceStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ReporterConfig;
use crate::reconcile::{ApplicationSnapshot, diff_service_statuses, plan_application_report};
use crate::sink::StatusSink;

/// Reconciles observed service status with the desired release of one application
///
/// Both loops start on the first [`Reporter::set_desired_application`] call and
/// run until [`Reporter::stop`]. Report failures are logged and retried on the
/// next tick; callers never see them.
///
/// # Example
/// ```
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use tether_supervisor::{RecordingSink, Reporter, ReporterConfig, ServiceState, ServiceStatus};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sink = RecordingSink::new();
/// let reporter = Reporter::new("app", Arc::new(sink.clone()), ReporterConfig::default()).unwrap();
///
/// let services = HashMap::from([("web".to_string(), ())]);
/// reporter.set_desired_application("r1", &services);
/// reporter.set_service_status("web", ServiceStatus::new("r1", ServiceState::Running));
///
/// reporter.stop().await;
/// # }
/// ```
pub struct Reporter {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

struct Shared {
    application_id: String,
    sink: Arc<dyn StatusSink>,
    config: ReporterConfig,
    state: RwLock<ObservedState>,
}

#[derive(Debug, Default)]
struct ObservedState {
    desired_release: String,
    desired_services: BTreeSet<String>,
    statuses: BTreeMap<String, ServiceStatus>,
}

enum Lifecycle {
    NotStarted,
    Running {
        shutdown: watch::Sender<bool>,
        loops: Vec<JoinHandle<()>>,
    },
    Stopped,
}

impl Reporter {
    /// Create a reporter for `application_id`
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn new(
        application_id: impl Into<String>,
        sink: Arc<dyn StatusSink>,
        config: ReporterConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                application_id: application_id.into(),
                sink,
                config,
                state: RwLock::new(ObservedState::default()),
            }),
            lifecycle: Mutex::new(Lifecycle::NotStarted),
        })
    }

    /// Whether the reconciliation loops are running
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Running { .. })
    }

    /// Record the desired release and the services expected to run it.
    ///
    /// Only the keys of `services` are used. The first call starts both
    /// reconciliation loops on the current Tokio runtime; later calls only
    /// update state.
    pub fn set_desired_application<V, S>(
        &self,
        release: impl Into<String>,
        services: &HashMap<String, V, S>,
    ) {
        let release = release.into();
        let service_names: BTreeSet<String> = services.keys().cloned().collect();

        debug!(
            application_id = %self.shared.application_id,
            release = %release,
            services = service_names.len(),
            "Desired application updated"
        );

        {
            let mut state = self.shared.write();
            state.desired_release = release;
            state.desired_services = service_names;
        }

        self.start();
    }

    /// Record the latest observed status of a service (last write wins)
    pub fn set_service_status(&self, service_name: impl Into<String>, status: ServiceStatus) {
        self.shared.write().statuses.insert(service_name.into(), status);
    }

    /// Cancel both loops and wait until they have exited.
    ///
    /// A reporter that was never started just moves to the stopped state.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle(), Lifecycle::Stopped);

        let Lifecycle::Running { shutdown, loops } = previous else {
            debug!(application_id = %self.shared.application_id, "Reporter stopped before start");
            return;
        };

        let _ = shutdown.send(true);

        for handle in loops {
            if let Err(e) = handle.await {
                error!(error = %e, "Reconciliation loop ended abnormally");
            }
        }

        info!(application_id = %self.shared.application_id, "Reporter stopped");
    }

    fn lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) {
        let mut lifecycle = self.lifecycle();
        if !matches!(*lifecycle, Lifecycle::NotStarted) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                application_id = %self.shared.application_id,
                "No Tokio runtime, reconciliation loops not started"
            );
            return;
        };

        let (shutdown, receiver) = watch::channel(false);
        let loops = vec![
            runtime.spawn(application_status_loop(Arc::clone(&self.shared), receiver.clone())),
            runtime.spawn(service_status_loop(Arc::clone(&self.shared), receiver)),
        ];

        info!(
            application_id = %self.shared.application_id,
            interval_ms = self.shared.config.interval.as_millis(),
            "Reconciliation loops started"
        );

        *lifecycle = Lifecycle::Running { shutdown, loops };
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("application_id", &self.shared.application_id)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, ObservedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObservedState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn application_snapshot(&self) -> ApplicationSnapshot {
        let state = self.read();
        let statuses = state
            .desired_services
            .iter()
            .filter_map(|name| state.statuses.get(name).map(|s| (name.clone(), s.clone())))
            .collect();

        ApplicationSnapshot {
            release: state.desired_release.clone(),
            service_names: state.desired_services.clone(),
            statuses,
        }
    }

    fn service_statuses(&self) -> BTreeMap<String, ServiceStatus> {
        self.read().statuses.clone()
    }

    fn ticker(&self) -> time::Interval {
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

/// Waits for the next tick; `false` once shutdown has been requested.
async fn next_tick(ticker: &mut time::Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.changed() => false,
        _ = ticker.tick() => !*shutdown.borrow(),
    }
}

async fn application_status_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = shared.ticker();
    let mut reported_release: Option<String> = None;

    while next_tick(&mut ticker, &mut shutdown).await {
        let snapshot = shared.application_snapshot();
        let Some(release) = plan_application_report(&snapshot, reported_release.as_deref())
        else {
            continue;
        };

        match shared
            .sink
            .report_application_status(&shared.application_id, &release)
            .await
        {
            Ok(()) => {
                info!(
                    application_id = %shared.application_id,
                    release = %release,
                    "Reported application status"
                );
                reported_release = Some(release);
            }
            Err(e) => {
                error!(
                    application_id = %shared.application_id,
                    release = %release,
                    error = %e,
                    "Failed to report application status"
                );
            }
        }
    }

    debug!(application_id = %shared.application_id, "Application status loop exited");
}

async fn service_status_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = shared.ticker();
    let mut reported: BTreeMap<String, ServiceStatus> = BTreeMap::new();

    while next_tick(&mut ticker, &mut shutdown).await {
        let current = shared.service_statuses();
        let diff = diff_service_statuses(&current, &reported);
        if diff.is_empty() {
            continue;
        }

        if report_services(&shared, &diff).await {
            reported = current;
        }
    }

    debug!(application_id = %shared.application_id, "Service status loop exited");
}

/// Reports every entry, stopping at the first failure.
async fn report_services(shared: &Shared, diff: &[(String, ServiceStatus)]) -> bool {
    for (service, status) in diff {
        let result = shared
            .sink
            .report_service_status(
                &shared.application_id,
                service,
                &status.current_release_id,
                status.current_state,
                &status.error_message,
            )
            .await;

        if let Err(e) = result {
            error!(
                application_id = %shared.application_id,
                service = %service,
                error = %e,
                "Failed to report service status"
            );
            return false;
        }

        debug!(
            application_id = %shared.application_id,
            service = %service,
            release = %status.current_release_id,
            state = %status.current_state,
            "Reported service status"
        );
    }

    true
}

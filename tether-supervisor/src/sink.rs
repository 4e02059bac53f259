//! Upstream status reporting

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tether_core::{Error, Result, ServiceState, ServiceStatus};

/// Destination for convergence reports (typically the control plane)
///
/// Failures are retried by the reporter on its next tick, so implementations
/// should not retry internally.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Report that every service of the application runs `release`
    async fn report_application_status(&self, application_id: &str, release: &str) -> Result<()>;

    /// Report the observed status of one service
    async fn report_service_status(
        &self,
        application_id: &str,
        service_name: &str,
        release: &str,
        state: ServiceState,
        error_message: &str,
    ) -> Result<()>;
}

/// One report call as seen by a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// Application status report
    Application {
        /// Application ID
        application_id: String,
        /// Release reported as current
        release: String,
    },
    /// Service status report
    Service {
        /// Application ID
        application_id: String,
        /// Service name
        service: String,
        /// Reported status
        status: ServiceStatus,
    },
}

/// In-memory sink for testing, with failure injection
///
/// # Example
/// ```
/// use tether_supervisor::{RecordingSink, StatusSink};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sink = RecordingSink::new();
/// sink.fail_next_application_reports(1);
///
/// assert!(sink.report_application_status("app", "r1").await.is_err());
/// assert!(sink.report_application_status("app", "r1").await.is_ok());
/// assert_eq!(sink.application_releases(), vec!["r1".to_string()]);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
}

#[derive(Debug, Default)]
struct SinkState {
    attempts: Vec<Report>,
    delivered: Vec<Report>,
    application_failures: usize,
    failing_services: HashSet<String>,
}

impl RecordingSink {
    /// Create a new sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` application reports
    pub fn fail_next_application_reports(&self, count: usize) {
        self.lock().application_failures = count;
    }

    /// Fail every report for `service` until [`RecordingSink::recover_service`]
    pub fn fail_service(&self, service: impl Into<String>) {
        self.lock().failing_services.insert(service.into());
    }

    /// Stop failing reports for `service`
    pub fn recover_service(&self, service: &str) {
        self.lock().failing_services.remove(service);
    }

    /// Every report call, including failed ones
    #[must_use]
    pub fn attempts(&self) -> Vec<Report> {
        self.lock().attempts.clone()
    }

    /// Successful report calls
    #[must_use]
    pub fn delivered(&self) -> Vec<Report> {
        self.lock().delivered.clone()
    }

    /// Releases successfully reported at application level
    #[must_use]
    pub fn application_releases(&self) -> Vec<String> {
        self.lock()
            .delivered
            .iter()
            .filter_map(|report| match report {
                Report::Application { release, .. } => Some(release.clone()),
                Report::Service { .. } => None,
            })
            .collect()
    }

    /// Successfully reported service statuses, in call order
    #[must_use]
    pub fn service_reports(&self) -> Vec<(String, ServiceStatus)> {
        self.lock()
            .delivered
            .iter()
            .filter_map(|report| match report {
                Report::Service {
                    service, status, ..
                } => Some((service.clone(), status.clone())),
                Report::Application { .. } => None,
            })
            .collect()
    }

    /// Forget recorded calls (failure settings are kept)
    pub fn clear(&self) {
        let mut state = self.lock();
        state.attempts.clear();
        state.delivered.clear();
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn report_application_status(&self, application_id: &str, release: &str) -> Result<()> {
        let report = Report::Application {
            application_id: application_id.to_string(),
            release: release.to_string(),
        };

        let mut state = self.lock();
        state.attempts.push(report.clone());

        if state.application_failures > 0 {
            state.application_failures -= 1;
            return Err(Error::report("injected application report failure"));
        }

        state.delivered.push(report);
        Ok(())
    }

    async fn report_service_status(
        &self,
        application_id: &str,
        service_name: &str,
        release: &str,
        state: ServiceState,
        error_message: &str,
    ) -> Result<()> {
        let report = Report::Service {
            application_id: application_id.to_string(),
            service: service_name.to_string(),
            status: ServiceStatus {
                current_release_id: release.to_string(),
                current_state: state,
                error_message: error_message.to_string(),
            },
        };

        let mut sink = self.lock();
        sink.attempts.push(report.clone());

        if sink.failing_services.contains(service_name) {
            return Err(Error::report(format!(
                "injected failure for service {service_name}"
            )));
        }

        sink.delivered.push(report);
        Ok(())
    }
}

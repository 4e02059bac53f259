use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tether_supervisor::*;

const INTERVAL: Duration = Duration::from_secs(3);

fn reporter(sink: &RecordingSink) -> Reporter {
    Reporter::new(
        "app-1",
        Arc::new(sink.clone()),
        ReporterConfig::new().with_interval(INTERVAL),
    )
    .unwrap()
}

fn services(names: &[&str]) -> HashMap<String, ()> {
    names.iter().map(|name| ((*name).to_string(), ())).collect()
}

fn running(release: &str) -> ServiceStatus {
    ServiceStatus::new(release, ServiceState::Running)
}

/// Let freshly spawned loops run their immediate first tick
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Advance past the next tick of both loops
async fn tick() {
    tokio::time::sleep(INTERVAL).await;
}

#[tokio::test(start_paused = true)]
async fn test_loops_start_lazily() {
    let sink = RecordingSink::new();
    let reporter = reporter(&sink);

    reporter.set_service_status("a", running("r1"));
    assert!(!reporter.is_running());
    settle().await;
    tick().await;
    assert!(sink.attempts().is_empty());

    reporter.set_desired_application("r1", &services(&["a"]));
    assert!(reporter.is_running());
    settle().await;

    assert_eq!(sink.application_releases(), vec!["r1"]);
    assert_eq!(sink.service_reports(), vec![("a".to_string(), running("r1"))]);

    reporter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_application_report_waits_for_all_services() {
    let sink = RecordingSink::new();
    let reporter = reporter(&sink);

    reporter.set_desired_application("r2", &services(&["a", "b"]));
    reporter.set_service_status("a", running("r2"));
    reporter.set_service_status("b", running("r1"));
    settle().await;
    tick().await;
    assert!(sink.application_releases().is_empty());

    reporter.set_service_status("b", running("r2"));
    tick().await;
    assert_eq!(sink.application_releases(), vec!["r2"]);

    reporter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_repeated_desired_state_reports_once() {
    let sink = RecordingSink::new();
    let reporter = reporter(&sink);
    let desired = services(&["a"]);

    reporter.set_service_status("a", running("r1"));
    for _ in 0..3 {
        reporter.set_desired_application("r1", &desired);
        settle().await;
        tick().await;
    }

    assert_eq!(sink.application_releases(), vec!["r1"]);

    // A new release is reported once it converges
    reporter.set_desired_application("r2", &desired);
    reporter.set_service_status("a", running("r2"));
    tick().await;
    tick().await;
    assert_eq!(sink.application_releases(), vec!["r1", "r2"]);

    reporter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_application_report_retried_after_failure() {
    let sink = RecordingSink::new();
    sink.fail_next_application_reports(2);
    let reporter = reporter(&sink);

    reporter.set_service_status("a", running("r1"));
    reporter.set_desired_application("r1", &services(&["a"]));
    settle().await;
    assert!(sink.application_releases().is_empty());

    tick().await;
    assert!(sink.application_releases().is_empty());

    tick().await;
    assert_eq!(sink.application_releases(), vec!["r1"]);

    let attempts = sink
        .attempts()
        .iter()
        .filter(|report| matches!(report, Report::Application { .. }))
        .count();
    assert_eq!(attempts, 3);

    reporter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_only_changed_services_are_reported() {
    let sink = RecordingSink::new();
    let reporter = reporter(&sink);

    reporter.set_desired_application("r1", &services(&["a", "b"]));
    reporter.set_service_status("a", running("r1"));
    reporter.set_service_status("b", running("r1"));
    settle().await;
    assert_eq!(sink.service_reports().len(), 2);

    sink.clear();
    reporter.set_service_status("a", running("r2"));
    tick().await;
    assert_eq!(sink.service_reports(), vec![("a".to_string(), running("r2"))]);

    // Nothing changed since: nothing reported
    sink.clear();
    tick().await;
    assert!(sink.attempts().is_empty());

    reporter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_retries_whole_diff() {
    let sink = RecordingSink::new();
    sink.fail_service("b");
    let reporter = reporter(&sink);

    reporter.set_service_status("a", running("r1"));
    reporter.set_service_status("b", running("r1"));
    reporter.set_desired_application("r1", &services(&["a", "b"]));
    settle().await;

    // "a" went through, "b" failed
    assert_eq!(sink.service_reports(), vec![("a".to_string(), running("r1"))]);

    sink.recover_service("b");
    sink.clear();
    tick().await;

    // Reported snapshot was left untouched, so both are sent again
    assert_eq!(
        sink.service_reports(),
        vec![
            ("a".to_string(), running("r1")),
            ("b".to_string(), running("r1")),
        ]
    );

    sink.clear();
    tick().await;
    assert!(sink.service_reports().is_empty());

    reporter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_aborts_remaining_reports_in_tick() {
    let sink = RecordingSink::new();
    sink.fail_service("a");
    let reporter = reporter(&sink);

    reporter.set_service_status("a", running("r1"));
    reporter.set_service_status("b", running("r1"));
    reporter.set_desired_application("r1", &services(&["a", "b"]));
    settle().await;

    // "a" sorts first and fails; "b" is not attempted this tick
    let attempted: Vec<_> = sink
        .attempts()
        .into_iter()
        .filter_map(|report| match report {
            Report::Service { service, .. } => Some(service),
            Report::Application { .. } => None,
        })
        .collect();
    assert_eq!(attempted, vec!["a"]);

    reporter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_last_write_wins_within_one_tick() {
    let sink = RecordingSink::new();
    let reporter = reporter(&sink);

    reporter.set_desired_application("r1", &services(&["a"]));
    settle().await;

    reporter.set_service_status("a", ServiceStatus::new("r1", ServiceState::PullingImage));
    reporter.set_service_status("a", ServiceStatus::new("r1", ServiceState::StartingContainer));
    reporter.set_service_status("a", running("r1").with_error("healthcheck flapping"));
    tick().await;

    assert_eq!(
        sink.service_reports(),
        vec![("a".to_string(), running("r1").with_error("healthcheck flapping"))]
    );

    reporter.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_reporting() {
    let sink = RecordingSink::new();
    let reporter = reporter(&sink);

    reporter.set_desired_application("r1", &services(&["a"]));
    settle().await;

    reporter.stop().await;
    assert!(!reporter.is_running());

    // Writes after stop are accepted but never reported
    reporter.set_service_status("a", running("r1"));
    reporter.set_desired_application("r1", &services(&["a"]));
    assert!(!reporter.is_running());
    tick().await;
    tick().await;
    assert!(sink.attempts().is_empty());
}

/// Sink whose every report takes `delay` to complete
struct SlowSink {
    delay: Duration,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl SlowSink {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    async fn report(&self) -> tether_core::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl StatusSink for SlowSink {
    async fn report_application_status(
        &self,
        _application_id: &str,
        _release: &str,
    ) -> tether_core::Result<()> {
        self.report().await
    }

    async fn report_service_status(
        &self,
        _application_id: &str,
        _service_name: &str,
        _release: &str,
        _state: ServiceState,
        _error_message: &str,
    ) -> tether_core::Result<()> {
        self.report().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_sink_blocks_neither_writers_nor_stop() {
    let sink = Arc::new(SlowSink::new(Duration::from_secs(10)));
    let reporter = Reporter::new(
        "app-1",
        Arc::clone(&sink) as Arc<dyn StatusSink>,
        ReporterConfig::new().with_interval(INTERVAL),
    )
    .unwrap();

    reporter.set_service_status("a", running("r1"));
    reporter.set_desired_application("r1", &services(&["a"]));
    settle().await;

    // Both loops are inside a report call
    assert_eq!(sink.started.load(Ordering::SeqCst), 2);
    assert_eq!(sink.finished.load(Ordering::SeqCst), 0);

    let begin = tokio::time::Instant::now();
    tokio::time::timeout(Duration::from_millis(1), async {
        reporter.set_service_status("a", running("r2"));
    })
    .await
    .expect("status writes must not wait for an in-flight report");

    // Stop lets pending reports finish instead of abandoning them
    reporter.stop().await;
    assert!(begin.elapsed() >= Duration::from_secs(9));
    assert_eq!(sink.finished.load(Ordering::SeqCst), 2);
    assert_eq!(sink.started.load(Ordering::SeqCst), 2);
    assert!(!reporter.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start_returns() {
    let sink = RecordingSink::new();
    let reporter = reporter(&sink);

    tokio::time::timeout(Duration::from_secs(1), reporter.stop())
        .await
        .expect("stop must not block when loops never started");

    reporter.set_desired_application("r1", &services(&["a"]));
    assert!(!reporter.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_status_writers() {
    let sink = RecordingSink::new();
    let reporter = Arc::new(reporter(&sink));
    let names: Vec<String> = (0..16).map(|i| format!("svc-{i}")).collect();

    let desired: HashMap<String, ()> = names.iter().map(|n| (n.clone(), ())).collect();
    reporter.set_desired_application("r1", &desired);

    let writers: Vec<_> = names
        .iter()
        .cloned()
        .map(|name| {
            let reporter = Arc::clone(&reporter);
            tokio::spawn(async move {
                reporter.set_service_status(name.clone(), running("r0"));
                tokio::task::yield_now().await;
                reporter.set_service_status(name, running("r1"));
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    tick().await;
    tick().await;

    assert_eq!(sink.application_releases(), vec!["r1"]);
    let last: HashMap<String, ServiceStatus> = sink.service_reports().into_iter().collect();
    assert_eq!(last.len(), 16);
    assert!(last.values().all(|status| *status == running("r1")));

    reporter.stop().await;
}

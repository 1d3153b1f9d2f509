//! Session orchestration across selected servers
//!
//! A run moves through `Selecting`, then for every selected server
//! `Probing → Benchmarking(download) → Benchmarking(upload) → Validating →
//! Reporting`, and finally `Aggregating` when more than one session
//! completed. Failures while probing or benchmarking end only the session
//! they happen in; selection and aggregation failures end the run.

use super::{
    benchmark::{ThroughputBenchmarker, WindowConfig},
    pool::{ConnectionPool, PoolConfig},
    prober::LatencyProber,
    selector::{SelectionConfig, ServerSelector},
    validator::ResultValidator,
};
use crate::{
    error::{AppError, Result},
    logging::Logger,
    models::{AverageResult, CandidateList, Config, RunReport, Server, SessionRecord, SessionStage, UserInfo},
    stats,
    transport::SpeedTransport,
    types::{Direction, ExitPolicy, MeasurementMode},
};
use std::{fmt, sync::Arc};

/// Where the orchestrator currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Selecting,
    Probing(String),
    Benchmarking(String, Direction),
    Validating(String),
    Reporting(String),
    Aggregating,
    Done,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Selecting => f.write_str("selecting"),
            Self::Probing(id) => write!(f, "probing({})", id),
            Self::Benchmarking(id, direction) => write!(f, "benchmarking({}, {})", id, direction.label()),
            Self::Validating(id) => write!(f, "validating({})", id),
            Self::Reporting(id) => write!(f, "reporting({})", id),
            Self::Aggregating => f.write_str("aggregating"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// Receives progress events while a run is going; every method defaults to nothing
pub trait SessionObserver: Send + Sync {
    fn servers_selected(&self, _servers: &[Server]) {}
    fn session_started(&self, _server: &Server) {}
    fn latency_measured(&self, _server: &Server) {}
    fn phase_started(&self, _server: &Server, _direction: Direction) {}
    fn phase_finished(&self, _server: &Server, _direction: Direction, _mbps: Option<f64>) {}
    fn session_finished(&self, _record: &SessionRecord) {}
}

/// Observer that ignores every event
pub struct SilentObserver;

impl SessionObserver for SilentObserver {}

/// Drives selection, per-server sessions and aggregation
pub struct SessionOrchestrator {
    config: Config,
    mode: MeasurementMode,
    transport: Arc<dyn SpeedTransport>,
    selector: ServerSelector,
    prober: LatencyProber,
    benchmarker: ThroughputBenchmarker,
    validator: ResultValidator,
    observer: Arc<dyn SessionObserver>,
    logger: Logger,
    pool_logger: Logger,
    state: SessionState,
}

impl SessionOrchestrator {
    /// Build every component from the configuration; component loggers derive from `logger`
    pub fn new(config: &Config, transport: Arc<dyn SpeedTransport>, logger: Logger) -> Self {
        let mode = config.mode();
        let selector = ServerSelector::new(
            LatencyProber::new(transport.clone(), config.timeout(), logger.named("PROBE")),
            SelectionConfig::from(config),
            logger.named("SELECT"),
        );

        Self {
            config: config.clone(),
            mode,
            prober: LatencyProber::new(transport.clone(), config.timeout(), logger.named("PROBE")),
            benchmarker: ThroughputBenchmarker::new(WindowConfig::from_config(config, mode), logger.named("BENCH")),
            validator: ResultValidator::from(config),
            observer: Arc::new(SilentObserver),
            pool_logger: logger.named("POOL"),
            logger: logger.named("SESSION"),
            transport,
            selector,
            state: SessionState::Idle,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn mode(&self) -> MeasurementMode {
        self.mode
    }

    /// Select servers, run a session against each and aggregate the completed ones
    pub async fn run(&mut self, candidates: &CandidateList, user_info: Option<UserInfo>) -> Result<RunReport> {
        let servers = self.select(candidates).await?;

        let mut report = RunReport::new(user_info);
        for server in servers {
            let record = self.run_session(server).await;
            report.servers.push(record);
        }

        if report.completed_count() > 1 {
            self.transition(SessionState::Aggregating).await;
            report.average = aggregate(&report.servers)?;
        }

        self.transition(SessionState::Done).await;
        self.logger
            .info("Run finished")
            .field("completed", report.completed_count())
            .field("failed", report.failed_count())
            .log()
            .await;

        Ok(report)
    }

    pub async fn select(&mut self, candidates: &CandidateList) -> Result<Vec<Server>> {
        self.transition(SessionState::Selecting).await;
        let servers = self.selector.select(candidates, self.config.max_servers).await?;
        self.observer.servers_selected(&servers);
        Ok(servers)
    }

    /// One isolated session; failures end up in the returned record
    pub async fn run_session(&mut self, mut server: Server) -> SessionRecord {
        server.clear_measurements();
        self.observer.session_started(&server);

        self.transition(SessionState::Probing(server.id.clone())).await;
        if let Err(error) = self.prober.probe_into(&mut server, self.config.ping_count).await {
            return self.fail(server, SessionStage::Probing, error).await;
        }
        self.observer.latency_measured(&server);

        let pool = ConnectionPool::open(
            self.transport.clone(),
            &server,
            PoolConfig::from_config(&self.config, self.mode),
            self.pool_logger.clone(),
        );

        for (direction, stage) in [
            (Direction::Download, SessionStage::Download),
            (Direction::Upload, SessionStage::Upload),
        ] {
            self.transition(SessionState::Benchmarking(server.id.clone(), direction)).await;
            self.observer.phase_started(&server, direction);

            let result = self.benchmarker.measure_into(&pool, &mut server, direction).await;
            self.observer
                .phase_finished(&server, direction, result.as_ref().ok().map(|m| m.mbps));

            if let Err(error) = result {
                return self.fail(server, stage, error).await;
            }
        }

        self.transition(SessionState::Validating(server.id.clone())).await;
        let warnings = self.validator.validate(&server);
        for warning in &warnings {
            self.logger
                .warn("Result looks implausible")
                .server(&server)
                .field("warning", warning)
                .log()
                .await;
        }

        self.transition(SessionState::Reporting(server.id.clone())).await;
        let record = SessionRecord::completed(server, self.mode, warnings);
        self.observer.session_finished(&record);
        record
    }

    async fn fail(&mut self, server: Server, stage: SessionStage, error: AppError) -> SessionRecord {
        let builder = if error.is_session_scoped() {
            self.logger.warn("Session aborted")
        } else {
            self.logger.error("Session aborted by unexpected error")
        };
        builder
            .server(&server)
            .error_info(&error)
            .field("stage", stage)
            .field("error", error.to_string())
            .log()
            .await;

        self.transition(SessionState::Reporting(server.id.clone())).await;
        let record = SessionRecord::failed(server, self.mode, stage, error.to_string());
        self.observer.session_finished(&record);
        record
    }

    async fn transition(&mut self, next: SessionState) {
        self.logger
            .debug("State transition")
            .field("from", self.state.to_string())
            .field("to", next.to_string())
            .log()
            .await;
        self.state = next;
    }
}

/// Arithmetic mean of download and upload over completed sessions
pub fn aggregate(records: &[SessionRecord]) -> Result<Option<AverageResult>> {
    let mut downloads = Vec::new();
    let mut uploads = Vec::new();

    for record in records.iter().filter(|r| r.is_completed()) {
        match (record.server.download_mbps, record.server.upload_mbps) {
            (Some(down), Some(up)) => {
                downloads.push(down);
                uploads.push(up);
            }
            _ => {
                return Err(AppError::internal(format!(
                    "completed session {} has no throughput",
                    record.server.id
                )))
            }
        }
    }

    Ok(match (stats::mean(&downloads), stats::mean(&uploads)) {
        (Some(download_mbps), Some(upload_mbps)) => Some(AverageResult {
            download_mbps,
            upload_mbps,
            server_count: downloads.len(),
        }),
        _ => None,
    })
}

/// Map a finished run to success or a `SessionsFailed` error under `policy`
pub fn evaluate_exit_policy(policy: ExitPolicy, report: &RunReport) -> Result<()> {
    let failed = report.failed_count();
    let passed = match policy {
        ExitPolicy::AnySuccess => report.completed_count() > 0,
        ExitPolicy::AllSuccess => failed == 0,
    };

    if passed {
        Ok(())
    } else {
        Err(AppError::sessions_failed(failed, report.servers.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValidationWarning;
    use crate::transport::mock::{ScriptedTransport, ServerScript};
    use crate::types::SessionStatus;
    use proptest::prelude::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn server(id: &str, distance: f64) -> Server {
        Server::new(id, format!("Server {}", id), format!("http://{}.test/upload.php", id))
            .with_location("JP", "Sponsor", distance)
    }

    fn test_config(max_servers: usize) -> Config {
        Config {
            max_servers,
            ping_count: 3,
            selection_ping_count: 1,
            connections: 2,
            warmup_ms: 500,
            measure_seconds: 2,
            stall_timeout_ms: 1000,
            ..Config::default()
        }
    }

    fn orchestrator(config: &Config, transport: ScriptedTransport) -> SessionOrchestrator {
        SessionOrchestrator::new(config, Arc::new(transport), Logger::silent("SESSION"))
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        fn push(&self, event: String) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }

    impl SessionObserver for RecordingObserver {
        fn servers_selected(&self, servers: &[Server]) {
            self.push(format!("selected:{}", servers.len()));
        }
        fn session_started(&self, server: &Server) {
            self.push(format!("start:{}", server.id));
        }
        fn phase_started(&self, _server: &Server, direction: Direction) {
            self.push(format!("phase:{}", direction.label()));
        }
        fn session_finished(&self, record: &SessionRecord) {
            self.push(format!("end:{}:{:?}", record.server.id, record.status));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_of_three_with_two_reachable() {
        let candidates = CandidateList::from_discovered(vec![server("a", 5.0), server("b", 10.0), server("c", 1.0)]);
        let transport = ScriptedTransport::new()
            .with_server("a", ServerScript::reachable(30))
            .with_server("b", ServerScript::reachable(10))
            .with_server("c", ServerScript::unreachable());

        let mut orchestrator = orchestrator(&test_config(1), transport);
        let selected = orchestrator.select(&candidates).await.unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "b");
        assert_eq!(selected[0].latency, Some(Duration::from_millis(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_aggregates_completed_sessions() {
        let candidates = CandidateList::from_discovered(vec![server("a", 5.0), server("b", 10.0), server("c", 1.0)]);
        let transport = ScriptedTransport::new()
            .with_server("a", ServerScript::reachable(30))
            .with_server("b", ServerScript::reachable(10))
            .with_server("c", ServerScript::unreachable());
        let observer = Arc::new(RecordingObserver::default());

        let mut orchestrator = orchestrator(&test_config(3), transport).with_observer(observer.clone());
        let report = orchestrator.run(&candidates, None).await.unwrap();

        let ids: Vec<_> = report.servers.iter().map(|r| r.server.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(report.completed_count(), 2);
        assert!(report.servers.iter().all(|r| r.valid));

        let average = report.average.unwrap();
        assert_eq!(average.server_count, 2);
        let expected = (report.servers[0].server.download_mbps.unwrap()
            + report.servers[1].server.download_mbps.unwrap())
            / 2.0;
        assert!((average.download_mbps - expected).abs() < 1e-9);
        assert_eq!(orchestrator.state(), &SessionState::Done);

        let events = observer.events.lock().unwrap().clone();
        assert_eq!(events[0], "selected:2");
        assert_eq!(&events[1..4], ["start:b", "phase:Download", "phase:Upload"]);
        assert_eq!(events[4], "end:b:Completed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_server_does_not_stop_the_run() {
        let candidates = CandidateList::from_discovered(vec![server("stuck", 1.0), server("fine", 2.0)]);
        let mut stuck = ServerScript::reachable(5);
        stuck.download_stall_after = Some(2);
        let transport = ScriptedTransport::new()
            .with_server("stuck", stuck)
            .with_server("fine", ServerScript::reachable(20));

        let mut orchestrator = orchestrator(&test_config(2), transport);
        let report = orchestrator.run(&candidates, None).await.unwrap();

        assert_eq!(report.servers.len(), 2);
        let stuck = &report.servers[0];
        assert_eq!(stuck.server.id, "stuck");
        assert_eq!(stuck.status, SessionStatus::Failed);
        assert_eq!(stuck.failed_stage, Some(SessionStage::Download));
        assert!(stuck.error.as_deref().unwrap_or_default().contains("stalled"));

        let fine = &report.servers[1];
        assert!(fine.is_completed());
        assert!(fine.server.download_mbps.unwrap() > 0.0);

        // A single completed session is not averaged
        assert!(report.average.is_none());
        assert!(evaluate_exit_policy(ExitPolicy::AnySuccess, &report).is_ok());
        assert!(matches!(
            evaluate_exit_policy(ExitPolicy::AllSuccess, &report),
            Err(AppError::SessionsFailed { failed: 1, total: 2 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_upload_is_reported_with_warning() {
        let candidates = CandidateList::from_discovered(vec![server("a", 1.0)]);
        let mut script = ServerScript::reachable(5);
        script.upload_zero = true;
        let transport = ScriptedTransport::new().with_server("a", script);

        let mut config = test_config(1);
        config.stall_timeout_ms = 60_000;
        let report = orchestrator(&config, transport).run(&candidates, None).await.unwrap();

        let record = &report.servers[0];
        assert!(record.is_completed());
        assert!(!record.valid);
        assert_eq!(record.server.upload_mbps, Some(0.0));
        assert_eq!(
            record.warnings,
            vec![ValidationWarning::ZeroThroughput { direction: "upload".into() }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_saving_mode_uses_fewer_connections() {
        let candidates = CandidateList::from_discovered(vec![server("a", 1.0)]);
        let transport = Arc::new(ScriptedTransport::new().with_server("a", ServerScript::reachable(5)));

        let mut config = test_config(1);
        config.connections = 4;
        config.saving_mode = true;
        let mut orchestrator = SessionOrchestrator::new(&config, transport.clone(), Logger::silent("SESSION"));
        let report = orchestrator.run(&candidates, None).await.unwrap();

        assert_eq!(orchestrator.mode(), MeasurementMode::Saving);
        assert_eq!(report.servers[0].mode, MeasurementMode::Saving);
        // One connection per phase
        assert_eq!(transport.connect_attempts("a"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_failure_is_fatal() {
        let candidates = CandidateList::from_discovered(vec![server("a", 1.0)]);
        let transport = ScriptedTransport::new().with_server("a", ServerScript::unreachable());

        let result = orchestrator(&test_config(1), transport).run(&candidates, None).await;
        assert!(matches!(result, Err(AppError::Selection(_))));
    }

    #[test]
    fn test_exit_policy_without_successes() {
        let mut report = RunReport::new(None);
        report.servers.push(SessionRecord::failed(
            server("a", 1.0),
            MeasurementMode::Full,
            SessionStage::Probing,
            "down".into(),
        ));
        assert!(evaluate_exit_policy(ExitPolicy::AnySuccess, &report).is_err());
    }

    fn record(download: f64, upload: f64, completed: bool) -> SessionRecord {
        let mut s = server("x", 1.0);
        s.download_mbps = Some(download);
        s.upload_mbps = Some(upload);
        if completed {
            SessionRecord::completed(s, MeasurementMode::Full, Vec::new())
        } else {
            SessionRecord::failed(s, MeasurementMode::Full, SessionStage::Upload, "stall".into())
        }
    }

    #[test]
    fn test_aggregate_rejects_incomplete_completed_record() {
        let mut broken = record(1.0, 1.0, true);
        broken.server.upload_mbps = None;
        assert!(aggregate(&[broken]).is_err());
        assert_eq!(aggregate(&[]).unwrap(), None);
    }

    proptest! {
        #[test]
        fn prop_average_is_mean_of_completed_sessions(
            sessions in prop::collection::vec((0.0f64..1000.0, 0.0f64..1000.0, any::<bool>()), 0..10)
        ) {
            let records: Vec<_> = sessions.iter().map(|(d, u, c)| record(*d, *u, *c)).collect();
            let completed: Vec<_> = sessions.iter().filter(|s| s.2).collect();

            let average = aggregate(&records).unwrap();
            if completed.is_empty() {
                prop_assert!(average.is_none());
            } else {
                let average = average.unwrap();
                let n = completed.len() as f64;
                let down = completed.iter().map(|s| s.0).sum::<f64>() / n;
                let up = completed.iter().map(|s| s.1).sum::<f64>() / n;
                prop_assert_eq!(average.server_count, completed.len());
                prop_assert!((average.download_mbps - down).abs() <= 1e-9 * down.max(1.0));
                prop_assert!((average.upload_mbps - up).abs() <= 1e-9 * up.max(1.0));
            }
        }
    }
}

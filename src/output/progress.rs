//! Live console progress while sessions run

use super::formatter::ReportFormatter;
use crate::{
    engine::SessionObserver,
    models::{Server, SessionRecord},
    types::Direction,
};
use std::{
    io::Write,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{sync::oneshot, task::JoinHandle, time::Interval};

/// Shared sink for console output
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

pub fn stdout_writer() -> SharedWriter {
    Arc::new(Mutex::new(std::io::stdout()))
}

fn emit(out: &SharedWriter, text: &str) {
    if let Ok(mut out) = out.lock() {
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

/// Prints one dot per interval until finished or dropped
pub struct PhaseProgress {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl PhaseProgress {
    /// Start ticking on the current tokio runtime
    pub fn start(out: SharedWriter, every: Duration) -> Self {
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            print_dots(out, ticker, stopped).await;
        });
        Self {
            stop: Some(stop),
            handle,
        }
    }

    pub fn finish(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// A stop that is already due wins over a due tick
async fn print_dots(out: SharedWriter, mut ticker: Interval, mut stopped: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stopped => break,
            _ = ticker.tick() => emit(&out, "."),
        }
    }
}

impl Drop for PhaseProgress {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Writes the human-readable transcript of a run as it happens
pub struct ConsoleObserver {
    formatter: Box<dyn ReportFormatter>,
    out: SharedWriter,
    dot_interval: Duration,
    progress: Mutex<Option<PhaseProgress>>,
}

impl ConsoleObserver {
    pub fn new(formatter: Box<dyn ReportFormatter>, out: SharedWriter) -> Self {
        Self {
            formatter,
            out,
            dot_interval: Duration::from_secs(1),
            progress: Mutex::new(None),
        }
    }

    pub fn with_dot_interval(mut self, every: Duration) -> Self {
        self.dot_interval = every;
        self
    }

    fn line(&self, text: &str) {
        emit(&self.out, &format!("{}\n", text));
    }

    fn stop_progress(&self) {
        if let Ok(mut progress) = self.progress.lock() {
            if let Some(progress) = progress.take() {
                progress.finish();
            }
        }
    }
}

impl SessionObserver for ConsoleObserver {
    fn servers_selected(&self, servers: &[Server]) {
        emit(&self.out, &self.formatter.format_server_list(servers));
    }

    fn session_started(&self, server: &Server) {
        self.line(&self.formatter.format_target(server));
    }

    fn latency_measured(&self, server: &Server) {
        self.line(&self.formatter.format_latency(server));
    }

    fn phase_started(&self, _server: &Server, direction: Direction) {
        emit(&self.out, &self.formatter.format_phase_label(direction));
        let ticker = PhaseProgress::start(self.out.clone(), self.dot_interval);
        if let Ok(mut progress) = self.progress.lock() {
            if let Some(previous) = progress.replace(ticker) {
                previous.finish();
            }
        }
    }

    fn phase_finished(&self, _server: &Server, _direction: Direction, _mbps: Option<f64>) {
        self.stop_progress();
        emit(&self.out, "\n");
    }

    fn session_finished(&self, record: &SessionRecord) {
        self.stop_progress();
        emit(&self.out, &self.formatter.format_session_result(record));
    }
}

//! Sensor proxy: one configured sensor with its values, state and supervisor task.

use crate::sensors::latest::{LatestValues, ValueReader};
use crate::sensors::supervisor::{ConnectionSupervisor, RunOutcome, SupervisorConfig};
use crate::sensors::transport::Transport;
use crate::sensors::types::{
    Channel, ConnectionState, Metric, SensorAddress, SensorError, SensorEvent,
};
use crossbeam::channel::Sender;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct ActiveRun {
    token: CancellationToken,
    task: JoinHandle<RunOutcome>,
}

/// Owns one sensor's latest values and drives its connection in a background task.
///
/// The values outlive individual runs: after a stop or a terminal failure the last
/// known readings stay readable, and a later [`start`](Self::start) resumes writing
/// into the same store.
pub struct SensorProxy<T: Transport> {
    name: String,
    address: SensorAddress,
    metrics: Vec<Metric>,
    transport: Arc<T>,
    values: Arc<LatestValues>,
    state: Arc<watch::Sender<ConnectionState>>,
    events: Option<Sender<SensorEvent>>,
    config: SupervisorConfig,
    run: Option<ActiveRun>,
}

impl<T: Transport> SensorProxy<T> {
    pub fn new(
        name: impl Into<String>,
        address: SensorAddress,
        metrics: Vec<Metric>,
        transport: Arc<T>,
        config: SupervisorConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            name: name.into(),
            address,
            metrics,
            transport,
            values: Arc::new(LatestValues::new()),
            state: Arc::new(state),
            events: None,
            config,
            run: None,
        }
    }

    /// Report this sensor's events on `events`
    pub fn with_events(mut self, events: Sender<SensorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &SensorAddress {
        &self.address
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Read-only handle to this sensor's latest values
    pub fn reader(&self) -> ValueReader {
        ValueReader::new(self.values.clone())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every connection state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Whether a supervisor task is still running
    pub fn is_running(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| !run.task.is_finished())
    }

    /// Spawn a fresh supervisor run. Must be called within a tokio runtime.
    pub fn start(&mut self) -> Result<(), SensorError> {
        if self.is_running() {
            return Err(SensorError::AlreadyRunning(self.name.clone()));
        }

        let token = CancellationToken::new();
        let mut supervisor = ConnectionSupervisor::new(
            self.name.clone(),
            self.address.clone(),
            Channel::for_metrics(&self.metrics),
            self.transport.clone(),
            self.values.clone(),
            self.state.clone(),
            self.config.clone(),
        );
        if let Some(events) = &self.events {
            supervisor = supervisor.with_events(events.clone());
        }

        self.state.send_replace(ConnectionState::Idle);
        let task = tokio::spawn(supervisor.run(token.clone()));
        self.run = Some(ActiveRun { token, task });

        tracing::info!(sensor = %self.name, address = %self.address, "Sensor started");
        Ok(())
    }

    /// Ask the running supervisor to stop. Returns immediately.
    pub fn stop(&self) {
        if let Some(run) = &self.run {
            run.token.cancel();
        }
    }

    /// Detach the current run's task handle
    pub fn take_task(&mut self) -> Option<JoinHandle<RunOutcome>> {
        self.run.take().map(|run| run.task)
    }

    /// Wait for the current run to end and return how it ended.
    pub async fn join(&mut self) -> Option<RunOutcome> {
        let task = self.take_task()?;
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(sensor = %self.name, error = %e, "Supervisor task failed");
                None
            }
        }
    }
}

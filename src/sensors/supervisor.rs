//! Connection supervision for a single sensor.
//!
//! One run walks the lifecycle connect → subscribe → stream → close, retrying a failed
//! session up to a bounded number of attempts. Cancellation of the run's token is
//! observed before every connect, while waiting on the transport and during the retry
//! delay. The link is closed on every path out of a session.

use crate::sensors::decoder::{DecodeAnomaly, PayloadDecoder, DEFAULT_WHEEL_CIRCUMFERENCE_M};
use crate::sensors::latest::LatestValues;
use crate::sensors::transport::Transport;
use crate::sensors::types::{Channel, ConnectionState, SensorAddress, SensorError, SensorEvent};
use crossbeam::channel::Sender;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Default number of connection attempts per run
pub const DEFAULT_RETRY_BOUND: u32 = 3;

/// Default wait between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default idle wait before checking the link is still alive
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Retry and streaming parameters of a supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Maximum consecutive failed attempts before the run stops (at least 1)
    pub retry_bound: u32,
    /// Wait between a failure and the next attempt
    pub retry_delay: Duration,
    /// Idle wait on the notification stream before a liveness check
    pub poll_interval: Duration,
    /// Wheel circumference for speed and distance, in meters
    pub wheel_circumference_m: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_bound: DEFAULT_RETRY_BOUND,
            retry_delay: DEFAULT_RETRY_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            wheel_circumference_m: DEFAULT_WHEEL_CIRCUMFERENCE_M,
        }
    }
}

/// How a supervisor run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run's token was cancelled
    Cancelled,
    /// Every allowed attempt failed
    RetriesExhausted { attempts: u32, error: SensorError },
    /// A failure that another attempt cannot fix
    Failed { error: SensorError },
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }
}

/// How one connect-to-close session ended.
enum SessionEnd {
    Cancelled,
    Failed(SensorError),
}

/// Drives one sensor's transport lifecycle.
pub struct ConnectionSupervisor<T: Transport> {
    name: String,
    address: SensorAddress,
    channels: Vec<Channel>,
    transport: Arc<T>,
    values: Arc<LatestValues>,
    state: Arc<watch::Sender<ConnectionState>>,
    events: Option<Sender<SensorEvent>>,
    config: SupervisorConfig,
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn new(
        name: impl Into<String>,
        address: SensorAddress,
        channels: Vec<Channel>,
        transport: Arc<T>,
        values: Arc<LatestValues>,
        state: Arc<watch::Sender<ConnectionState>>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            channels,
            transport,
            values,
            state,
            events: None,
            config,
        }
    }

    /// Report state changes and terminal failures on `events`
    pub fn with_events(mut self, events: Sender<SensorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn send_event(&self, event: SensorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            tracing::debug!(sensor = %self.name, %state, "Connection state changed");
            self.send_event(SensorEvent::ConnectionChanged {
                sensor: self.name.clone(),
                state,
            });
        }
    }

    /// Run until cancelled, out of attempts or failed for good. Always ends `Stopped`.
    pub async fn run(self, token: CancellationToken) -> RunOutcome {
        let bound = self.config.retry_bound.max(1);
        let mut attempt: u32 = 1;

        let outcome = loop {
            if token.is_cancelled() {
                break RunOutcome::Cancelled;
            }

            self.set_state(ConnectionState::Connecting);
            tracing::info!(
                sensor = %self.name,
                address = %self.address,
                attempt,
                "Connecting to sensor"
            );

            // Every connect counts against the bound, including sessions that streamed.
            let error = match self.session(&token).await {
                SessionEnd::Cancelled => break RunOutcome::Cancelled,
                SessionEnd::Failed(error) => error,
            };

            if !error.is_retryable() {
                break RunOutcome::Failed { error };
            }
            if attempt >= bound {
                break RunOutcome::RetriesExhausted {
                    attempts: attempt,
                    error,
                };
            }

            attempt += 1;
            self.set_state(ConnectionState::Retrying);
            tracing::warn!(
                sensor = %self.name,
                attempt,
                max_attempts = bound,
                error = %error,
                "Sensor connection failed, retrying"
            );

            let cancelled = tokio::select! {
                biased;
                _ = token.cancelled() => true,
                _ = tokio::time::sleep(self.config.retry_delay) => false,
            };
            if cancelled {
                break RunOutcome::Cancelled;
            }
        };

        self.set_state(ConnectionState::Stopped);

        match &outcome {
            RunOutcome::Cancelled => {
                tracing::info!(sensor = %self.name, "Sensor stopped");
            }
            RunOutcome::RetriesExhausted { attempts, error } => {
                tracing::error!(
                    sensor = %self.name,
                    attempts,
                    error = %error,
                    "Giving up on sensor"
                );
                self.send_event(SensorEvent::Failed {
                    sensor: self.name.clone(),
                    attempts: *attempts,
                    error: error.to_string(),
                });
            }
            RunOutcome::Failed { error } => {
                tracing::error!(sensor = %self.name, error = %error, "Sensor failed");
                self.send_event(SensorEvent::Failed {
                    sensor: self.name.clone(),
                    attempts: attempt,
                    error: error.to_string(),
                });
            }
        }

        outcome
    }

    /// One connect-to-close cycle.
    async fn session(&self, token: &CancellationToken) -> SessionEnd {
        let connected = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.transport.connect(&self.address) => Some(result),
        };

        let mut link = match connected {
            None => return SessionEnd::Cancelled,
            Some(Ok(link)) => link,
            Some(Err(error)) => return SessionEnd::Failed(error),
        };

        let end = self.stream(&mut link, token).await;
        self.transport.close(link).await;
        tracing::debug!(sensor = %self.name, "Link closed");
        end
    }

    /// Subscribe every channel and apply notifications until the link drops or the
    /// token is cancelled.
    async fn stream(&self, link: &mut T::Link, token: &CancellationToken) -> SessionEnd {
        for &channel in &self.channels {
            let subscribed = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = self.transport.subscribe(link, channel) => Some(result),
            };

            match subscribed {
                None => return SessionEnd::Cancelled,
                Some(Err(error)) => return SessionEnd::Failed(error),
                Some(Ok(())) => {
                    tracing::debug!(sensor = %self.name, %channel, "Subscribed");
                }
            }
        }

        // Counter baselines never survive a reconnect.
        let mut decoder =
            PayloadDecoder::new(self.transport.layout(link), self.config.wheel_circumference_m);

        self.set_state(ConnectionState::Streaming);
        tracing::info!(sensor = %self.name, "Streaming sensor data");

        let disconnected =
            || SessionEnd::Failed(SensorError::Disconnected(self.address.to_string()));

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                next = tokio::time::timeout(
                    self.config.poll_interval,
                    self.transport.next_notification(link),
                ) => Some(next),
            };

            let notification = match next {
                None => return SessionEnd::Cancelled,
                Some(Err(_idle)) => {
                    if !self.transport.is_alive(link).await {
                        return disconnected();
                    }
                    continue;
                }
                Some(Ok(None)) => return disconnected(),
                Some(Ok(Some(Err(error)))) => return SessionEnd::Failed(error),
                Some(Ok(Some(Ok(notification)))) => notification,
            };

            match decoder.apply(&notification, &self.values) {
                Ok(()) => {
                    tracing::trace!(
                        sensor = %self.name,
                        channel = %notification.channel,
                        "Applied notification"
                    );
                }
                Err(
                    anomaly @ (DecodeAnomaly::Truncated { .. }
                    | DecodeAnomaly::UnsupportedLayout { .. }),
                ) => {
                    tracing::warn!(
                        sensor = %self.name,
                        channel = %notification.channel,
                        %anomaly,
                        "Dropped malformed notification"
                    );
                }
                Err(anomaly) => {
                    tracing::trace!(
                        sensor = %self.name,
                        channel = %notification.channel,
                        %anomaly,
                        "Notification skipped"
                    );
                }
            }
        }
    }
}

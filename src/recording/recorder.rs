//! Session recorder: samples the live metrics at a fixed rate into a [`RecordSink`].

use crate::recording::fit::RecordSink;
use crate::recording::types::RecorderError;
use crate::sensors::hub::MetricView;
use chrono::Utc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default sampling interval (1 Hz)
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Time between samples
    pub sample_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

/// Samples a [`MetricView`] until cancelled.
pub struct SessionRecorder {
    view: MetricView,
    config: RecorderConfig,
}

impl SessionRecorder {
    pub fn new(view: MetricView, config: RecorderConfig) -> Self {
        Self { view, config }
    }

    /// Record into `sink` until `token` is cancelled, then finish the session.
    ///
    /// The first sample is taken immediately. The sink is handed back so callers can
    /// inspect it after the run.
    pub async fn run<S: RecordSink>(
        self,
        mut sink: S,
        token: CancellationToken,
    ) -> Result<S, RecorderError> {
        sink.start(Utc::now())?;

        let mut ticker = tokio::time::interval(self.config.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut samples: u64 = 0;

        loop {
            let cancelled = tokio::select! {
                biased;
                _ = token.cancelled() => true,
                _ = ticker.tick() => false,
            };
            if cancelled {
                break;
            }

            let record = self.view.sample(Utc::now());
            if let Err(e) = sink.add_record(&record) {
                tracing::error!(error = %e, "Failed to add record, stopping recorder");
                let _ = sink.finish(Utc::now());
                return Err(e);
            }
            samples += 1;
            tracing::trace!(samples, "Recorded sample");
        }

        tracing::debug!(samples, "Recorder stopping");
        sink.finish(Utc::now())?;
        Ok(sink)
    }
}

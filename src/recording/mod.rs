//! Session recording: periodic metric sampling and FIT file output.

pub mod fit;
pub mod recorder;
pub mod types;

pub use fit::{FitRecorder, RecordSink};
pub use recorder::{RecorderConfig, SessionRecorder};
pub use types::{MetricRecord, RecorderError, RecordingStatus};

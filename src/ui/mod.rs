//! Terminal display of live metrics.

pub mod overlay;

pub use overlay::{format_elapsed, metric_line, time_line, Overlay};

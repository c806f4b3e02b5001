use serde::Serialize;

use crate::{Attributes, ExperimentConfig, Result, Timestamp};

/// Default event type attached to exposure events that don't set one.
pub(crate) const DEFAULT_EVENT_TYPE: &str = "EXPOSE";

/// An experiment exposure that needs to be submitted to analytics storage for further analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureEvent {
    /// The kind of event. Defaults to `"EXPOSE"` when left empty.
    pub event_type: String,
    /// Name of the experiment the user was exposed to.
    pub experiment_name: String,
    /// The variant the user was assigned.
    pub variant_name: String,
    /// The value the user was bucketed on.
    pub bucketing_value: String,
    /// The evaluation inputs at the time of exposure.
    pub inputs: Attributes,
    /// When the exposure occurred.
    pub timestamp: Timestamp,
    /// The experiment's configuration at the time of exposure. Attached by
    /// [`Experiments::expose`](crate::Experiments::expose).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<ExperimentConfig>,
}

/// A trait for forwarding exposure events to your analytics storage.
///
/// Implementations should not block the calling thread: `log_event` is called inline from
/// [`Experiments::expose`](crate::Experiments::expose), so slow sinks should enqueue and
/// return.
pub trait EventLogger: Send + Sync {
    /// Forward the event to the storage system.
    fn log_event(&self, event: &ExposureEvent) -> Result<()>;
}

pub(crate) struct NoopEventLogger;
impl EventLogger for NoopEventLogger {
    fn log_event(&self, _event: &ExposureEvent) -> Result<()> {
        Ok(())
    }
}

impl<T: Fn(&ExposureEvent) + Send + Sync> EventLogger for T {
    fn log_event(&self, event: &ExposureEvent) -> Result<()> {
        self(event);
        Ok(())
    }
}

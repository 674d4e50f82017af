//! Reading metric values back from a `DebuggingRecorder`.

use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};

/// Creates a debugging recorder and its snapshotter.
#[must_use]
pub fn debugging_recorder() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Run `f` with `recorder` installed on this thread.
pub fn with_recorder<R>(recorder: &DebuggingRecorder, f: impl FnOnce() -> R) -> R {
    ::metrics::with_local_recorder(recorder, f)
}

/// Metric values captured at one instant.
pub struct MetricValues(Vec<(CompositeKey, DebugValue)>);

impl MetricValues {
    /// Take a snapshot from `snapshotter`.
    #[must_use]
    pub fn capture(snapshotter: &Snapshotter) -> Self {
        Self(
            snapshotter
                .snapshot()
                .into_vec()
                .into_iter()
                .map(|(key, _, _, value)| (key, value))
                .collect(),
        )
    }

    /// Total of the counter `name`, or zero if it was never touched.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.0
            .iter()
            .filter(|(key, _)| key.key().name() == name)
            .map(|(_, value)| match value {
                DebugValue::Counter(count) => *count,
                _ => 0,
            })
            .sum()
    }

    /// Current value of the gauge `name`, if it was ever set.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(key, _)| key.key().name() == name)
            .and_then(|(_, value)| match value {
                DebugValue::Gauge(gauge) => Some(gauge.into_inner()),
                _ => None,
            })
    }
}

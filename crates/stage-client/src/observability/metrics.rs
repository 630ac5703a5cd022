//! Metric recording functions.
//!
//! All metrics use the `stage_` prefix, `_total` for counters and
//! `_seconds` for duration histograms.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a local device acquisition attempt.
///
/// Metric: `stage_device_acquisitions_total`
/// Labels: `kind` (audio, video, screen), `outcome` (success, error, cancelled)
pub fn record_device_acquisition(kind: &str, outcome: &str) {
    counter!(
        "stage_device_acquisitions_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a join attempt and, when the transport answered, its duration.
///
/// Metrics: `stage_session_joins_total`, `stage_session_join_duration_seconds`
/// Labels: `session` (primary, screenshare), `outcome`
/// (success, empty_token, rejected, error)
pub fn record_session_join(session: &str, outcome: &str, duration: Option<Duration>) {
    counter!(
        "stage_session_joins_total",
        "session" => session.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    if let Some(duration) = duration {
        histogram!(
            "stage_session_join_duration_seconds",
            "session" => session.to_string()
        )
        .record(duration.as_secs_f64());
    }
}

/// Record a transport event passing through the roster reducer.
///
/// Metric: `stage_roster_events_total`
/// Labels: `session`, `event_type`, `result` (applied, ignored)
pub fn record_roster_event(session: &str, event_type: &str, applied: bool) {
    let result = if applied { "applied" } else { "ignored" };
    counter!(
        "stage_roster_events_total",
        "session" => session.to_string(),
        "event_type" => event_type.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Record a strategy refresh forwarded to the transport.
///
/// Metric: `stage_strategy_refreshes_total`
/// Labels: `session`
pub fn record_strategy_refresh(session: &str) {
    counter!("stage_strategy_refreshes_total", "session" => session.to_string()).increment(1);
}

/// Set the number of remote participants in a session's roster.
///
/// Metric: `stage_remote_participants`
/// Labels: `session`
pub fn set_remote_participants(session: &str, count: usize) {
    // usize to f64 is exact for any realistic roster size
    #[allow(clippy::cast_precision_loss)]
    gauge!("stage_remote_participants", "session" => session.to_string()).set(count as f64);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_device_acquisition("video", "success");
        record_session_join("primary", "success", Some(Duration::from_millis(20)));
        record_session_join("primary", "empty_token", None);
        record_roster_event("primary", "participant_joined", true);
        record_strategy_refresh("primary");
        set_remote_participants("screenshare", 0);
    }

    #[test]
    fn test_metrics_are_captured_by_recorder() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_device_acquisition("audio", "success");
            record_device_acquisition("screen", "cancelled");
            record_session_join("primary", "success", Some(Duration::from_millis(25)));
            record_roster_event("primary", "streams_removed", false);
            record_strategy_refresh("primary");
            set_remote_participants("primary", 3);
        });

        let metrics = snapshotter.snapshot().into_vec();
        let names: Vec<String> = metrics
            .iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        for expected in [
            "stage_device_acquisitions_total",
            "stage_session_joins_total",
            "stage_session_join_duration_seconds",
            "stage_roster_events_total",
            "stage_strategy_refreshes_total",
            "stage_remote_participants",
        ] {
            assert!(
                names.iter().any(|n| n == expected),
                "missing metric {expected}, got {names:?}"
            );
        }

        let participants = metrics
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "stage_remote_participants")
            .map(|(_, _, _, value)| value)
            .unwrap();
        assert!(matches!(
            participants,
            DebugValue::Gauge(v) if (v.into_inner() - 3.0).abs() < f64::EPSILON
        ));
    }
}

//! Observability for the stage client.
//!
//! The crate only emits through the `metrics` facade and `tracing`; the
//! embedding application installs the recorder and subscriber.
//!
//! # Privacy
//!
//! Stage tokens never appear in logs or labels. Actor spans use
//! `#[instrument(skip_all)]` with an explicit field allow-list, and metric
//! labels are bounded:
//! - `session`: 2 values (primary, screenshare)
//! - `kind`: 3 values (audio, video, screen)
//! - `outcome`: 3-4 values per metric
//! - `event_type`: 6 values (one per transport event)
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `stage_device_acquisitions_total` | Counter | `kind`, `outcome` | Local capture attempts |
//! | `stage_session_joins_total` | Counter | `session`, `outcome` | Join attempts |
//! | `stage_session_join_duration_seconds` | Histogram | `session` | Time from join request to transport accept |
//! | `stage_roster_events_total` | Counter | `session`, `event_type`, `result` | Events applied or ignored by the reducer |
//! | `stage_strategy_refreshes_total` | Counter | `session` | Transport re-polls of the strategy |
//! | `stage_remote_participants` | Gauge | `session` | Current roster size |

pub mod metrics;

pub use metrics::{
    record_device_acquisition, record_roster_event, record_session_join,
    record_strategy_refresh, set_remote_participants,
};

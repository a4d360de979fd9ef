//! Observability for the Live Poll service.
//!
//! # Privacy
//!
//! Display names and vote choices are never logged or used as metric labels.
//! Logs carry connection-scoped participant ids and round ids only.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `poll_participants_active` | Gauge | none | Registered participants |
//! | `poll_rounds_started_total` | Counter | none | Rounds started |
//! | `poll_votes_total` | Counter | `outcome` | Accepted and dropped votes |
//! | `poll_rounds_finalized_total` | Counter | `trigger` | What ended each round |
//! | `poll_actor_mailbox_depth` | Gauge | none | Backpressure indicator |
//! | `poll_message_latency_seconds` | Histogram | `message_type` | Actor processing time |

pub mod health;
pub mod metrics;

pub use health::{health_router, metrics_router, HealthState};
pub use metrics::init_metrics_recorder;

//! Structured logging init (C10, §4.10).
//!
//! Grounded on the teacher's `utils/logging.rs` (`init_structured_logging`,
//! `LogContext` span tagging) and `utils/mod.rs::init_logging`, trimmed to
//! drop the teacher's mining-metrics/worker-state macros (no counterpart in
//! this gateway) while keeping the per-connection span tagging, since
//! sessions need the same kind of contextual log correlation workers did.

use std::collections::HashMap;

use tracing::{field, span, Level, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global subscriber. `format` is `"json"` or anything else
/// (pretty, human-readable).
pub fn init_logging(level: &str, format: &str) {
    let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        "json" => {
            let fmt_layer = fmt::layer().json().with_target(true).with_thread_ids(true);
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
        }
        _ => {
            let fmt_layer = fmt::layer().with_target(false);
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
        }
    }
}

/// Context tags for a session's log lines, grouped under one span so a
/// session's whole lifetime can be filtered on `session_id`.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub session_id: Option<String>,
    pub ip: Option<String>,
    pub custom_fields: HashMap<String, String>,
}

impl LogContext {
    pub fn for_session(session_id: &str, ip: &str) -> Self {
        Self { session_id: Some(session_id.to_string()), ip: Some(ip.to_string()), custom_fields: HashMap::new() }
    }

    pub fn with_field(mut self, key: String, value: String) -> Self {
        self.custom_fields.insert(key, value);
        self
    }

    pub fn span(&self, name: &str) -> Span {
        let span = span!(Level::INFO, "context", name = %name, session_id = field::Empty, ip = field::Empty);
        if let Some(session_id) = &self.session_id {
            span.record("session_id", field::display(session_id));
        }
        if let Some(ip) = &self.ip {
            span.record("ip", field::display(ip));
        }
        span
    }
}

/// One span per broadcast round, carrying the template's identity and how
/// many live sessions it was fanned out to (§4.10).
pub fn broadcast_span(job_id: &str, session_count: usize) -> Span {
    span!(Level::INFO, "broadcast", job_id = %job_id, session_count)
}

//! Broadcaster (C7, §4.7): on a new upstream template, push a job to every
//! live session concurrently.
//!
//! Grounded on the teacher's `start_job_emitter`
//! (`tokio::sync::broadcast` ticking job updates) and
//! `mimblewimble-grin/servers/.../stratumserver.rs::broadcast_job` /
//! `clean_workers` (iterate-all-workers, prune failures). Reworked from a
//! fire-and-forget broadcast channel into direct bounded-concurrency fan-out,
//! since §4.7 requires observing each push's success/failure to decide
//! removal — a plain broadcast channel can't report per-subscriber errors.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::hex_util::strip_0x;
use crate::job::BlockTemplate;
use crate::registry::Registry;
use crate::utils::logging::broadcast_span;
use crate::worksource::WorkSource;

/// Bounded concurrency for fan-out pushes (§4.7 step 3).
pub const BROADCAST_CONCURRENCY: usize = 1024;

/// Runs one broadcast round. Skips entirely if there is no template or the
/// upstream reports itself sick (§4.7 step 1).
pub async fn broadcast_once(registry: &Registry, work_source: &dyn WorkSource) {
    if work_source.is_sick().await {
        tracing::debug!("upstream marked sick, skipping broadcast");
        return;
    }
    let Some(template) = work_source.current_template().await else {
        tracing::debug!("no current template, skipping broadcast");
        return;
    };
    broadcast_template(registry, &template).await;
}

async fn broadcast_template(registry: &Registry, template: &BlockTemplate) {
    let sessions = registry.snapshot();
    if sessions.is_empty() {
        return;
    }

    let job_id: String = strip_0x(&template.header).chars().take(8).collect();
    let span = broadcast_span(&job_id, sessions.len());
    push_to_sessions(registry, template, sessions).instrument(span).await;
}

async fn push_to_sessions(registry: &Registry, template: &BlockTemplate, sessions: Vec<Arc<crate::session::Session>>) {
    let semaphore = Arc::new(Semaphore::new(BROADCAST_CONCURRENCY));
    let mut pushes = FuturesUnordered::new();
    for session in sessions {
        let semaphore = semaphore.clone();
        let template = template.clone();
        pushes.push(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            let result = session.push_new_job(&template).await;
            (session, result)
        });
    }

    let mut pushed = 0usize;
    let mut removed = 0usize;
    while let Some((session, result)) = pushes.next().await {
        match result {
            Ok(()) => {
                session.touch();
                pushed += 1;
            }
            Err(e) => {
                tracing::debug!(session = %session.id, error = %e, "broadcast push failed, removing session");
                registry.remove(session.id);
                removed += 1;
            }
        }
    }
    tracing::info!(pushed, removed, "broadcast round complete");
}

/// Ticks [`broadcast_once`] whenever the upstream's template watcher fires.
/// The watcher itself belongs to `WorkSource`; this just drives the loop.
pub async fn run(registry: Arc<Registry>, work_source: Arc<dyn WorkSource>, mut on_template_change: tokio::sync::watch::Receiver<()>) {
    loop {
        if on_template_change.changed().await.is_err() {
            return;
        }
        broadcast_once(&registry, &*work_source).await;
    }
}

//! Per-connection session state (C3, §4.3).
//!
//! Grounded on the teacher's `workers/stratum/session.rs` (`StratumSession`,
//! `SessionId(Uuid)`), restructured around the stale-job cache this gateway
//! needs instead of the teacher's hashrate-estimation fields (hashrate
//! belongs to `WorkSource`/an exporter here, out of scope per spec.md §1).

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::codec::{
    encode_ep_error, encode_ep_push, encode_ep_result, encode_push_request, encode_stratum_error,
    encode_stratum_result,
};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::hex_util::strip_0x;
use crate::job::{BlockTemplate, JobDetails, StaleJobEntry};
use crate::transport::Transport;

/// `stale_jobs` capacity bound (§3 invariants).
pub const MAX_STALE: usize = 10;
/// Entries kept on eviction, most recent first (§4.3).
pub const KEEP_STALE: usize = 3;

/// The algorithm name carried in NiceHash push frames. Not specified by the
/// wire protocol beyond "some string the miner already expects"; `ethash` is
/// what every EthereumStratum/1.0.0 pool in the wild sends.
const ALGO: &str = "ethash";

#[derive(Debug, Default)]
struct SessionState {
    login: Option<String>,
    worker: Option<String>,
    dialect: Dialect,
    extranonce_subscribed: bool,
    job_current: Option<JobDetails>,
    stale_jobs: HashMap<String, StaleJobEntry>,
    stale_order: VecDeque<String>,
}

/// Before overwriting `job_current`: evict down to `KEEP_STALE` if over
/// `MAX_STALE`, then fold the currently-active job into the stale cache
/// (§4.3 "stale-job cache policy").
fn cache_stales(state: &mut SessionState) {
    if state.stale_order.len() > MAX_STALE {
        while state.stale_order.len() > KEEP_STALE {
            if let Some(evicted) = state.stale_order.pop_front() {
                state.stale_jobs.remove(&evicted);
            }
        }
    }
    if let Some(current) = &state.job_current {
        state.stale_jobs.insert(current.job_id.clone(), current.as_stale_entry());
        state.stale_order.push_back(current.job_id.clone());
    }
}

/// A resolved job: seed/header to submit against, and whether it was the
/// active job (`false` means it came from the stale cache).
pub struct ResolvedJob {
    pub seed_hash: String,
    pub header_hash: String,
}

/// Per-connection state, owned by exactly one reader task and referenced
/// (read + write-lock only) by the broadcaster.
pub struct Session {
    pub id: Uuid,
    pub ip: String,
    pub extranonce: String,
    state: SyncMutex<SessionState>,
    writer: AsyncMutex<WriteHalf<Transport>>,
    last_active: SyncMutex<Instant>,
}

impl Session {
    pub fn new(id: Uuid, ip: String, extranonce: String, writer: WriteHalf<Transport>) -> Self {
        Self {
            id,
            ip,
            extranonce,
            state: SyncMutex::new(SessionState::default()),
            writer: AsyncMutex::new(writer),
            last_active: SyncMutex::new(Instant::now()),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.state.lock().dialect
    }

    /// Sets the dialect if unset; no-op if already set (§3: transitions
    /// exactly once, never flips).
    pub fn set_dialect(&self, dialect: Dialect) {
        let mut state = self.state.lock();
        if !state.dialect.is_set() {
            state.dialect = dialect;
        }
    }

    pub fn set_login(&self, login: impl Into<String>) {
        self.state.lock().login = Some(login.into());
    }

    pub fn set_worker(&self, worker: impl Into<String>) {
        self.state.lock().worker = Some(worker.into());
    }

    pub fn login(&self) -> Option<String> {
        self.state.lock().login.clone()
    }

    pub fn worker(&self) -> Option<String> {
        self.state.lock().worker.clone()
    }

    pub fn extranonce_subscribed(&self) -> bool {
        self.state.lock().extranonce_subscribed
    }

    pub fn set_extranonce_subscribed(&self) {
        self.state.lock().extranonce_subscribed = true;
    }

    pub fn current_job_id(&self) -> Option<String> {
        self.state.lock().job_current.as_ref().map(|j| j.job_id.clone())
    }

    /// Looks up a submitted `job_id` against the active job, then the stale
    /// cache. `None` means the share must be rejected as stale (§4.5).
    pub fn resolve_job(&self, job_id: &str) -> Option<ResolvedJob> {
        let state = self.state.lock();
        if let Some(current) = &state.job_current {
            if current.job_id == job_id {
                return Some(ResolvedJob {
                    seed_hash: current.seed_hash.clone(),
                    header_hash: current.header_hash.clone(),
                });
            }
        }
        state.stale_jobs.get(job_id).map(|entry| ResolvedJob {
            seed_hash: entry.seed_hash.clone(),
            header_hash: entry.header_hash.clone(),
        })
    }

    pub fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    /// The instant a reader's idle wait should expire, recomputed on every
    /// loop iteration so a broadcast push (which also calls `touch`) extends
    /// it without the reader needing to know about the broadcaster.
    pub fn deadline(&self, timeout: Duration) -> Instant {
        *self.last_active.lock() + timeout
    }

    async fn write_value(&self, value: Value) -> Result<()> {
        let mut line = serde_json::to_vec(&value)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// JSON-RPC 2.0 success (EthProxy path).
    pub async fn send_result(&self, id: Value, result: Value) -> Result<()> {
        self.write_value(encode_ep_result(id, result)).await
    }

    /// JSON-RPC 2.0 error (EthProxy path). Callers that hit this on a
    /// validation failure terminate the session themselves after it
    /// returns, per §7 `MalformedFrame`.
    pub async fn send_error(&self, id: Value, code: i64, message: &str) -> Result<()> {
        self.write_value(encode_ep_error(id, code, message)).await
    }

    /// Bare Stratum success (NiceHash path).
    pub async fn send_stratum_result(&self, id: Value, result: Value) -> Result<()> {
        self.write_value(encode_stratum_result(id, result)).await
    }

    /// Bare Stratum error; `code` is the two-char string code (`"20"`,
    /// `"21"`, ...), not a number (§4.1).
    pub async fn send_stratum_error(&self, id: Value, code: &str, message: &str) -> Result<()> {
        self.write_value(encode_stratum_error(id, code, message)).await
    }

    /// Unsolicited request-shaped push, e.g. `mining.set_difficulty`.
    pub async fn send_request(&self, method: &str, params: Value) -> Result<()> {
        self.write_value(encode_push_request(method, params)).await
    }

    /// Evicts/caches the superseded job and installs a freshly generated one
    /// as `job_current`, without touching the wire. Used both by
    /// [`Session::send_job`] and by the subscribe-reply flattening
    /// (§9 open question #1), which needs a job id inline in a reply rather
    /// than as a separate push.
    pub fn prepare_job(&self, template: &BlockTemplate) -> JobDetails {
        let mut state = self.state.lock();
        cache_stales(&mut state);
        let job = JobDetails::from_template(template);
        state.job_current = Some(job.clone());
        job
    }

    /// Targeted NH job push (§4.5 `send_job`): generates a fresh job,
    /// evicts/caches the superseded one, and sends `mining.notify`.
    /// `clean_jobs` is `true` for targeted sends per the spec's only call
    /// sites (subscribe/authorize, stale-share recovery).
    pub async fn send_job(&self, template: &BlockTemplate, clean_jobs: bool) -> Result<JobDetails> {
        let job = self.prepare_job(template);
        let params = json!([job.job_id, job.seed_hash, job.header_hash, clean_jobs]);
        self.write_value(crate::codec::encode_nh_push(
            "mining.notify",
            params,
            Some(job.height.as_str()),
            Some(ALGO),
        ))
        .await?;
        Ok(job)
    }

    /// Broadcaster fan-out push (C7, §4.7): dialect-appropriate shape,
    /// always `clean_jobs=false` for NH, legacy array push for EthProxy.
    pub async fn push_new_job(&self, template: &BlockTemplate) -> Result<()> {
        match self.dialect() {
            Dialect::NiceHash => {
                self.send_job(template, false).await?;
                Ok(())
            }
            Dialect::EthProxy => {
                let result = json!([
                    format!("0x{}", strip_0x(&template.header)),
                    format!("0x{}", strip_0x(&template.seed)),
                    template.current_difficulty_hex.clone(),
                    template.height.clone(),
                ]);
                self.write_value(encode_ep_push(result)).await
            }
            Dialect::Unset => Ok(()),
        }
    }
}

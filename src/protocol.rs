//! Protocol state machine (C5, §4.5): dispatch of each incoming method by
//! `(dialect, method)`, producing replies and follow-up pushes.
//!
//! Grounded on `workers/stratum/server.rs::handle_request` (match on parsed
//! method, per-arm validation then reply) and
//! `workers/stratum/protocol.rs::StratumMethod` (method-name parsing),
//! extended to two method namespaces instead of one, and to
//! dialect-conditional reply shaping called out in spec.md §9 ("push-vs-reply
//! encoding divergence ... never from the call site").

use serde_json::{json, Value};

use crate::codec::StratumRequest;
use crate::dialect::{subscribe_selects_nicehash, Dialect};
use crate::difficulty::difficulty_to_float;
use crate::error::{Error, Result};
use crate::extranonce::random_hex_n;
use crate::hex_util::strip_0x;
use crate::session::Session;
use crate::sharesink::{ShareSink, SubmitOutcome};
use crate::worksource::WorkSource;

/// Base target used to derive `mining.set_difficulty`'s floating-point
/// payload from `proxy.difficulty` (`target = target_base / diff`, §6). This
/// is the conventional "difficulty 1" target most EthereumStratum pools use.
const TARGET_BASE: f64 = 4_294_967_296.0;

const EP_ERR_AUTH_FAILED: i64 = -32000;
const EP_ERR_UNKNOWN_METHOD: i64 = -32601;

/// Everything a dispatch call needs beyond the session and the request:
/// the collaborators it calls through to, and the configured base
/// difficulty (§4.9 `proxy.difficulty`).
pub struct ProtocolContext<'a> {
    pub work_source: &'a dyn WorkSource,
    pub share_sink: &'a dyn ShareSink,
    pub difficulty: u64,
}

/// Dispatches one parsed request. `Ok(())` means the session continues;
/// `Err` means the reader task must tear the session down (§7).
pub async fn dispatch(session: &Session, req: StratumRequest, ctx: &ProtocolContext<'_>) -> Result<()> {
    match req.method.as_str() {
        "eth_login" => handle_eth_login(session, &req, ctx, false).await,
        "eth_submitLogin" => handle_eth_login(session, &req, ctx, true).await,
        "mining.subscribe" => handle_subscribe(session, &req, ctx).await,
        "mining.authorize" => handle_authorize(session, &req, ctx).await,
        "mining.extranonce.subscribe" => handle_extranonce_subscribe(session, &req).await,
        "mining.submit" => handle_submit(session, &req, ctx).await,
        "eth_getWork" => handle_get_work(session, &req, ctx).await,
        "eth_submitWork" => handle_submit_work(session, &req, ctx).await,
        "eth_submitHashrate" => handle_submit_hashrate(session, &req).await,
        other => reply_unknown_method(session, req.id.clone(), other).await,
    }
}

fn split_login_worker(raw: &str) -> (&str, &str) {
    match raw.split_once('.') {
        Some((login, worker)) => (login, worker),
        None => (raw, "0"),
    }
}

async fn reply_unknown_method(session: &Session, id: Value, method: &str) -> Result<()> {
    match session.dialect() {
        Dialect::EthProxy => {
            session.send_error(id, EP_ERR_UNKNOWN_METHOD, &format!("unknown method: {method}")).await
        }
        // Unset sessions haven't picked a wire shape yet; the bare Stratum
        // shape is the more conservative default since most unsolicited
        // pre-subscribe traffic is NH tooling probing the port.
        Dialect::NiceHash | Dialect::Unset => {
            session.send_stratum_error(id, "20", "Not supported.").await
        }
    }
}

async fn handle_eth_login(
    session: &Session,
    req: &StratumRequest,
    ctx: &ProtocolContext<'_>,
    sets_dialect: bool,
) -> Result<()> {
    if sets_dialect {
        session.set_dialect(Dialect::EthProxy);
    }
    let address = req
        .params
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed_params(&req.method, "params[0] must be the login address"))?;
    let worker = req.params.get(1).and_then(Value::as_str).unwrap_or_default();

    let outcome = ctx.work_source.login(address, worker).await?;
    if !outcome.accepted {
        return session.send_error(req.id.clone(), EP_ERR_AUTH_FAILED, "authentication failed").await;
    }
    session.set_login(address);
    if !worker.is_empty() {
        session.set_worker(worker);
    }
    session.send_result(req.id.clone(), json!(true)).await
}

async fn handle_subscribe(session: &Session, req: &StratumRequest, ctx: &ProtocolContext<'_>) -> Result<()> {
    if req.params.first().and_then(Value::as_str).is_none() {
        return Err(Error::malformed_params(&req.method, "params[0] must be the miner user-agent string"));
    }
    if !subscribe_selects_nicehash(&req.params) {
        return session.send_stratum_error(req.id.clone(), "20", "Not supported.").await;
    }
    session.set_dialect(Dialect::NiceHash);
    session.set_extranonce_subscribed();

    let template = ctx.work_source.current_template().await;
    let result = match template {
        Some(template) => {
            let job = session.prepare_job(&template);
            json!(["mining.notify", job.job_id, job.seed_hash, job.header_hash, job.height])
        }
        None => {
            let subscription_id = random_hex_n(8);
            json!([["mining.notify", subscription_id, "EthereumStratum/1.0.0"], session.extranonce])
        }
    };
    session.send_stratum_result(req.id.clone(), result).await
}

async fn handle_authorize(session: &Session, req: &StratumRequest, ctx: &ProtocolContext<'_>) -> Result<()> {
    if session.dialect() != Dialect::NiceHash {
        return reply_unknown_method(session, req.id.clone(), &req.method).await;
    }
    let raw = req
        .params
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed_params(&req.method, "params[0] must be login[.worker]"))?;
    let (login, worker) = split_login_worker(raw);

    let outcome = ctx.work_source.login(login, worker).await?;
    if !outcome.accepted {
        return session.send_stratum_error(req.id.clone(), "24", "Unauthorized worker.").await;
    }
    session.set_login(login);
    session.set_worker(worker);
    session.send_stratum_result(req.id.clone(), json!(true)).await?;

    let difficulty = difficulty_to_float(TARGET_BASE, ctx.difficulty);
    session.send_request("mining.set_difficulty", json!([difficulty])).await?;

    if let Some(template) = ctx.work_source.current_template().await {
        session.send_job(&template, true).await?;
    }
    Ok(())
}

async fn handle_extranonce_subscribe(session: &Session, req: &StratumRequest) -> Result<()> {
    if !req.params.is_empty() {
        return session.send_stratum_error(req.id.clone(), "20", "Not supported.").await;
    }
    session.set_extranonce_subscribed();
    session.send_stratum_result(req.id.clone(), json!(true)).await?;
    session.send_request("mining.set_extranonce", json!([session.extranonce])).await
}

async fn handle_submit(session: &Session, req: &StratumRequest, ctx: &ProtocolContext<'_>) -> Result<()> {
    if session.dialect() != Dialect::NiceHash {
        return reply_unknown_method(session, req.id.clone(), &req.method).await;
    }
    let raw_worker = req
        .params
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed_params(&req.method, "params[0] must be user.workerName"))?;
    let job_id = req
        .params
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed_params(&req.method, "params[1] must be the job id"))?;
    let miner_nonce = req
        .params
        .get(2)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed_params(&req.method, "params[2] must be the nonce"))?;

    let (_login_prefix, worker_name) = split_login_worker(raw_worker);
    let full_nonce = if session.extranonce_subscribed() {
        format!("{}{}", session.extranonce, miner_nonce)
    } else {
        miner_nonce.to_string()
    };

    let resolved = match session.resolve_job(job_id) {
        Some(job) => job,
        None => {
            session.send_stratum_error(req.id.clone(), "21", "Stale share.").await?;
            if let Some(template) = ctx.work_source.current_template().await {
                session.send_job(&template, true).await?;
            }
            return Ok(());
        }
    };

    let login = session.login().unwrap_or_default();
    let outcome = ctx
        .share_sink
        .submit(&login, worker_name, &full_nonce, &resolved.seed_hash, &resolved.header_hash)
        .await?;
    match outcome {
        SubmitOutcome::Accepted => session.send_stratum_result(req.id.clone(), json!(true)).await,
        SubmitOutcome::Rejected { code, message } => {
            session.send_stratum_error(req.id.clone(), &code, &message).await
        }
    }
}

async fn handle_get_work(session: &Session, req: &StratumRequest, ctx: &ProtocolContext<'_>) -> Result<()> {
    if session.dialect() != Dialect::EthProxy {
        return reply_unknown_method(session, req.id.clone(), &req.method).await;
    }
    let work = ctx.work_source.get_work(session).await?;
    let result = json!([work.header, work.seed, work.difficulty_hex, work.height_hex]);
    session.send_result(req.id.clone(), result).await
}

async fn handle_submit_work(session: &Session, req: &StratumRequest, ctx: &ProtocolContext<'_>) -> Result<()> {
    if session.dialect() != Dialect::EthProxy {
        return reply_unknown_method(session, req.id.clone(), &req.method).await;
    }
    if req.params.len() < 3 {
        return Err(Error::malformed_params(&req.method, "expected [nonce, header, mix]"));
    }
    let nonce = req.params[0].as_str().unwrap_or_default();
    let header = req.params[1].as_str().unwrap_or_default();
    let mix = req.params[2].as_str().unwrap_or_default();
    let expected_lens = [(nonce.len(), 18), (header.len(), 66), (mix.len(), 66)];
    if expected_lens.iter().any(|(actual, expected)| actual != expected) {
        return Err(Error::malformed_params(
            &req.method,
            "params must be hex with 0x prefix of length (18, 66, 66)",
        ));
    }

    let login = session.login().unwrap_or_default();
    let worker = session.worker().unwrap_or_default();
    let outcome = ctx
        .share_sink
        .submit(&login, &worker, strip_0x(nonce), strip_0x(mix), strip_0x(header))
        .await?;
    match outcome {
        SubmitOutcome::Accepted => session.send_result(req.id.clone(), json!(true)).await,
        SubmitOutcome::Rejected { message, .. } => {
            session.send_error(req.id.clone(), EP_ERR_AUTH_FAILED, &message).await
        }
    }
}

async fn handle_submit_hashrate(session: &Session, req: &StratumRequest) -> Result<()> {
    if session.dialect() != Dialect::EthProxy {
        return reply_unknown_method(session, req.id.clone(), &req.method).await;
    }
    let hashrate_hex = req
        .params
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| Error::malformed_params(&req.method, "params[0] must be a hashrate hex string"))?;
    if !hashrate_hex.starts_with("0x") {
        return Err(Error::malformed_params(&req.method, "hashrate must have a 0x prefix"));
    }
    let hashrate = i64::from_str_radix(strip_0x(hashrate_hex), 16)
        .map_err(|e| Error::malformed_params(&req.method, e.to_string()))?;
    tracing::info!(worker = ?session.worker(), hashrate, "eth_submitHashrate");
    session.send_result(req.id.clone(), json!(true)).await
}

//! Wire codec (C1, §4.1): newline-delimited JSON framing and the four
//! coexisting response/push shapes.
//!
//! Grounded on the teacher's `BufReader`/`read_line` framing in
//! `workers/stratum/server.rs::handle_client`, generalized from "one line is
//! one `StratumMessage`" to "one line is one raw JSON value dispatched by
//! dialect", since EthProxy and NiceHash replies are asymmetric in a way the
//! teacher's single-shape ASIC protocol never needed to be.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{Error, Result};

/// Read buffer bound (§4.1): a line that grows past this without a
/// terminating `\n` is a flood-ban condition, not merely a parse failure.
pub const MAX_REQ_SIZE: usize = 1024;

/// Reads one `\n`-terminated line, bounded at [`MAX_REQ_SIZE`] bytes.
/// Returns `Ok(None)` on clean EOF between frames.
pub async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::with_capacity(256);
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::Codec(crate::error::CodecError::Eof));
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            buf.extend_from_slice(&available[..pos]);
            let consumed = pos + 1;
            reader.consume(consumed);
            if buf.len() > MAX_REQ_SIZE {
                return Err(Error::line_too_long(MAX_REQ_SIZE));
            }
            return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
        }
        let chunk_len = available.len();
        buf.extend_from_slice(available);
        reader.consume(chunk_len);
        // No newline seen yet: reaching the bound here (not just exceeding
        // it) is itself the flood condition, since a well-formed line this
        // long would already have been terminated (§8 boundary behaviors).
        if buf.len() >= MAX_REQ_SIZE {
            return Err(Error::line_too_long(MAX_REQ_SIZE));
        }
    }
}

/// Parses one line into a raw JSON value; JSON errors are `MalformedFrame`
/// (policy-gated, always terminates) rather than a protocol-level reply.
pub fn parse_frame(line: &str) -> Result<Value> {
    serde_json::from_str(line).map_err(|e| Error::invalid_json(e.to_string()))
}

/// A parsed incoming request. `worker` is carried by some clients as a
/// top-level field alongside `params` (§3 wire model).
#[derive(Debug, Clone)]
pub struct StratumRequest {
    pub id: Value,
    pub method: String,
    pub params: Vec<Value>,
}

impl StratumRequest {
    pub fn from_value(v: &Value) -> Result<Self> {
        let method = v
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_json("missing method"))?
            .to_string();
        let params = v
            .get("params")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let id = v.get("id").cloned().unwrap_or(Value::Null);
        Ok(Self { id, method, params })
    }
}

/// JSON-RPC 2.0 success reply (EthProxy path).
pub fn encode_ep_result(id: Value, result: Value) -> Value {
    json!({ "id": id, "jsonrpc": "2.0", "result": result, "error": Value::Null })
}

/// JSON-RPC 2.0 error reply (EthProxy path).
pub fn encode_ep_error(id: Value, code: i64, message: &str) -> Value {
    json!({
        "id": id,
        "jsonrpc": "2.0",
        "result": Value::Null,
        "error": { "code": code, "message": message },
    })
}

/// Bare Stratum success reply (NiceHash path): no `jsonrpc` field.
pub fn encode_stratum_result(id: Value, result: Value) -> Value {
    json!({ "id": id, "result": result, "error": Value::Null })
}

/// Bare Stratum error reply: error is a two-element `[code, message]` array,
/// not an object (§4.1 — bug-compatible with the source, see §9).
pub fn encode_stratum_error(id: Value, code: &str, message: &str) -> Value {
    json!({ "id": id, "result": Value::Null, "error": [code, message] })
}

/// Generic unsolicited request-shaped push (e.g. `mining.set_difficulty`):
/// no `id`, no `height`/`algo` fields — those belong to `mining.notify` only.
pub fn encode_push_request(method: &str, params: Value) -> Value {
    json!({ "method": method, "params": params })
}

/// NiceHash unsolicited push (`mining.notify`, `mining.set_difficulty`, ...).
pub fn encode_nh_push(
    method: &str,
    params: Value,
    height: Option<&str>,
    algo: Option<&str>,
) -> Value {
    json!({
        "method": method,
        "params": params,
        "height": height,
        "algo": algo,
    })
}

/// EthProxy legacy push: a JSON-RPC 2.0 envelope with a forced `id: 0` for
/// legacy-client compatibility (§4.1).
pub fn encode_ep_push(result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "result": result, "id": 0 })
}

//! Listener & accept loop (C6, §4.6).
//!
//! Grounded on the teacher's `StratumServer::start_server`/`handle_client`
//! (accept loop shape, `tokio::select!` over accept vs. shutdown). TLS
//! wrapping is new — the teacher has no TLS listener — and is grounded on
//! `mimblewimble-grin`'s API/server crates pairing `tokio-rustls` + `rustls`
//! for the same "optional TLS wrapping of a plain listener" shape.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls_pemfile::{certs, private_key};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig as RustlsServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;
use uuid::Uuid;

use crate::codec::{parse_frame, read_frame, StratumRequest};
use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::protocol::{self, ProtocolContext};
use crate::registry::Registry;
use crate::session::Session;
use crate::sharesink::ShareSink;
use crate::transport::Transport;
use crate::utils::logging::LogContext;
use crate::worksource::WorkSource;

/// Runtime settings the listener needs (a view onto §4.9's `stratum.*`
/// keys).
pub struct ListenerConfig {
    pub listen: SocketAddr,
    pub timeout: Duration,
    pub max_conn: usize,
    pub tls: bool,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
}

fn load_tls_acceptor(cert_file: &str, key_file: &str) -> Result<TlsAcceptor> {
    let cert_bytes = std::fs::read(Path::new(cert_file))?;
    let key_bytes = std::fs::read(Path::new(key_file))?;

    let cert_chain: Vec<CertificateDer<'static>> =
        certs(&mut cert_bytes.as_slice()).collect::<std::result::Result<_, _>>()?;
    let key: PrivateKeyDer<'static> = private_key(&mut key_bytes.as_slice())?
        .ok_or_else(|| Error::tls("no private key found in key file"))?;

    let server_config = RustlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| Error::tls(e.to_string()))?;
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Binds and runs the accept loop until the listener itself errors (i.e.
/// until shutdown closes it). Every accepted connection is policy-gated,
/// issued an extranonce, registered, and handed a reader task.
pub async fn run(
    config: ListenerConfig,
    registry: Arc<Registry>,
    policy: Arc<dyn Policy>,
    work_source: Arc<dyn WorkSource>,
    share_sink: Arc<dyn ShareSink>,
    difficulty: u64,
) -> Result<()> {
    let tls_acceptor = if config.tls {
        let cert_file = config
            .cert_file
            .as_deref()
            .ok_or_else(|| Error::config_missing_field("stratum.certFile"))?;
        let key_file = config
            .key_file
            .as_deref()
            .ok_or_else(|| Error::config_missing_field("stratum.keyFile"))?;
        Some(load_tls_acceptor(cert_file, key_file)?)
    } else {
        None
    };

    let listener = TcpListener::bind(config.listen).await?;
    tracing::info!(addr = %config.listen, tls = config.tls, "stratum listener bound");

    // Caps total concurrent live sessions at MAX_CONN; the permit is moved
    // into the connection task and released on session teardown.
    let accept_semaphore = Arc::new(Semaphore::new(config.max_conn));
    let timeout = config.timeout;

    loop {
        let (stream, addr) = listener.accept().await?;
        let ip = addr.ip().to_string();

        if policy.is_banned(&ip).await {
            drop(stream);
            continue;
        }
        if !policy.apply_limit(&ip).await {
            drop(stream);
            continue;
        }

        let permit = match accept_semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                drop(stream);
                continue;
            }
        };

        let transport = match &tls_acceptor {
            Some(acceptor) => match accept_tls(acceptor.clone(), stream).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(%ip, error = %e, "TLS handshake failed");
                    continue;
                }
            },
            None => Transport::Plain(stream),
        };

        let registry = registry.clone();
        let policy = policy.clone();
        let work_source = work_source.clone();
        let share_sink = share_sink.clone();

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = serve_connection(
                transport, ip, timeout, registry, policy, work_source, share_sink, difficulty,
            )
            .await
            {
                tracing::debug!(error = %e, "session ended");
            }
        });
    }
}

async fn accept_tls(acceptor: TlsAcceptor, stream: TcpStream) -> Result<Transport> {
    let tls_stream = acceptor.accept(stream).await.map_err(|e| Error::tls(e.to_string()))?;
    Ok(Transport::Tls(Box::new(tls_stream)))
}

async fn serve_connection(
    transport: Transport,
    ip: String,
    timeout: Duration,
    registry: Arc<Registry>,
    policy: Arc<dyn Policy>,
    work_source: Arc<dyn WorkSource>,
    share_sink: Arc<dyn ShareSink>,
    difficulty: u64,
) -> Result<()> {
    let extranonce = registry.issue_extranonce();
    let (read_half, write_half) = tokio::io::split(transport);
    let session = Arc::new(Session::new(Uuid::new_v4(), ip.clone(), extranonce, write_half));
    registry.register(session.clone());

    let span = LogContext::for_session(&session.id.to_string(), &ip).span("session");
    let result = read_loop(&session, read_half, timeout, &policy, &*work_source, &*share_sink, difficulty)
        .instrument(span)
        .await;

    registry.remove(session.id);
    policy.release(&ip).await;
    result
}

async fn read_loop(
    session: &Arc<Session>,
    read_half: tokio::io::ReadHalf<Transport>,
    timeout: Duration,
    policy: &Arc<dyn Policy>,
    work_source: &dyn WorkSource,
    share_sink: &dyn ShareSink,
    difficulty: u64,
) -> Result<()> {
    let mut reader = BufReader::new(read_half);
    let ctx = ProtocolContext { work_source, share_sink, difficulty };

    loop {
        let deadline = session.deadline(timeout);
        let line = tokio::select! {
            frame = read_frame(&mut reader) => frame,
            _ = tokio::time::sleep_until(deadline) => {
                return Err(Error::Codec(crate::error::CodecError::Eof));
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(e @ crate::error::Error::Codec(crate::error::CodecError::LineTooLong { .. })) => {
                policy.ban(&session.ip).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let value = match parse_frame(&line) {
            Ok(v) => v,
            Err(_) => {
                policy.record_malformed(&session.ip).await;
                return Err(Error::invalid_json("top-level request was not valid JSON"));
            }
        };
        let request = match StratumRequest::from_value(&value) {
            Ok(r) => r,
            Err(_) => {
                policy.record_malformed(&session.ip).await;
                return Err(Error::invalid_json("request missing required fields"));
            }
        };

        session.touch();
        if let Err(e) = protocol::dispatch(session, request, &ctx).await {
            if e.terminates_session() {
                return Err(e);
            }
            tracing::debug!(error = %e, session = %session.id, "handled protocol error, continuing");
        }
    }
}

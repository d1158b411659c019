//! Stratum gateway core — demo binary.
//!
//! Wires the reference in-memory collaborators (`MemoryWorkSource`,
//! `MemoryShareSink`, `MemoryPolicy`) to the listener and broadcaster. A real
//! deployment swaps those three for implementations backed by an actual
//! chain node and a persistence layer; this binary exists to exercise the
//! gateway end to end.

use std::sync::Arc;

use clap::Parser;
use stratum_gateway::broadcaster;
use stratum_gateway::config::{Args, Config};
use stratum_gateway::listener::{self, ListenerConfig};
use stratum_gateway::policy::MemoryPolicy;
use stratum_gateway::registry::Registry;
use stratum_gateway::sharesink::MemoryShareSink;
use stratum_gateway::utils::init_logging;
use stratum_gateway::worksource::MemoryWorkSource;
use stratum_gateway::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let config = Config::load(&args)?;
    if !config.stratum_enabled {
        tracing::info!("stratum.enabled is false, nothing to do");
        return Ok(());
    }

    let registry = Arc::new(Registry::new());
    let policy = Arc::new(MemoryPolicy::default());
    let work_source = Arc::new(MemoryWorkSource::new());
    let share_sink = Arc::new(MemoryShareSink::new());

    let (template_tx, template_rx) = tokio::sync::watch::channel(());
    tokio::spawn(refresh_loop(work_source.clone(), template_tx, config.proxy_block_refresh_interval));
    tokio::spawn(broadcaster::run(registry.clone(), work_source.clone(), template_rx));

    let listener_config = ListenerConfig {
        listen: config.stratum_listen,
        timeout: config.stratum_timeout,
        max_conn: config.stratum_max_conn,
        tls: config.stratum_tls,
        cert_file: config.stratum_cert_file.clone(),
        key_file: config.stratum_key_file.clone(),
    };

    listener::run(listener_config, registry, policy, work_source, share_sink, config.proxy_difficulty).await
}

/// Stand-in for a real upstream poller: ticks a placeholder template on
/// `proxy.blockRefreshInterval` so the demo binary has something to push.
/// A production `WorkSource` replaces this with real node polling/SSE.
async fn refresh_loop(
    work_source: Arc<MemoryWorkSource>,
    notify: tokio::sync::watch::Sender<()>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut height: u64 = 1;
    loop {
        ticker.tick().await;
        let job_bytes: [u8; 32] = rand::random();
        work_source
            .set_template(stratum_gateway::job::BlockTemplate {
                header: format!("0x{}", hex::encode(job_bytes)),
                seed: format!("0x{}", hex::encode(job_bytes)),
                height: format!("0x{height:x}"),
                current_difficulty_hex: "0x4".to_string(),
            })
            .await;
        height += 1;
        let _ = notify.send(());
    }
}

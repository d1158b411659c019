//! Configuration surface (C9, §4.9): `clap`-derived CLI args layered over a
//! `serde`-derived file config, covering exactly the recognized options of
//! spec.md §6.
//!
//! Grounded on the teacher's `config/mod.rs` (`Args` via `clap::Parser`,
//! file loading via the `config` crate, `FromStr` for compound CLI values),
//! trimmed from the teacher's whole-mining-client CLI surface (hash rate,
//! node address, GPU flags, info/license banners) down to this gateway's own
//! `stratum.*`/`proxy.*` keys.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::{Error, Result};

/// CLI flags. Anything left `None` falls through to the file config, then
/// to the hardcoded default.
#[derive(Parser, Debug, Default)]
#[command(name = "stratum-gateway", about = "Multi-dialect Ethereum Stratum gateway core")]
pub struct Args {
    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub stratum_enabled: Option<bool>,

    #[arg(long)]
    pub stratum_listen: Option<String>,

    /// Duration string, e.g. "30s", "2m" (parsed with `humantime`).
    #[arg(long)]
    pub stratum_timeout: Option<String>,

    #[arg(long)]
    pub stratum_max_conn: Option<usize>,

    #[arg(long)]
    pub stratum_tls: Option<bool>,

    #[arg(long)]
    pub stratum_cert_file: Option<String>,

    #[arg(long)]
    pub stratum_key_file: Option<String>,

    #[arg(long)]
    pub proxy_difficulty: Option<u64>,

    #[arg(long)]
    pub proxy_block_refresh_interval: Option<String>,

    #[arg(long)]
    pub proxy_state_update_interval: Option<String>,

    #[arg(long)]
    pub proxy_hashrate_expiration: Option<String>,

    #[arg(long)]
    pub proxy_stratum_hostname: Option<String>,

    /// `json` or `pretty` (§4.10).
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// File-config mirror of the recognized `stratum.*`/`proxy.*` keys.
/// Unrecognized keys in the source file are ignored by `serde`'s default
/// deny-nothing behavior rather than rejected, per §4.9.
#[derive(Deserialize, Debug, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub stratum: StratumFileConfig,
    #[serde(default)]
    pub proxy: ProxyFileConfig,
}

#[derive(Deserialize, Debug, Default)]
pub struct StratumFileConfig {
    pub enabled: Option<bool>,
    pub listen: Option<String>,
    pub timeout: Option<String>,
    #[serde(rename = "maxConn")]
    pub max_conn: Option<usize>,
    pub tls: Option<bool>,
    #[serde(rename = "certFile")]
    pub cert_file: Option<String>,
    #[serde(rename = "keyFile")]
    pub key_file: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ProxyFileConfig {
    pub difficulty: Option<u64>,
    #[serde(rename = "blockRefreshInterval")]
    pub block_refresh_interval: Option<String>,
    #[serde(rename = "stateUpdateInterval")]
    pub state_update_interval: Option<String>,
    #[serde(rename = "hashrateExpiration")]
    pub hashrate_expiration: Option<String>,
    #[serde(rename = "stratumHostname")]
    pub stratum_hostname: Option<String>,
}

/// Fully resolved configuration (CLI over file over default).
#[derive(Debug, Clone)]
pub struct Config {
    pub stratum_enabled: bool,
    pub stratum_listen: SocketAddr,
    pub stratum_timeout: Duration,
    pub stratum_max_conn: usize,
    pub stratum_tls: bool,
    pub stratum_cert_file: Option<String>,
    pub stratum_key_file: Option<String>,
    pub proxy_difficulty: u64,
    pub proxy_block_refresh_interval: Duration,
    pub proxy_state_update_interval: Duration,
    pub proxy_hashrate_expiration: Duration,
    pub proxy_stratum_hostname: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stratum_enabled: true,
            stratum_listen: "0.0.0.0:3333".parse().expect("valid default listen addr"),
            stratum_timeout: Duration::from_secs(60),
            stratum_max_conn: 4096,
            stratum_tls: false,
            stratum_cert_file: None,
            stratum_key_file: None,
            proxy_difficulty: 4_000_000_000,
            proxy_block_refresh_interval: Duration::from_secs(1),
            proxy_state_update_interval: Duration::from_secs(10),
            proxy_hashrate_expiration: Duration::from_secs(600),
            proxy_stratum_hostname: "localhost".to_string(),
        }
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| Error::config_invalid_value(field, value, format!("duration string ({e})")))
}

impl Config {
    /// Loads the file config (if `--config` was given), then overlays any
    /// CLI flags the user actually set, the way the teacher merges `Args`
    /// over file values.
    pub fn load(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => load_file_config(path)?,
            None => FileConfig::default(),
        };
        let mut config = Config::default();

        if let Some(enabled) = args.stratum_enabled.or(file.stratum.enabled) {
            config.stratum_enabled = enabled;
        }
        if let Some(listen) = args.stratum_listen.as_ref().or(file.stratum.listen.as_ref()) {
            config.stratum_listen = listen
                .parse()
                .map_err(|_| Error::config_invalid_value("stratum.listen", listen, "host:port"))?;
        }
        if let Some(timeout) = args.stratum_timeout.as_ref().or(file.stratum.timeout.as_ref()) {
            config.stratum_timeout = parse_duration("stratum.timeout", timeout)?;
        }
        if let Some(max_conn) = args.stratum_max_conn.or(file.stratum.max_conn) {
            config.stratum_max_conn = max_conn;
        }
        if let Some(tls) = args.stratum_tls.or(file.stratum.tls) {
            config.stratum_tls = tls;
        }
        config.stratum_cert_file = args.stratum_cert_file.clone().or(file.stratum.cert_file);
        config.stratum_key_file = args.stratum_key_file.clone().or(file.stratum.key_file);

        if let Some(difficulty) = args.proxy_difficulty.or(file.proxy.difficulty) {
            config.proxy_difficulty = difficulty;
        }
        if let Some(v) =
            args.proxy_block_refresh_interval.as_ref().or(file.proxy.block_refresh_interval.as_ref())
        {
            config.proxy_block_refresh_interval = parse_duration("proxy.blockRefreshInterval", v)?;
        }
        if let Some(v) =
            args.proxy_state_update_interval.as_ref().or(file.proxy.state_update_interval.as_ref())
        {
            config.proxy_state_update_interval = parse_duration("proxy.stateUpdateInterval", v)?;
        }
        if let Some(v) =
            args.proxy_hashrate_expiration.as_ref().or(file.proxy.hashrate_expiration.as_ref())
        {
            config.proxy_hashrate_expiration = parse_duration("proxy.hashrateExpiration", v)?;
        }
        if let Some(hostname) =
            args.proxy_stratum_hostname.as_ref().or(file.proxy.stratum_hostname.as_ref())
        {
            config.proxy_stratum_hostname = hostname.clone();
        }

        if config.stratum_tls && (config.stratum_cert_file.is_none() || config.stratum_key_file.is_none()) {
            return Err(Error::config_missing_field("stratum.certFile/stratum.keyFile"));
        }

        Ok(config)
    }
}

fn load_file_config(path: &str) -> Result<FileConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .build()
        .map_err(|e| Error::config_invalid_value("config", path, e.to_string()))?;
    settings
        .try_deserialize()
        .map_err(|e| Error::config_invalid_value("config", path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_set() {
        let args = Args::default();
        let config = Config::load(&args).unwrap();
        assert!(config.stratum_enabled);
        assert_eq!(config.stratum_max_conn, 4096);
    }

    #[test]
    fn cli_flag_overrides_default() {
        let mut args = Args::default();
        args.stratum_max_conn = Some(10);
        let config = Config::load(&args).unwrap();
        assert_eq!(config.stratum_max_conn, 10);
    }

    #[test]
    fn tls_without_cert_and_key_is_rejected() {
        let mut args = Args::default();
        args.stratum_tls = Some(true);
        assert!(Config::load(&args).is_err());
    }

    #[test]
    fn invalid_listen_address_is_rejected() {
        let mut args = Args::default();
        args.stratum_listen = Some("not-an-address".to_string());
        assert!(Config::load(&args).is_err());
    }
}

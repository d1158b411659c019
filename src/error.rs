//! Error types for the Stratum gateway
//!
//! Layered `thiserror` hierarchy mirroring the kinds enumerated for each
//! failure domain (configuration, codec, protocol, policy, upstream), folded
//! into one top-level [`Error`] so call sites can match on a single type.

use thiserror::Error;

/// Configuration error subtypes.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid value for {field}: {value} (expected {expected})")]
    InvalidValue { field: String, value: String, expected: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("parse error in {file}: {message}")]
    ParseError { file: String, message: String },
}

/// Wire-framing error subtypes (§4.1).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("line exceeds MAX_REQ_SIZE ({limit} bytes)")]
    LineTooLong { limit: usize },

    #[error("invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("connection closed")]
    Eof,
}

/// Protocol-state-machine error subtypes (§4.5).
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("malformed params for {method}: {reason}")]
    MalformedParams { method: String, reason: String },
}

/// Policy-gate error subtypes (§4.4).
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("ip banned: {ip}")]
    Banned { ip: String },

    #[error("connection limit exceeded for {ip}")]
    LimitExceeded { ip: String },
}

/// Upstream collaborator error subtypes (`WorkSource`/`ShareSink`).
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream rejected submission: [{code}] {message}")]
    Rejected { code: String, message: String },

    #[error("upstream unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Top-level gateway error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls { reason: String },

    #[error("error in {context}: {message}")]
    Other { context: String, message: String },
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config_missing_field(field: impl Into<String>) -> Self {
        Self::Config(ConfigError::MissingField { field: field.into() })
    }

    pub fn config_invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::Config(ConfigError::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        })
    }

    pub fn line_too_long(limit: usize) -> Self {
        Self::Codec(CodecError::LineTooLong { limit })
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::Codec(CodecError::InvalidJson { message: message.into() })
    }

    pub fn unknown_method(method: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::UnknownMethod { method: method.into() })
    }

    pub fn malformed_params(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::MalformedParams {
            method: method.into(),
            reason: reason.into(),
        })
    }

    pub fn banned(ip: impl Into<String>) -> Self {
        Self::Policy(PolicyError::Banned { ip: ip.into() })
    }

    pub fn limit_exceeded(ip: impl Into<String>) -> Self {
        Self::Policy(PolicyError::LimitExceeded { ip: ip.into() })
    }

    pub fn upstream_rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream(UpstreamError::Rejected { code: code.into(), message: message.into() })
    }

    pub fn upstream_unavailable(reason: impl Into<String>) -> Self {
        Self::Upstream(UpstreamError::Unavailable { reason: reason.into() })
    }

    pub fn tls(reason: impl Into<String>) -> Self {
        Self::Tls { reason: reason.into() }
    }

    pub fn other(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other { context: context.into(), message: message.into() }
    }

    /// Whether this error terminates the session per §7.
    pub fn terminates_session(&self) -> bool {
        matches!(
            self,
            Error::Codec(_)
                | Error::Io(_)
                | Error::Tls { .. }
                | Error::Protocol(ProtocolError::MalformedParams { .. })
                | Error::Policy(_)
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration",
            Error::Codec(_) => "codec",
            Error::Protocol(_) => "protocol",
            Error::Policy(_) => "policy",
            Error::Upstream(_) => "upstream",
            Error::Json(_) => "serialization",
            Error::Io(_) => "io",
            Error::Tls { .. } => "tls",
            Error::Other { .. } => "other",
        }
    }
}

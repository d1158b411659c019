//! The two Stratum dialects this gateway speaks on one socket.

/// Protocol dialect a session has settled on, detected from its first
/// dialect-selecting message. Transitions exactly once: `Unset -> EthProxy`
/// or `Unset -> NiceHash`, and never flips back (§3 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Unset,
    EthProxy,
    NiceHash,
}

impl Dialect {
    pub fn is_set(self) -> bool {
        !matches!(self, Dialect::Unset)
    }
}

/// `mining.subscribe` selects NiceHash when `params[1]` names the
/// EthereumStratum dialect, or `params[0]` is the GodMiner sentinel.
pub fn subscribe_selects_nicehash(params: &[serde_json::Value]) -> bool {
    let second = params.get(1).and_then(|v| v.as_str());
    let first = params.get(0).and_then(|v| v.as_str());
    second == Some("EthereumStratum/1.0.0") || first == Some("GodMiner/2.0.0")
}

//! Policy gate (C4, §4.4): IP bans, connection limits, malformed-request
//! accounting, applied before protocol parsing.
//!
//! The teacher has no direct abuse-control analogue; this trait is grounded
//! on the "async trait + concurrency-safe struct implementing it" shape of
//! the teacher's `Worker` trait (`workers/mod.rs`), and `MemoryPolicy` uses
//! `dashmap::DashMap`, the teacher's concurrent map of choice for
//! `ServerState::sessions`.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

/// External collaborator consumed by the listener (§6). Implementations own
/// whatever ban/limit store backs a production deployment; this crate only
/// calls through the trait.
#[async_trait]
pub trait Policy: Send + Sync {
    async fn is_banned(&self, ip: &str) -> bool;
    /// `false` means reject the connection (limit exceeded).
    async fn apply_limit(&self, ip: &str) -> bool;
    /// Releases a slot counted by a prior `apply_limit`, called on session
    /// teardown so the per-IP counter tracks live connections, not a
    /// lifetime total.
    async fn release(&self, ip: &str);
    async fn ban(&self, ip: &str);
    async fn record_malformed(&self, ip: &str);
}

/// In-memory reference `Policy` for tests and the demo binary (§4.11).
/// Not a production backend: a real deployment persists bans and limits
/// somewhere durable.
pub struct MemoryPolicy {
    banned: DashSet<String>,
    connections: DashMap<String, AtomicU32>,
    malformed_counts: DashMap<String, AtomicU32>,
    max_connections_per_ip: u32,
    malformed_ban_threshold: u32,
}

impl MemoryPolicy {
    pub fn new(max_connections_per_ip: u32, malformed_ban_threshold: u32) -> Self {
        Self {
            banned: DashSet::new(),
            connections: DashMap::new(),
            malformed_counts: DashMap::new(),
            max_connections_per_ip,
            malformed_ban_threshold,
        }
    }

}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self::new(64, 5)
    }
}

#[async_trait]
impl Policy for MemoryPolicy {
    async fn is_banned(&self, ip: &str) -> bool {
        self.banned.contains(ip)
    }

    async fn apply_limit(&self, ip: &str) -> bool {
        let counter = self.connections.entry(ip.to_string()).or_insert_with(|| AtomicU32::new(0));
        let previous = counter.fetch_add(1, Ordering::SeqCst);
        if previous >= self.max_connections_per_ip {
            counter.fetch_sub(1, Ordering::SeqCst);
            false
        } else {
            true
        }
    }

    async fn release(&self, ip: &str) {
        if let Some(counter) = self.connections.get(ip) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn ban(&self, ip: &str) {
        self.banned.insert(ip.to_string());
    }

    async fn record_malformed(&self, ip: &str) {
        let counter =
            self.malformed_counts.entry(ip.to_string()).or_insert_with(|| AtomicU32::new(0));
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.malformed_ban_threshold {
            drop(counter);
            self.ban(ip).await;
        }
    }
}

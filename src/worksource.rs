//! `WorkSource` collaborator (C11, §6): the upstream block-template and
//! login-validation backend, consumed but not implemented by this crate.
//!
//! Grounded on the teacher's `async_trait`-based `Worker` trait
//! (`workers/mod.rs`) for the shape of "async trait boundary the rest of the
//! crate depends on, implemented by something external to it".

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::job::BlockTemplate;
use crate::session::Session;

/// Reply to a login/authorize attempt, distinct from a hard error: a
/// deliberate "rejected but well-formed" reply vs. an upstream/transport
/// failure (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthOutcome {
    pub accepted: bool,
}

/// The tuple `get_work` hands back; the EthProxy `eth_getWork` reply is this
/// struct flattened to a 4-element array (§3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamWork {
    pub header: String,
    pub seed: String,
    pub difficulty_hex: String,
    pub height_hex: String,
}

/// Upstream block-template source and login validator (§6).
#[async_trait]
pub trait WorkSource: Send + Sync {
    async fn login(&self, address: &str, worker_id: &str) -> Result<AuthOutcome>;
    async fn get_work(&self, session: &Session) -> Result<UpstreamWork>;
    async fn current_template(&self) -> Option<BlockTemplate>;
    async fn is_sick(&self) -> bool;
}

/// In-memory reference `WorkSource` for tests and the demo binary (§4.11).
/// Always accepts logins and serves whatever template was last set.
pub struct MemoryWorkSource {
    template: RwLock<Option<BlockTemplate>>,
    sick: RwLock<bool>,
}

impl MemoryWorkSource {
    pub fn new() -> Self {
        Self { template: RwLock::new(None), sick: RwLock::new(false) }
    }

    pub async fn set_template(&self, template: BlockTemplate) {
        *self.template.write().await = Some(template);
    }

    pub async fn set_sick(&self, sick: bool) {
        *self.sick.write().await = sick;
    }
}

impl Default for MemoryWorkSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkSource for MemoryWorkSource {
    async fn login(&self, _address: &str, _worker_id: &str) -> Result<AuthOutcome> {
        Ok(AuthOutcome { accepted: true })
    }

    async fn get_work(&self, _session: &Session) -> Result<UpstreamWork> {
        let template = self.template.read().await.clone();
        match template {
            Some(t) => Ok(UpstreamWork {
                header: format!("0x{}", crate::hex_util::strip_0x(&t.header)),
                seed: format!("0x{}", crate::hex_util::strip_0x(&t.seed)),
                difficulty_hex: t.current_difficulty_hex,
                height_hex: t.height,
            }),
            None => Err(crate::error::Error::upstream_unavailable("no template set")),
        }
    }

    async fn current_template(&self) -> Option<BlockTemplate> {
        self.template.read().await.clone()
    }

    async fn is_sick(&self) -> bool {
        *self.sick.read().await
    }
}

//! `ShareSink` collaborator (C11, §6): the persistence/accounting backend
//! that validates and records submitted shares.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

/// Result of a share submission. Kept distinct from a hard `Err` so the
/// protocol layer can mirror `Rejected` onto the dialect-specific wire error
/// shape without treating it as a transport failure (§3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected { code: String, message: String },
}

/// A recorded submission, as `ShareSink::submit` received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedShare {
    pub login: String,
    pub worker_id: String,
    pub nonce: String,
    pub seed_hash: String,
    pub header_hash: String,
}

/// Persistence/accounting backend for submitted shares (§6).
#[async_trait]
pub trait ShareSink: Send + Sync {
    async fn submit(
        &self,
        login: &str,
        worker_id: &str,
        nonce: &str,
        seed_hash: &str,
        header_hash: &str,
    ) -> Result<SubmitOutcome>;
}

/// In-memory reference `ShareSink` for tests and the demo binary (§4.11):
/// accepts everything, records submissions for assertions.
#[derive(Default)]
pub struct MemoryShareSink {
    shares: Mutex<Vec<SubmittedShare>>,
}

impl MemoryShareSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded(&self) -> Vec<SubmittedShare> {
        self.shares.lock().await.clone()
    }
}

#[async_trait]
impl ShareSink for MemoryShareSink {
    async fn submit(
        &self,
        login: &str,
        worker_id: &str,
        nonce: &str,
        seed_hash: &str,
        header_hash: &str,
    ) -> Result<SubmitOutcome> {
        self.shares.lock().await.push(SubmittedShare {
            login: login.to_string(),
            worker_id: worker_id.to_string(),
            nonce: nonce.to_string(),
            seed_hash: seed_hash.to_string(),
            header_hash: header_hash.to_string(),
        });
        Ok(SubmitOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_submitted_shares() {
        let sink = MemoryShareSink::new();
        let outcome = sink.submit("0xabc", "rig1", "nonce1", "seed", "header").await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Accepted);
        let recorded = sink.recorded().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].login, "0xabc");
    }
}

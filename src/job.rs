//! Job / block-template data types (§3).
//!
//! Grounded on the teacher's `workers/stratum/job.rs` (`MiningJob`, job-id
//! generation), with the Kadena-specific `ChainId`/`Target`/`Work` fields
//! dropped: this gateway never validates proof-of-work, it only relays the
//! header/seed/height triple `WorkSource` hands it.

use rand::Rng;

use crate::hex_util::strip_0x;

/// Block template as observed from the upstream `WorkSource`. Hex fields may
/// arrive with or without a `0x` prefix; normalized on entry into a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub header: String,
    pub seed: String,
    pub height: String,
    pub current_difficulty_hex: String,
}

/// One job handed to a session: a `(seed, header, height)` triple identified
/// by a server-chosen `job_id`. Hashes are stored **without** a `0x` prefix
/// (§3), height is kept exactly as the template supplied it since it is only
/// ever echoed back in `heightHex` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDetails {
    pub job_id: String,
    pub seed_hash: String,
    pub header_hash: String,
    pub height: String,
}

impl JobDetails {
    /// Builds a fresh job from a template, generating a new 8-hex `job_id`
    /// and stripping any `0x` prefix from seed/header.
    pub fn from_template(template: &BlockTemplate) -> Self {
        Self {
            job_id: generate_job_id(),
            seed_hash: strip_0x(&template.seed).to_string(),
            header_hash: strip_0x(&template.header).to_string(),
            height: template.height.clone(),
        }
    }

    /// The cached entry stored in a session's `stale_jobs` map: just enough
    /// to re-validate a late `mining.submit` (§4.3).
    pub fn as_stale_entry(&self) -> StaleJobEntry {
        StaleJobEntry { seed_hash: self.seed_hash.clone(), header_hash: self.header_hash.clone() }
    }
}

/// Cached seed/header for a job that is no longer the active one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleJobEntry {
    pub seed_hash: String,
    pub header_hash: String,
}

/// Fresh 8-hex-char random `job_id`, one per miner per push (§3).
pub fn generate_job_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 4] = rng.random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_template_strips_0x_prefix() {
        let template = BlockTemplate {
            header: "0xdead".into(),
            seed: "0xbeef".into(),
            height: "0x10".into(),
            current_difficulty_hex: "0x4".into(),
        };
        let job = JobDetails::from_template(&template);
        assert_eq!(job.header_hash, "dead");
        assert_eq!(job.seed_hash, "beef");
        assert_eq!(job.height, "0x10");
        assert_eq!(job.job_id.len(), 8);
    }

    #[test]
    fn job_id_is_random_hex() {
        let a = generate_job_id();
        let b = generate_job_id();
        assert_eq!(a.len(), 8);
        assert!(hex::decode(&a).is_ok());
        assert_ne!(a, b, "two job ids should not collide in practice");
    }
}

//! Process-wide extranonce RNG (§4.2, §9 "Global RNG" design note).
//!
//! The teacher's nonce generation (`generate_extranonce1` in
//! `workers/stratum/server.rs`) reseeds from OS entropy on every call. The
//! spec calls this out as a bug on fast accept paths, so this module seeds
//! one `StdRng` at process start and reuses it behind a mutex instead.

use std::sync::OnceLock;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

static RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();

fn rng() -> &'static Mutex<StdRng> {
    RNG.get_or_init(|| Mutex::new(StdRng::from_os_rng()))
}

/// A candidate 4-hex-char lowercase extranonce. Collision against
/// already-issued values is the caller's responsibility (see
/// [`crate::registry::Registry::issue_extranonce`]).
pub fn random_hex4() -> String {
    random_hex_n(2)
}

/// `n_bytes * 2` lowercase hex characters from the shared seeded generator,
/// e.g. the 16-char subscription id in the `mining.subscribe` reply.
pub fn random_hex_n(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rng().lock().fill(bytes.as_mut_slice());
    hex::encode(bytes)
}

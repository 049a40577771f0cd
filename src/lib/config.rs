//! Process-level configuration derived from the environment, in the same
//! spirit as `p-vector`'s `config.rs` centralizing environment-derived
//! settings even though what's configured here is much smaller: there is no
//! config *file* for this service, only the one request on stdin plus a
//! couple of environment overrides (§6).

use std::env;

/// `OVERWRITE_CACHE_DIR` locks clients out of choosing the cache root
/// (§4.2) — this closes a path-injection vector when the service runs under
/// a privileged caller.
const OVERWRITE_CACHE_DIR_VAR: &str = "OVERWRITE_CACHE_DIR";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub overwrite_cache_dir: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            overwrite_cache_dir: env::var(OVERWRITE_CACHE_DIR_VAR)
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

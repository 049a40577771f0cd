//! Cache Directory Resolver (§4.2).
//!
//! Resolution order: an environment override always wins and is
//! arch-partitioned; otherwise the request's `cachedir` is used verbatim.
//! Once resolved, the cache root is immutable for the remainder of the
//! request (it's handed around by value / shared reference from here on,
//! never re-derived).

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::err::{Res, SolveError};

pub fn resolve(config: &Config, cachedir: Option<&str>, arch: &str) -> Res<PathBuf> {
    let root = if let Some(ref overwrite) = config.overwrite_cache_dir {
        Path::new(overwrite).join(arch)
    } else {
        match cachedir {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => return Err(SolveError::generic("No cache dir set")),
        }
    };

    if root.as_os_str().is_empty() {
        return Err(SolveError::generic("No cache dir set"));
    }

    Ok(root)
}

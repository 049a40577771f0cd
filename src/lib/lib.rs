//! Crate root: wires the §4 pipeline order — Validator, Cache Resolver,
//! Repository Loader + GPG Materializer, Metadata Sack, Query Engine /
//! Transaction Resolver, Response Emitter — behind one entry point,
//! [`run`].
//!
//! Every component past the Validator is fallible with a tagged
//! [`err::SolveError`]; `run` is the single place that catches, classifies,
//! and logs one (§7 "Propagation").

pub mod cache;
pub mod config;
pub mod err;
pub mod evr;
pub mod gpgkey;
pub mod log;
pub mod query;
pub mod repo;
pub mod request;
pub mod resolve;
pub mod response;
pub mod sack;
pub mod util;

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use slog::{info, Logger};

use err::{Res, SolveError};
use query::PackageEntry;
use request::Command;
use sack::{HttpSource, ResolvedRepo, SackConfig};
use util::lock::DirLock;

/// Run one request end to end. Always returns a JSON document to write to
/// stdout, plus the process exit code — never panics on a malformed or
/// infeasible request (§4.7, §7).
pub fn run(raw_request: &str) -> (Value, i32) {
    let logger = log::root_logger();
    match execute(raw_request, &logger) {
        Ok(value) => (value, 0),
        Err(e) => {
            // §4.7: "<Kind>: <reason>" on stderr, independent of whatever
            // structured logging this component also produced.
            eprintln!("{}: {}", e.kind, e.reason);
            (response::error_response(&e), 1)
        }
    }
}

fn execute(raw_request: &str, logger: &Logger) -> Res<Value> {
    let validated = request::validate(raw_request)?;
    info!(logger, "request validated"; "command" => format!("{:?}", validated.command));

    let config = config::Config::from_env();
    let cache_root = cache::resolve(&config, validated.cachedir.as_deref(), &validated.arch)?;

    let repos = repo::load(
        &validated.arguments.repos,
        validated.arguments.root_dir.as_deref(),
        &validated.arch,
        &validated.releasever,
    )?;
    let root_dir_path = validated.arguments.root_dir.as_ref().map(Path::new);

    let persistdir = gpgkey::Persistdir::new()?;
    let http = HttpSource::new(validated.proxy.as_deref())?;

    // The cache root is shared across invocations for the same architecture
    // (§5); hold an advisory lock for the duration of metadata fetch/parse
    // so two solver processes don't race writing the same repo's cache.
    let _lock = DirLock::acquire(&cache_root)?;

    let mut repomd_bytes = HashMap::new();
    let mut resolved_repos: Vec<ResolvedRepo> = Vec::new();
    for descriptor in &repos {
        // Materialize inline gpgkeys to files before the metadata fetch, the
        // same way the solver mutates engine-wide gpgkey config ahead of a
        // sync (§4.4 direction 1); this crate's own sack never reads them
        // back, but any gpgcheck-capable engine substituted in would.
        gpgkey::materialize_for_sack(&descriptor.gpgkey_sources(), &persistdir)?;

        let (base_url, bytes) = sack::select_mirror(descriptor, &http)?;
        repomd_bytes.insert(descriptor.id.clone(), bytes);
        resolved_repos.push(ResolvedRepo {
            descriptor: descriptor.clone(),
            base_url,
        });
    }

    let sack_config = SackConfig::new(cache_root);
    let built_sack = sack::load(&resolved_repos, &repomd_bytes, &sack_config, &http)?;
    info!(logger, "sack built"; "packages" => built_sack.all().len());

    match validated.command {
        Command::Dump => {
            let entries = query::dump(&built_sack);
            Ok(response::entries_response(&entries))
        }
        Command::Search => {
            let search_spec = validated
                .arguments
                .search
                .as_ref()
                .expect("validate() requires 'search' for the search command");
            let results = query::search(&built_sack, &search_spec.packages, search_spec.latest);
            let entries: Vec<PackageEntry> = results.into_iter().map(PackageEntry::from).collect();
            Ok(response::entries_response(&entries))
        }
        Command::Depsolve => {
            let forward = resolve::run(&built_sack, &validated.arguments.transactions)?;
            info!(logger, "transactions resolved"; "forward_actions" => forward.len());
            response::depsolve_response(&forward, &resolved_repos, http.client(), root_dir_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_json(id: &str) -> String {
        format!(
            r#"{{"id":"{}","baseurl":["http://127.0.0.1:1/repo"]}}"#,
            id
        )
    }

    #[test]
    fn invalid_request_short_circuits_before_any_io() {
        let raw = r#"{"command":"dump","arch":"","module_platform_id":"p","releasever":"9","arguments":{"repos":[]}}"#;
        let (value, code) = run(raw);
        assert_eq!(code, 1);
        assert_eq!(value["kind"], "InvalidRequest");
    }

    #[test]
    fn unreachable_repo_surfaces_as_repo_error() {
        let cache_dir = std::env::temp_dir().join(format!("depsolve-test-cache-{}", std::process::id()));
        let raw = format!(
            r#"{{"command":"dump","arch":"x86_64","module_platform_id":"p","releasever":"9","cachedir":"{}","arguments":{{"repos":[{}]}}}}"#,
            cache_dir.display(),
            repo_json("r1")
        );
        let (value, code) = run(&raw);
        assert_eq!(code, 1);
        assert_eq!(value["kind"], "RepoError");
    }
}

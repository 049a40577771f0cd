//! The wire schema (§6) and the Request Validator (§4.1).
//!
//! Validation is purely structural and precedes any filesystem or network
//! access: everything here is infallible I/O-wise, only `serde`/our own
//! checks can fail it. Past this module, no other component asks "is this
//! key present" — optional fields are already resolved to concrete defaults
//! (Design Note "Dynamic typing of the request").

use serde::Deserialize;
use serde_json::Value;

use crate::err::{Res, SolveError};
use crate::repo::RepoDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Dump,
    Depsolve,
    Search,
}

/// Raw top-level request, deserialized directly from stdin.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub command: Command,
    pub arch: String,
    pub module_platform_id: String,
    pub releasever: String,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub cachedir: Option<String>,
    #[serde(default)]
    pub arguments: Value,
}

/// A package-spec search term for `search: {latest: bool}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSpec {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub latest: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionSpec {
    #[serde(rename = "package-specs", default)]
    pub package_specs: Vec<String>,
    #[serde(rename = "exclude-specs", default)]
    pub exclude_specs: Vec<String>,
    #[serde(rename = "repo-ids", default)]
    pub repo_ids: Vec<String>,
    #[serde(default)]
    pub install_weak_deps: bool,
}

/// `arguments` after schema validation but before per-command interpretation.
#[derive(Debug, Clone, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub repos: Vec<RepoDescriptor>,
    #[serde(default)]
    pub root_dir: Option<String>,
    #[serde(default)]
    pub transactions: Vec<TransactionSpec>,
    pub search: Option<SearchSpec>,
}

/// The normalized, post-validation request every downstream component works
/// against.
#[derive(Debug, Clone)]
pub struct Validated {
    pub command: Command,
    pub arch: String,
    pub module_platform_id: String,
    pub releasever: String,
    pub proxy: Option<String>,
    pub cachedir: Option<String>,
    pub arguments: Arguments,
}

/// Parse and validate a raw JSON request string. Fails with `InvalidRequest`
/// before any I/O, per §4.1.
pub fn validate(raw: &str) -> Res<Validated> {
    let req: Request = serde_json::from_str(raw)
        .map_err(|e| SolveError::invalid_request(format!("malformed request: {}", e)))?;

    if req.arch.trim().is_empty() {
        return Err(SolveError::invalid_request("'arch' must not be empty"));
    }
    if req.module_platform_id.trim().is_empty() {
        return Err(SolveError::invalid_request(
            "'module_platform_id' must not be empty",
        ));
    }
    if req.releasever.trim().is_empty() {
        return Err(SolveError::invalid_request(
            "'releasever' must not be empty",
        ));
    }
    if req.arguments.is_null() {
        return Err(SolveError::invalid_request("'arguments' is required"));
    }

    let arguments: Arguments = serde_json::from_value(req.arguments)
        .map_err(|e| SolveError::invalid_request(format!("invalid 'arguments': {}", e)))?;

    if arguments.repos.is_empty() && arguments.root_dir.is_none() {
        return Err(SolveError::invalid_request(
            "no 'repos' or 'root_dir' specified",
        ));
    }

    match req.command {
        Command::Search => {
            let spec = arguments
                .search
                .as_ref()
                .ok_or_else(|| SolveError::invalid_request("'search' arguments are required"))?;
            if spec.packages.is_empty() {
                return Err(SolveError::invalid_request(
                    "'search.packages' must not be empty",
                ));
            }
        }
        Command::Depsolve => {
            if arguments.transactions.is_empty() {
                return Err(SolveError::invalid_request(
                    "'transactions' must not be empty",
                ));
            }
        }
        Command::Dump => {}
    }

    Ok(Validated {
        command: req.command,
        arch: req.arch,
        module_platform_id: req.module_platform_id,
        releasever: req.releasever,
        proxy: req.proxy,
        cachedir: req.cachedir,
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(command: &str, arguments: &str) -> String {
        format!(
            r#"{{"command":"{}","arch":"x86_64","module_platform_id":"platform:el9","releasever":"9","arguments":{}}}"#,
            command, arguments
        )
    }

    #[test]
    fn rejects_missing_repos_and_root_dir() {
        let raw = base("depsolve", r#"{"transactions":[{"package-specs":["a"]}]}"#);
        let err = validate(&raw).unwrap_err();
        assert_eq!(err.kind, crate::err::ErrorKind::InvalidRequest);
        assert!(err.reason.contains("no 'repos' or 'root_dir'"));
    }

    #[test]
    fn rejects_empty_arch() {
        let raw = r#"{"command":"dump","arch":"","module_platform_id":"platform:el9","releasever":"9","arguments":{"repos":[]}}"#;
        let err = validate(raw).unwrap_err();
        assert_eq!(err.kind, crate::err::ErrorKind::InvalidRequest);
    }

    #[test]
    fn accepts_minimal_dump_with_root_dir() {
        let raw = base("dump", r#"{"root_dir":"/img"}"#);
        let v = validate(&raw).unwrap();
        assert_eq!(v.command, Command::Dump);
        assert_eq!(v.arguments.root_dir.as_deref(), Some("/img"));
    }

    #[test]
    fn search_requires_packages() {
        let raw = base(
            "search",
            r#"{"root_dir":"/img","search":{"packages":[],"latest":false}}"#,
        );
        let err = validate(&raw).unwrap_err();
        assert_eq!(err.kind, crate::err::ErrorKind::InvalidRequest);
    }
}

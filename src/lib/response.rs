//! Response Emitter & Error Classifier (§4.7).
//!
//! Builds the single JSON document written to stdout: on success, the
//! command's result object; on failure, `{"kind": <K>, "reason": <R>}`
//! (after the `"<Kind>: <reason>"` line has gone to stderr). `depsolve`'s
//! response additionally echoes every repo that sourced a resolved package,
//! with its `gpgkeys` dereferenced back to key text (§4.4 direction 2) —
//! never a URL or path.

use std::path::Path;

use indexmap::IndexMap;
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::err::{Res, SolveError};
use crate::gpgkey;
use crate::query::PackageEntry;
use crate::repo::RepoDescriptor;
use crate::sack::{Package, ResolvedRepo};

/// A single resolved package, as emitted in `depsolve`'s `packages` (§3).
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPackage {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub repo_id: String,
    pub path: String,
    pub remote_location: String,
    pub checksum: String,
}

/// A full echo of the repository that sourced a resolved package, with
/// `gpgkeys` resolved to key text (§3 ResponseRepo).
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRepo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseurl: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metalink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrorlist: Option<String>,
    pub sslverify: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslcacert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslclientkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslclientcert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpgcheck: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_gpgcheck: Option<bool>,
    pub module_hotfixes: Option<bool>,
    /// Key bodies, never URLs or paths (§3 invariant, §8 invariant #3).
    pub gpgkeys: Vec<String>,
}

fn resolved_package(pkg: &Package, base_url: &url::Url) -> Res<ResolvedPackage> {
    let remote_location = base_url
        .join(&pkg.location)
        .map_err(|e| SolveError::repo(format!("bad package location: {}", e)))?;
    Ok(ResolvedPackage {
        name: pkg.name.clone(),
        epoch: pkg.evr.epoch,
        version: pkg.evr.version.clone(),
        release: pkg.evr.release.clone(),
        arch: pkg.arch.clone(),
        repo_id: pkg.repo_id.clone(),
        path: pkg.location.clone(),
        remote_location: remote_location.to_string(),
        checksum: format!("{}:{}", pkg.checksum_algo, pkg.checksum_hex),
    })
}

fn response_repo(
    descriptor: &RepoDescriptor,
    client: &Client,
    root_dir: Option<&Path>,
) -> Res<ResponseRepo> {
    let mut gpgkeys = Vec::new();
    for source in descriptor.gpgkey_sources() {
        let text = match &source {
            crate::repo::GpgKeySource::Inline(text) => text.clone(),
            crate::repo::GpgKeySource::Url(url) => {
                gpgkey::read_key_text(client, url, root_dir, descriptor.request_sourced)?
            }
        };
        gpgkeys.push(text);
    }

    Ok(ResponseRepo {
        id: descriptor.id.clone(),
        name: descriptor.name.clone(),
        baseurl: descriptor.baseurl.clone(),
        metalink: descriptor.metalink.clone(),
        mirrorlist: descriptor.mirrorlist.clone(),
        sslverify: descriptor.sslverify,
        sslcacert: descriptor.sslcacert.clone(),
        sslclientkey: descriptor.sslclientkey.clone(),
        sslclientcert: descriptor.sslclientcert.clone(),
        gpgcheck: descriptor.gpgcheck,
        repo_gpgcheck: descriptor.repo_gpgcheck,
        module_hotfixes: descriptor.module_hotfixes,
        gpgkeys,
    })
}

/// Build the `depsolve` response body: `packages` plus exactly the repos
/// that sourced one of them (§4.6).
pub fn depsolve_response(
    forward: &[&Package],
    resolved_repos: &[ResolvedRepo],
    client: &Client,
    root_dir: Option<&Path>,
) -> Res<Value> {
    let mut packages = Vec::with_capacity(forward.len());
    for pkg in forward {
        let repo = resolved_repos
            .iter()
            .find(|r| r.descriptor.id == pkg.repo_id)
            .ok_or_else(|| {
                SolveError::generic(format!(
                    "resolved package '{}' has no matching repo '{}'",
                    pkg.nevra(),
                    pkg.repo_id
                ))
            })?;
        packages.push(resolved_package(pkg, &repo.base_url)?);
    }

    let mut repos: IndexMap<String, ResponseRepo> = IndexMap::new();
    for pkg in forward {
        if repos.contains_key(&pkg.repo_id) {
            continue;
        }
        let repo = resolved_repos
            .iter()
            .find(|r| r.descriptor.id == pkg.repo_id)
            .expect("checked above when building packages");
        repos.insert(
            pkg.repo_id.clone(),
            response_repo(&repo.descriptor, client, root_dir)?,
        );
    }

    Ok(json!({ "packages": packages, "repos": repos }))
}

/// Build the `dump` / `search` response body: just a package list.
pub fn entries_response(entries: &[PackageEntry]) -> Value {
    json!({ "packages": entries })
}

/// `{"kind": <K>, "reason": <R>}` (§4.7, §7).
pub fn error_response(err: &SolveError) -> Value {
    json!({ "kind": err.kind.to_string(), "reason": err.reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evr::Evr;
    use crate::repo::RepoDescriptor;
    use url::Url;

    fn descriptor(id: &str) -> RepoDescriptor {
        RepoDescriptor {
            id: id.to_string(),
            name: Some("Test".to_string()),
            baseurl: Some(vec!["https://example.com/repo".to_string()]),
            metalink: None,
            mirrorlist: None,
            sslverify: true,
            sslcacert: None,
            sslclientkey: None,
            sslclientcert: None,
            gpgcheck: Some(true),
            repo_gpgcheck: None,
            gpgkey: None,
            gpgkeys: vec![
                "-----BEGIN PGP PUBLIC KEY BLOCK-----\nabc\n-----END PGP PUBLIC KEY BLOCK-----\n"
                    .to_string(),
            ],
            metadata_expire: "20s".to_string(),
            module_hotfixes: None,
            request_sourced: true,
        }
    }

    fn pkg(repo: &str) -> Package {
        Package {
            repo_id: repo.to_string(),
            name: "a".to_string(),
            evr: Evr::new(0, "1", "1"),
            arch: "x86_64".to_string(),
            summary: String::new(),
            description: String::new(),
            url: String::new(),
            license: String::new(),
            buildtime: 0,
            checksum_algo: "sha256".to_string(),
            checksum_hex: "deadbeef".to_string(),
            location: "Packages/a-1-1.x86_64.rpm".to_string(),
            provides: vec![],
            requires: vec![],
        }
    }

    #[test]
    fn gpgkeys_in_response_are_key_text_not_urls() {
        let desc = descriptor("r1");
        let client = Client::new();
        let repo = response_repo(&desc, &client, None).unwrap();
        assert!(repo.gpgkeys[0].starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));
    }

    #[test]
    fn depsolve_response_includes_only_repos_backing_resolved_packages() {
        let p = pkg("r1");
        let resolved_repos = vec![ResolvedRepo {
            descriptor: descriptor("r1"),
            base_url: Url::parse("https://example.com/repo/").unwrap(),
        }];
        let client = Client::new();
        let forward = vec![&p];
        let value = depsolve_response(&forward, &resolved_repos, &client, None).unwrap();
        let repos = value.get("repos").unwrap().as_object().unwrap();
        assert_eq!(repos.len(), 1);
        assert!(repos.contains_key("r1"));
        let packages = value.get("packages").unwrap().as_array().unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0]["checksum"], "sha256:deadbeef");
    }

    #[test]
    fn error_response_has_kind_and_reason() {
        let err = SolveError::invalid_request("bad");
        let value = error_response(&err);
        assert_eq!(value["kind"], "InvalidRequest");
        assert_eq!(value["reason"], "bad");
    }
}

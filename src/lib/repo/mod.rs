//! Repository Descriptor Loader (§4.3).
//!
//! Phase A materializes repos given directly in the request (`arguments.repos`),
//! tagging them as request-sourced. Phase B, only when `root_dir` is set,
//! additionally loads `.repo` files from `<root>/etc/yum.repos.d/`,
//! substituting variables from `<root>/etc/{yum,dnf}/vars/`, and rewrites
//! TLS/GPG file paths for repos it discovers (never for request-sourced ones,
//! which are host-absolute by contract).

pub mod reposdir;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::err::{Res, SolveError};

/// Which of `baseurl` / `metalink` / `mirrorlist` a repo was configured with.
/// Exactly one must be present per §3/§4.3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RepoSource {
    BaseUrl(Vec<String>),
    Metalink(String),
    Mirrorlist(String),
}

/// A single `gpgkeys` entry, classified by the PEM header probe (Design Note
/// "Inline-vs-URL polymorphism of `gpgkeys`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpgKeySource {
    Inline(String),
    Url(String),
}

const PEM_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";

impl GpgKeySource {
    pub fn classify(raw: &str) -> Self {
        if raw.trim_start().starts_with(PEM_HEADER) {
            GpgKeySource::Inline(raw.to_string())
        } else {
            GpgKeySource::Url(raw.to_string())
        }
    }
}

fn default_metadata_expire() -> String {
    "20s".to_string()
}

fn default_sslverify() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepoDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub baseurl: Option<Vec<String>>,
    #[serde(default)]
    pub metalink: Option<String>,
    #[serde(default)]
    pub mirrorlist: Option<String>,
    #[serde(default = "default_sslverify")]
    pub sslverify: bool,
    #[serde(default)]
    pub sslcacert: Option<String>,
    #[serde(default)]
    pub sslclientkey: Option<String>,
    #[serde(default)]
    pub sslclientcert: Option<String>,
    #[serde(default)]
    pub gpgcheck: Option<bool>,
    #[serde(default)]
    pub repo_gpgcheck: Option<bool>,
    #[serde(default)]
    pub gpgkey: Option<String>,
    #[serde(default)]
    pub gpgkeys: Vec<String>,
    #[serde(default = "default_metadata_expire")]
    pub metadata_expire: String,
    #[serde(default)]
    pub module_hotfixes: Option<bool>,

    /// Phase A repos are request-sourced; Phase B repos are not. Drives the
    /// `root_dir` path-rewriting rule and the response's echoed key text
    /// lookup (§4.3, §4.4). Not part of the wire format.
    #[serde(skip, default = "request_sourced_default")]
    pub request_sourced: bool,
}

fn request_sourced_default() -> bool {
    true
}

impl RepoDescriptor {
    /// Validate and classify which of baseurl/metalink/mirrorlist is set.
    pub fn source(&self) -> Res<RepoSource> {
        match (&self.baseurl, &self.metalink, &self.mirrorlist) {
            (Some(urls), None, None) => Ok(RepoSource::BaseUrl(urls.clone())),
            (None, Some(m), None) => Ok(RepoSource::Metalink(m.clone())),
            (None, None, Some(m)) => Ok(RepoSource::Mirrorlist(m.clone())),
            _ => Err(SolveError::invalid_request(format!(
                "repo '{}' must set exactly one of baseurl, metalink, mirrorlist",
                self.id
            ))),
        }
    }

    pub fn gpgkey_sources(&self) -> Vec<GpgKeySource> {
        let mut out: Vec<GpgKeySource> = self.gpgkeys.iter().map(|s| GpgKeySource::classify(s)).collect();
        if let Some(single) = &self.gpgkey {
            out.push(GpgKeySource::classify(single));
        }
        out
    }

    /// Prefix `sslcacert`/`sslclientcert`/`sslclientkey` with `root` when
    /// this repo came from `root_dir`'s repo files (never for
    /// request-sourced repos — those are host-absolute, §3 RootDir).
    fn rewrite_tls_paths(&mut self, root: &Path) {
        if self.request_sourced {
            return;
        }
        for field in [
            &mut self.sslcacert,
            &mut self.sslclientcert,
            &mut self.sslclientkey,
        ] {
            if let Some(path) = field {
                if path.starts_with('/') {
                    *field = Some(root.join(path.trim_start_matches('/')).to_string_lossy().into_owned());
                }
            }
        }
    }
}

/// Phase A + Phase B, per §4.3. `arch`/`releasever` come from the validated
/// request and are always available to `.repo` file substitution as
/// `$basearch`/`$releasever`, the same as real dnf -- a vars file can still
/// override either by defining a file literally named `basearch`/`releasever`.
pub fn load(
    request_repos: &[RepoDescriptor],
    root_dir: Option<&str>,
    arch: &str,
    releasever: &str,
) -> Res<Vec<RepoDescriptor>> {
    let mut repos: Vec<RepoDescriptor> = request_repos
        .iter()
        .cloned()
        .map(|mut r| {
            r.request_sourced = true;
            r
        })
        .collect();

    for r in &repos {
        r.source()?;
    }

    if let Some(root) = root_dir {
        let root = Path::new(root);
        let mut vars = std::collections::HashMap::new();
        vars.insert("basearch".to_string(), arch.to_string());
        vars.insert("releasever".to_string(), releasever.to_string());
        vars.extend(reposdir::load_vars(root));
        let repos_dir = root.join("etc/yum.repos.d");
        let request_ids: std::collections::HashSet<&str> =
            repos.iter().map(|r| r.id.as_str()).collect();

        let mut discovered = reposdir::load_repo_files(&repos_dir, &vars)?;
        for repo in &mut discovered {
            if request_ids.contains(repo.id.as_str()) {
                continue;
            }
            repo.request_sourced = false;
            repo.rewrite_tls_paths(root);
        }
        // Request-sourced repos win over anything discovered with the same id.
        discovered.retain(|r| !request_ids.contains(r.id.as_str()));
        repos.extend(discovered);
    }

    for r in &repos {
        r.source()?;
    }

    Ok(repos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_repo(id: &str) -> RepoDescriptor {
        RepoDescriptor {
            id: id.to_string(),
            name: None,
            baseurl: Some(vec!["https://example.com/repo".to_string()]),
            metalink: None,
            mirrorlist: None,
            sslverify: true,
            sslcacert: None,
            sslclientkey: None,
            sslclientcert: None,
            gpgcheck: None,
            repo_gpgcheck: None,
            gpgkey: None,
            gpgkeys: vec![],
            metadata_expire: default_metadata_expire(),
            module_hotfixes: None,
            request_sourced: true,
        }
    }

    #[test]
    fn exactly_one_source_required() {
        let mut r = base_repo("x");
        r.baseurl = None;
        assert!(r.source().is_err());

        let mut r = base_repo("x");
        r.metalink = Some("https://example.com/ml".to_string());
        assert!(r.source().is_err()); // both baseurl and metalink set
    }

    #[test]
    fn classifies_inline_vs_url_keys() {
        let pem = "-----BEGIN PGP PUBLIC KEY BLOCK-----\nabc\n-----END PGP PUBLIC KEY BLOCK-----\n";
        assert_eq!(GpgKeySource::classify(pem), GpgKeySource::Inline(pem.to_string()));
        assert_eq!(
            GpgKeySource::classify("https://example.com/key"),
            GpgKeySource::Url("https://example.com/key".to_string())
        );
    }

    #[test]
    fn default_metadata_expire_is_20s() {
        let json = r#"{"id":"x","baseurl":["https://example.com"]}"#;
        let r: RepoDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(r.metadata_expire, "20s");
        assert!(r.sslverify);
    }
}

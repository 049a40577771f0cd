//! Query Engine: `dump` and `search` (§4.5/§4.6).

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::sack::{Package, Sack};

/// The full package descriptor `dump` emits for every available package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageEntry {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub url: String,
    pub repo_id: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub buildtime: String,
    pub license: String,
}

fn render_buildtime(unix_ts: i64) -> String {
    // Buildtimes are whole-second unix timestamps, so `Rfc3339` already
    // yields exactly the "YYYY-MM-DDTHH:MM:SSZ" shape §4.5 specifies.
    OffsetDateTime::from_unix_timestamp(unix_ts)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}

impl From<&Package> for PackageEntry {
    fn from(p: &Package) -> Self {
        PackageEntry {
            name: p.name.clone(),
            summary: p.summary.clone(),
            description: p.description.clone(),
            url: p.url.clone(),
            repo_id: p.repo_id.clone(),
            epoch: p.evr.epoch,
            version: p.evr.version.clone(),
            release: p.evr.release.clone(),
            arch: p.arch.clone(),
            buildtime: render_buildtime(p.buildtime),
            license: p.license.clone(),
        }
    }
}

/// `dump`: every available package, full descriptors.
pub fn dump(sack: &Sack) -> Vec<PackageEntry> {
    sack.all().iter().map(PackageEntry::from).collect()
}

pub(crate) enum Matcher {
    Exact(String),
    Substring(String),
    Glob(Regex),
}

pub(crate) fn classify(pattern: &str) -> Matcher {
    if !pattern.contains('*') {
        Matcher::Exact(pattern.to_string())
    } else if pattern.starts_with('*') && pattern.ends_with('*') && pattern.len() > 1 {
        Matcher::Substring(pattern[1..pattern.len() - 1].to_string())
    } else {
        let mut regex_src = String::from("^");
        for ch in pattern.chars() {
            match ch {
                '*' => regex_src.push_str(".*"),
                c => regex_src.push_str(&regex::escape(&c.to_string())),
            }
        }
        regex_src.push('$');
        Matcher::Glob(Regex::new(&regex_src).expect("generated glob regex is always valid"))
    }
}

impl Matcher {
    fn matches(&self, name: &str) -> bool {
        match self {
            Matcher::Exact(s) => name == s,
            Matcher::Substring(s) => name.contains(s.as_str()),
            Matcher::Glob(re) => re.is_match(name),
        }
    }
}

/// `search`: pattern classification + optional reduction to the latest NEVRA
/// per name (§4.5). Matches across patterns are concatenated in input order
/// and not deduped.
pub fn search<'a>(sack: &'a Sack, patterns: &[String], latest: bool) -> Vec<&'a Package> {
    let mut results: Vec<&Package> = Vec::new();
    for pattern in patterns {
        let matcher = classify(pattern);
        let mut matched: Vec<&Package> = sack
            .all()
            .iter()
            .filter(|p| matcher.matches(&p.name))
            .collect();
        if latest {
            matched = reduce_to_latest(matched);
        }
        results.extend(matched);
    }
    results
}

fn reduce_to_latest<'a>(packages: Vec<&'a Package>) -> Vec<&'a Package> {
    let mut best: HashMap<&str, &Package> = HashMap::new();
    for pkg in packages {
        best.entry(pkg.name.as_str())
            .and_modify(|cur| {
                if pkg.evr > cur.evr {
                    *cur = pkg;
                }
            })
            .or_insert(pkg);
    }
    let mut out: Vec<&Package> = best.into_values().collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| b.evr.cmp(&a.evr)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evr::Evr;

    fn pkg(repo: &str, name: &str, version: &str, release: &str) -> Package {
        Package {
            repo_id: repo.to_string(),
            name: name.to_string(),
            evr: Evr::new(0, version, release),
            arch: "x86_64".to_string(),
            summary: String::new(),
            description: String::new(),
            url: String::new(),
            license: String::new(),
            buildtime: 1_700_000_000,
            checksum_algo: "sha256".to_string(),
            checksum_hex: "ab".to_string(),
            location: String::new(),
            provides: vec![],
            requires: vec![],
        }
    }

    #[test]
    fn exact_match_excludes_prefix_siblings() {
        assert!(classify("vim").matches("vim"));
        assert!(!classify("vim").matches("vim-minimal"));
    }

    #[test]
    fn substring_match() {
        let m = classify("*ssh*");
        assert!(m.matches("openssh"));
        assert!(m.matches("libssh"));
        assert!(m.matches("openssh-server"));
        assert!(!m.matches("telnet"));
    }

    #[test]
    fn glob_match_prefix_star() {
        let m = classify("vim*");
        assert!(m.matches("vim"));
        assert!(m.matches("vim-minimal"));
        assert!(!m.matches("gvim"));
    }

    #[test]
    fn latest_reduces_to_highest_evr() {
        let kernel1 = pkg("r", "kernel", "5.1", "1");
        let kernel2 = pkg("r", "kernel", "5.2", "1");
        let refs = vec![&kernel1, &kernel2];
        let reduced = reduce_to_latest(refs);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced[0].evr.version, "5.2");
    }

    #[test]
    fn buildtime_renders_rfc3339_utc() {
        assert_eq!(render_buildtime(0), "1970-01-01T00:00:00Z");
    }
}

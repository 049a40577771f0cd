//! The Metadata Sack (§4.5).
//!
//! An in-memory, queryable index of every package a set of repos make
//! available. This
//! module supplies one concrete, synchronous implementation: fetch (or read
//! from cache) each repo's `repomd.xml`, follow it to `primary.xml.gz`,
//! and parse that into `Package` records. The HTTP fetch is behind
//! `MetadataSource` so tests can substitute canned bytes without any
//! network access.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use url::Url;

use crate::err::{Res, SolveError};
use crate::evr::Evr;
use crate::repo::{RepoDescriptor, RepoSource};
use crate::util::hexify_hash;

/// A single `requires`/`provides` capability, optionally version-qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub name: String,
    pub flags: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Package {
    pub repo_id: String,
    pub name: String,
    pub evr: Evr,
    pub arch: String,
    pub summary: String,
    pub description: String,
    pub url: String,
    pub license: String,
    pub buildtime: i64,
    pub checksum_algo: String,
    pub checksum_hex: String,
    pub location: String,
    pub provides: Vec<Capability>,
    pub requires: Vec<Capability>,
}

impl Package {
    pub fn nevra(&self) -> String {
        format!(
            "{}-{}-{}.{}",
            self.name, self.evr.version, self.evr.release, self.arch
        )
    }
}

/// Where metadata bytes come from. Production code talks HTTP; tests supply
/// canned fixture bytes instead.
pub trait MetadataSource {
    fn fetch(&self, url: &Url) -> Res<Vec<u8>>;
}

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(proxy: Option<&str>) -> Res<Self> {
        let mut builder = Client::builder();
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| SolveError::repo(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| SolveError::repo(format!("could not build http client: {}", e)))?;
        Ok(HttpSource { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl MetadataSource for HttpSource {
    fn fetch(&self, url: &Url) -> Res<Vec<u8>> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| SolveError::repo(format!("{}: {}", url, e)))?;
        resp.bytes()
            .map(|b| b.to_vec())
            .map_err(|e| SolveError::repo(format!("{}: {}", url, e)))
    }
}

/// Global engine configuration materialized once per request (Design Note
/// "Global config on the metadata engine"). `zchunk` is always disabled
/// (§4.3); `fastest_mirror` biases which `baseurl` entry is used.
#[derive(Debug, Clone)]
pub struct SackConfig {
    pub zchunk: bool,
    pub fastest_mirror: bool,
    pub cache_root: PathBuf,
}

impl SackConfig {
    pub fn new(cache_root: PathBuf) -> Self {
        SackConfig {
            zchunk: false,
            fastest_mirror: true,
            cache_root,
        }
    }
}

/// A repo together with the single base URL chosen for it (§4.3's "fastest
/// mirror" heuristic, applied once at sack-build time).
#[derive(Debug, Clone)]
pub struct ResolvedRepo {
    pub descriptor: RepoDescriptor,
    pub base_url: Url,
}

pub struct Sack {
    packages: Vec<Package>,
    provides_index: HashMap<String, Vec<usize>>,
}

impl Sack {
    pub fn all(&self) -> &[Package] {
        &self.packages
    }

    pub fn providers_of(&self, capability: &str) -> Vec<&Package> {
        match self.provides_index.get(capability) {
            Some(idxs) => idxs.iter().map(|&i| &self.packages[i]).collect(),
            None => self
                .packages
                .iter()
                .filter(|p| p.name == capability)
                .collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn build_for_test(packages: Vec<Package>) -> Self {
        Self::build(packages)
    }

    fn build(packages: Vec<Package>) -> Self {
        let mut provides_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, pkg) in packages.iter().enumerate() {
            provides_index
                .entry(pkg.name.clone())
                .or_default()
                .push(i);
            for cap in &pkg.provides {
                provides_index.entry(cap.name.clone()).or_default().push(i);
            }
        }
        Sack {
            packages,
            provides_index,
        }
    }
}

/// Resolve each repo's mirror set down to one base URL, biased towards
/// whichever answered `repomd.xml` fastest (§4.3's fastest-mirror heuristic).
pub fn select_mirror(repo: &RepoDescriptor, source: &dyn MetadataSource) -> Res<(Url, Vec<u8>)> {
    let candidates: Vec<String> = match repo.source()? {
        RepoSource::BaseUrl(urls) => urls,
        RepoSource::Metalink(url) | RepoSource::Mirrorlist(url) => {
            let list_url = Url::parse(&url)
                .map_err(|e| SolveError::repo(format!("invalid mirrorlist url: {}", e)))?;
            let body = source.fetch(&list_url)?;
            String::from_utf8_lossy(&body)
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string)
                .collect()
        }
    };

    if candidates.is_empty() {
        return Err(SolveError::repo(format!(
            "repo '{}' has no usable mirrors",
            repo.id
        )));
    }

    let mut best: Option<(Url, Vec<u8>, Duration)> = None;
    for candidate in &candidates {
        let base = match Url::parse(candidate) {
            Ok(u) => u,
            Err(_) => continue,
        };
        let repomd_url = match base.join("repodata/repomd.xml") {
            Ok(u) => u,
            Err(_) => continue,
        };
        let start = SystemTime::now();
        let bytes = match source.fetch(&repomd_url) {
            Ok(b) => b,
            Err(_) => continue,
        };
        let elapsed = SystemTime::now()
            .duration_since(start)
            .unwrap_or_default();

        let replace = match &best {
            None => true,
            Some((_, _, best_elapsed)) => elapsed < *best_elapsed,
        };
        if replace {
            best = Some((base, bytes, elapsed));
        }
    }

    best.map(|(url, bytes, _)| (url, bytes)).ok_or_else(|| {
        SolveError::repo(format!(
            "repo '{}': none of its mirrors served repomd.xml",
            repo.id
        ))
    })
}

/// Load the full sack for a set of already-mirror-resolved repos.
pub fn load(
    repos: &[ResolvedRepo],
    repomd_bytes: &HashMap<String, Vec<u8>>,
    config: &SackConfig,
    source: &dyn MetadataSource,
) -> Res<Sack> {
    let mut packages = Vec::new();

    for repo in repos {
        let repomd = repomd_bytes
            .get(&repo.descriptor.id)
            .ok_or_else(|| SolveError::repo(format!("missing repomd.xml for '{}'", repo.descriptor.id)))?;
        let primary_ref = find_primary_location(repomd)?;

        let primary_url = repo
            .base_url
            .join(&primary_ref.href)
            .map_err(|e| SolveError::repo(format!("bad primary location: {}", e)))?;

        let cache_path = cache_path_for(config, &repo.descriptor.id, &primary_ref.href);
        let expire = parse_duration(&repo.descriptor.metadata_expire);

        let bytes = if let Some(cached) = read_cached(&cache_path, expire) {
            cached
        } else {
            let fetched = source.fetch(&primary_url)?;
            verify_checksum(&repo.descriptor.id, &fetched, &primary_ref)?;
            let _ = write_cache(&cache_path, &fetched);
            fetched
        };

        let decompressed = if primary_ref.href.ends_with(".gz") {
            let mut gz = GzDecoder::new(&bytes[..]);
            let mut out = Vec::new();
            gz.read_to_end(&mut out)
                .map_err(|e| SolveError::repo(format!("gunzip failed: {}", e)))?;
            out
        } else {
            bytes
        };

        let repo_packages = parse_primary_xml(&decompressed, &repo.descriptor.id)?;
        packages.extend(repo_packages);
    }

    let _ = config.zchunk;
    let _ = config.fastest_mirror;

    Ok(Sack::build(packages))
}

fn cache_path_for(config: &SackConfig, repo_id: &str, href: &str) -> PathBuf {
    config
        .cache_root
        .join(repo_id)
        .join("repodata")
        .join(href.rsplit('/').next().unwrap_or(href))
}

fn read_cached(path: &Path, expire: Duration) -> Option<Vec<u8>> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    if SystemTime::now().duration_since(modified).ok()? > expire {
        return None;
    }
    std::fs::read(path).ok()
}

fn write_cache(path: &Path, bytes: &[u8]) -> Res<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Parse durations like `"20s"`, `"1h"`, `"2d"`; bare numbers are seconds.
fn parse_duration(raw: &str) -> Duration {
    let raw = raw.trim();
    let (num_part, unit) = match raw.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&raw[..raw.len() - 1], c),
        _ => (raw, 's'),
    };
    let n: u64 = num_part.parse().unwrap_or(20);
    let secs = match unit {
        'm' => n * 60,
        'h' => n * 3600,
        'd' => n * 86400,
        _ => n,
    };
    Duration::from_secs(secs)
}

/// The `<data type="primary">` entry of `repomd.xml`: where to fetch the
/// package list from, and the checksum it was published with (verified
/// against the fetched bytes before they're trusted, when the declared
/// algorithm is one this crate knows how to compute).
struct PrimaryRef {
    href: String,
    checksum_type: Option<String>,
    checksum_hex: Option<String>,
}

fn find_primary_location(repomd_xml: &[u8]) -> Res<PrimaryRef> {
    let mut reader = Reader::from_reader(repomd_xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut in_primary_data = false;
    let mut href: Option<String> = None;
    let mut checksum_type: Option<String> = None;
    let mut checksum_hex: Option<String> = None;
    let mut in_checksum = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = local_name(e.name().as_ref());
                if name == "data" {
                    in_primary_data = e
                        .attributes()
                        .flatten()
                        .any(|a| a.key.as_ref() == b"type" && a.value.as_ref() == b"primary");
                } else if name == "location" && in_primary_data {
                    if let Some(attr) = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"href")
                    {
                        href = Some(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                } else if name == "checksum" && in_primary_data {
                    in_checksum = true;
                    checksum_type = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"type")
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                }
            }
            Ok(Event::Text(t)) if in_checksum => {
                checksum_hex = Some(t.unescape().unwrap_or_default().trim().to_string());
            }
            Ok(Event::End(ref e)) => {
                let name = local_name(e.name().as_ref());
                if name == "checksum" {
                    in_checksum = false;
                } else if name == "data" {
                    in_primary_data = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SolveError::repo(format!("malformed repomd.xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    match href {
        Some(href) => Ok(PrimaryRef {
            href,
            checksum_type,
            checksum_hex,
        }),
        None => Err(SolveError::repo(
            "repomd.xml has no 'primary' data entry".to_string(),
        )),
    }
}

/// Verify freshly-fetched `primary.xml(.gz)` bytes against the checksum
/// `repomd.xml` declared for them. Only `sha256` is checked — other
/// algorithms (older repos use `sha`/`sha1`) are accepted unverified rather
/// than pulling in another digest crate for a legacy case this service
/// doesn't otherwise need.
fn verify_checksum(repo_id: &str, bytes: &[u8], primary_ref: &PrimaryRef) -> Res<()> {
    let (Some(algo), Some(expected)) = (&primary_ref.checksum_type, &primary_ref.checksum_hex)
    else {
        return Ok(());
    };
    if algo != "sha256" {
        return Ok(());
    }
    let actual = hexify_hash(&Sha256::digest(bytes));
    if &actual != expected {
        return Err(SolveError::repo(format!(
            "repo '{}': primary.xml checksum mismatch (expected {}, got {})",
            repo_id, expected, actual
        )));
    }
    Ok(())
}

fn local_name(qname: &[u8]) -> &str {
    let s = std::str::from_utf8(qname).unwrap_or("");
    s.rsplit(':').next().unwrap_or(s)
}

#[derive(Default)]
struct PackageBuilder {
    name: String,
    arch: String,
    epoch: u32,
    version: String,
    release: String,
    summary: String,
    description: String,
    url: String,
    license: String,
    buildtime: i64,
    checksum_algo: String,
    checksum_hex: String,
    location: String,
    provides: Vec<Capability>,
    requires: Vec<Capability>,
}

impl PackageBuilder {
    fn finish(self, repo_id: &str) -> Package {
        Package {
            repo_id: repo_id.to_string(),
            name: self.name,
            evr: Evr::new(self.epoch, self.version, self.release),
            arch: self.arch,
            summary: self.summary,
            description: self.description,
            url: self.url,
            license: self.license,
            buildtime: self.buildtime,
            checksum_algo: self.checksum_algo.to_lowercase(),
            checksum_hex: self.checksum_hex,
            location: self.location,
            provides: self.provides,
            requires: self.requires,
        }
    }
}

#[derive(PartialEq)]
enum Section {
    None,
    Provides,
    Requires,
}

/// Parse a `primary.xml` document (createrepo's common package metadata
/// format) into `Package` records.
pub fn parse_primary_xml(xml: &[u8], repo_id: &str) -> Res<Vec<Package>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut packages = Vec::new();
    let mut current: Option<PackageBuilder> = None;
    let mut section = Section::None;
    let mut text_target: Option<&'static str> = None;
    let mut text_buf = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e.name().as_ref()).to_string();
                match name.as_str() {
                    "package" => current = Some(PackageBuilder::default()),
                    "name" | "arch" | "summary" | "description" | "url" | "license" | "checksum" => {
                        text_buf.clear();
                        text_target = Some(match name.as_str() {
                            "name" => "name",
                            "arch" => "arch",
                            "summary" => "summary",
                            "description" => "description",
                            "url" => "url",
                            "license" => "license",
                            "checksum" => "checksum",
                            _ => unreachable!(),
                        });
                        if name == "checksum" {
                            apply_checksum_attrs(&mut current, e);
                        }
                    }
                    "provides" => section = Section::Provides,
                    "requires" => section = Section::Requires,
                    "version" => apply_version_attrs(&mut current, e),
                    "checksum" => apply_checksum_attrs(&mut current, e),
                    "location" => apply_location_attrs(&mut current, e),
                    "time" => apply_time_attrs(&mut current, e),
                    "entry" => apply_entry_attrs(&mut current, &section, e),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = local_name(e.name().as_ref()).to_string();
                match name.as_str() {
                    "version" => apply_version_attrs(&mut current, e),
                    "checksum" => apply_checksum_attrs(&mut current, e),
                    "location" => apply_location_attrs(&mut current, e),
                    "time" => apply_time_attrs(&mut current, e),
                    "entry" => apply_entry_attrs(&mut current, &section, e),
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if text_target.is_some() {
                    text_buf.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(ref e)) => {
                let name = local_name(e.name().as_ref());
                if let Some(field) = text_target {
                    if field == name {
                        if let Some(pkg) = current.as_mut() {
                            let val = std::mem::take(&mut text_buf);
                            match field {
                                "name" => pkg.name = val,
                                "arch" => pkg.arch = val,
                                "summary" => pkg.summary = val,
                                "description" => pkg.description = val,
                                "url" => pkg.url = val,
                                "license" => pkg.license = val,
                                "checksum" => pkg.checksum_hex = val,
                                _ => {}
                            }
                        }
                        text_target = None;
                    }
                }
                match name {
                    "provides" | "requires" => section = Section::None,
                    "package" => {
                        if let Some(pkg) = current.take() {
                            packages.push(pkg.finish(repo_id));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SolveError::repo(format!("malformed primary.xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(packages)
}

fn attr_str(e: &quick_xml::events::BytesStart, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn apply_version_attrs(current: &mut Option<PackageBuilder>, e: &quick_xml::events::BytesStart) {
    let Some(pkg) = current.as_mut() else { return };
    pkg.epoch = attr_str(e, "epoch").and_then(|s| s.parse().ok()).unwrap_or(0);
    pkg.version = attr_str(e, "ver").unwrap_or_default();
    pkg.release = attr_str(e, "rel").unwrap_or_default();
}

fn apply_checksum_attrs(current: &mut Option<PackageBuilder>, e: &quick_xml::events::BytesStart) {
    let Some(pkg) = current.as_mut() else { return };
    if let Some(algo) = attr_str(e, "type") {
        pkg.checksum_algo = algo;
    }
}

fn apply_location_attrs(current: &mut Option<PackageBuilder>, e: &quick_xml::events::BytesStart) {
    let Some(pkg) = current.as_mut() else { return };
    pkg.location = attr_str(e, "href").unwrap_or_default();
}

fn apply_time_attrs(current: &mut Option<PackageBuilder>, e: &quick_xml::events::BytesStart) {
    let Some(pkg) = current.as_mut() else { return };
    pkg.buildtime = attr_str(e, "build").and_then(|s| s.parse().ok()).unwrap_or(0);
}

fn apply_entry_attrs(
    current: &mut Option<PackageBuilder>,
    section: &Section,
    e: &quick_xml::events::BytesStart,
) {
    let Some(pkg) = current.as_mut() else { return };
    let name = match attr_str(e, "name") {
        Some(n) => n,
        None => return,
    };
    let cap = Capability {
        name,
        flags: attr_str(e, "flags"),
        version: attr_str(e, "ver"),
    };
    match section {
        Section::Provides => pkg.provides.push(cap),
        Section::Requires => pkg.requires.push(cap),
        Section::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="1">
  <package type="rpm">
    <name>a</name>
    <arch>x86_64</arch>
    <version epoch="0" ver="1" rel="1"/>
    <checksum type="sha256" pkgid="YES">deadbeef</checksum>
    <summary>package a</summary>
    <description>the a package</description>
    <url>https://example.com/a</url>
    <time file="1700000000" build="1700000000"/>
    <location href="Packages/a-1-1.x86_64.rpm"/>
    <format>
      <rpm:license>MIT</rpm:license>
      <rpm:provides>
        <rpm:entry name="libfoo" flags="EQ" ver="1"/>
      </rpm:provides>
      <rpm:requires>
        <rpm:entry name="libbar"/>
      </rpm:requires>
    </format>
  </package>
</metadata>"#;

    #[test]
    fn parses_name_version_checksum_and_capabilities() {
        let pkgs = parse_primary_xml(PRIMARY.as_bytes(), "repo1").unwrap();
        assert_eq!(pkgs.len(), 1);
        let p = &pkgs[0];
        assert_eq!(p.name, "a");
        assert_eq!(p.arch, "x86_64");
        assert_eq!(p.evr.version, "1");
        assert_eq!(p.evr.release, "1");
        assert_eq!(p.checksum_algo, "sha256");
        assert_eq!(p.checksum_hex, "deadbeef");
        assert_eq!(p.location, "Packages/a-1-1.x86_64.rpm");
        assert_eq!(p.provides[0].name, "libfoo");
        assert_eq!(p.requires[0].name, "libbar");
        assert_eq!(p.repo_id, "repo1");
    }

    #[test]
    fn finds_primary_location_and_checksum_in_repomd() {
        let repomd = br#"<?xml version="1.0"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <checksum type="sha256">abc123</checksum>
    <location href="repodata/primary.xml.gz"/>
  </data>
</repomd>"#;
        let primary_ref = find_primary_location(repomd).unwrap();
        assert_eq!(primary_ref.href, "repodata/primary.xml.gz");
        assert_eq!(primary_ref.checksum_type.as_deref(), Some("sha256"));
        assert_eq!(primary_ref.checksum_hex.as_deref(), Some("abc123"));
    }

    #[test]
    fn verify_checksum_rejects_mismatched_bytes() {
        let primary_ref = PrimaryRef {
            href: "repodata/primary.xml.gz".to_string(),
            checksum_type: Some("sha256".to_string()),
            checksum_hex: Some("0000000000000000000000000000000000000000000000000000000000000000".to_string()),
        };
        let err = verify_checksum("repo1", b"not the expected bytes", &primary_ref).unwrap_err();
        assert_eq!(err.kind, crate::err::ErrorKind::RepoError);
    }

    #[test]
    fn verify_checksum_accepts_matching_sha256() {
        let digest = hexify_hash(&Sha256::digest(b"hello"));
        let primary_ref = PrimaryRef {
            href: "repodata/primary.xml.gz".to_string(),
            checksum_type: Some("sha256".to_string()),
            checksum_hex: Some(digest),
        };
        assert!(verify_checksum("repo1", b"hello", &primary_ref).is_ok());
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("20s"), Duration::from_secs(20));
        assert_eq!(parse_duration("1h"), Duration::from_secs(3600));
        assert_eq!(parse_duration("2d"), Duration::from_secs(172800));
        assert_eq!(parse_duration("5"), Duration::from_secs(5));
    }
}

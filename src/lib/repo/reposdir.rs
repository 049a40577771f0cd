//! `.repo` file (INI) parsing and `$var` substitution for Phase B of the
//! Repository Descriptor Loader (§4.3).
//!
//! No crate in the dependency stack reads this format, so a small grammar is
//! hand-rolled with `nom` rather than pulling in a general-purpose INI
//! parser for this one small domain grammar.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{char, multispace0},
    combinator::{map, opt, recognize},
    sequence::{delimited, preceded, terminated},
    IResult,
};

use crate::err::Res;
use crate::repo::RepoDescriptor;

/// One parsed `[section]` / `key = value` line.
enum Line<'a> {
    Section(&'a str),
    KeyValue(&'a str, &'a str),
    Blank,
}

fn section_header(input: &str) -> IResult<&str, &str> {
    delimited(char('['), is_not("]"), char(']'))(input)
}

fn key(input: &str) -> IResult<&str, &str> {
    recognize(is_not("=# \t"))(input)
}

fn key_value(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, k) = terminated(key, preceded(multispace0, char('=')))(input)?;
    let (input, _) = multispace0(input)?;
    Ok(("", (k.trim(), input.trim())))
}

fn parse_line(raw: &str) -> Line<'_> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
        return Line::Blank;
    }
    if let Ok((_, section)) = section_header(trimmed) {
        return Line::Section(section);
    }
    if let Ok((_, (k, v))) = key_value(trimmed) {
        return Line::KeyValue(k, v);
    }
    Line::Blank
}

/// A bare INI document: ordered sections, each an ordered key/value map.
fn parse_ini(contents: &str) -> IndexMap<String, IndexMap<String, String>> {
    let mut sections: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
    let mut current: Option<String> = None;

    for raw_line in contents.lines() {
        match parse_line(raw_line) {
            Line::Section(name) => {
                current = Some(name.to_string());
                sections.entry(name.to_string()).or_default();
            }
            Line::KeyValue(k, v) => {
                if let Some(section) = &current {
                    sections
                        .entry(section.clone())
                        .or_default()
                        .insert(k.to_string(), v.to_string());
                }
            }
            Line::Blank => {}
        }
    }

    sections
}

/// Substitute `$name` / `${name}` occurrences with values from `vars`.
/// Unknown variables are left untouched.
pub fn substitute(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == '$' {
            let braced = i + 1 < bytes.len() && bytes[i + 1] == '{';
            let start = if braced { i + 2 } else { i + 1 };
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == '_')
            {
                end += 1;
            }
            if end > start {
                let name: String = bytes[start..end].iter().collect();
                let close_ok = !braced || (end < bytes.len() && bytes[end] == '}');
                if close_ok {
                    if let Some(val) = vars.get(&name) {
                        out.push_str(val);
                    } else {
                        out.extend(&bytes[i..if braced { end + 1 } else { end }]);
                    }
                    i = if braced { end + 1 } else { end };
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Load variable definitions from `<root>/etc/yum/vars/` and
/// `<root>/etc/dnf/vars/`, one variable per file (file name is the variable
/// name, contents trimmed of trailing newline). `dnf` vars win ties.
pub fn load_vars(root: &Path) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for sub in ["etc/yum/vars", "etc/dnf/vars"] {
        let dir = root.join(sub);
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Ok(contents) = fs::read_to_string(&path) {
                vars.insert(name.to_string(), contents.trim_end_matches('\n').to_string());
            }
        }
    }
    vars
}

/// Load every `.repo` file found in `dir`, applying `$var` substitution to
/// every string value.
pub fn load_repo_files(dir: &Path, vars: &HashMap<String, String>) -> Res<Vec<RepoDescriptor>> {
    let mut repos = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(repos);
    };

    let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if path.extension().and_then(|e| e.to_str()) != Some("repo") {
            continue;
        }
        let contents = fs::read_to_string(&path)?;
        let sections = parse_ini(&contents);
        for (id, kv) in sections {
            repos.push(repo_from_section(id, &kv, vars));
        }
    }

    Ok(repos)
}

fn repo_from_section(
    id: String,
    kv: &IndexMap<String, String>,
    vars: &HashMap<String, String>,
) -> RepoDescriptor {
    let get = |k: &str| kv.get(k).map(|v| substitute(v, vars));
    let get_bool = |k: &str| get(k).map(|v| v.eq_ignore_ascii_case("true") || v == "1");
    let get_list = |k: &str| {
        get(k).map(|v| {
            v.split_whitespace()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        })
    };

    RepoDescriptor {
        id,
        name: get("name"),
        baseurl: get_list("baseurl"),
        metalink: get("metalink"),
        mirrorlist: get("mirrorlist"),
        sslverify: get_bool("sslverify").unwrap_or(true),
        sslcacert: get("sslcacert"),
        sslclientkey: get("sslclientkey"),
        sslclientcert: get("sslclientcert"),
        gpgcheck: get_bool("gpgcheck"),
        repo_gpgcheck: get_bool("repo_gpgcheck"),
        gpgkey: get("gpgkey"),
        gpgkeys: get_list("gpgkeys").unwrap_or_default(),
        metadata_expire: get("metadata_expire").unwrap_or_else(|| "20s".to_string()),
        module_hotfixes: get_bool("module_hotfixes"),
        request_sourced: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_section() {
        let contents = r#"
[baseos]
name = BaseOS
baseurl = https://example.com/$releasever/$basearch/baseos
sslcacert = /etc/pki/ca.pem
gpgcheck = 1
"#;
        let mut vars = HashMap::new();
        vars.insert("releasever".to_string(), "9".to_string());
        vars.insert("basearch".to_string(), "x86_64".to_string());

        let sections = parse_ini(contents);
        let repo = repo_from_section("baseos".to_string(), &sections["baseos"], &vars);
        assert_eq!(repo.name.as_deref(), Some("BaseOS"));
        assert_eq!(
            repo.baseurl,
            Some(vec!["https://example.com/9/x86_64/baseos".to_string()])
        );
        assert_eq!(repo.sslcacert.as_deref(), Some("/etc/pki/ca.pem"));
        assert_eq!(repo.gpgcheck, Some(true));
    }

    #[test]
    fn substitute_leaves_unknown_vars_untouched() {
        let vars = HashMap::new();
        assert_eq!(substitute("$unknown/path", &vars), "$unknown/path");
    }

    #[test]
    fn comments_and_blanks_are_ignored() {
        let contents = "# comment\n\n[a]\n; also a comment\nname=A\n";
        let sections = parse_ini(contents);
        assert_eq!(sections["a"].get("name").map(String::as_str), Some("A"));
    }
}

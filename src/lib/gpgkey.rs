//! GPG Key Materializer (§4.4).
//!
//! Two directions: *into* the sack, inline PEM blocks become temp files under
//! `<persistdir>/gpgkeys/` so the metadata engine only ever sees key URLs;
//! *out of* the sack (into the response), every key URL that sourced a
//! resolved package is dereferenced back to key text.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;

use crate::err::{ErrorKind, Res, SolveError};
use crate::repo::GpgKeySource;

/// Per-request scratch space. Removed on drop (end of request, success or
/// failure — see lib.rs `run`).
pub struct Persistdir {
    dir: tempfile::TempDir,
}

impl Persistdir {
    pub fn new() -> Res<Self> {
        let dir = tempfile::Builder::new()
            .prefix("depsolve-")
            .tempdir()
            .map_err(|e| SolveError::generic(format!("could not create persistdir: {}", e)))?;
        Ok(Persistdir { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn gpgkeys_dir(&self) -> Res<PathBuf> {
        let dir = self.dir.path().join("gpgkeys");
        fs::create_dir_all(&dir)?;
        let mut perms = fs::metadata(&dir)?.permissions();
        set_mode_0700(&mut perms);
        fs::set_permissions(&dir, perms)?;
        Ok(dir)
    }

    /// Write an inline PEM block to a fresh file under `gpgkeys/` and return
    /// its `file://` URI (§4.4.1, invariant #5).
    pub fn write_inline_key(&self, key_text: &str, seq: usize) -> Res<String> {
        let dir = self.gpgkeys_dir()?;
        let path = dir.join(format!("key-{}.asc", seq));
        fs::write(&path, key_text)?;
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(unix)]
fn set_mode_0700(perms: &mut fs::Permissions) {
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(0o700);
}

#[cfg(not(unix))]
fn set_mode_0700(_perms: &mut fs::Permissions) {}

/// Rewrite a repo's `gpgkeys` entries into key URLs a metadata engine can
/// consume, writing any inline PEM blocks to disk first (§4.4.1).
pub fn materialize_for_sack(
    sources: &[GpgKeySource],
    persistdir: &Persistdir,
) -> Res<Vec<String>> {
    let mut urls = Vec::with_capacity(sources.len());
    for (i, source) in sources.iter().enumerate() {
        match source {
            GpgKeySource::Url(u) => urls.push(u.clone()),
            GpgKeySource::Inline(text) => urls.push(persistdir.write_inline_key(text, i)?),
        }
    }
    Ok(urls)
}

/// Dereference a single key URL to its text, for inclusion in the response
/// (§4.4.2). `root_dir` is applied to `file://` paths only for repos that did
/// *not* come from the request directly.
pub fn read_key_text(
    client: &Client,
    url: &str,
    root_dir: Option<&Path>,
    request_sourced: bool,
) -> Res<String> {
    if let Some(rest) = url.strip_prefix("file://") {
        let path = if !request_sourced {
            match root_dir {
                Some(root) if rest.starts_with('/') => {
                    root.join(rest.trim_start_matches('/'))
                }
                _ => PathBuf::from(rest),
            }
        } else {
            PathBuf::from(rest)
        };
        fs::read_to_string(&path)
            .map_err(|e| SolveError::gpg(format!("{}: {}", path.display(), e)))
    } else if url.starts_with("http://") || url.starts_with("https://") {
        client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| SolveError::gpg(format!("{}: {}", url, e)))
    } else {
        Err(SolveError::new(
            ErrorKind::GPGKeyReadError,
            format!("unsupported gpgkey scheme: {}", url),
        ))
    }
}

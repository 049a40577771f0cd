//! Epoch:Version-Release comparison (the NEVRA "EVR" ordering, glossary).
//!
//! RPM version strings aren't semver, so a generic semver crate doesn't
//! apply here. This implements the standard rpm `vercmp` algorithm: compare
//! epoch numerically (missing epoch == 0), then compare version and release
//! by splitting each into alternating runs of digits and non-digits,
//! comparing digit runs numerically and non-digit runs lexically
//! (tilde-extension aside, not modeled — no NEVRA this service emits uses
//! it).

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Evr {
    pub epoch: u32,
    pub version: String,
    pub release: String,
}

impl Evr {
    pub fn new(epoch: u32, version: impl Into<String>, release: impl Into<String>) -> Self {
        Evr {
            epoch,
            version: version.into(),
            release: release.into(),
        }
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_segment(&self.version, &other.version))
            .then_with(|| compare_segment(&self.release, &other.release))
    }
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    let a_parts = split_alnum_runs(a);
    let b_parts = split_alnum_runs(b);

    for (x, y) in a_parts.iter().zip(b_parts.iter()) {
        let ord = match (x.chars().next(), y.chars().next()) {
            (Some(c1), Some(c2)) if c1.is_ascii_digit() && c2.is_ascii_digit() => {
                let xi = x.trim_start_matches('0');
                let yi = y.trim_start_matches('0');
                xi.len().cmp(&yi.len()).then_with(|| xi.cmp(yi))
            }
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    a_parts.len().cmp(&b_parts.len())
}

fn split_alnum_runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let digit = bytes[start].is_ascii_digit();
        let mut end = start + 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() == digit {
            end += 1;
        }
        runs.push(&s[start..end]);
        start = end;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_epoch_wins() {
        let a = Evr::new(1, "1.0", "1");
        let b = Evr::new(0, "99.0", "99");
        assert!(a > b);
    }

    #[test]
    fn numeric_version_segments_compare_numerically_not_lexically() {
        let a = Evr::new(0, "5.2", "1");
        let b = Evr::new(0, "5.10", "1");
        assert!(b > a);
    }

    #[test]
    fn release_breaks_ties() {
        let a = Evr::new(0, "1.0", "1");
        let b = Evr::new(0, "1.0", "2");
        assert!(b > a);
    }

    #[test]
    fn equal_evr() {
        let a = Evr::new(0, "1.0", "1");
        let b = Evr::new(0, "1.0", "1");
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }
}

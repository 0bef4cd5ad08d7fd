//! Version ordering for crate tags and migration targets.
//!
//! Two forms exist. The lenient comparison (`compare_versions`) orders
//! arbitrary version strings for latest-tag resolution and tolerates
//! `.`/`_`/`-` delimiters and non-numeric components. The strict form
//! ([`NumericVersion`]) accepts only dot-separated non-negative integers
//! and is what the migration engine uses to pick a symlink target.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component<'a> {
    Num(u64),
    Text(&'a str),
}

fn split_components(v: &str) -> Vec<Component<'_>> {
    v.split(['.', '_', '-'])
        .map(|piece| {
            if !piece.is_empty() && piece.chars().all(|c| c.is_ascii_digit()) {
                match piece.parse::<u64>() {
                    Ok(n) => Component::Num(n),
                    Err(_) => Component::Text(piece),
                }
            } else {
                Component::Text(piece)
            }
        })
        .collect()
}

/// Compare two version strings the way a human would read them.
///
/// Components split on `.`, `_`, `-` compare element-wise: integers
/// numerically, everything else lexically. A numeric component meeting a
/// textual one at the same position degrades the whole comparison to a
/// lexical comparison of the two raw strings. That fallback is kept for
/// compatibility with existing registries even though it is not
/// transitive for adversarial tag sets (e.g. `1.0.a` / `1.0.2` / `1.0.b`).
///
/// When one parsed sequence is a strict prefix of the other and the
/// shared components are all equal, the longer sequence sorts greater.
/// Never panics.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let pa = split_components(a);
    let pb = split_components(b);

    for (ca, cb) in pa.iter().zip(pb.iter()) {
        let ord = match (ca, cb) {
            (Component::Num(x), Component::Num(y)) => x.cmp(y),
            (Component::Text(x), Component::Text(y)) => x.cmp(y),
            // Mixed types: raw lexical fallback over the full strings.
            _ => return a.cmp(b),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    pa.len().cmp(&pb.len())
}

/// True when `a` supersedes `b` as the latest version.
pub fn version_gt(a: &str, b: &str) -> bool {
    compare_versions(a, b) == Ordering::Greater
}

/// Error returned when a string is not a strict numeric version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a numeric version: '{0}'")]
pub struct NumericVersionError(pub String);

/// A strict numeric version: one or more dot-separated non-negative
/// integers (`1.0.0`, `3.21`). Ordering is element-wise, with a strict
/// prefix sorting below the longer sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NumericVersion(Vec<u64>);

impl FromStr for NumericVersion {
    type Err = NumericVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(NumericVersionError(s.to_string()));
        }
        let mut parts = Vec::new();
        for piece in s.split('.') {
            if piece.is_empty() || !piece.chars().all(|c| c.is_ascii_digit()) {
                return Err(NumericVersionError(s.to_string()));
            }
            let n = piece
                .parse::<u64>()
                .map_err(|_| NumericVersionError(s.to_string()))?;
            parts.push(n);
        }
        Ok(NumericVersion(parts))
    }
}

impl fmt::Display for NumericVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", rendered.join("."))
    }
}

/// Whether a string looks like a strict numeric version (e.g. `1.0.0`).
pub fn is_numeric_version(s: &str) -> bool {
    s.parse::<NumericVersion>().is_ok()
}

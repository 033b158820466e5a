//! DN suffix substitution.
//!
//! Moves entries from one naming context to another, e.g. from
//! `dc=old,dc=com` to `dc=new,dc=org`. Matching is done per RDN: the trailing
//! RDNs of the DN must equal the source suffix ignoring case and blanks after
//! commas. A partial RDN never matches, so `ou=xdc=com` does not end in
//! `dc=com`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSubstitution {
    pub source: String,
    pub target: String,
}

impl NamespaceSubstitution {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Replace the source suffix of `dn` with the target suffix. A DN without
    /// the suffix is returned unchanged.
    #[must_use]
    pub fn apply(&self, dn: &str) -> String {
        let source = split_rdns(&self.source);
        if source.is_empty() {
            return dn.to_string();
        }
        let rdns = split_rdns(dn);
        if rdns.len() < source.len() {
            return dn.to_string();
        }
        let first = rdns.len() - source.len();
        let matches = rdns[first..]
            .iter()
            .zip(&source)
            .all(|(a, b)| a.text.trim().eq_ignore_ascii_case(b.text.trim()));
        if !matches {
            return dn.to_string();
        }
        if first == 0 {
            return self.target.clone();
        }
        // keep everything up to and including the comma before the suffix
        let cut = rdns[first].start;
        format!("{}{}", &dn[..cut], self.target)
    }
}

#[derive(Debug, Clone, Copy)]
struct Rdn<'a> {
    text: &'a str,
    start: usize,
}

/// Split on unescaped commas, keeping byte offsets into `dn`.
fn split_rdns(dn: &str) -> Vec<Rdn<'_>> {
    if dn.trim().is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                out.push(Rdn {
                    text: &dn[start..i],
                    start,
                });
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(Rdn {
        text: &dn[start..],
        start,
    });
    out
}

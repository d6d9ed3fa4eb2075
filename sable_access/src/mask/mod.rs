//! Classification of host masks.
//!
//! Every host mask ends up in exactly one lookup structure. Address masks are
//! recognised first by [`parse_cidr`]; anything else is sorted by [`classify`]
//! into one of three shapes:
//!
//! - the bare `*`, which lives in the wildcard default list;
//! - masks made of whole dot-separated labels, optionally led by a single `*`
//!   label (`irc.example.com`, `*.example.com`), which go into the label trie;
//! - everything else (`foo*.example.com`, `irc?.example.com`), which can only
//!   be matched by a linear scan.

mod cidr;
pub use cidr::*;

#[cfg(test)]
mod test;

use serde::Serialize;

/// The storage shape of a host mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    WildcardOnly,
    Sortable(LabelPath),
    Unsortable,
}

/// A hostname or host mask split into labels, least specific label first.
///
/// This is the order in which the label trie is descended: for
/// `*.mail.example.com` the labels are `com`, `example`, `mail`, `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LabelPath(Vec<String>);

impl LabelPath {
    /// Split a concrete hostname for lookup
    pub fn from_hostname(host: &str) -> Self {
        Self(
            host.rsplit('.')
                .map(|label| label.to_ascii_lowercase())
                .collect(),
        )
    }

    /// Labels in descent order
    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub(crate) const WILDCARD_LABEL: &str = "*";

/// Determine how a (non-address) host mask can be stored.
pub fn classify(pattern: &str) -> Shape {
    if pattern == WILDCARD_LABEL {
        return Shape::WildcardOnly;
    }
    if pattern.contains('?') {
        return Shape::Unsortable;
    }

    // Scan from the right, cutting a label at each dot. A `*` is tolerated only
    // as the whole of the leftmost label, so at most one can ever be accepted.
    let mut labels = Vec::new();
    let mut label_end = pattern.len();

    for (pos, c) in pattern.char_indices().rev() {
        match c {
            '.' => {
                labels.push(&pattern[pos + 1..label_end]);
                label_end = pos;
            }
            '*' if pos != 0 || label_end != 1 => return Shape::Unsortable,
            _ => {}
        }
    }
    labels.push(&pattern[..label_end]);

    // Hostnames never contain empty labels, so a mask that does can only ever
    // be matched textually
    if labels.iter().any(|label| label.is_empty()) {
        return Shape::Unsortable;
    }

    Shape::Sortable(LabelPath(
        labels
            .into_iter()
            .map(|label| label.to_ascii_lowercase())
            .collect(),
    ))
}

//! Resource version comparison
//!
//! Resource versions are free-form ("5.1", "2.2.14", "1.0-beta2") so semver
//! parsing does not apply. Versions are split on `.`, `-` and `_`; numeric
//! components compare numerically, the rest lexically, and a version that
//! runs out of components is the older one.

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Component<'a> {
    Number(u64),
    Text(&'a str),
}

impl Ord for Component<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Number(a), Component::Number(b)) => a.cmp(b),
            // numeric release parts sort after textual pre-release parts
            (Component::Number(_), Component::Text(_)) => Ordering::Greater,
            (Component::Text(_), Component::Number(_)) => Ordering::Less,
            (Component::Text(a), Component::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Component<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn components(version: &str) -> Vec<Component<'_>> {
    version
        .split(['.', '-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<u64>() {
            Ok(n) => Component::Number(n),
            Err(_) => Component::Text(part),
        })
        .collect()
}

/// Compare two resource version strings
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = components(a.trim());
    let right = components(b.trim());

    for (l, r) in left.iter().zip(right.iter()) {
        match l.cmp(r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    left.len().cmp(&right.len())
}

/// True when `new` should be handled by `upgrade()` relative to `old`.
///
/// Equal versions count as an upgrade, so a re-run with an unchanged version
/// goes through the driver's upgrade path again.
pub fn is_upgrade(new: &str, old: &str) -> bool {
    compare_versions(new, old) != Ordering::Less
}

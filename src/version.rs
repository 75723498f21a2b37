//! Semantic version triplets as they appear in the catalog.
//!
//! The wire form is a plain JSON array `[major, minor, patch]`, the display
//! form is `"M.m.p"`, and ordering weighs the components so that
//! `1.2.3 < 1.10.0` compares numerically rather than lexicographically.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTriplet(pub u32, pub u32, pub u32);

impl VersionTriplet {
    /// Collapse the triplet into a single comparable weight.
    fn weight(&self) -> u64 {
        u64::from(self.0) * 1_000_000 + u64::from(self.1) * 1_000 + u64::from(self.2)
    }

    /// Match against a possibly partial version string ("1", "1.2", "1.2.3").
    ///
    /// Each component present in `fragments` must equal the corresponding
    /// component of this triplet.
    pub fn matches_prefix(&self, fragments: &[u32]) -> bool {
        let own = [self.0, self.1, self.2];
        fragments.iter().zip(own.iter()).all(|(a, b)| a == b)
    }
}

impl PartialOrd for VersionTriplet {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionTriplet {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.weight().cmp(&other.weight())
    }
}

impl fmt::Display for VersionTriplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

impl FromStr for VersionTriplet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let fragments = parse_fragments(s)?;
        if fragments.len() > 3 {
            anyhow::bail!("too many version components in '{}'", s);
        }
        let mut components = [0u32; 3];
        for (idx, frag) in fragments.iter().enumerate().take(3) {
            components[idx] = *frag;
        }
        Ok(VersionTriplet(components[0], components[1], components[2]))
    }
}

/// Parse the dot-separated components of a version string.
///
/// Used both for full triplets and for the partial version selectors the
/// `add`/`rm` commands accept.
pub fn parse_fragments(version: &str) -> anyhow::Result<Vec<u32>> {
    version
        .split('.')
        .enumerate()
        .map(|(idx, frag)| {
            frag.parse::<u32>()
                .map_err(|e| anyhow::anyhow!("cannot parse component {}: {}", idx + 1, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let v: VersionTriplet = "1.2.3".parse().unwrap();
        assert_eq!(v, VersionTriplet(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn rejects_garbage() {
        assert!("1.x.3".parse::<VersionTriplet>().is_err());
        assert!("".parse::<VersionTriplet>().is_err());
        assert!("1.2.3.4".parse::<VersionTriplet>().is_err());
    }

    #[test]
    fn short_versions_zero_fill() {
        assert_eq!("2".parse::<VersionTriplet>().unwrap(), VersionTriplet(2, 0, 0));
        assert_eq!("2.1".parse::<VersionTriplet>().unwrap(), VersionTriplet(2, 1, 0));
    }

    #[test]
    fn orders_numerically_not_lexicographically() {
        let a: VersionTriplet = "1.2.3".parse().unwrap();
        let b: VersionTriplet = "1.10.0".parse().unwrap();
        assert!(a < b);

        let c: VersionTriplet = "2.0.0".parse().unwrap();
        assert!(b < c);
        assert!(a < c);
    }

    #[test]
    fn prefix_matching() {
        let v = VersionTriplet(1, 2, 3);
        assert!(v.matches_prefix(&[1]));
        assert!(v.matches_prefix(&[1, 2]));
        assert!(v.matches_prefix(&[1, 2, 3]));
        assert!(!v.matches_prefix(&[1, 3]));
        assert!(!v.matches_prefix(&[2]));
    }

    #[test]
    fn json_round_trip_is_an_array() {
        let v = VersionTriplet(1, 2, 3);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "[1,2,3]");
        let back: VersionTriplet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}

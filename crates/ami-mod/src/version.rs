//! Semantic versions as used in AMI import constraints and git tags.
//!
//! Accepts `v?MAJOR.MINOR.PATCH(-PRERELEASE)?`. Build metadata is not
//! supported. Prerelease tags compare as whole strings rather than by
//! dot-separated identifiers.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{ModError, Result};

/// A parsed semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl Version {
    /// A release version with no prerelease tag.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// `(major+1).0.0`, or `None` when the major number is already `u64::MAX`.
    pub fn next_major(&self) -> Option<Version> {
        Some(Version::new(self.major.checked_add(1)?, 0, 0))
    }

    /// `major.(minor+1).0`, or `None` on overflow.
    pub fn next_minor(&self) -> Option<Version> {
        Some(Version::new(self.major, self.minor.checked_add(1)?, 0))
    }

    /// Whether both versions share major, minor and patch.
    pub fn same_triple(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch == other.patch
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Version {
    type Err = ModError;

    fn from_str(s: &str) -> Result<Self> {
        parse_version(s)
    }
}

/// Parse a version string like "1.2.3", "v1.2.3" or "v1.2.3-rc.1".
pub fn parse_version(s: &str) -> Result<Version> {
    let invalid = || ModError::InvalidVersion(s.to_string());

    let body = s.strip_prefix('v').unwrap_or(s);
    let (core, prerelease) = match body.split_once('-') {
        Some((core, pre)) => {
            let valid_pre = !pre.is_empty()
                && pre
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
            if !valid_pre {
                return Err(invalid());
            }
            (core, Some(pre.to_string()))
        }
        None => (body, None),
    };

    let mut parts = core.split('.');
    let mut next_number = || -> Result<u64> {
        let part = parts.next().ok_or_else(invalid)?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        part.parse().map_err(|_| invalid())
    };
    let major = next_number()?;
    let minor = next_number()?;
    let patch = next_number()?;
    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok(Version {
        major,
        minor,
        patch,
        prerelease,
    })
}

/// Three-way comparison: major, minor, patch, then prerelease.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

/// Whether `s` parses as a version.
pub fn is_version(s: &str) -> bool {
    parse_version(s).is_ok()
}

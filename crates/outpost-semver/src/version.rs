//! ---
//! upd_section: "02-version-engine"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Semantic version model and comparison engine."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors produced while parsing version strings.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SemverError {
    /// The base version did not contain exactly major, minor and patch.
    #[error("expected MAJOR.MINOR.PATCH in '{0}'")]
    MalformedBase(String),
    /// One of the base components was not a non-negative integer.
    #[error("non-numeric version component '{0}'")]
    NonNumeric(String),
    /// The prerelease section after '-' was empty or unusable.
    #[error("malformed prerelease in '{0}'")]
    MalformedPrerelease(String),
}

/// Prerelease marker: an identifier plus a sequence number (`beta.3`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerelease {
    /// Identifier such as `alpha`, `beta` or `rc`.
    pub identifier: String,
    /// Sequence number within the identifier series.
    pub sequence: u64,
}

impl Prerelease {
    /// Precedence rank for the fixed identifier table. Unknown identifiers
    /// sort after the known ones and then lexicographically among themselves.
    fn rank(&self) -> u8 {
        match self.identifier.as_str() {
            "alpha" => 0,
            "beta" => 1,
            "rc" => 2,
            _ => 3,
        }
    }

    fn order_key(&self) -> (u8, &str, u64) {
        let unknown = if self.rank() == 3 {
            self.identifier.as_str()
        } else {
            ""
        };
        (self.rank(), unknown, self.sequence)
    }
}

impl fmt::Display for Prerelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.identifier, self.sequence)
    }
}

/// Structured semantic version for a managed component.
///
/// `dev_distance`, `dirty` and `commit` are informational: two versions
/// differing only in those fields compare equal. `build_number` participates
/// only as the final tie-break between otherwise-equal versions.
#[derive(Debug, Clone, Default)]
pub struct Semver {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<Prerelease>,
    pub build_number: u64,
    pub dev_distance: u64,
    pub dirty: bool,
    pub commit: Option<String>,
}

impl Semver {
    /// Construct a plain release version.
    #[must_use]
    pub fn release(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            ..Self::default()
        }
    }

    /// Construct a prerelease version such as `1.0.0-beta.3`.
    #[must_use]
    pub fn prerelease(major: u64, minor: u64, patch: u64, identifier: &str, sequence: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: Some(Prerelease {
                identifier: identifier.to_owned(),
                sequence,
            }),
            ..Self::default()
        }
    }

    /// Return a copy with the given build number attached.
    #[must_use]
    pub fn with_build_number(mut self, build_number: u64) -> Self {
        self.build_number = build_number;
        self
    }

    /// Whether this version carries a prerelease marker.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Whether this version was built past a tagged commit.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.dev_distance > 0 || self.dirty
    }

    /// Canonical string form without build metadata, e.g. `1.0.0-beta.3.dev2`.
    #[must_use]
    pub fn full_version(&self) -> String {
        self.to_string()
    }

    /// Base version string without prerelease or markers, e.g. `1.0.0`.
    #[must_use]
    pub fn base_version(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    // Comparison key implementing the total order. A release carries rank 1
    // over any prerelease (rank 0) of the same base triple.
    fn order_key(&self) -> (u64, u64, u64, u8, Option<(u8, &str, u64)>, u64) {
        let release_rank = if self.prerelease.is_some() { 0 } else { 1 };
        (
            self.major,
            self.minor,
            self.patch,
            release_rank,
            self.prerelease.as_ref().map(Prerelease::order_key),
            self.build_number,
        )
    }
}

impl PartialEq for Semver {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for Semver {}

impl Hash for Semver {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order_key().hash(state);
    }
}

impl PartialOrd for Semver {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Semver {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl fmt::Display for Semver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{pre}")?;
        }
        if self.dev_distance > 0 {
            write!(f, ".dev{}", self.dev_distance)?;
        }
        if self.dirty {
            write!(f, ".dirty")?;
        }
        Ok(())
    }
}

impl FromStr for Semver {
    type Err = SemverError;

    /// Parse `MAJOR.MINOR.PATCH[-ID.N][.devD][.dirty]`, tolerating a
    /// leading `v` as produced by release tags.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if stripped.is_empty() {
            return Err(SemverError::MalformedBase(input.to_owned()));
        }

        let (base_part, pre_part) = match stripped.split_once('-') {
            Some((base, pre)) => (base, Some(pre)),
            None => (stripped, None),
        };

        // Development markers attach to whichever section ends the string.
        let (base_core, base_dev, base_dirty) = strip_markers(base_part);
        let mut dev_distance = base_dev;
        let mut dirty = base_dirty;

        let fields: Vec<&str> = base_core.split('.').collect();
        if fields.len() != 3 {
            return Err(SemverError::MalformedBase(input.to_owned()));
        }
        let mut numbers = [0u64; 3];
        for (slot, field) in numbers.iter_mut().zip(&fields) {
            *slot = field
                .parse::<u64>()
                .map_err(|_| SemverError::NonNumeric((*field).to_owned()))?;
        }

        let prerelease = match pre_part {
            None => None,
            Some(raw) => {
                let (core, pre_dev, pre_dirty) = strip_markers(raw);
                dev_distance = dev_distance.max(pre_dev);
                dirty = dirty || pre_dirty;
                if core.is_empty() {
                    return Err(SemverError::MalformedPrerelease(input.to_owned()));
                }
                Some(parse_prerelease(core))
            }
        };

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            prerelease,
            build_number: 0,
            dev_distance,
            dirty,
            commit: None,
        })
    }
}

// Peel trailing `.dirty` and `.devN` markers off a version section.
fn strip_markers(part: &str) -> (&str, u64, bool) {
    let mut rest = part;
    let mut dirty = false;
    if let Some(head) = rest.strip_suffix(".dirty") {
        rest = head;
        dirty = true;
    }
    let mut dev = 0u64;
    if let Some(idx) = rest.rfind(".dev") {
        let (head, tail) = rest.split_at(idx);
        if let Ok(distance) = tail[".dev".len()..].parse::<u64>() {
            rest = head;
            dev = distance;
        }
    }
    (rest, dev, dirty)
}

// `beta.3` splits into identifier and sequence; a bare identifier or a
// non-numeric tail keeps the whole text as identifier with sequence 0.
fn parse_prerelease(core: &str) -> Prerelease {
    if let Some((name, tail)) = core.rsplit_once('.') {
        if let Ok(sequence) = tail.parse::<u64>() {
            return Prerelease {
                identifier: name.to_owned(),
                sequence,
            };
        }
    }
    Prerelease {
        identifier: core.to_owned(),
        sequence: 0,
    }
}

impl Serialize for Semver {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Semver {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(DeError::custom)
    }
}

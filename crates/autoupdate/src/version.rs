//! Release tags of the form `vMAJOR.MINOR.PATCH` and their ordering.

use crate::error::{Result, UpdaterError};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed `vMAJOR.MINOR.PATCH` tag.
///
/// Components compare numerically, so `v1.10.0` is newer than `v1.9.0`.
/// Leading zeros are rejected, so [`Display`](fmt::Display) reproduces the
/// parsed tag exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTag {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl VersionTag {
    /// Build a tag from its components.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a tag, rejecting anything that is not exactly `v<uint>.<uint>.<uint>`.
    pub fn parse(tag: &str) -> Result<Self> {
        let rest = tag
            .strip_prefix('v')
            .ok_or_else(|| UpdaterError::invalid_version(tag, "versions must begin with a \"v\""))?;

        let version = semver::Version::parse(rest)?;
        if !version.pre.is_empty() || !version.build.is_empty() {
            return Err(UpdaterError::invalid_version(
                tag,
                "versions must be in the form vX.Y.Z",
            ));
        }
        Ok(VersionTag::from(&version))
    }
}

impl From<&semver::Version> for VersionTag {
    fn from(version: &semver::Version) -> Self {
        VersionTag::new(version.major, version.minor, version.patch)
    }
}

impl FromStr for VersionTag {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self> {
        VersionTag::parse(s)
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Outcome of [`compare`]: how the first tag relates to the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// The first tag is older.
    Lower,
    /// Both tags name the same release.
    Equal,
    /// The first tag is newer.
    Higher,
}

impl From<Ordering> for Comparison {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => Comparison::Lower,
            Ordering::Equal => Comparison::Equal,
            Ordering::Greater => Comparison::Higher,
        }
    }
}

/// Compare `a` against `b`: `Higher` means `a` is the newer release.
pub fn compare(a: &VersionTag, b: &VersionTag) -> Comparison {
    a.cmp(b).into()
}

/// String form of [`compare`]. Malformed tags are reported as fatal
/// precondition errors.
pub fn compare_tags(a: &str, b: &str) -> Result<Comparison> {
    Ok(compare(&VersionTag::parse(a)?, &VersionTag::parse(b)?))
}

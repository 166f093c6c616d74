//! FMC server version handling
//!
//! Resources that depend on newer FMC API features declare a minimum
//! version; the provider compares it against the version reported by the
//! server at configure time.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionError {
    #[error("Empty version string")]
    Empty,
    #[error("Invalid version component '{0}'")]
    InvalidComponent(String),
}

/// FMC version, e.g. `7.2.5`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FmcVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FmcVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for FmcVersion {
    type Err = VersionError;

    /// Accepts `7.2`, `7.2.5` and the server form `7.2.5 (build 208)`.
    /// A fourth component (`7.2.5.1`) is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let core = s.split_whitespace().next().ok_or(VersionError::Empty)?;

        let mut parts = [0u32; 3];
        for (slot, raw) in parts.iter_mut().zip(core.split('.')) {
            *slot = raw
                .parse()
                .map_err(|_| VersionError::InvalidComponent(raw.to_string()))?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for FmcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

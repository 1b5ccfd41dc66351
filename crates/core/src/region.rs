//! Region codes (postal codes, "PLZ").

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Maximum accepted length of a region code.
pub const MAX_REGION_CODE_LEN: usize = 10;

/// A validated region code.
///
/// Surrounding whitespace is trimmed; the remainder must be 1-10 ASCII
/// alphanumeric characters. German postal codes are five digits, but the
/// type does not assume a country.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionCode(String);

impl RegionCode {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, Error> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_region("region code is empty"));
        }
        if trimmed.len() > MAX_REGION_CODE_LEN {
            return Err(Error::invalid_region(format!(
                "region code '{}' exceeds {} characters",
                trimmed, MAX_REGION_CODE_LEN
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::invalid_region(format!(
                "region code '{}' contains invalid characters",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RegionCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RegionCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegionCode> for String {
    fn from(value: RegionCode) -> Self {
        value.0
    }
}

impl AsRef<str> for RegionCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

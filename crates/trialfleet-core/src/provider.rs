//! Supported cloud providers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The closed set of cloud providers trial resources can be provisioned on.
///
/// Provider-specific behaviour is selected by matching on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum CloudProvider {
    /// Amazon Elastic MapReduce.
    Emr = 1,
    /// Azure `HDInsight`.
    Hdi = 2,
}

impl CloudProvider {
    /// All supported providers.
    pub const ALL: [Self; 2] = [Self::Emr, Self::Hdi];

    /// The canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emr => "EMR",
            Self::Hdi => "HDI",
        }
    }

    /// Lower-case name used in URL paths.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Emr => "emr",
            Self::Hdi => "hdi",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = CoreError;

    /// Parse a provider name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| CoreError::UnsupportedProvider(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("EMR".parse::<CloudProvider>().unwrap(), CloudProvider::Emr);
        assert_eq!(" hdi ".parse::<CloudProvider>().unwrap(), CloudProvider::Hdi);
        assert_eq!("Emr".parse::<CloudProvider>().unwrap(), CloudProvider::Emr);
    }

    #[test]
    fn parse_rejects_unknown() {
        let result = "DATAPROC".parse::<CloudProvider>();
        assert!(matches!(result, Err(CoreError::UnsupportedProvider(name)) if name == "DATAPROC"));
    }

    #[test]
    fn serde_uses_canonical_name() {
        let json = serde_json::to_string(&CloudProvider::Hdi).unwrap();
        assert_eq!(json, "\"HDI\"");
    }
}

// ── Core identity type ──
//
// PvName is the foundation of every domain type: a validated EPICS-style
// record name. Construction is the single validation point -- a PvName in
// hand is always well-formed, so downstream code never re-checks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Validated process-variable name.
///
/// Accepts EPICS-style record names: colon-separated segments of
/// alphanumerics plus `_ . + -`, with `{}` allowed for area-notation names
/// like `SR:C03{BPM:7}Pos:X-I`. Leading/trailing whitespace is trimmed
/// before validation; interior whitespace is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PvName(String);

impl PvName {
    /// Validate and canonicalize a raw name.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let trimmed = raw.as_ref().trim();

        if trimmed.is_empty() {
            return Err(CoreError::Validation {
                name: raw.as_ref().to_owned(),
                reason: "name is empty".into(),
            });
        }

        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '+' | '-' | '{' | '}')))
        {
            return Err(CoreError::Validation {
                name: raw.as_ref().to_owned(),
                reason: format!("invalid character {bad:?}"),
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PvName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PvName {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<PvName> for String {
    fn from(pv: PvName) -> Self {
        pv.0
    }
}

impl AsRef<str> for PvName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_record_name() {
        let pv = PvName::new("DEV:TEMP").unwrap();
        assert_eq!(pv.as_str(), "DEV:TEMP");
    }

    #[test]
    fn accepts_area_notation() {
        assert!(PvName::new("SR:C03{BPM:7}Pos:X-I").is_ok());
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let pv = PvName::new("  DEV:TEMP \n").unwrap();
        assert_eq!(pv.as_str(), "DEV:TEMP");
    }

    #[test]
    fn rejects_empty_and_blank() {
        assert!(matches!(PvName::new(""), Err(CoreError::Validation { .. })));
        assert!(matches!(PvName::new("   "), Err(CoreError::Validation { .. })));
    }

    #[test]
    fn rejects_interior_whitespace() {
        assert!(matches!(
            PvName::new("DEV: TEMP"),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn rejects_reserved_characters() {
        for bad in ["DEV/TEMP", "DEV?TEMP", "DEV#1", "DEV;TEMP"] {
            assert!(
                matches!(PvName::new(bad), Err(CoreError::Validation { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn serde_round_trip_validates() {
        let pv: PvName = serde_json::from_str("\" DEV:TEMP \"").unwrap();
        assert_eq!(pv.as_str(), "DEV:TEMP");
        assert!(serde_json::from_str::<PvName>("\"DEV TEMP\"").is_err());
    }
}

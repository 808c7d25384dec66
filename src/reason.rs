//! Decision reasons.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Reason explains why a host was, or was not, filtered.
///
/// The numeric codes are stable and follow declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Reason {
    /// Host was not found in any check; the default value
    #[default]
    NotFilteredNotFound = 0,
    /// Host is explicitly allowed
    NotFilteredWhiteList = 1,
    /// A transient error happened during a check
    NotFilteredError = 2,

    /// Host matched a block rule
    FilteredBlackList = 3,
    /// Host is malicious or phishing
    FilteredSafeBrowsing = 4,
    /// Host is outside of parental control settings
    FilteredParental = 5,
    /// Request was invalid and was not processed
    FilteredInvalid = 6,
    /// Host was replaced with its safe search variant
    FilteredSafeSearch = 7,
    /// Host is blocked by the blocked services settings
    FilteredBlockedService = 8,

    /// A rewrite rule was applied
    Rewrite = 9,
}

impl Reason {
    /// Whether any check matched, filtered or not.
    pub fn matched(self) -> bool {
        self != Reason::NotFilteredNotFound
    }

    /// Whether this reason belongs to the filtered group.
    pub fn is_filtered(self) -> bool {
        matches!(
            self,
            Reason::FilteredBlackList
                | Reason::FilteredSafeBrowsing
                | Reason::FilteredParental
                | Reason::FilteredInvalid
                | Reason::FilteredSafeSearch
                | Reason::FilteredBlockedService
        )
    }

    /// Convert from a u8 value.
    ///
    /// Returns `None` for invalid values.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Reason::NotFilteredNotFound),
            1 => Some(Reason::NotFilteredWhiteList),
            2 => Some(Reason::NotFilteredError),
            3 => Some(Reason::FilteredBlackList),
            4 => Some(Reason::FilteredSafeBrowsing),
            5 => Some(Reason::FilteredParental),
            6 => Some(Reason::FilteredInvalid),
            7 => Some(Reason::FilteredSafeSearch),
            8 => Some(Reason::FilteredBlockedService),
            9 => Some(Reason::Rewrite),
            _ => None,
        }
    }

    /// Convert to a u8 value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NotFilteredNotFound => "NotFilteredNotFound",
            Reason::NotFilteredWhiteList => "NotFilteredWhiteList",
            Reason::NotFilteredError => "NotFilteredError",
            Reason::FilteredBlackList => "FilteredBlackList",
            Reason::FilteredSafeBrowsing => "FilteredSafeBrowsing",
            Reason::FilteredParental => "FilteredParental",
            Reason::FilteredInvalid => "FilteredInvalid",
            Reason::FilteredSafeSearch => "FilteredSafeSearch",
            Reason::FilteredBlockedService => "FilteredBlockedService",
            Reason::Rewrite => "Rewrite",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Reason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        (0..=9)
            .filter_map(Reason::from_u8)
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Reason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        Reason::from_u8(v)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid reason code: {}", v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched() {
        assert!(!Reason::NotFilteredNotFound.matched());
        assert!(Reason::NotFilteredWhiteList.matched());
        assert!(Reason::NotFilteredError.matched());
        assert!(Reason::FilteredBlackList.matched());
        assert!(Reason::Rewrite.matched());
    }

    #[test]
    fn test_is_filtered() {
        assert!(!Reason::NotFilteredWhiteList.is_filtered());
        assert!(!Reason::Rewrite.is_filtered());
        assert!(Reason::FilteredBlockedService.is_filtered());
        assert!(Reason::FilteredSafeSearch.is_filtered());
    }

    #[test]
    fn test_reason_from_u8() {
        assert_eq!(Reason::from_u8(0), Some(Reason::NotFilteredNotFound));
        assert_eq!(Reason::from_u8(3), Some(Reason::FilteredBlackList));
        assert_eq!(Reason::from_u8(9), Some(Reason::Rewrite));
        assert_eq!(Reason::from_u8(10), None);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(Reason::FilteredBlackList.to_string(), "FilteredBlackList");
        assert_eq!(Reason::Rewrite.to_string(), "Rewrite");
        assert_eq!("rewrite".parse::<Reason>(), Ok(Reason::Rewrite));
        assert!("Bogus".parse::<Reason>().is_err());
    }
}

//! The outcome of a filtering decision.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::Reason;

/// FilterResult holds the state of a hostname check.
///
/// `FilterResult::default()` means "no decision": not filtered and no
/// reason. Every field is omitted from the serialized form when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterResult {
    /// True if the host name is filtered
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_filtered: bool,

    /// Reason for blocking or unblocking
    #[serde(default, skip_serializing_if = "is_not_found")]
    pub reason: Reason,

    /// Original rule text
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rule: String,

    /// Address from a host rule; `None` when the rule is not a host rule or
    /// when it matched for a different query type
    #[serde(rename = "IP", default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,

    /// ID of the rule list the rule belongs to
    #[serde(rename = "FilterID", default, skip_serializing_if = "is_zero")]
    pub filter_id: i64,

    /// Last canonical name reached through rewrites
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub canon_name: String,

    /// Addresses produced by rewrites
    #[serde(rename = "IPList", default, skip_serializing_if = "Vec::is_empty")]
    pub ip_list: Vec<IpAddr>,

    /// Name of the blocked service
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,
}

fn is_not_found(reason: &Reason) -> bool {
    !reason.matched()
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl FilterResult {
    /// A result carrying only a reason; `is_filtered` follows the reason.
    pub fn with_reason(reason: Reason) -> Self {
        Self {
            is_filtered: reason.is_filtered(),
            reason,
            ..Default::default()
        }
    }

    /// Whether any check matched.
    pub fn matched(&self) -> bool {
        self.reason.matched()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_serializes_empty() {
        let json = serde_json::to_string(&FilterResult::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_serialize_blocked() {
        let res = FilterResult {
            is_filtered: true,
            reason: Reason::FilteredBlackList,
            rule: "||ads.example.org^".to_string(),
            filter_id: 3,
            ..Default::default()
        };
        let json = serde_json::to_string(&res).unwrap();
        assert_eq!(
            json,
            r#"{"IsFiltered":true,"Reason":3,"Rule":"||ads.example.org^","FilterID":3}"#
        );
    }

    #[test]
    fn test_serialize_rewrite() {
        let res = FilterResult {
            reason: Reason::Rewrite,
            canon_name: "cdn.example.net".to_string(),
            ip_list: vec!["1.2.3.4".parse().unwrap()],
            ..Default::default()
        };
        let json = serde_json::to_string(&res).unwrap();
        assert_eq!(
            json,
            r#"{"Reason":9,"CanonName":"cdn.example.net","IPList":["1.2.3.4"]}"#
        );

        let back: FilterResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, res);
    }

    #[test]
    fn test_with_reason() {
        let res = FilterResult::with_reason(Reason::FilteredParental);
        assert!(res.is_filtered);
        assert!(res.matched());

        let res = FilterResult::with_reason(Reason::NotFilteredWhiteList);
        assert!(!res.is_filtered);
        assert!(res.matched());
    }
}

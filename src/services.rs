//! Blocked services: named groups of network rules.

use crate::error::Result;
use crate::rule::{NetworkRule, Rule};
use crate::{FilterResult, Reason};

/// ServiceEntry is one blocked service and the rules that cover it.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub name: String,
    pub rules: Vec<NetworkRule>,
}

impl ServiceEntry {
    /// Compile the rule texts of a service.
    ///
    /// # Examples
    /// ```
    /// use dnsfilter::ServiceEntry;
    ///
    /// let rules = ["||video.example^", "||cdn.video.example^"];
    /// let svc = ServiceEntry::from_rules("video", &rules).unwrap();
    /// assert_eq!(svc.rules.len(), 2);
    /// ```
    pub fn from_rules<S: AsRef<str>>(name: &str, texts: &[S]) -> Result<Self> {
        let rules = texts
            .iter()
            .map(|t| NetworkRule::parse(t.as_ref(), 0))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            rules,
        })
    }
}

/// Check a lower-case host against blocked services, in order.
///
/// The first rule that matches decides; later services are not consulted.
pub fn match_blocked_services(host: &str, services: &[ServiceEntry]) -> FilterResult {
    for svc in services {
        if let Some(rule) = svc.rules.iter().find(|r| r.matches_host(host)) {
            log::debug!(
                "Blocked Services: matched rule {}  host: {}  service: {}",
                rule.text(),
                host,
                svc.name
            );
            return FilterResult {
                is_filtered: true,
                reason: Reason::FilteredBlockedService,
                rule: rule.text().to_string(),
                service_name: svc.name.clone(),
                ..Default::default()
            };
        }
    }
    FilterResult::default()
}

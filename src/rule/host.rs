//! Hosts-file rule implementation.

use std::net::IpAddr;

use super::{is_valid_hostname, Rule};
use crate::error::RuleError;

/// HostRule binds one or more hostnames to a literal address.
///
/// # Examples
/// ```
/// use dnsfilter::rule::HostRule;
///
/// let rule = HostRule::parse("0.0.0.0 ads.example.org # ad server", "0.0.0.0".parse().unwrap(), 1)
///     .unwrap();
/// assert_eq!(rule.hostnames(), ["ads.example.org"]);
/// assert!(rule.ip().is_ipv4());
/// ```
#[derive(Debug, Clone)]
pub struct HostRule {
    text: String,
    list_id: i64,
    ip: IpAddr,
    hostnames: Vec<String>,
}

impl HostRule {
    /// Parse a hosts-file line whose first token has already been parsed
    /// as `ip`.
    pub fn parse(line: &str, ip: IpAddr, list_id: i64) -> Result<Self, RuleError> {
        let line = line.trim();

        // Drop a trailing comment
        let content = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };

        let mut hostnames = Vec::new();
        for name in content.split_whitespace().skip(1) {
            let name = name.trim_end_matches('.').to_lowercase();
            if !is_valid_hostname(&name, false) {
                return Err(RuleError::InvalidHostname(name));
            }
            hostnames.push(name);
        }

        if hostnames.is_empty() {
            return Err(RuleError::MissingHostname(line.to_string()));
        }

        Ok(Self {
            text: line.to_string(),
            list_id,
            ip,
            hostnames,
        })
    }

    /// The address hostnames are bound to.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Lower-case hostnames covered by this rule.
    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    /// Check if a lower-case hostname is covered by this rule.
    pub fn matches_host(&self, host: &str) -> bool {
        self.hostnames.iter().any(|h| h == host)
    }
}

impl Rule for HostRule {
    fn text(&self) -> &str {
        &self.text
    }

    fn filter_list_id(&self) -> i64 {
        self.list_id
    }
}

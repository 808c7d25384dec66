//! Rule types and rule text parsing.
//!
//! Two kinds of rules are understood:
//!
//! - **Network rules**: pattern based block or allow rules, e.g.
//!   `||ads.example.org^`, `@@||good.example.org^$important`,
//!   `/^track[0-9]+\./`, `||cdn*.example.net^$ctag=kids|~admin`.
//! - **Host rules**: hosts-file lines binding hostnames to an address, e.g.
//!   `0.0.0.0 ads.example.org tracker.example.org`.
//!
//! Comments (`!`, `#`) and cosmetic rules (`##`, `#@#`, ...) are skipped.

mod host;
mod network;

pub use host::HostRule;
pub use network::NetworkRule;
pub(crate) use network::Pattern;

use std::net::IpAddr;

use crate::error::RuleError;

/// Rule trait defines what every parsed rule exposes.
pub trait Rule: Send + Sync {
    /// The original rule text.
    fn text(&self) -> &str;

    /// ID of the rule list this rule belongs to.
    fn filter_list_id(&self) -> i64;
}

/// A rule parsed from one line of a rule list.
#[derive(Debug)]
pub enum ParsedRule {
    Network(NetworkRule),
    Host(HostRule),
}

/// Markers of cosmetic (element hiding, scriptlet) rules.
const COSMETIC_MARKERS: &[&str] = &["##", "#@#", "#?#", "#$#", "#%#", "#@$#"];

/// Parse a single line of rule text.
///
/// Returns `Ok(None)` for lines that carry no DNS rule (blank lines,
/// comments, cosmetic rules).
pub fn parse_line(line: &str, list_id: i64) -> Result<Option<ParsedRule>, RuleError> {
    let line = line.trim();

    if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
        return Ok(None);
    }

    if COSMETIC_MARKERS.iter().any(|m| line.contains(m)) {
        return Ok(None);
    }

    // Hosts-file syntax: the first token is an address
    let first = line.split_whitespace().next().unwrap_or_default();
    if let Ok(ip) = first.parse::<IpAddr>() {
        return HostRule::parse(line, ip, list_id).map(|r| Some(ParsedRule::Host(r)));
    }

    NetworkRule::parse(line, list_id).map(|r| Some(ParsedRule::Network(r)))
}

/// Check that a hostname or hostname pattern only contains characters that
/// can appear in DNS names. `*` is accepted when `allow_wildcard` is set.
pub(crate) fn is_valid_hostname(name: &str, allow_wildcard: bool) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || b == b'.'
                || b == b'-'
                || b == b'_'
                || (allow_wildcard && b == b'*')
        })
}

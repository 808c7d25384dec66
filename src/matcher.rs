//! Converts engine matches into filtering results.

use crate::engine::DnsEngine;
use crate::rule::Rule;
use crate::{FilterResult, Reason, RecordType};

/// Match a lower-case hostname against an engine and build the result for
/// the queried record type.
///
/// Resolution order:
/// 1. A network rule wins over host rules. Allow rules give
///    `NotFilteredWhiteList`, block rules `FilteredBlackList`.
/// 2. Host rules for the queried type (A with IPv4, AAAA with IPv6): the
///    first one is reported with its address.
/// 3. Host rules of the other family: the first one is reported as
///    `FilteredBlackList` without an address. The name is governed by a
///    block rule, there is just no answer for this type.
pub fn match_host<S: AsRef<str>>(
    engine: &DnsEngine,
    host: &str,
    qtype: RecordType,
    client_tags: &[S],
) -> FilterResult {
    let Some(m) = engine.match_host(host, client_tags) else {
        return FilterResult::default();
    };

    if let Some(rule) = m.network_rule {
        log::debug!(
            "Filtering: found rule for host '{}': '{}' list_id: {}",
            host,
            rule.text(),
            rule.filter_list_id()
        );
        let reason = if rule.is_allow() {
            Reason::NotFilteredWhiteList
        } else {
            Reason::FilteredBlackList
        };
        return FilterResult {
            is_filtered: reason.is_filtered(),
            reason,
            rule: rule.text().to_string(),
            filter_id: rule.filter_list_id(),
            ..Default::default()
        };
    }

    let same_type = match qtype {
        RecordType::A => m.host_rules_v4.first(),
        RecordType::AAAA => m.host_rules_v6.first(),
        _ => None,
    };
    if let Some(rule) = same_type {
        return FilterResult {
            is_filtered: true,
            reason: Reason::FilteredBlackList,
            rule: rule.text().to_string(),
            filter_id: rule.filter_list_id(),
            ip: Some(rule.ip()),
            ..Default::default()
        };
    }

    match m.host_rules_v4.first().or_else(|| m.host_rules_v6.first()) {
        Some(rule) => FilterResult {
            is_filtered: true,
            reason: Reason::FilteredBlackList,
            rule: rule.text().to_string(),
            filter_id: rule.filter_list_id(),
            ..Default::default()
        },
        None => FilterResult::default(),
    }
}

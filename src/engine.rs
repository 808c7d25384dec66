//! Rule index answering hostname queries.

use ahash::AHashMap;
use std::cmp::Reverse;

use crate::error::Error;
use crate::rule::{parse_line, HostRule, NetworkRule, ParsedRule, Pattern};
use crate::storage::RuleStorage;
use crate::Result;

/// Rules matched for one hostname.
///
/// Either `network_rule` is set, or one or both host rule sets are
/// non-empty. Host rules are in storage order.
#[derive(Debug, Default)]
pub struct DnsMatch<'a> {
    /// The network rule selected for the host
    pub network_rule: Option<&'a NetworkRule>,
    /// Host rules with an IPv4 address
    pub host_rules_v4: Vec<&'a HostRule>,
    /// Host rules with an IPv6 address
    pub host_rules_v6: Vec<&'a HostRule>,
}

/// DnsEngine indexes the rules of a [`RuleStorage`].
///
/// Network rules are selected in priority order:
/// 1. Important block rules
/// 2. Allow rules
/// 3. Block rules
///
/// Within a class, rules restricted by client tags beat unrestricted ones,
/// then the first rule in storage order wins. A matched network rule hides
/// any host rules for the same name.
pub struct DnsEngine {
    network_rules: Vec<NetworkRule>,
    host_rules: Vec<HostRule>,
    /// Domain patterns by domain (matches the domain and its subdomains)
    domains: AHashMap<String, Vec<usize>>,
    /// Exact patterns by hostname
    exacts: AHashMap<String, Vec<usize>>,
    /// Regex and wildcard rules, checked one by one
    scanned: Vec<usize>,
    /// Host rules by hostname
    hosts: AHashMap<String, Vec<usize>>,
}

impl DnsEngine {
    /// Parse every list of `storage` and build the index.
    ///
    /// Fails on the first malformed rule.
    pub fn new(storage: &RuleStorage) -> Result<Self> {
        let mut engine = Self {
            network_rules: Vec::new(),
            host_rules: Vec::new(),
            domains: AHashMap::new(),
            exacts: AHashMap::new(),
            scanned: Vec::new(),
            hosts: AHashMap::new(),
        };

        for list in storage.lists() {
            let contents = list.contents()?;
            for (idx, line) in contents.lines().enumerate() {
                match parse_line(line, list.id()).map_err(|e| Error::at(list.id(), idx + 1, e))? {
                    Some(ParsedRule::Network(rule)) => engine.add_network_rule(rule),
                    Some(ParsedRule::Host(rule)) => engine.add_host_rule(rule),
                    None => {}
                }
            }
        }

        log::debug!(
            "Built rule engine: {} network rules, {} host rules",
            engine.network_rules.len(),
            engine.host_rules.len()
        );

        Ok(engine)
    }

    fn add_network_rule(&mut self, rule: NetworkRule) {
        let idx = self.network_rules.len();
        match rule.pattern() {
            Pattern::Domain(name) => self.domains.entry(name.clone()).or_default().push(idx),
            Pattern::Exact(name) => self.exacts.entry(name.clone()).or_default().push(idx),
            Pattern::Regex(_) => self.scanned.push(idx),
        }
        self.network_rules.push(rule);
    }

    fn add_host_rule(&mut self, rule: HostRule) {
        let idx = self.host_rules.len();
        for name in rule.hostnames() {
            let entry = self.hosts.entry(name.clone()).or_default();
            // A name listed twice on one line is indexed once
            if entry.last() != Some(&idx) {
                entry.push(idx);
            }
        }
        self.host_rules.push(rule);
    }

    /// Number of network rules.
    pub fn network_rule_count(&self) -> usize {
        self.network_rules.len()
    }

    /// Number of host rules.
    pub fn host_rule_count(&self) -> usize {
        self.host_rules.len()
    }

    /// Match a lower-case hostname for a client carrying `client_tags`.
    ///
    /// Returns `None` if no rule matches.
    pub fn match_host<S: AsRef<str>>(&self, host: &str, client_tags: &[S]) -> Option<DnsMatch<'_>> {
        if host.is_empty() {
            return None;
        }

        if let Some(rule) = self.best_network_rule(host, client_tags) {
            return Some(DnsMatch {
                network_rule: Some(rule),
                ..Default::default()
            });
        }

        let indexes = self.hosts.get(host)?;
        let mut result = DnsMatch::default();
        for &idx in indexes {
            let rule = &self.host_rules[idx];
            if rule.ip().is_ipv4() {
                result.host_rules_v4.push(rule);
            } else {
                result.host_rules_v6.push(rule);
            }
        }
        Some(result)
    }

    fn best_network_rule<S: AsRef<str>>(
        &self,
        host: &str,
        client_tags: &[S],
    ) -> Option<&NetworkRule> {
        let mut candidates: Vec<usize> = Vec::new();

        if let Some(idxs) = self.exacts.get(host) {
            candidates.extend(idxs);
        }

        // The host itself, then each parent domain
        let mut current = host;
        loop {
            if let Some(idxs) = self.domains.get(current) {
                candidates.extend(idxs);
            }
            match current.find('.') {
                Some(pos) => current = &current[pos + 1..],
                None => break,
            }
        }

        candidates.extend(self.scanned.iter().copied());

        candidates
            .into_iter()
            .filter(|&idx| self.network_rules[idx].matches(host, client_tags))
            .min_by_key(|&idx| (Reverse(self.network_rules[idx].priority()), idx))
            .map(|idx| &self.network_rules[idx])
    }
}

//! Rewrite table lookup and CNAME chain resolution.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::rule::is_valid_hostname;
use crate::{FilterResult, Reason, RecordType};

/// RewriteEntry maps a domain pattern to an answer.
///
/// The record type follows from the answer: an IPv4 address gives an A
/// record, an IPv6 address an AAAA record, anything else a CNAME.
///
/// Domain patterns are exact (`host.example.org`) or wildcards
/// (`*.example.org`, matching every subdomain but not `example.org`).
/// An entry whose answer equals its domain is an exception: the host is
/// left unrewritten, even when a wildcard entry would cover it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteEntry {
    pub domain: String,
    pub answer: String,
}

impl RewriteEntry {
    /// Create a normalized, validated entry.
    pub fn new(domain: &str, answer: &str) -> Result<Self> {
        let mut entry = Self {
            domain: domain.to_string(),
            answer: answer.to_string(),
        };
        entry.normalize()?;
        Ok(entry)
    }

    /// Lower-case the entry and check that both sides are usable.
    pub(crate) fn normalize(&mut self) -> Result<()> {
        self.domain = self.domain.trim().trim_end_matches('.').to_lowercase();
        self.answer = self.answer.trim().to_lowercase();

        let pattern = self.domain.strip_prefix("*.").unwrap_or(&self.domain);
        if !is_valid_hostname(pattern, false) {
            return Err(Error::InvalidRewrite(format!(
                "bad domain {:?}",
                self.domain
            )));
        }
        if self.answer.is_empty() {
            return Err(Error::InvalidRewrite(format!(
                "empty answer for {:?}",
                self.domain
            )));
        }
        if self.ip().is_none() {
            self.answer = self.answer.trim_end_matches('.').to_string();
            if !is_valid_hostname(&self.answer, false) {
                return Err(Error::InvalidRewrite(format!(
                    "bad answer {:?}",
                    self.answer
                )));
            }
        }
        Ok(())
    }

    /// Record type produced by this entry.
    pub fn record_type(&self) -> RecordType {
        match self.ip() {
            Some(IpAddr::V4(_)) => RecordType::A,
            Some(IpAddr::V6(_)) => RecordType::AAAA,
            None => RecordType::CNAME,
        }
    }

    /// The answer as an address, for A and AAAA entries.
    pub fn ip(&self) -> Option<IpAddr> {
        self.answer.parse().ok()
    }

    fn is_wildcard(&self) -> bool {
        self.domain.starts_with("*.")
    }

    fn is_exception(&self) -> bool {
        self.answer == self.domain
    }

    fn matches(&self, host: &str) -> bool {
        if self.is_wildcard() {
            let suffix = &self.domain[1..];
            host.len() > suffix.len() && host.ends_with(suffix)
        } else {
            self.domain == host
        }
    }
}

/// RewriteTable is the ordered list of rewrite entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewriteTable {
    entries: Vec<RewriteEntry>,
}

impl RewriteTable {
    /// Build a table, normalizing every entry.
    pub fn new(mut entries: Vec<RewriteEntry>) -> Result<Self> {
        entries.iter_mut().try_for_each(RewriteEntry::normalize)?;
        Ok(Self { entries })
    }

    /// Normalize entries loaded from a config file.
    pub(crate) fn prepare(&mut self) -> Result<()> {
        self.entries.iter_mut().try_for_each(RewriteEntry::normalize)
    }

    pub fn entries(&self) -> &[RewriteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalize and append an entry. Returns false if the same entry is
    /// already present.
    pub fn add(&mut self, mut entry: RewriteEntry) -> Result<bool> {
        entry.normalize()?;
        if self.entries.contains(&entry) {
            return Ok(false);
        }
        self.entries.push(entry);
        Ok(true)
    }

    /// Remove the entry equal to `entry` once normalized. Returns false if it
    /// was not present.
    pub fn remove(&mut self, entry: &RewriteEntry) -> Result<bool> {
        let mut entry = entry.clone();
        entry.normalize()?;
        let before = self.entries.len();
        self.entries.retain(|e| *e != entry);
        Ok(self.entries.len() != before)
    }

    /// Find the entries for a lower-case host.
    ///
    /// Exact entries shadow wildcard entries. Among wildcards only the most
    /// specific pattern is kept. If an exception is left the host is not
    /// rewritten. CNAME entries come first; the table order is kept otherwise.
    pub fn find(&self, host: &str) -> Vec<&RewriteEntry> {
        let mut found: Vec<&RewriteEntry> =
            self.entries.iter().filter(|e| e.matches(host)).collect();
        if found.is_empty() {
            return found;
        }

        if found.iter().any(|e| !e.is_wildcard()) {
            found.retain(|e| !e.is_wildcard());
        } else {
            let longest = found.iter().map(|e| e.domain.len()).max().unwrap_or_default();
            found.retain(|e| e.domain.len() == longest);
        }
        if found.iter().any(|e| e.is_exception()) {
            return Vec::new();
        }

        found.sort_by_key(|e| e.record_type() != RecordType::CNAME);
        found
    }

    /// Resolve a lower-case host through the table.
    ///
    /// CNAME entries are followed hop by hop; only the last canonical name is
    /// kept. A loop stops the resolution and returns what was collected so
    /// far, which has a canonical name but no addresses. At the final host,
    /// every entry of the queried type contributes its address, in order.
    pub fn resolve(&self, host: &str, qtype: RecordType) -> FilterResult {
        let mut rr = self.find(host);
        if rr.is_empty() {
            return FilterResult::default();
        }

        let mut res = FilterResult::with_reason(Reason::Rewrite);
        let mut seen: AHashSet<&str> = AHashSet::new();
        let mut current = host;

        while let Some(first) = rr
            .first()
            .copied()
            .filter(|e| e.record_type() == RecordType::CNAME)
        {
            log::debug!("Rewrite: CNAME for {} is {}", current, first.answer);
            current = &first.answer;
            if !seen.insert(current) {
                log::info!(
                    "Rewrite: breaking CNAME redirection loop: {}. Question: {}",
                    current,
                    host
                );
                return res;
            }
            res.canon_name = first.answer.clone();
            rr = self.find(current);
        }

        if qtype != RecordType::CNAME {
            for entry in rr.into_iter().filter(|e| e.record_type() == qtype) {
                if let Some(ip) = entry.ip() {
                    log::debug!("Rewrite: {} for {} is {}", qtype, current, ip);
                    res.ip_list.push(ip);
                }
            }
        }

        res
    }
}

impl From<Vec<RewriteEntry>> for RewriteTable {
    /// Wrap entries that are already normalized.
    fn from(entries: Vec<RewriteEntry>) -> Self {
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> RewriteTable {
        let entries = pairs
            .iter()
            .map(|(d, a)| RewriteEntry {
                domain: d.to_string(),
                answer: a.to_string(),
            })
            .collect();
        RewriteTable::new(entries).unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_record_types() {
        assert_eq!(RewriteEntry::new("a.org", "1.2.3.4").unwrap().record_type(), RecordType::A);
        assert_eq!(RewriteEntry::new("a.org", "::1").unwrap().record_type(), RecordType::AAAA);
        assert_eq!(RewriteEntry::new("a.org", "b.org").unwrap().record_type(), RecordType::CNAME);
    }

    #[test]
    fn test_normalize() {
        let entry = RewriteEntry::new(" Host.Example.ORG. ", "CDN.Example.net.").unwrap();
        assert_eq!(entry.domain, "host.example.org");
        assert_eq!(entry.answer, "cdn.example.net");

        assert!(RewriteEntry::new("", "1.2.3.4").is_err());
        assert!(RewriteEntry::new("host.example.org", "").is_err());
        assert!(RewriteEntry::new("bad host", "1.2.3.4").is_err());
        assert!(RewriteEntry::new("host.example.org", "bad answer").is_err());
    }

    #[test]
    fn test_no_rewrite() {
        let entries = table(&[("host.example.org", "1.2.3.4")]);
        let res = entries.resolve("other.example.org", RecordType::A);
        assert_eq!(res, FilterResult::default());
    }

    #[test]
    fn test_fan_out() {
        let entries = table(&[
            ("host.example.org", "1.2.3.4"),
            ("host.example.org", "::1"),
            ("host.example.org", "5.6.7.8"),
        ]);
        let res = entries.resolve("host.example.org", RecordType::A);
        assert_eq!(res.reason, Reason::Rewrite);
        assert!(!res.is_filtered);
        assert_eq!(res.ip_list, vec![ip("1.2.3.4"), ip("5.6.7.8")]);

        let res = entries.resolve("host.example.org", RecordType::AAAA);
        assert_eq!(res.ip_list, vec![ip("::1")]);

        // Rewritten, but nothing for this type
        let res = entries.resolve("host.example.org", RecordType::Other(16));
        assert_eq!(res.reason, Reason::Rewrite);
        assert!(res.ip_list.is_empty());
    }

    #[test]
    fn test_cname_chain() {
        let entries = table(&[
            ("www.example.org", "edge.example.org"),
            ("edge.example.org", "cdn.example.net"),
            ("cdn.example.net", "9.9.9.9"),
        ]);
        let res = entries.resolve("www.example.org", RecordType::A);
        assert_eq!(res.reason, Reason::Rewrite);
        assert_eq!(res.canon_name, "cdn.example.net");
        assert_eq!(res.ip_list, vec![ip("9.9.9.9")]);
    }

    #[test]
    fn test_cname_without_addresses() {
        let entries = table(&[("www.example.org", "elsewhere.example.net")]);
        let res = entries.resolve("www.example.org", RecordType::A);
        assert_eq!(res.reason, Reason::Rewrite);
        assert_eq!(res.canon_name, "elsewhere.example.net");
        assert!(res.ip_list.is_empty());
    }

    #[test]
    fn test_cname_loop() {
        let entries = table(&[
            ("a.example.org", "b.example.org"),
            ("b.example.org", "a.example.org"),
        ]);
        let res = entries.resolve("a.example.org", RecordType::A);
        assert_eq!(res.reason, Reason::Rewrite);
        assert_eq!(res.canon_name, "a.example.org");
        assert!(res.ip_list.is_empty());

        let entries = table(&[
            ("a.example.org", "b.example.org"),
            ("b.example.org", "c.example.org"),
            ("c.example.org", "b.example.org"),
            ("c.example.org", "1.1.1.1"),
        ]);
        let res = entries.resolve("a.example.org", RecordType::A);
        assert_eq!(res.canon_name, "c.example.org");
        assert!(res.ip_list.is_empty());
    }

    #[test]
    fn test_wildcard() {
        let entries = table(&[
            ("*.example.org", "1.1.1.1"),
            ("*.sub.example.org", "2.2.2.2"),
            ("exact.example.org", "3.3.3.3"),
        ]);

        let res = entries.resolve("host.example.org", RecordType::A);
        assert_eq!(res.ip_list, vec![ip("1.1.1.1")]);

        // The more specific wildcard wins
        let res = entries.resolve("host.sub.example.org", RecordType::A);
        assert_eq!(res.ip_list, vec![ip("2.2.2.2")]);

        // Exact entries shadow wildcards
        let res = entries.resolve("exact.example.org", RecordType::A);
        assert_eq!(res.ip_list, vec![ip("3.3.3.3")]);

        // A wildcard does not cover the bare domain
        let res = entries.resolve("example.org", RecordType::A);
        assert_eq!(res, FilterResult::default());
    }

    #[test]
    fn test_exception_entry() {
        let entries = table(&[
            ("*.example.org", "1.1.1.1"),
            ("keep.example.org", "keep.example.org"),
        ]);
        let res = entries.resolve("keep.example.org", RecordType::A);
        assert_eq!(res, FilterResult::default());
        assert!(entries.find("keep.example.org").is_empty());

        let res = entries.resolve("other.example.org", RecordType::A);
        assert_eq!(res.ip_list, vec![ip("1.1.1.1")]);

        // A CNAME into an excepted host stops there
        let entries = table(&[
            ("www.example.org", "keep.example.org"),
            ("*.example.org", "1.1.1.1"),
            ("keep.example.org", "keep.example.org"),
        ]);
        let res = entries.resolve("www.example.org", RecordType::A);
        assert_eq!(res.canon_name, "keep.example.org");
        assert!(res.ip_list.is_empty());
    }

    #[test]
    fn test_add_remove() {
        let mut entries = table(&[("host.example.org", "1.2.3.4")]);
        let entry = RewriteEntry::new("other.example.org", "5.6.7.8").unwrap();
        assert!(entries.add(entry.clone()).unwrap());
        assert!(!entries.add(entry.clone()).unwrap());
        assert_eq!(entries.len(), 2);
        assert!(entries.remove(&entry).unwrap());
        assert!(!entries.remove(&entry).unwrap());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_add_remove_normalizes() {
        let mut entries = RewriteTable::default();
        let mixed = RewriteEntry {
            domain: "Host.Example.".to_string(),
            answer: " 1.2.3.4 ".to_string(),
        };
        assert!(entries.add(mixed.clone()).unwrap());
        assert_eq!(entries.entries()[0].domain, "host.example");
        assert_eq!(entries.entries()[0].answer, "1.2.3.4");

        let res = entries.resolve("host.example", RecordType::A);
        assert_eq!(res.ip_list, vec![ip("1.2.3.4")]);

        let bad = RewriteEntry {
            domain: "bad host".to_string(),
            answer: "1.2.3.4".to_string(),
        };
        assert!(matches!(entries.add(bad.clone()), Err(Error::InvalidRewrite(_))));
        assert!(entries.remove(&bad).is_err());
        assert_eq!(entries.len(), 1);

        assert!(entries.remove(&mixed).unwrap());
        assert!(entries.is_empty());
    }

    #[test]
    fn test_cname_first() {
        let entries = table(&[
            ("host.example.org", "1.2.3.4"),
            ("host.example.org", "target.example.org"),
        ]);
        let found = entries.find("host.example.org");
        assert_eq!(found[0].record_type(), RecordType::CNAME);
        assert_eq!(found[1].record_type(), RecordType::A);
    }
}

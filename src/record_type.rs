//! DNS record type definitions.

use std::fmt;

/// RecordType is the DNS query type a decision is made for.
///
/// Only the types the filter treats specially get their own variant;
/// everything else is carried as its raw code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    AAAA,
    /// Canonical name record
    CNAME,
    /// Any other type, by its numeric code
    Other(u16),
}

impl RecordType {
    /// Parse a record type from its mnemonic (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "A" => Some(RecordType::A),
            "AAAA" => Some(RecordType::AAAA),
            "CNAME" => Some(RecordType::CNAME),
            "MX" => Some(RecordType::Other(15)),
            "TXT" => Some(RecordType::Other(16)),
            "HTTPS" => Some(RecordType::Other(65)),
            other => other
                .strip_prefix("TYPE")
                .and_then(|code| code.parse().ok())
                .map(RecordType::from_u16),
        }
    }

    /// Convert from the wire code.
    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => RecordType::A,
            28 => RecordType::AAAA,
            5 => RecordType::CNAME,
            other => RecordType::Other(other),
        }
    }

    /// Convert to the wire code.
    pub fn as_u16(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::AAAA => 28,
            RecordType::CNAME => 5,
            RecordType::Other(v) => *v,
        }
    }
}

impl From<u16> for RecordType {
    fn from(v: u16) -> Self {
        RecordType::from_u16(v)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => f.write_str("A"),
            RecordType::AAAA => f.write_str("AAAA"),
            RecordType::CNAME => f.write_str("CNAME"),
            RecordType::Other(v) => write!(f, "TYPE{}", v),
        }
    }
}

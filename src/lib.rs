//! dnsfilter - DNS query filtering decisions.
//!
//! Given a queried hostname and record type, this crate decides whether
//! the query is blocked, rewritten or passed through.
//!
//! # Features
//!
//! - **Rule lists**: Adblock-style network rules and hosts-file rules,
//!   from inline text or memory-mapped files
//! - **Allow lists**: A second engine that cancels block decisions
//! - **Hot reload**: Rule engines are rebuilt off the query path and
//!   swapped atomically, in place or on a background worker
//! - **Rewrites**: Per-domain answers with CNAME chains and loop detection
//! - **Blocked services**: Named groups of rules
//! - **Classifiers**: Safe search, safe browsing and parental control
//!   lookups behind a cache
//!
//! # Quick Start
//!
//! ```
//! use dnsfilter::{Config, DnsFilter, Filter, Reason, RecordType};
//!
//! let filter = DnsFilter::new(Config::default());
//! filter.set_filters(
//!     vec![Filter::inline("||ads.example.org^\n0.0.0.0 tracker.example.org")],
//!     vec![Filter::inline("@@||ok.ads.example.org^")],
//!     false,
//! )?;
//!
//! let mut settings = filter.request_settings();
//! settings.filtering_enabled = true;
//!
//! let res = filter.check_host("ads.example.org", RecordType::A, &settings)?;
//! assert!(res.is_filtered);
//!
//! let res = filter.check_host("ok.ads.example.org", RecordType::A, &settings)?;
//! assert_eq!(res.reason, Reason::NotFilteredNotFound);
//! # Ok::<(), dnsfilter::Error>(())
//! ```
//!
//! # Decision Order
//!
//! Checks run in the following order, the first match decides:
//! 1. Rewrites
//! 2. Block rules (cancelled by allow rules)
//! 3. Blocked services
//! 4. Safe search, safe browsing, parental control

mod error;
mod reason;
mod record_type;
mod result;

pub mod classifier;
pub mod config;
pub mod context;
pub mod engine;
pub mod filter;
pub mod manager;
pub mod matcher;
pub mod rewrite;
pub mod rule;
pub mod services;
pub mod storage;

// Re-export core types
pub use error::{Error, Result, RuleError};
pub use reason::Reason;
pub use record_type::RecordType;
pub use result::FilterResult;

// Re-export the filtering API
pub use config::{Config, RequestFilteringSettings};
pub use context::{FilterContext, LookupStats, Stats};
pub use filter::DnsFilter;
pub use manager::EngineManager;
pub use rewrite::{RewriteEntry, RewriteTable};
pub use services::ServiceEntry;
pub use storage::Filter;

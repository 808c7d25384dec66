//! Network (pattern based) rule implementation.

use regex::Regex;
use std::fmt;

use super::{is_valid_hostname, Rule};
use crate::error::RuleError;

/// Prefix that turns a rule into an allow rule.
const ALLOW_PREFIX: &str = "@@";

/// How a network rule matches hostnames.
#[derive(Clone)]
pub(crate) enum Pattern {
    /// The domain itself and all of its subdomains
    Domain(String),
    /// Exactly this hostname
    Exact(String),
    /// Hostname regex, either written as `/.../` or built from `*` wildcards
    Regex(Regex),
}

impl Pattern {
    fn matches(&self, host: &str) -> bool {
        match self {
            Pattern::Domain(name) => {
                host == name
                    || (host.len() > name.len()
                        && host.ends_with(name.as_str())
                        && host.as_bytes()[host.len() - name.len() - 1] == b'.')
            }
            Pattern::Exact(name) => host == name,
            Pattern::Regex(re) => re.is_match(host),
        }
    }
}

/// Client tag restrictions from the `$ctag` modifier.
#[derive(Debug, Clone, Default)]
struct ClientTags {
    permitted: Vec<String>,
    restricted: Vec<String>,
}

impl ClientTags {
    fn parse(value: &str) -> Result<Self, RuleError> {
        let mut tags = ClientTags::default();
        for tag in value.split('|') {
            let tag = tag.trim();
            match tag.strip_prefix('~') {
                Some("") => return Err(RuleError::UnsupportedModifier(format!("ctag={}", value))),
                Some(t) => tags.restricted.push(t.to_string()),
                None if tag.is_empty() => {
                    return Err(RuleError::UnsupportedModifier(format!("ctag={}", value)))
                }
                None => tags.permitted.push(tag.to_string()),
            }
        }
        Ok(tags)
    }

    fn allows<S: AsRef<str>>(&self, client_tags: &[S]) -> bool {
        let has = |tag: &String| client_tags.iter().any(|t| t.as_ref() == tag);

        if self.restricted.iter().any(has) {
            return false;
        }
        self.permitted.is_empty() || self.permitted.iter().any(has)
    }
}

/// NetworkRule blocks or allows hostnames by pattern.
///
/// # Syntax
/// - `||example.org^` - `example.org` and all of its subdomains
/// - `|example.org^` or `|example.org|` - exactly `example.org`
/// - `example.org` - same as `||example.org^`
/// - `||ads*.example.org^` - `*` matches any run of characters
/// - `/^ads[0-9]+\./` - regular expression over the hostname
/// - `@@` prefix - allow rule
/// - `$important` - block rule that wins over allow rules
/// - `$ctag=tag1|~tag2` - only for clients tagged `tag1` and not `tag2`
///
/// # Examples
/// ```
/// use dnsfilter::rule::NetworkRule;
///
/// let rule = NetworkRule::parse("||ads.example.org^", 1).unwrap();
/// assert!(rule.matches_host("ads.example.org"));
/// assert!(rule.matches_host("cdn.ads.example.org"));
/// assert!(!rule.matches_host("example.org"));
/// ```
#[derive(Clone)]
pub struct NetworkRule {
    text: String,
    list_id: i64,
    allow: bool,
    important: bool,
    ctags: Option<ClientTags>,
    pattern: Pattern,
}

impl NetworkRule {
    /// Parse a network rule from its text.
    pub fn parse(text: &str, list_id: i64) -> Result<Self, RuleError> {
        let text = text.trim();
        let (allow, body) = match text.strip_prefix(ALLOW_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (pattern_text, modifiers) = split_modifiers(body);

        let mut important = false;
        let mut ctags = None;
        if let Some(modifiers) = modifiers {
            for modifier in modifiers.split(',') {
                let modifier = modifier.trim();
                match modifier.split_once('=') {
                    None if modifier == "important" => important = true,
                    Some(("ctag", value)) => ctags = Some(ClientTags::parse(value)?),
                    _ => return Err(RuleError::UnsupportedModifier(modifier.to_string())),
                }
            }
        }

        Ok(Self {
            text: text.to_string(),
            list_id,
            allow,
            important,
            ctags,
            pattern: parse_pattern(pattern_text)?,
        })
    }

    /// Whether this is an allow (`@@`) rule.
    pub fn is_allow(&self) -> bool {
        self.allow
    }

    /// Whether this rule carries the `important` modifier.
    pub fn is_important(&self) -> bool {
        self.important
    }

    /// Whether this rule is restricted to tagged clients.
    pub fn has_client_tags(&self) -> bool {
        self.ctags.is_some()
    }

    /// Match a lower-case hostname, ignoring client tags.
    pub fn matches_host(&self, host: &str) -> bool {
        self.matches(host, &[] as &[&str])
    }

    /// Match a lower-case hostname for a client carrying `client_tags`.
    pub fn matches<S: AsRef<str>>(&self, host: &str, client_tags: &[S]) -> bool {
        if let Some(ref ctags) = self.ctags {
            if !ctags.allows(client_tags) {
                return false;
            }
        }
        self.pattern.matches(host)
    }

    /// Priority used to pick one rule when several match.
    pub(crate) fn priority(&self) -> (u8, bool) {
        let class = match (self.allow, self.important) {
            (false, true) => 3,
            (true, _) => 2,
            (false, false) => 1,
        };
        (class, self.ctags.is_some())
    }

    pub(crate) fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

impl Rule for NetworkRule {
    fn text(&self) -> &str {
        &self.text
    }

    fn filter_list_id(&self) -> i64 {
        self.list_id
    }
}

impl fmt::Debug for NetworkRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkRule")
            .field("text", &self.text)
            .field("list_id", &self.list_id)
            .finish()
    }
}

/// Split `pattern$modifiers`. For regex rules the separator is the `$`
/// right after the closing slash, since `$` is also a regex anchor.
fn split_modifiers(body: &str) -> (&str, Option<&str>) {
    if body.starts_with('/') {
        if let Some(end) = body.rfind("/$") {
            if end > 0 {
                return (&body[..=end], Some(&body[end + 2..]));
            }
        }
        return (body, None);
    }

    match body.split_once('$') {
        Some((pattern, modifiers)) => (pattern, Some(modifiers)),
        None => (body, None),
    }
}

fn parse_pattern(text: &str) -> Result<Pattern, RuleError> {
    if text.len() > 2 && text.starts_with('/') && text.ends_with('/') {
        let source = &text[1..text.len() - 1];
        return Regex::new(&format!("(?i){}", source))
            .map(Pattern::Regex)
            .map_err(|e| RuleError::InvalidRegex {
                pattern: source.to_string(),
                reason: e.to_string(),
            });
    }

    let (exact, name) = if let Some(rest) = text.strip_prefix("||") {
        (false, rest)
    } else if let Some(rest) = text.strip_prefix('|') {
        (true, rest)
    } else {
        (false, text)
    };

    let name = name.trim_end_matches(&['^', '|'][..]).to_lowercase();
    if name.is_empty() {
        return Err(RuleError::EmptyPattern);
    }
    if !is_valid_hostname(&name, true) || name.starts_with('.') {
        return Err(RuleError::InvalidPattern(text.to_string()));
    }

    if name.contains('*') {
        let body = name
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let source = if exact {
            format!("^{}$", body)
        } else {
            format!("(^|\\.){}$", body)
        };
        return Regex::new(&source)
            .map(Pattern::Regex)
            .map_err(|e| RuleError::InvalidRegex {
                pattern: source,
                reason: e.to_string(),
            });
    }

    Ok(if exact {
        Pattern::Exact(name)
    } else {
        Pattern::Domain(name)
    })
}

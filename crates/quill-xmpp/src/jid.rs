//! XMPP addresses (JIDs) per RFC 7622.
//!
//! A JID is `[localpart@]domainpart[/resourcepart]`. Parsing always
//! succeeds; inputs that violate the profile collapse to the empty JID,
//! which callers can detect with [`Jid::is_empty`]. Normalization is
//! idempotent.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use unicode_normalization::UnicodeNormalization;

/// Maximum size of each part after normalization, in bytes; anything
/// longer collapses the whole JID to empty.
const MAX_PART_BYTES: usize = 1024;

/// Characters excluded from the localpart (RFC 7622 §3.3.1), stripped
/// during normalization together with spaces and ASCII controls.
const LOCAL_FORBIDDEN: &[char] = &['"', '&', '\'', '/', ':', '<', '>', '@'];

/// A parsed, normalized JID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Jid {
    local: String,
    domain: String,
    resource: String,
}

impl Jid {
    /// Parses and normalizes a JID. Returns the empty JID when the input
    /// violates the address profile (empty domain, oversized part, IDNA
    /// failure).
    pub fn new(s: &str) -> Jid {
        let (rest, resource) = match s.split_once('/') {
            Some((rest, resource)) => (rest, Some(resource)),
            None => (s, None),
        };
        let (local, domain) = match rest.split_once('@') {
            Some((local, domain)) => (Some(local), domain),
            None => (None, rest),
        };

        let local = match local {
            Some(l) => match normalize_local(l) {
                Some(l) => l,
                None => return Jid::default(),
            },
            None => String::new(),
        };
        let domain = match normalize_domain(domain) {
            Some(d) => d,
            None => return Jid::default(),
        };
        let resource = match resource {
            Some(r) => match normalize_resource(r) {
                Some(r) => r,
                None => return Jid::default(),
            },
            None => String::new(),
        };

        Jid {
            local,
            domain,
            resource,
        }
    }

    /// The localpart, empty when absent.
    pub fn local(&self) -> &str {
        &self.local
    }

    /// The domainpart.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The resourcepart, empty when absent.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Whether this is the empty JID (parse failure or empty input).
    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
    }

    /// Whether this JID carries a resource.
    pub fn is_full(&self) -> bool {
        !self.is_empty() && !self.resource.is_empty()
    }

    /// This JID without its resource.
    pub fn bare(&self) -> Jid {
        Jid {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: String::new(),
        }
    }

    /// This JID with the given resource. Returns the empty JID when the
    /// resource does not normalize.
    pub fn with_resource(&self, resource: &str) -> Jid {
        if self.is_empty() {
            return Jid::default();
        }
        match normalize_resource(resource) {
            Some(r) if !r.is_empty() => Jid {
                local: self.local.clone(),
                domain: self.domain.clone(),
                resource: r,
            },
            _ => Jid::default(),
        }
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.local.is_empty() {
            write!(f, "{}@", self.local)?;
        }
        f.write_str(&self.domain)?;
        if !self.resource.is_empty() {
            write!(f, "/{}", self.resource)?;
        }
        Ok(())
    }
}

impl FromStr for Jid {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Jid::new(s))
    }
}

/// Maps fullwidth forms (U+FF01..U+FF5E) onto their ASCII counterparts and
/// the ideographic space onto SPACE.
fn fold_width(c: char) -> char {
    match c {
        '\u{FF01}'..='\u{FF5E}' => {
            char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
        }
        '\u{3000}' => ' ',
        _ => c,
    }
}

/// Width-fold, lowercase, NFC, then strip the excluded set. `None` when the
/// result is empty or oversized.
fn normalize_local(s: &str) -> Option<String> {
    let folded: String = s
        .chars()
        .map(fold_width)
        .flat_map(char::to_lowercase)
        .nfc()
        .filter(|c| !c.is_control() && *c != ' ' && !LOCAL_FORBIDDEN.contains(c))
        .collect();
    if folded.is_empty() || folded.len() > MAX_PART_BYTES {
        return None;
    }
    Some(folded)
}

/// IP literal, or IDNA-to-Unicode with lowercasing.
fn normalize_domain(s: &str) -> Option<String> {
    let s = s.strip_suffix('.').unwrap_or(s);
    if s.is_empty() || s.len() > MAX_PART_BYTES {
        return None;
    }
    // IPv6 literals keep their brackets; IPv4 literals pass unchanged.
    if s.starts_with('[') && s.ends_with(']') {
        let inner = &s[1..s.len() - 1];
        return inner.parse::<IpAddr>().ok().map(|_| s.to_ascii_lowercase());
    }
    if s.parse::<IpAddr>().is_ok() {
        return Some(s.to_string());
    }
    let (unicode, result) = idna::domain_to_unicode(s);
    match result {
        Ok(()) if !unicode.is_empty() && unicode.len() <= MAX_PART_BYTES => Some(unicode),
        _ => None,
    }
}

/// NFC only; controls are rejected outright rather than stripped.
fn normalize_resource(s: &str) -> Option<String> {
    if s.chars().any(|c| c.is_control()) {
        return None;
    }
    let normalized: String = s.nfc().collect();
    if normalized.is_empty() || normalized.len() > MAX_PART_BYTES {
        return None;
    }
    Some(normalized)
}

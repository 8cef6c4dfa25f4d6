//! Domain-scoped cookie jar.
//!
//! The handshake hops between the identity provider and the application
//! portal; every hop may set cookies on its own host. The jar keeps them per
//! domain so a request only carries the cookies its host would receive in a
//! browser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieJar {
    domains: BTreeMap<String, BTreeMap<String, String>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one `Set-Cookie` header value received from `host`.
    ///
    /// Only `name=value` is kept. A `Domain` attribute widens the scope,
    /// `Max-Age=0` removes the cookie.
    pub fn absorb(&mut self, host: &str, set_cookie: &str) {
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }

        let mut domain = normalize_domain(host);
        let mut expired = false;
        for attr in parts {
            let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" if !val.trim().is_empty() => domain = normalize_domain(val),
                "max-age" => expired = val.trim().parse::<i64>().is_ok_and(|age| age <= 0),
                _ => {}
            }
        }

        if expired {
            if let Some(bucket) = self.domains.get_mut(&domain) {
                bucket.remove(name);
                if bucket.is_empty() {
                    self.domains.remove(&domain);
                }
            }
            return;
        }

        self.domains
            .entry(domain)
            .or_default()
            .insert(name.to_string(), value.trim().to_string());
    }

    /// Insert a cookie directly
    pub fn insert(&mut self, domain: &str, name: &str, value: &str) {
        self.domains
            .entry(normalize_domain(domain))
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    /// `Cookie` header value for a request to `host`, if any cookie applies
    pub fn header_for(&self, host: &str) -> Option<String> {
        let host = normalize_domain(host);
        let mut merged: BTreeMap<&str, &str> = BTreeMap::new();

        // Parent domains first so a more specific domain wins on name clashes
        let mut matching: Vec<(&String, &BTreeMap<String, String>)> = self
            .domains
            .iter()
            .filter(|(domain, _)| domain_matches(&host, domain))
            .collect();
        matching.sort_by_key(|(domain, _)| domain.len());

        for (_, cookies) in matching {
            for (name, value) in cookies {
                merged.insert(name, value);
            }
        }

        if merged.is_empty() {
            return None;
        }

        Some(
            merged
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// True if at least one cookie would be sent to `host`
    pub fn covers(&self, host: &str) -> bool {
        let host = normalize_domain(host);
        self.domains
            .iter()
            .any(|(domain, cookies)| !cookies.is_empty() && domain_matches(&host, domain))
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    /// Total number of cookies across all domains
    pub fn len(&self) -> usize {
        self.domains.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_domain(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_keeps_name_value_only() {
        let mut jar = CookieJar::new();
        jar.absorb("auth.example.edu", "JSESSIONID=abc123; Path=/authserver; HttpOnly");
        assert_eq!(
            jar.header_for("auth.example.edu").as_deref(),
            Some("JSESSIONID=abc123")
        );
        assert_eq!(jar.len(), 1);
    }

    #[test]
    fn test_cookies_stay_on_their_host() {
        let mut jar = CookieJar::new();
        jar.absorb("auth.example.edu", "CASTGC=tgt; Path=/");
        jar.absorb("jw.example.com", "route=r1");

        assert_eq!(jar.header_for("auth.example.edu").as_deref(), Some("CASTGC=tgt"));
        assert_eq!(jar.header_for("jw.example.com").as_deref(), Some("route=r1"));
        assert!(jar.header_for("other.example.org").is_none());
        assert!(jar.covers("auth.example.edu"));
        assert!(jar.covers("jw.example.com"));
    }

    #[test]
    fn test_domain_attribute_widens_scope() {
        let mut jar = CookieJar::new();
        jar.absorb("auth.example.edu", "SSO=1; Domain=.example.edu; Path=/");
        assert!(jar.covers("portal.example.edu"));
        assert_eq!(jar.header_for("portal.example.edu").as_deref(), Some("SSO=1"));
    }

    #[test]
    fn test_max_age_zero_removes() {
        let mut jar = CookieJar::new();
        jar.absorb("auth.example.edu", "JSESSIONID=abc");
        jar.absorb("auth.example.edu", "JSESSIONID=; Max-Age=0");
        assert!(jar.is_empty());
        assert!(!jar.covers("auth.example.edu"));
    }

    #[test]
    fn test_specific_domain_wins_on_clash() {
        let mut jar = CookieJar::new();
        jar.insert("example.edu", "lang", "en");
        jar.insert("auth.example.edu", "lang", "zh");
        assert_eq!(jar.header_for("auth.example.edu").as_deref(), Some("lang=zh"));
    }

    #[test]
    fn test_round_trips_through_json() {
        let mut jar = CookieJar::new();
        jar.absorb("auth.example.edu", "a=1");
        let json = serde_json::to_string(&jar).unwrap();
        let back: CookieJar = serde_json::from_str(&json).unwrap();
        assert_eq!(jar, back);
    }
}

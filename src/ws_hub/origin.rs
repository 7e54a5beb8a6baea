use std::collections::HashSet;

use tracing::warn;

/// Origin allow-list for WebSocket upgrades.
///
/// In production a missing `Origin` header is rejected and an empty
/// allow-list denies every upgrade. In development a missing header is
/// allowed, to accommodate non-browser tooling (curl, websocat).
pub struct OriginPolicy {
    allowed: HashSet<String>,
    production: bool,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>, production: bool) -> Self {
        if production {
            for origin in &allowed {
                if origin.starts_with("http://") && !origin.contains("localhost") && !origin.contains("127.0.0.1")
                {
                    warn!(origin, "non-HTTPS origin allowed in production");
                } else if origin.contains("localhost") || origin.contains("127.0.0.1") {
                    warn!(origin, "localhost origin allowed in production");
                }
            }
        }
        Self { allowed: allowed.into_iter().collect(), production }
    }

    /// Decide whether an upgrade carrying this `Origin` header value (or
    /// none) should proceed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(origin) => self.allowed.contains(origin),
            None => !self.production,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_origin_in_production() {
        let policy = OriginPolicy::new(vec!["https://app.example.com".to_string()], true);
        assert!(!policy.allows(None));
    }

    #[test]
    fn allows_missing_origin_in_development() {
        let policy = OriginPolicy::new(vec!["https://app.example.com".to_string()], false);
        assert!(policy.allows(None));
    }

    #[test]
    fn empty_allow_list_denies_all_in_production() {
        let policy = OriginPolicy::new(vec![], true);
        assert!(!policy.allows(Some("https://app.example.com")));
    }

    #[test]
    fn matches_exact_origin_only() {
        let policy = OriginPolicy::new(vec!["https://app.example.com".to_string()], true);
        assert!(policy.allows(Some("https://app.example.com")));
        assert!(!policy.allows(Some("https://evil.example.com")));
    }
}

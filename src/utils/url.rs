// src/utils/url.rs

//! URL validation for outbound fetches.
//!
//! Every URL is checked twice: when it is stored and again right before it
//! is fetched. Only `http`/`https` targets on public hosts pass; loopback,
//! link-local, private and unique-local addresses are refused, as is the
//! `localhost` name. IPv6 literals that embed an IPv4 address (mapped,
//! compatible or NAT64) are judged by that address. Checks run against the
//! literal host in the URL and do not resolve DNS names.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

/// Reason a URL was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid URL format: {0}")]
    Malformed(String),

    #[error("unsupported scheme: {0} (only http and https are allowed)")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("access to localhost is not allowed")]
    Localhost,

    #[error("access to private IP {0} is not allowed")]
    BlockedAddress(IpAddr),
}

/// Validate a URL string with no allowlist.
///
/// # Examples
/// ```
/// use pathfetch::utils::url::validate_url;
///
/// assert!(validate_url("https://example.com").is_ok());
/// assert!(validate_url("http://127.0.0.1/x").is_err());
/// ```
pub fn validate_url(raw: &str) -> Result<Url, ValidationError> {
    UrlValidator::default().validate(raw)
}

/// URL validator with an optional host allowlist.
///
/// Hosts on the allowlist skip the address checks. Scheme checks always apply.
#[derive(Debug, Clone, Default)]
pub struct UrlValidator {
    allowed_hosts: Vec<String>,
}

impl UrlValidator {
    /// Create a validator that lets the given hosts through the address checks.
    pub fn with_allowed_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_hosts: hosts
                .into_iter()
                .map(|h| normalize_host(h.as_ref()))
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Parse and validate a URL string.
    pub fn validate(&self, raw: &str) -> Result<Url, ValidationError> {
        let url = Url::parse(raw.trim()).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        self.validate_parsed(&url)?;
        Ok(url)
    }

    /// Validate an already parsed URL (used for redirect targets).
    pub fn validate_parsed(&self, url: &Url) -> Result<(), ValidationError> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
        }

        let host = url.host().ok_or(ValidationError::MissingHost)?;
        if self.is_allowed(url) {
            return Ok(());
        }

        match host {
            Host::Domain(domain) => {
                if is_localhost_name(domain) {
                    return Err(ValidationError::Localhost);
                }
            }
            Host::Ipv4(ip) => {
                if is_blocked_v4(ip) {
                    return Err(ValidationError::BlockedAddress(IpAddr::V4(ip)));
                }
            }
            Host::Ipv6(ip) => {
                if is_blocked_v6(ip) {
                    return Err(ValidationError::BlockedAddress(IpAddr::V6(ip)));
                }
            }
        }
        Ok(())
    }

    fn is_allowed(&self, url: &Url) -> bool {
        match url.host_str() {
            Some(host) => {
                let host = normalize_host(host);
                self.allowed_hosts.iter().any(|allowed| *allowed == host)
            }
            None => false,
        }
    }
}

fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_lowercase()
}

fn is_localhost_name(domain: &str) -> bool {
    let d = domain.trim_end_matches('.').to_lowercase();
    d == "localhost" || d.ends_with(".localhost")
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

/// IPv4 address carried in the low 32 bits of an IPv4-mapped (`::ffff:0:0/96`),
/// IPv4-compatible (`::/96`) or NAT64 (`64:ff9b::/96`) address.
fn embedded_v4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return Some(mapped);
    }
    let [.., a, b, c, d] = ip.octets();
    match ip.segments() {
        [0, 0, 0, 0, 0, 0, _, _] | [0x64, 0xff9b, 0, 0, 0, 0, _, _] => {
            Some(Ipv4Addr::new(a, b, c, d))
        }
        _ => None,
    }
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = embedded_v4(ip) {
        return is_blocked_v4(v4);
    }
    let first = ip.segments()[0];
    (first & 0xffc0) == 0xfe80 // fe80::/10
        || (first & 0xfe00) == 0xfc00 // fc00::/7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_public_urls() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://example.com/path?q=1").is_ok());
        assert!(validate_url("https://8.8.8.8/dns").is_ok());
        assert!(validate_url("https://[2606:4700::1111]/").is_ok());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            validate_url("not-a-url"),
            Err(ValidationError::Malformed(_))
        ));
        assert!(matches!(
            validate_url(""),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_other_schemes() {
        for raw in ["ftp://x/y", "file:///etc/passwd", "data:text/plain,hi"] {
            match validate_url(raw) {
                Err(ValidationError::UnsupportedScheme(scheme)) => {
                    assert!(raw.starts_with(&scheme), "{raw} -> {scheme}");
                }
                other => panic!("expected scheme rejection for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_rejects_localhost_names() {
        assert_eq!(
            validate_url("http://localhost/x"),
            Err(ValidationError::Localhost)
        );
        assert_eq!(
            validate_url("http://LOCALHOST:8080/"),
            Err(ValidationError::Localhost)
        );
        assert_eq!(
            validate_url("http://api.localhost/"),
            Err(ValidationError::Localhost)
        );
    }

    #[test]
    fn test_rejects_internal_ipv4() {
        for raw in [
            "http://127.0.0.1/x",
            "http://127.10.0.1/",
            "http://10.1.2.3/",
            "http://172.16.0.1/",
            "http://172.31.255.255/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data",
            "http://0.0.0.0/",
        ] {
            assert!(
                matches!(validate_url(raw), Err(ValidationError::BlockedAddress(_))),
                "{raw} should be blocked"
            );
        }
        // Just outside 172.16.0.0/12
        assert!(validate_url("http://172.32.0.1/").is_ok());
    }

    #[test]
    fn test_rejects_internal_ipv6() {
        for raw in [
            "http://[::1]/",
            "http://[fe80::1]/",
            "http://[fc00::1]/",
            "http://[fd12:3456::1]/",
            "http://[::ffff:127.0.0.1]/",
            "http://[::7f00:1]/",
            "http://[::10.0.0.1]/",
            "http://[64:ff9b::10.0.0.1]/",
            "http://[64:ff9b::7f00:1]/",
            "http://[64:ff9b::a9fe:a9fe]/",
        ] {
            assert!(
                matches!(validate_url(raw), Err(ValidationError::BlockedAddress(_))),
                "{raw} should be blocked"
            );
        }
    }

    #[test]
    fn test_embedded_public_ipv4_is_allowed() {
        assert!(validate_url("http://[64:ff9b::8.8.8.8]/").is_ok());
        assert!(validate_url("http://[::ffff:1.1.1.1]/").is_ok());
    }

    #[test]
    fn test_numeric_host_forms_are_normalized() {
        // 2130706433 == 127.0.0.1
        assert!(matches!(
            validate_url("http://2130706433/"),
            Err(ValidationError::BlockedAddress(_))
        ));
    }

    #[test]
    fn test_allowlist_bypasses_address_checks_only() {
        let validator = UrlValidator::with_allowed_hosts(["127.0.0.1", "LocalHost"]);
        assert!(validator.validate("http://127.0.0.1:8080/x").is_ok());
        assert!(validator.validate("http://localhost/x").is_ok());
        assert!(validator.validate("http://10.0.0.1/").is_err());
        assert!(matches!(
            validator.validate("ftp://127.0.0.1/"),
            Err(ValidationError::UnsupportedScheme(_))
        ));
    }
}

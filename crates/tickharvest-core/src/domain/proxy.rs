use std::fmt::{Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalized `host:port` proxy address.
///
/// Hosts are lowercased and IP literals are re-rendered canonically, so two
/// spellings of the same endpoint compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProxyAddress {
    host: String,
    port: u16,
}

impl ProxyAddress {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyProxyAddress);
        }

        let (raw_host, raw_port) = split_host_port(trimmed)?;
        let port = parse_port(raw_port, trimmed)?;
        let host = normalize_host(raw_host, trimmed)?;

        Ok(Self { host, port })
    }

    pub fn new(host: &str, port: u16) -> Result<Self, ValidationError> {
        let rendered = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        Self::parse(&rendered)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Proxy URL understood by HTTP clients (`http://host:port`).
    pub fn proxy_url(&self) -> String {
        format!("http://{self}")
    }
}

impl Display for ProxyAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl TryFrom<String> for ProxyAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProxyAddress> for String {
    fn from(value: ProxyAddress) -> Self {
        value.to_string()
    }
}

fn split_host_port(input: &str) -> Result<(&str, &str), ValidationError> {
    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ValidationError::ProxyInvalidHost {
                value: input.to_owned(),
            })?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| ValidationError::ProxyMissingPort {
                value: input.to_owned(),
            })?;
        return Ok((host, port));
    }

    let (host, port) = input
        .rsplit_once(':')
        .ok_or_else(|| ValidationError::ProxyMissingPort {
            value: input.to_owned(),
        })?;
    if host.contains(':') {
        // unbracketed IPv6 is ambiguous
        return Err(ValidationError::ProxyInvalidHost {
            value: input.to_owned(),
        });
    }
    Ok((host.trim(), port.trim()))
}

fn parse_port(raw: &str, original: &str) -> Result<u16, ValidationError> {
    let invalid = || ValidationError::ProxyInvalidPort {
        value: original.to_owned(),
    };
    if raw.is_empty() || !raw.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(invalid());
    }
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(port) => Ok(port),
    }
}

fn normalize_host(raw: &str, original: &str) -> Result<String, ValidationError> {
    let invalid = || ValidationError::ProxyInvalidHost {
        value: original.to_owned(),
    };
    let lowered = raw.to_ascii_lowercase();

    if lowered.contains(':') {
        return lowered
            .parse::<Ipv6Addr>()
            .map(|addr| addr.to_string())
            .map_err(|_| invalid());
    }

    if let Ok(addr) = lowered.parse::<Ipv4Addr>() {
        return Ok(addr.to_string());
    }

    if lowered.is_empty() || lowered.len() > MAX_HOSTNAME_LEN {
        return Err(invalid());
    }

    let labels = lowered.split('.').collect::<Vec<_>>();
    // dotted all-numeric hosts that failed IPv4 parsing are malformed IPs
    if labels
        .iter()
        .all(|label| !label.is_empty() && label.chars().all(|ch| ch.is_ascii_digit()))
    {
        return Err(invalid());
    }

    for label in labels {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
        if !valid {
            return Err(invalid());
        }
    }

    Ok(lowered)
}

/// Unvalidated proxy scraped from a public list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCandidate {
    pub address: ProxyAddress,
    pub discovered_at: UtcDateTime,
    pub source_url: String,
}

impl ProxyCandidate {
    pub fn new(address: ProxyAddress, source_url: impl Into<String>) -> Self {
        Self {
            address,
            discovered_at: UtcDateTime::now(),
            source_url: source_url.into(),
        }
    }
}

/// Proxy that routed a real request to the target API successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedProxy {
    pub address: ProxyAddress,
    pub validated_at: UtcDateTime,
    pub last_success_at: UtcDateTime,
    pub consecutive_failures: u32,
    pub latency_ms: u64,
}

impl ValidatedProxy {
    pub fn new(address: ProxyAddress, latency_ms: u64) -> Self {
        let now = UtcDateTime::now();
        Self {
            address,
            validated_at: now,
            last_success_at: now,
            consecutive_failures: 0,
            latency_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let a = ProxyAddress::parse("  Proxy.Example.COM:8080 ").expect("valid");
        let b = ProxyAddress::parse("proxy.example.com:8080").expect("valid");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "proxy.example.com:8080");
    }

    #[test]
    fn renders_ipv6_canonically_in_brackets() {
        let address = ProxyAddress::parse("[2001:DB8:0:0::1]:3128").expect("valid");
        assert_eq!(address.to_string(), "[2001:db8::1]:3128");
        assert_eq!(address.proxy_url(), "http://[2001:db8::1]:3128");
    }

    #[test]
    fn rejects_bad_ports_and_hosts() {
        assert!(matches!(
            ProxyAddress::parse("1.1.1.1"),
            Err(ValidationError::ProxyMissingPort { .. })
        ));
        assert!(matches!(
            ProxyAddress::parse("1.1.1.1:0"),
            Err(ValidationError::ProxyInvalidPort { .. })
        ));
        assert!(matches!(
            ProxyAddress::parse("1.1.1.1:70000"),
            Err(ValidationError::ProxyInvalidPort { .. })
        ));
        assert!(matches!(
            ProxyAddress::parse("999.1.1.1:80"),
            Err(ValidationError::ProxyInvalidHost { .. })
        ));
        assert!(matches!(
            ProxyAddress::parse("bad_host:80"),
            Err(ValidationError::ProxyInvalidHost { .. })
        ));
    }

    #[test]
    fn new_accepts_bare_ipv6_host() {
        let address = ProxyAddress::new("::1", 8080).expect("valid");
        assert_eq!(address.to_string(), "[::1]:8080");
    }
}

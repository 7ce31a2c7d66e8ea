// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Host Classification
//!
//! Turns the origin URL of a pack-delivery request into a [`HostInfo`] and
//! decides whether that origin is local/private or public.
//!
//! # Security Guarantees
//! - An origin that cannot be parsed or has no host is always treated as
//!   local. Unresolved origins are never considered safely public.
//! - DNS failures only leave `ip` empty, they never fail classification.
//! - Transport fallback data never overwrites URL-derived fields.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements origin parsing and local/public classification

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use url::Url;

use crate::domain::ports::HostResolver;

/// Placeholder returned when no identifying field is known.
pub const UNKNOWN_HOST: &str = "<unknown>";

const LOCAL_HOST_NAMES: &[&str] = &["localhost", "0.0.0.0", "127.0.0.1", "::1"];
const LOCAL_SUFFIXES: &[&str] = &[".local", ".lan"];
const LOCAL_SCHEMES: &[&str] = &["file", "jar"];

/// Structured origin information for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub host: String,
    pub port: String,
    pub scheme: String,
    /// Normalized `host[:port]`, the primary identity key of an origin
    pub canonical: String,
    /// Raw URL as received
    pub original: String,
    /// Resolved address, empty when resolution failed or was skipped
    pub ip: String,
    /// Transport-layer remote address of the connection
    pub remote: String,
    pub local: bool,
}

impl HostInfo {
    /// Identity key degrading `canonical → host → original → remote`.
    pub fn canonical_or_fallback(&self) -> &str {
        first_non_empty(&[
            &self.canonical,
            &self.host,
            &self.original,
            &self.remote,
        ])
    }

    /// User-facing name, preferring the bare host over `host:port`.
    pub fn display_name(&self) -> &str {
        first_non_empty(&[
            &self.host,
            &self.canonical,
            &self.original,
            &self.remote,
        ])
    }

    /// Fill missing fields from the transport remote address.
    ///
    /// Accepts `ip:port`, `[v6]:port`, bare addresses and the `/ip:port`
    /// form some transports print. Fields that are already non-empty are
    /// left untouched. `local` follows the transport only when the URL named
    /// no host, and then can only become more conservative.
    pub fn with_fallback(mut self, remote: Option<&str>) -> Self {
        let Some(raw) = remote.map(str::trim).filter(|r| !r.is_empty()) else {
            return self;
        };
        let origin_known = !self.host.is_empty();

        if self.remote.is_empty() {
            self.remote = raw.to_string();
        }

        let (remote_host, remote_port) = split_remote_address(raw);
        let remote_ip = remote_host.parse::<IpAddr>().ok();

        if self.host.is_empty() && !remote_host.is_empty() {
            self.host = remote_host.to_ascii_lowercase();
        }
        if self.port.is_empty() {
            if let Some(port) = remote_port {
                self.port = port.to_string();
            }
        }
        if self.ip.is_empty() {
            if let Some(ip) = remote_ip {
                self.ip = ip.to_string();
            }
        }
        if self.canonical.is_empty() && !self.host.is_empty() {
            self.canonical = canonical_form(&self.host, remote_port);
        }

        if !origin_known {
            let remote_local = is_local_host_name(&remote_host)
                || remote_ip.map(is_local_address).unwrap_or(false);
            self.local = self.local || remote_local;
        }
        self
    }
}

fn first_non_empty<'a>(candidates: &[&'a String]) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|value| !value.is_empty())
        .map(String::as_str)
        .unwrap_or(UNKNOWN_HOST)
}

/// Split a transport address into host and optional port.
fn split_remote_address(raw: &str) -> (String, Option<u16>) {
    // Some transports render as "hostname/ip:port"; the address part wins.
    let raw = raw.rsplit('/').next().unwrap_or(raw);

    if let Some(rest) = raw.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (host.to_string(), port);
        }
    }

    if raw.parse::<Ipv6Addr>().is_ok() {
        return (raw.to_string(), None);
    }

    match raw.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (raw.to_string(), None),
        },
        None => (raw.to_string(), None),
    }
}

fn canonical_form(host: &str, port: Option<u16>) -> String {
    match port {
        Some(port) if host.contains(':') => format!("[{}]:{}", host, port),
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Well-known local names and `.local` / `.lan` suffixes.
pub fn is_local_host_name(host: &str) -> bool {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    LOCAL_HOST_NAMES.contains(&host.as_str())
        || LOCAL_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

/// RFC1918 and loopback IPv4 literals (`10.*`, `127.*`, `172.16-31.*`, `192.168.*`).
pub fn is_private_ipv4_literal(host: &str) -> bool {
    match host.parse::<Ipv4Addr>() {
        Ok(addr) => {
            let [a, b, _, _] = addr.octets();
            a == 10 || a == 127 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168)
        }
        Err(_) => false,
    }
}

/// Any-local, loopback, link-local or site-local addresses.
pub fn is_local_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_local_ipv4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_local_ipv4(mapped);
            }
            let site_local = (v6.segments()[0] & 0xffc0) == 0xfec0;
            v6.is_unspecified()
                || v6.is_loopback()
                || v6.is_unicast_link_local()
                || v6.is_unique_local()
                || site_local
        }
    }
}

fn is_local_ipv4(v4: Ipv4Addr) -> bool {
    v4.is_unspecified() || v4.is_loopback() || v4.is_link_local() || v4.is_private()
}

/// Parses origins and classifies them as local or public.
#[derive(Clone)]
pub struct HostClassifier {
    resolver: Arc<dyn HostResolver>,
}

impl HostClassifier {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    /// Classify a raw origin URL. Never fails.
    pub fn classify(&self, raw_url: &str, remote: Option<&str>) -> HostInfo {
        let trimmed = raw_url.trim();
        let mut info = HostInfo {
            original: trimmed.to_string(),
            ..HostInfo::default()
        };

        match Url::parse(trimmed) {
            Ok(url) => {
                info.scheme = url.scheme().to_ascii_lowercase();
                match url.host_str().filter(|h| !h.is_empty()) {
                    Some(raw_host) => self.classify_host(&mut info, &url, raw_host),
                    None => {
                        if !LOCAL_SCHEMES.contains(&info.scheme.as_str()) {
                            tracing::debug!(url = %trimmed, "Origin has no host, treating as local");
                        }
                        info.local = true;
                    }
                }
            }
            Err(error) => {
                tracing::debug!(url = %trimmed, %error, "Unparseable origin, treating as local");
                if let Some((scheme, _)) = trimmed.split_once(':') {
                    if LOCAL_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
                        info.scheme = scheme.to_ascii_lowercase();
                    }
                }
                info.local = true;
            }
        }

        info.with_fallback(remote)
    }

    fn classify_host(&self, info: &mut HostInfo, url: &Url, raw_host: &str) {
        let host = raw_host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_ascii_lowercase();

        info.port = url
            .port_or_known_default()
            .map(|p| p.to_string())
            .unwrap_or_default();
        info.canonical = canonical_form(&host, url.port());

        let resolved = match host.parse::<IpAddr>() {
            Ok(literal) => Some(literal),
            Err(_) => self
                .resolver
                .resolve(&host, url.port_or_known_default().unwrap_or(0)),
        };
        if let Some(ip) = resolved {
            info.ip = ip.to_string();
        }

        info.local = is_local_host_name(&host)
            || is_private_ipv4_literal(&host)
            || resolved.map(is_local_address).unwrap_or(false);
        info.host = host;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapResolver(HashMap<&'static str, IpAddr>);

    impl HostResolver for MapResolver {
        fn resolve(&self, host: &str, _port: u16) -> Option<IpAddr> {
            self.0.get(host).copied()
        }
    }

    fn classifier() -> HostClassifier {
        let mut table = HashMap::new();
        table.insert("example.com", "93.184.215.14".parse().unwrap());
        table.insert("intranet.corp", "10.1.2.3".parse().unwrap());
        HostClassifier::new(Arc::new(MapResolver(table)))
    }

    #[test]
    fn test_local_classification_table() {
        let classifier = classifier();
        for url in [
            "http://127.0.0.1/pack.zip",
            "http://localhost:8080/pack.zip",
            "http://10.0.0.5/pack.zip",
            "http://192.168.1.1/pack.zip",
            "http://172.20.0.1/pack.zip",
            "file:///tmp/pack.zip",
            "http://[::1]/pack.zip",
            "http://printer.local/pack.zip",
            "http://nas.lan/pack.zip",
        ] {
            assert!(classifier.classify(url, None).local, "{url} should be local");
        }
    }

    #[test]
    fn test_public_classification() {
        let classifier = classifier();
        assert!(!classifier.classify("http://8.8.8.8/pack.zip", None).local);
        assert!(!classifier.classify("http://example.com/pack.zip", None).local);
        assert!(!classifier.classify("http://172.32.0.1/pack.zip", None).local);
    }

    #[test]
    fn test_resolved_private_address_is_local() {
        let info = classifier().classify("https://intranet.corp/pack.zip", None);
        assert!(info.local);
        assert_eq!(info.ip, "10.1.2.3");
    }

    #[test]
    fn test_resolution_failure_keeps_public() {
        let info = classifier().classify("https://unresolvable.example.org/p.zip", None);
        assert!(!info.local);
        assert!(info.ip.is_empty());
        assert_eq!(info.canonical, "unresolvable.example.org");
    }

    #[test]
    fn test_malformed_and_empty_urls_are_local() {
        let classifier = classifier();
        assert!(classifier.classify("not a url", None).local);
        assert!(classifier.classify("", None).local);
    }

    #[test]
    fn test_canonical_includes_explicit_port_only() {
        let classifier = classifier();
        let info = classifier.classify("https://Example.com:8443/p.zip", None);
        assert_eq!(info.canonical, "example.com:8443");
        assert_eq!(info.port, "8443");

        let info = classifier.classify("https://example.com/p.zip", None);
        assert_eq!(info.canonical, "example.com");
        assert_eq!(info.port, "443");
    }

    #[test]
    fn test_fallback_never_overwrites() {
        let info = classifier().classify("http://example.com/p.zip", Some("10.9.9.9:25565"));
        assert_eq!(info.host, "example.com");
        assert_eq!(info.ip, "93.184.215.14");
        assert_eq!(info.remote, "10.9.9.9:25565");
        assert!(!info.local, "the URL already settled the origin");
    }

    #[test]
    fn test_public_ip_url_over_lan_transport_stays_public() {
        let info = classifier().classify("http://8.8.8.8/p.zip", Some("192.168.1.5:25565"));
        assert_eq!(info.ip, "8.8.8.8");
        assert!(!info.local);

        let local = classifier().classify("http://127.0.0.1/p.zip", Some("8.8.4.4:25565"));
        assert!(local.local);
    }

    #[test]
    fn test_fallback_fills_missing_fields() {
        let info = classifier().classify("", Some("/203.0.113.7:25565"));
        assert_eq!(info.host, "203.0.113.7");
        assert_eq!(info.port, "25565");
        assert_eq!(info.ip, "203.0.113.7");
        assert_eq!(info.canonical, "203.0.113.7:25565");
        assert!(info.local, "unparsed origin stays local");
    }

    #[test]
    fn test_display_name_degrades() {
        let mut info = HostInfo::default();
        assert_eq!(info.display_name(), UNKNOWN_HOST);
        info.remote = "1.2.3.4:5".to_string();
        assert_eq!(info.canonical_or_fallback(), "1.2.3.4:5");
        info.original = "weird".to_string();
        assert_eq!(info.canonical_or_fallback(), "weird");
        info.canonical = "a.b:1".to_string();
        info.host = "a.b".to_string();
        assert_eq!(info.canonical_or_fallback(), "a.b:1");
        assert_eq!(info.display_name(), "a.b");
    }

    #[test]
    fn test_split_remote_address_forms() {
        assert_eq!(split_remote_address("[::1]:80"), ("::1".to_string(), Some(80)));
        assert_eq!(split_remote_address("::1"), ("::1".to_string(), None));
        assert_eq!(split_remote_address("host/1.2.3.4:7"), ("1.2.3.4".to_string(), Some(7)));
        assert_eq!(split_remote_address("1.2.3.4"), ("1.2.3.4".to_string(), None));
    }
}

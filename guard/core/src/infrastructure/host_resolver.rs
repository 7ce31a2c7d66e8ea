// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::net::{IpAddr, ToSocketAddrs};
use tracing::debug;

use crate::domain::ports::HostResolver;

/// Resolver backed by the operating system's lookup.
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> Option<IpAddr> {
        match (host, port).to_socket_addrs() {
            Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
            Err(error) => {
                debug!(host = %host, %error, "DNS resolution failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_literal_resolves_without_dns() {
        let ip = SystemResolver.resolve("127.0.0.1", 80);
        assert_eq!(ip, Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_invalid_name_yields_none() {
        assert_eq!(SystemResolver.resolve("bad host name", 80), None);
    }
}

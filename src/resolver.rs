//! Domain and literal IP resolution for custom route sources
//!
//! Resolution failures are a normal, non-fatal outcome: a custom entry
//! whose domain does not currently resolve stays persisted and is simply
//! skipped when the route set is applied.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use tracing::{debug, warn};

/// Outcome of resolving a custom source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Ipv4Addr),
    NotFound,
}

/// Resolves a domain or literal IPv4 string to an address.
///
/// The seam that lets the store and reconciler be tested without DNS.
pub trait NameResolver {
    fn resolve(&self, source: &str) -> Resolution;
}

/// Resolver backed by the system DNS (std::net).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl NameResolver for SystemResolver {
    fn resolve(&self, source: &str) -> Resolution {
        // A literal IPv4 address passes through without a lookup.
        if let Ok(ip) = source.parse::<Ipv4Addr>() {
            return Resolution::Resolved(ip);
        }

        debug!("Resolving {} via system DNS", source);
        let addrs = match format!("{}:0", source).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("DNS lookup failed for {}: {}", source, e);
                return Resolution::NotFound;
            }
        };

        for addr in addrs {
            if let IpAddr::V4(ip) = addr.ip() {
                debug!("Resolved {} -> {}", source, ip);
                return Resolution::Resolved(ip);
            }
        }

        warn!("No IPv4 address found for {}", source);
        Resolution::NotFound
    }
}

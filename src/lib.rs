//! vpn-bypass - Keep VPN bypass routes in sync with the host routing table
//!
//! Maintains the set of IP routes that should skip the VPN tunnel and go
//! out the normal default gateway. The route set comes from two sources:
//! a bulk collection of country-level address ranges regenerated from the
//! APNIC delegation feed, and a small collection of individually managed
//! domains/IPs.
//!
//! # Architecture
//!
//! - `cidr`: block size to netmask conversion
//! - `feed`: allocation feed retrieval and parsing
//! - `resolver`: domain/IP resolution for custom entries
//! - `store`: persisted bulk and custom route collections
//! - `reconciler`: derives the active route set and drives the OS
//! - `platform`: cross-platform command batch execution (Windows, macOS, Linux)
//! - `config`: configuration file handling (TOML)
//! - `lock`: advisory lock around route mutation
//!
//! # Usage
//!
//! ```bash
//! vpn-bypass gen        # regenerate the bulk collection from the feed
//! vpn-bypass up         # apply all bypass routes
//! vpn-bypass add HOST   # add a custom bypass route and apply it
//! ```

pub mod cidr;
pub mod config;
pub mod feed;
pub mod lock;
pub mod platform;
pub mod reconciler;
pub mod resolver;
pub mod store;

pub use config::Config;
pub use reconciler::{Reconciler, Scope};

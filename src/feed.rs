//! APNIC delegation feed retrieval and parsing
//!
//! The feed is a flat text document; each line of interest has the form
//! `apnic|cn|ipv4|<ip>|<count>|<date>|<status>` with a status token
//! starting with `a` (allocated/assigned), matched case-insensitively.
//! A fetch parses the whole document into memory before the caller
//! touches any persisted state.

use crate::cidr::{self, CidrError};
use crate::store::BulkRoute;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_FEED_URL: &str =
    "http://ftp.apnic.net/apnic/stats/apnic/delegated-apnic-latest";

const FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("Failed to fetch allocation feed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("Allocation feed fetch timed out")]
    Timeout,
    #[error("Allocation feed returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("Allocation feed contained no matching records")]
    Empty,
}

impl FeedError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Http(e)
        }
    }
}

/// One country-scoped range from the feed: starting address plus
/// address-block size. Ephemeral; converted before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub start: Ipv4Addr,
    pub count: u32,
}

impl Allocation {
    /// Convert to a persistable bulk route. A block size that is not a
    /// power of two rejects this record, never the whole feed.
    pub fn to_bulk_route(&self) -> Result<BulkRoute, CidrError> {
        let (mask, _prefix_len) = cidr::block_mask(self.count)?;
        Ok(BulkRoute {
            network: self.start,
            mask,
        })
    }
}

pub struct FeedClient {
    client: reqwest::Client,
    url: String,
}

impl FeedClient {
    pub fn new(url: impl Into<String>) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(format!("vpn-bypass/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FeedError::ClientBuild)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// One HTTP GET per call. Non-success status, network/timeout
    /// failure, or a document with zero matching records (a captive
    /// portal, say) all surface as a `FeedError` before anything
    /// persisted is touched.
    pub async fn fetch_allocations(&self) -> Result<Vec<Allocation>, FeedError> {
        info!("Fetching allocation feed from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(FeedError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }
        let body = response.text().await.map_err(FeedError::from_reqwest)?;

        let allocations = parse_allocations(&body);
        if allocations.is_empty() {
            return Err(FeedError::Empty);
        }
        info!("Parsed {} allocations from feed", allocations.len());
        Ok(allocations)
    }
}

/// Extract the matching records from the feed text, in document order.
/// Non-matching or malformed lines are skipped.
pub fn parse_allocations(text: &str) -> Vec<Allocation> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Allocation> {
    let mut fields = line.split('|');
    if !fields.next()?.eq_ignore_ascii_case("apnic") {
        return None;
    }
    if !fields.next()?.eq_ignore_ascii_case("cn") {
        return None;
    }
    if !fields.next()?.eq_ignore_ascii_case("ipv4") {
        return None;
    }
    let start: Ipv4Addr = fields.next()?.parse().ok()?;
    let count: u32 = fields.next()?.parse().ok()?;
    let date = fields.next()?;
    if date.is_empty() || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let status = fields.next()?;
    if !status.starts_with(['a', 'A']) {
        return None;
    }
    Some(Allocation { start, count })
}

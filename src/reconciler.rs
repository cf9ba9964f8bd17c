//! Route-set reconciliation
//!
//! Derives the active route set (bulk union resolved custom) from the
//! store and drives the OS route table through command batches. The
//! add/del flows converge by tearing down and reapplying the whole
//! custom scope rather than diffing: redundant delete/add instructions
//! are cheap inside one batch, and the table ends up matching the exact
//! persisted state even if it had drifted.

use crate::feed::{Allocation, FeedClient, FeedError};
use crate::platform::{BatchExecutor, CommandBatch, ExecError, RouteCommand};
use crate::resolver::{NameResolver, Resolution};
use crate::store::{RouteStore, StoreError};
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::{info, warn};

/// Custom entries always get a host route.
const HOST_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),
}

/// Which subset of the route set an operation affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    CustomOnly,
}

/// A resolved route as handed to the OS. Computed on demand, never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveRoute {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub metric: u32,
}

pub struct Reconciler<R: NameResolver> {
    store: RouteStore<R>,
    executor: Box<dyn BatchExecutor>,
    metric: u32,
}

impl<R: NameResolver> Reconciler<R> {
    pub fn new(store: RouteStore<R>, executor: Box<dyn BatchExecutor>, metric: u32) -> Self {
        Self {
            store,
            executor,
            metric,
        }
    }

    pub fn store(&self) -> &RouteStore<R> {
        &self.store
    }

    /// Build the active route set for a scope. Custom entries are
    /// resolved here, at apply time; unresolved ones are skipped with a
    /// warning rather than aborting the operation.
    fn active_routes(&self, scope: Scope) -> Result<Vec<ActiveRoute>, ReconcileError> {
        let mut routes = Vec::new();
        if scope == Scope::All {
            for bulk in self.store.list_bulk()? {
                routes.push(ActiveRoute {
                    destination: bulk.network,
                    mask: bulk.mask,
                    metric: self.metric,
                });
            }
        }
        for source in self.store.list_custom()? {
            match self.store.resolver().resolve(&source) {
                Resolution::Resolved(ip) => routes.push(ActiveRoute {
                    destination: ip,
                    mask: HOST_MASK,
                    metric: self.metric,
                }),
                Resolution::NotFound => {
                    warn!("Skipping custom route {}: does not resolve", source);
                }
            }
        }
        Ok(routes)
    }

    /// Apply the scope's routes: one add instruction per route plus a
    /// DNS-cache flush, as a single batch. Returns the number of routes
    /// applied. An empty route set issues no batch at all.
    pub fn up(&self, scope: Scope) -> Result<usize, ReconcileError> {
        let routes = self.active_routes(scope)?;
        if routes.is_empty() {
            info!("No routes to apply");
            return Ok(0);
        }

        let mut batch = CommandBatch::new();
        batch.push(RouteCommand::FlushDnsCache);
        for route in &routes {
            batch.push(RouteCommand::Add {
                destination: route.destination,
                mask: route.mask,
                metric: route.metric,
            });
        }
        self.executor.execute(&batch)?;
        info!("Applied {} bypass routes", routes.len());
        Ok(routes.len())
    }

    /// Remove the scope's routes: one delete instruction per route as a
    /// single batch. Returns the number of routes removed.
    pub fn down(&self, scope: Scope) -> Result<usize, ReconcileError> {
        let routes = self.active_routes(scope)?;
        if routes.is_empty() {
            info!("No routes to remove");
            return Ok(0);
        }

        let mut batch = CommandBatch::new();
        for route in &routes {
            batch.push(RouteCommand::Delete {
                destination: route.destination,
                mask: route.mask,
            });
        }
        self.executor.execute(&batch)?;
        info!("Removed {} bypass routes", routes.len());
        Ok(routes.len())
    }

    /// Regenerate the bulk collection from the feed. The fetch and parse
    /// complete fully in memory before anything persisted or applied is
    /// touched, so a feed failure leaves the old data intact. Old routes
    /// are torn down before the store is replaced; the operator runs
    /// `up` to apply the new set.
    pub async fn regenerate(&self, feed: &FeedClient) -> Result<usize, ReconcileError> {
        let allocations = feed.fetch_allocations().await?;
        self.apply_allocations(&allocations)
    }

    /// Teardown-then-replace step of regeneration; runs only once a
    /// fully parsed allocation list is in hand. Records with an invalid
    /// block size are skipped individually; an empty old route set
    /// issues no teardown batch at all.
    pub fn apply_allocations(&self, allocations: &[Allocation]) -> Result<usize, ReconcileError> {
        let mut routes = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            match allocation.to_bulk_route() {
                Ok(route) => routes.push(route),
                Err(e) => warn!("Skipping allocation {}: {}", allocation.start, e),
            }
        }

        self.down(Scope::All)?;
        self.store.replace_bulk(&routes)?;
        info!("Bulk collection regenerated: {} routes", routes.len());
        Ok(routes.len())
    }

    /// Add a custom source and converge the custom scope onto the new
    /// persisted set. A duplicate or invalid source returns false and
    /// issues no batches.
    pub fn add_custom(&self, source: &str) -> Result<bool, ReconcileError> {
        if !self.store.add_custom(source)? {
            return Ok(false);
        }
        self.down(Scope::CustomOnly)?;
        self.up(Scope::CustomOnly)?;
        Ok(true)
    }

    /// Remove a custom source and converge. The teardown runs over the
    /// pre-mutation set so the removed destination actually leaves the
    /// table; an absent source returns false and issues no batches.
    pub fn remove_custom(&self, source: &str) -> Result<bool, ReconcileError> {
        let source = source.trim();
        if !self.store.list_custom()?.iter().any(|s| s == source) {
            return Ok(false);
        }
        self.down(Scope::CustomOnly)?;
        self.store.remove_custom(source)?;
        self.up(Scope::CustomOnly)?;
        Ok(true)
    }
}

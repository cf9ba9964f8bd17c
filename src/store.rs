//! Persisted bulk and custom route collections
//!
//! Two flat files under the data directory back the route database:
//! `bulk_routes.txt` holds `<ip> <mask>` lines and is replaced wholesale
//! on regeneration; `custom_routes.txt` holds one raw operator-entered
//! source per line (domain or literal IP) and is edited entry by entry.
//! A custom entry's identity is its literal string, never its resolved
//! address, so a domain whose IP changes still matches on delete.

use crate::resolver::{NameResolver, Resolution};
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

pub const BULK_FILE: &str = "bulk_routes.txt";
pub const CUSTOM_FILE: &str = "custom_routes.txt";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access route store: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed bulk route entry: {0:?}")]
    MalformedBulkEntry(String),
}

/// One persisted bulk range. The metric is a shared constant, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkRoute {
    pub network: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl BulkRoute {
    fn from_line(line: &str) -> Result<Self, StoreError> {
        let malformed = || StoreError::MalformedBulkEntry(line.to_string());
        let (network, mask) = line.split_once(' ').ok_or_else(malformed)?;
        Ok(Self {
            network: network.parse().map_err(|_| malformed())?,
            mask: mask.parse().map_err(|_| malformed())?,
        })
    }

    fn to_line(self) -> String {
        format!("{} {}", self.network, self.mask)
    }
}

/// Injected storage dependency: an ordered collection of lines read and
/// written as a whole.
pub trait LineStore {
    fn read_all(&self) -> io::Result<Vec<String>>;
    fn write_all(&self, lines: &[String]) -> io::Result<()>;
}

/// Flat-file line store. A missing file reads as an empty collection.
pub struct FileLineStore {
    path: PathBuf,
}

impl FileLineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LineStore for FileLineStore {
    fn read_all(&self) -> io::Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty())
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn write_all(&self, lines: &[String]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(&self.path, content)
    }
}

/// In-memory line store for tests.
#[derive(Default)]
pub struct MemoryLineStore {
    lines: Mutex<Vec<String>>,
}

impl MemoryLineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineStore for MemoryLineStore {
    fn read_all(&self) -> io::Result<Vec<String>> {
        Ok(self.lines.lock().unwrap().clone())
    }

    fn write_all(&self, lines: &[String]) -> io::Result<()> {
        *self.lines.lock().unwrap() = lines.to_vec();
        Ok(())
    }
}

/// Owner of the two persisted collections. Nothing else writes the
/// backing stores.
pub struct RouteStore<R: NameResolver> {
    bulk: Box<dyn LineStore>,
    custom: Box<dyn LineStore>,
    resolver: R,
}

impl<R: NameResolver> RouteStore<R> {
    /// Open the flat-file stores under `data_dir`.
    pub fn open(data_dir: &Path, resolver: R) -> Self {
        Self::with_stores(
            Box::new(FileLineStore::new(data_dir.join(BULK_FILE))),
            Box::new(FileLineStore::new(data_dir.join(CUSTOM_FILE))),
            resolver,
        )
    }

    pub fn with_stores(
        bulk: Box<dyn LineStore>,
        custom: Box<dyn LineStore>,
        resolver: R,
    ) -> Self {
        Self {
            bulk,
            custom,
            resolver,
        }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Ordered bulk collection; empty if never generated. Bulk lines are
    /// machine-written, so a malformed line is surfaced, not skipped.
    pub fn list_bulk(&self) -> Result<Vec<BulkRoute>, StoreError> {
        self.bulk
            .read_all()?
            .iter()
            .map(|line| BulkRoute::from_line(line))
            .collect()
    }

    /// Replace the entire persisted bulk collection in one write.
    pub fn replace_bulk(&self, routes: &[BulkRoute]) -> Result<(), StoreError> {
        let lines: Vec<String> = routes.iter().map(|route| route.to_line()).collect();
        self.bulk.write_all(&lines)?;
        Ok(())
    }

    /// Ordered custom sources; empty if never populated.
    pub fn list_custom(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.custom.read_all()?)
    }

    /// Append a custom source unless it is already present. Returns
    /// whether an insertion occurred. Resolution is only a sanity check
    /// and never blocks the insert.
    pub fn add_custom(&self, source: &str) -> Result<bool, StoreError> {
        let source = source.trim();
        if source.is_empty() || source.chars().any(char::is_whitespace) {
            warn!("Rejecting custom source {:?}: not a single domain or IP", source);
            return Ok(false);
        }

        if let Resolution::NotFound = self.resolver.resolve(source) {
            warn!("{} does not currently resolve; storing it anyway", source);
        }

        let mut sources = self.custom.read_all()?;
        if sources.iter().any(|s| s == source) {
            debug!("{} already present in custom routes", source);
            return Ok(false);
        }
        sources.push(source.to_string());
        self.custom.write_all(&sources)?;
        Ok(true)
    }

    /// Remove the exact string match from the custom collection. Returns
    /// whether a removal occurred.
    pub fn remove_custom(&self, source: &str) -> Result<bool, StoreError> {
        let source = source.trim();
        let mut sources = self.custom.read_all()?;
        let before = sources.len();
        sources.retain(|s| s != source);
        if sources.len() == before {
            return Ok(false);
        }
        self.custom.write_all(&sources)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Resolver stub: every source resolves to a fixed address.
    struct FixedResolver(Ipv4Addr);

    impl NameResolver for FixedResolver {
        fn resolve(&self, _source: &str) -> Resolution {
            Resolution::Resolved(self.0)
        }
    }

    /// Resolver stub: nothing resolves.
    struct NoResolver;

    impl NameResolver for NoResolver {
        fn resolve(&self, _source: &str) -> Resolution {
            Resolution::NotFound
        }
    }

    fn memory_store<R: NameResolver>(resolver: R) -> RouteStore<R> {
        RouteStore::with_stores(
            Box::new(MemoryLineStore::new()),
            Box::new(MemoryLineStore::new()),
            resolver,
        )
    }

    #[test]
    fn test_empty_collections() {
        let store = memory_store(NoResolver);
        assert!(store.list_bulk().unwrap().is_empty());
        assert!(store.list_custom().unwrap().is_empty());
    }

    #[test]
    fn test_bulk_replace_and_list() {
        let store = memory_store(NoResolver);
        let routes = vec![
            BulkRoute {
                network: Ipv4Addr::new(1, 2, 3, 0),
                mask: Ipv4Addr::new(255, 255, 255, 0),
            },
            BulkRoute {
                network: Ipv4Addr::new(10, 0, 0, 0),
                mask: Ipv4Addr::new(255, 0, 0, 0),
            },
        ];
        store.replace_bulk(&routes).unwrap();
        assert_eq!(store.list_bulk().unwrap(), routes);

        // Regeneration replaces, never appends
        store.replace_bulk(&routes[..1]).unwrap();
        assert_eq!(store.list_bulk().unwrap(), routes[..1]);
    }

    #[test]
    fn test_malformed_bulk_entry_is_surfaced() {
        let bulk = MemoryLineStore::new();
        bulk.write_all(&["1.2.3.0 not-a-mask".to_string()]).unwrap();
        let store = RouteStore::with_stores(
            Box::new(bulk),
            Box::new(MemoryLineStore::new()),
            NoResolver,
        );
        assert!(matches!(
            store.list_bulk(),
            Err(StoreError::MalformedBulkEntry(_))
        ));
    }

    #[test]
    fn test_add_custom_is_idempotent() {
        let store = memory_store(FixedResolver(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(store.add_custom("10.0.0.5").unwrap());
        assert!(!store.add_custom("10.0.0.5").unwrap());
        assert_eq!(store.list_custom().unwrap(), vec!["10.0.0.5"]);
    }

    #[test]
    fn test_add_unresolvable_source_is_stored_anyway() {
        let store = memory_store(NoResolver);
        assert!(store.add_custom("example.com").unwrap());
        assert_eq!(store.list_custom().unwrap(), vec!["example.com"]);
    }

    #[test]
    fn test_add_then_remove_round_trip() {
        let store = memory_store(NoResolver);
        store.add_custom("a.example").unwrap();
        store.add_custom("b.example").unwrap();
        assert!(store.remove_custom("b.example").unwrap());
        assert_eq!(store.list_custom().unwrap(), vec!["a.example"]);
    }

    #[test]
    fn test_remove_absent_source() {
        let store = memory_store(NoResolver);
        store.add_custom("a.example").unwrap();
        assert!(!store.remove_custom("not-present.example").unwrap());
        assert_eq!(store.list_custom().unwrap(), vec!["a.example"]);
    }

    #[test]
    fn test_sources_are_trimmed() {
        let store = memory_store(NoResolver);
        assert!(store.add_custom("  example.com \t").unwrap());
        assert_eq!(store.list_custom().unwrap(), vec!["example.com"]);
        assert!(store.remove_custom(" example.com ").unwrap());
        assert!(store.list_custom().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_sources_are_rejected() {
        let store = memory_store(NoResolver);
        assert!(!store.add_custom("").unwrap());
        assert!(!store.add_custom("   ").unwrap());
        assert!(!store.add_custom("two words").unwrap());
        assert!(store.list_custom().unwrap().is_empty());
    }

    #[test]
    fn test_file_line_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileLineStore::new(dir.path().join("missing.txt"));
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_file_line_store_round_trip() {
        let dir = TempDir::new().unwrap();
        // Parent directories are created on first write
        let store = FileLineStore::new(dir.path().join("sub").join("routes.txt"));
        let lines = vec!["1.2.3.0 255.255.255.0".to_string(), "x".to_string()];
        store.write_all(&lines).unwrap();
        assert_eq!(store.read_all().unwrap(), lines);
    }

    #[test]
    fn test_file_line_store_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routes.txt");
        std::fs::write(&path, "a.example\r\n\n  \nb.example\n").unwrap();
        let store = FileLineStore::new(path);
        assert_eq!(store.read_all().unwrap(), vec!["a.example", "b.example"]);
    }

    #[test]
    fn test_open_uses_data_dir_files() {
        let dir = TempDir::new().unwrap();
        let store = RouteStore::open(dir.path(), NoResolver);
        store.add_custom("example.com").unwrap();
        store
            .replace_bulk(&[BulkRoute {
                network: Ipv4Addr::new(1, 2, 3, 0),
                mask: Ipv4Addr::new(255, 255, 255, 0),
            }])
            .unwrap();

        let custom = std::fs::read_to_string(dir.path().join(CUSTOM_FILE)).unwrap();
        assert_eq!(custom, "example.com\n");
        let bulk = std::fs::read_to_string(dir.path().join(BULK_FILE)).unwrap();
        assert_eq!(bulk, "1.2.3.0 255.255.255.0\n");
    }
}

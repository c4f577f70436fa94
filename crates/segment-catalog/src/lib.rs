use common::{FlockError, FlockResult, NodeKey, Segment, SegmentKey};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

pub mod graph;
pub mod reload;

pub use graph::{CatalogGraph, GraphEdge};
pub use reload::{CatalogReloader, DirectoryListing, ReloadReport, SegmentDirectory};

/// Members plus the adjacency index derived from them.
///
/// Buckets hold keys into `members`, so a bucket entry always resolves to the
/// current value for that key.
#[derive(Debug, Default)]
struct CatalogIndex {
    members: HashMap<SegmentKey, Segment>,
    // (generation, start_node) -> segments leaving that node
    outgoing: HashMap<NodeKey, HashSet<SegmentKey>>,
}

impl CatalogIndex {
    fn insert(&mut self, segment: Segment) -> Option<Segment> {
        let key = segment.key();
        let origin = segment.origin();
        let previous = self.members.insert(key, segment);
        if let Some(previous) = &previous {
            self.unlink(previous);
        }
        self.outgoing.entry(origin).or_default().insert(key);
        previous
    }

    fn remove(&mut self, key: SegmentKey) -> Option<Segment> {
        let removed = self.members.remove(&key)?;
        self.unlink(&removed);
        Some(removed)
    }

    /// Drop `segment` from the bucket of its own start node.
    fn unlink(&mut self, segment: &Segment) {
        let origin = segment.origin();
        if let Some(bucket) = self.outgoing.get_mut(&origin) {
            bucket.remove(&segment.key());
            if bucket.is_empty() {
                self.outgoing.remove(&origin);
            }
        }
    }

    fn leaving(&self, node: NodeKey) -> Vec<Segment> {
        let mut found: Vec<Segment> = self
            .outgoing
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|key| self.members.get(key))
            .cloned()
            .collect();
        found.sort_by_key(Segment::key);
        found
    }

    fn collect_sorted<F>(&self, keep: F) -> Vec<Segment>
    where
        F: Fn(&Segment) -> bool,
    {
        let mut found: Vec<Segment> = self
            .members
            .values()
            .filter(|segment| keep(*segment))
            .cloned()
            .collect();
        found.sort_by_key(Segment::key);
        found
    }
}

/// Outcome of applying a batch of locators.
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub accepted: usize,
    pub rejected: Vec<(PathBuf, FlockError)>,
}

impl UpdateReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Every known segment, indexed by key and by the node it leaves from.
///
/// All state sits behind a single lock. Each mutation runs entirely under
/// the write guard, so readers on other tasks see either the state before or
/// after it, never a member missing from its bucket.
#[derive(Debug, Default)]
pub struct SegmentCatalog {
    index: RwLock<CatalogIndex>,
}

impl SegmentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
        let catalog = Self::new();
        for segment in segments {
            catalog.add_segment(segment);
        }
        catalog
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or refresh a segment. A segment with the same key is replaced
    /// and moved to the bucket of the new start node.
    pub fn add_segment(&self, segment: Segment) -> Option<Segment> {
        let key = segment.key();
        let previous = self.write().insert(segment);
        if previous.is_some() {
            debug!(segment = %key, "refreshed segment");
        } else {
            debug!(segment = %key, "added segment");
        }
        previous
    }

    /// Parse a filename and insert the resulting segment.
    pub fn add_from_locator(&self, locator: impl AsRef<Path>) -> FlockResult<Segment> {
        let segment = Segment::from_path(locator)?;
        self.add_segment(segment.clone());
        Ok(segment)
    }

    /// Apply `add_from_locator` to each locator. A malformed name is logged
    /// and skipped; the rest of the batch still lands.
    pub fn update<I, P>(&self, locators: I) -> UpdateReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = UpdateReport::default();
        for locator in locators {
            let locator = locator.as_ref();
            match self.add_from_locator(locator) {
                Ok(_) => report.accepted += 1,
                Err(err) => {
                    warn!(locator = %locator.display(), error = %err, "skipping segment file");
                    report.rejected.push((locator.to_path_buf(), err));
                }
            }
        }
        report
    }

    /// Remove a segment from the members and from the bucket of its start
    /// node.
    pub fn discard(&self, segment: &Segment) -> FlockResult<Segment> {
        let key = segment.key();
        let removed = self
            .write()
            .remove(key)
            .ok_or_else(|| FlockError::not_found(key.generation, key.identity))?;
        debug!(segment = %key, "discarded segment");
        Ok(removed)
    }

    /// Drop every segment whose backing file no longer exists and return how
    /// many were removed.
    ///
    /// Existence is checked outside the lock. A segment refreshed with a new
    /// location in the meantime is left alone.
    pub fn discard_missing(&self) -> usize {
        let missing: Vec<Segment> = self
            .segments()
            .into_iter()
            .filter(|segment| !segment.location().exists())
            .collect();

        let removed = self.discard_unchanged(missing);
        if removed > 0 {
            info!(removed, "discarded missing segments");
        }
        removed
    }

    /// Remove each candidate whose stored location still matches the one it
    /// was observed with.
    fn discard_unchanged(&self, candidates: Vec<Segment>) -> usize {
        let mut removed = 0;
        for segment in candidates {
            let mut index = self.write();
            let unchanged = index
                .members
                .get(&segment.key())
                .is_some_and(|current| current.location() == segment.location());
            if unchanged && index.remove(segment.key()).is_some() {
                removed += 1;
                debug!(segment = %segment.key(), location = %segment.location().display(), "backing file gone");
            }
        }
        removed
    }

    pub fn lookup(&self, generation: u64, identity: u64) -> FlockResult<Segment> {
        self.read()
            .members
            .get(&SegmentKey::new(generation, identity))
            .cloned()
            .ok_or_else(|| FlockError::not_found(generation, identity))
    }

    /// Segments that may follow `segment`: those leaving its end node.
    pub fn successors_of(&self, segment: &Segment) -> Vec<Segment> {
        self.read().leaving(segment.destination())
    }

    /// Like [`successors_of`](Self::successors_of), for a segment known only
    /// by key. An unknown key has no successors.
    pub fn successors_of_key(&self, key: SegmentKey) -> Vec<Segment> {
        let index = self.read();
        match index.members.get(&key) {
            Some(segment) => index.leaving(segment.destination()),
            None => Vec::new(),
        }
    }

    pub fn contains(&self, segment: &Segment) -> bool {
        self.read().members.contains_key(&segment.key())
    }

    pub fn len(&self) -> usize {
        self.read().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().members.is_empty()
    }

    /// Snapshot of every member, ordered by key.
    pub fn segments(&self) -> Vec<Segment> {
        self.read().collect_sorted(|_| true)
    }

    /// Snapshot of the loop segments, ordered by key.
    pub fn loops(&self) -> Vec<Segment> {
        self.read().collect_sorted(Segment::is_loop)
    }

    /// Every transition in the catalog, read under a single guard.
    pub fn graph(&self) -> CatalogGraph {
        let index = self.read();
        CatalogGraph::from_segments(index.members.values())
    }
}

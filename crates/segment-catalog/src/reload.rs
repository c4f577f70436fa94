use crate::SegmentCatalog;
use common::{FlockError, FlockResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Source of candidate segment files.
pub trait DirectoryListing: Send + Sync {
    fn list(&self) -> FlockResult<Vec<PathBuf>>;
}

/// Lists the `*.<extension>` files directly inside a directory.
#[derive(Debug, Clone)]
pub struct SegmentDirectory {
    root: PathBuf,
    extension: String,
}

impl SegmentDirectory {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn matches(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

impl DirectoryListing for SegmentDirectory {
    fn list(&self) -> FlockResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root).map_err(|err| FlockError::listing(&self.root, err))?;

        let mut found = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| FlockError::listing(&self.root, err))?
                .path();
            if self.matches(&path) {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Counts from a single reload pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    pub removed: usize,
    pub accepted: usize,
    pub rejected: usize,
}

/// Reconciles the catalog with what the listing currently reports.
///
/// Running it twice with no filesystem change leaves the catalog as it was.
pub struct CatalogReloader {
    catalog: Arc<SegmentCatalog>,
    listing: Arc<dyn DirectoryListing>,
}

impl CatalogReloader {
    pub fn new(catalog: Arc<SegmentCatalog>, listing: Arc<dyn DirectoryListing>) -> Self {
        Self { catalog, listing }
    }

    pub fn catalog(&self) -> &Arc<SegmentCatalog> {
        &self.catalog
    }

    /// Drop segments whose files vanished, then add or refresh everything
    /// currently listed.
    pub fn reload(&self) -> FlockResult<ReloadReport> {
        let removed = self.catalog.discard_missing();
        let locators = self.listing.list()?;
        let update = self.catalog.update(&locators);

        let report = ReloadReport {
            removed,
            accepted: update.accepted,
            rejected: update.rejected.len(),
        };

        if report.rejected > 0 {
            warn!(rejected = report.rejected, "some segment files were not understood");
        }
        info!(
            removed = report.removed,
            accepted = report.accepted,
            total = self.catalog.len(),
            "catalog reloaded"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Listing whose contents the test rewrites between reloads.
    struct FakeListing(Mutex<Vec<PathBuf>>);

    impl DirectoryListing for FakeListing {
        fn list(&self) -> FlockResult<Vec<PathBuf>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    struct BrokenListing;

    impl DirectoryListing for BrokenListing {
        fn list(&self) -> FlockResult<Vec<PathBuf>> {
            Err(FlockError::listing(
                "/gone",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
            ))
        }
    }

    #[test]
    fn test_reload_reports_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("1=1=1=1.mp4");
        let bad = dir.path().join("poster.mp4");
        fs::write(&good, b"").unwrap();
        fs::write(&bad, b"").unwrap();

        let catalog = Arc::new(SegmentCatalog::new());
        let listing = Arc::new(FakeListing(Mutex::new(vec![good, bad])));
        let reloader = CatalogReloader::new(Arc::clone(&catalog), listing);

        let report = reloader.reload().unwrap();
        assert_eq!(
            report,
            ReloadReport {
                removed: 0,
                accepted: 1,
                rejected: 1
            }
        );
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_listing_failure_propagates_after_discard() {
        let catalog = Arc::new(SegmentCatalog::new());
        catalog.add_segment(common::Segment::new("/nonexistent/1=1=1=1.mp4", 1, 1, 1, 1));
        let reloader = CatalogReloader::new(Arc::clone(&catalog), Arc::new(BrokenListing));

        let err = reloader.reload().unwrap_err();
        assert!(matches!(err, FlockError::Listing { .. }));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_segment_directory_filters_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1=1=1=1.mp4", "1=2=1=2.MP4", "1=3=2=1.webm", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.mp4")).unwrap();

        let listing = SegmentDirectory::new(dir.path(), "mp4");
        let names: Vec<String> = listing
            .list()
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_owned))
            .collect();
        assert_eq!(names, vec!["1=1=1=1.mp4", "1=2=1=2.MP4"]);
    }

    #[test]
    fn test_missing_directory_is_listing_error() {
        let listing = SegmentDirectory::new("/definitely/not/here", "mp4");
        assert!(matches!(listing.list(), Err(FlockError::Listing { .. })));
    }
}

use common::{FlockResult, Segment};
use segment_catalog::{CatalogReloader, DirectoryListing, SegmentCatalog};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use walker::{Driver, PlaybackWindow, WalkPolicy};

/// Listing the test can extend while the driver runs.
#[derive(Default)]
struct StagedListing(Mutex<Vec<PathBuf>>);

impl StagedListing {
    fn stage(&self, path: PathBuf) {
        self.0.lock().unwrap().push(path);
    }
}

impl DirectoryListing for StagedListing {
    fn list(&self) -> FlockResult<Vec<PathBuf>> {
        Ok(self.0.lock().unwrap().clone())
    }
}

struct Harness {
    catalog: Arc<SegmentCatalog>,
    window: Arc<PlaybackWindow>,
    listing: Arc<StagedListing>,
    driver: Driver,
}

fn harness(segments: Vec<Segment>) -> Harness {
    let catalog = Arc::new(SegmentCatalog::from_segments(segments));
    let window = Arc::new(PlaybackWindow::new(10));
    let listing = Arc::new(StagedListing::default());
    let reloader = Arc::new(CatalogReloader::new(
        Arc::clone(&catalog),
        Arc::clone(&listing) as Arc<dyn DirectoryListing>,
    ));
    let driver = Driver::new(reloader, Arc::clone(&window), WalkPolicy::default());
    Harness {
        catalog,
        window,
        listing,
        driver,
    }
}

/// Listing that blocks for a while and counts how often it was asked.
struct SlowListing {
    delay: Duration,
    calls: AtomicUsize,
}

impl DirectoryListing for SlowListing {
    fn list(&self) -> FlockResult<Vec<PathBuf>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(Vec::new())
    }
}

fn touch(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, b"").unwrap();
    path
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !ready() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(start_paused = true)]
async fn test_driver_paces_by_segment_duration() {
    let dir = tempfile::tempdir().unwrap();
    let path = touch(&dir, "1=1=1=1.mp4");
    let h = harness(vec![Segment::from_path(&path).unwrap()]);
    let handle = h.driver.with_reload_every(1_000).spawn();

    // Default segments play 5s: appends land at t=0, 5 and 10.
    sleep(Duration::from_secs(12)).await;
    let snapshot = h.window.snapshot();
    assert_eq!(snapshot.segments.len(), 3);
    assert_eq!(snapshot.first_sequence, Some(0));

    sleep(Duration::from_secs(50)).await;
    let snapshot = h.window.snapshot();
    assert_eq!(snapshot.segments.len(), 10);
    assert_eq!(snapshot.first_sequence, Some(3));

    handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_window_fills_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = touch(&dir, "1=1=1=1.mp4");
    let segment = Segment::from_path(&path)
        .unwrap()
        .with_duration(Duration::from_millis(20));
    let h = harness(vec![segment]);

    let started = Instant::now();
    let handle = h.driver.with_reload_every(1_000).spawn();
    let window = Arc::clone(&h.window);
    wait_until(|| window.len() >= 3).await;
    assert!(started.elapsed() >= Duration::from_millis(40));

    let snapshot = h.window.snapshot();
    let sequences: Vec<u64> = snapshot.entries().map(|(n, _)| n).collect();
    assert!(sequences.windows(2).all(|pair| pair[1] == pair[0] + 1));
    handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_reloads_periodically() {
    let dir = tempfile::tempdir().unwrap();
    let existing = touch(&dir, "1=1=1=1.mp4");
    let segment = Segment::from_path(&existing)
        .unwrap()
        .with_duration(Duration::from_millis(5));
    let h = harness(vec![segment]);

    let newcomer = touch(&dir, "1=2=2=2.mp4");
    h.listing.stage(newcomer);

    let handle = h.driver.with_reload_every(3).spawn();
    let catalog = Arc::clone(&h.catalog);
    wait_until(|| catalog.lookup(1, 2).is_ok()).await;
    assert!(catalog.lookup(1, 1).is_ok());
    handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_survives_empty_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(Vec::new());
    let handle = h
        .driver
        .with_empty_retry(Duration::from_millis(10))
        .spawn();

    sleep(Duration::from_millis(60)).await;
    assert!(h.window.is_empty());
    assert!(!handle.is_finished());

    h.listing.stage(touch(&dir, "3=3=3=3.mp4"));
    let window = Arc::clone(&h.window);
    wait_until(|| !window.is_empty()).await;
    assert_eq!(h.window.snapshot().segments[0].generation(), 3);
    handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pacing_continues_during_slow_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = touch(&dir, "1=1=1=1.mp4");
    let segment = Segment::from_path(&path)
        .unwrap()
        .with_duration(Duration::from_millis(20));
    let catalog = Arc::new(SegmentCatalog::from_segments([segment]));
    let listing = Arc::new(SlowListing {
        delay: Duration::from_millis(1_500),
        calls: AtomicUsize::new(0),
    });
    let reloader = Arc::new(CatalogReloader::new(
        Arc::clone(&catalog),
        Arc::clone(&listing) as Arc<dyn DirectoryListing>,
    ));
    let window = Arc::new(PlaybackWindow::new(1_000));

    // A reload is due after every step; the first one blocks for 1.5s.
    let handle = Driver::new(reloader, Arc::clone(&window), WalkPolicy::default())
        .with_reload_every(1)
        .spawn();
    sleep(Duration::from_millis(500)).await;

    let appended = window.len();
    assert!(appended >= 10, "only {appended} segments while reloading");
    // Every reload due after the first was skipped while it still ran.
    assert_eq!(listing.calls.load(Ordering::SeqCst), 1);
    handle.abort();
}

use segment_catalog::SegmentCatalog;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use walker::{PlaybackWindow, WindowSnapshot};

pub mod handlers;
pub mod server;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Service state shared by every request: the catalog and the window, both
/// read-only from here.
pub struct HlsView {
    catalog: Arc<SegmentCatalog>,
    window: Arc<PlaybackWindow>,
    segment_url_prefix: String,
}

/// Body of the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub segments: usize,
    pub loops: usize,
    pub window: usize,
    pub first_sequence: Option<u64>,
}

impl HlsView {
    pub fn new(
        catalog: Arc<SegmentCatalog>,
        window: Arc<PlaybackWindow>,
        segment_url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            window,
            segment_url_prefix: segment_url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn segment_url_prefix(&self) -> &str {
        &self.segment_url_prefix
    }

    /// Media playlist of the current window.
    pub fn playlist(&self) -> String {
        render_playlist(&self.window.snapshot(), &self.segment_url_prefix)
    }

    /// Graphviz dump of one catalog snapshot.
    pub fn graph_dot(&self) -> String {
        self.catalog.graph().to_dot()
    }

    pub fn health(&self) -> HealthReport {
        let snapshot = self.window.snapshot();
        let segments = self.catalog.len();
        HealthReport {
            // an empty catalog leaves the stream stalled
            status: if segments == 0 { "starved" } else { "healthy" },
            segments,
            loops: self.catalog.loops().len(),
            window: snapshot.segments.len(),
            first_sequence: snapshot.first_sequence,
        }
    }
}

/// Render a window snapshot as an HLS media playlist.
///
/// The media sequence is the window's first sequence number so players
/// polling the playlist pick up where they left off. A discontinuity is
/// flagged wherever the generation changes.
pub fn render_playlist(snapshot: &WindowSnapshot, url_prefix: &str) -> String {
    let target = snapshot
        .segments
        .iter()
        .map(|s| s.duration().as_secs_f64().ceil() as u64)
        .max()
        .unwrap_or(common::DEFAULT_SEGMENT_SECS)
        .max(1);

    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "#EXTM3U");
    let _ = writeln!(out, "#EXT-X-VERSION:3");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{target}");
    let _ = writeln!(
        out,
        "#EXT-X-MEDIA-SEQUENCE:{}",
        snapshot.first_sequence.unwrap_or(0)
    );

    let mut previous_generation = None;
    for segment in &snapshot.segments {
        if previous_generation.is_some_and(|g| g != segment.generation()) {
            let _ = writeln!(out, "#EXT-X-DISCONTINUITY");
        }
        previous_generation = Some(segment.generation());

        let _ = writeln!(out, "#EXTINF:{:.3},", segment.duration().as_secs_f64());
        let _ = writeln!(
            out,
            "{}/{}",
            url_prefix.trim_end_matches('/'),
            segment.file_name().unwrap_or_default()
        );
    }
    out
}

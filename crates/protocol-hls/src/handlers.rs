use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::{HlsView, PLAYLIST_CONTENT_TYPE};

pub type AppState = Arc<HlsView>;

const PLAYER_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>electric flock</title></head>
<body>
<video id="player" controls autoplay muted></video>
<script src="https://cdn.jsdelivr.net/npm/hls.js@1"></script>
<script>
  var video = document.getElementById('player');
  var source = '/stream.m3u8';
  if (Hls.isSupported()) {
    var hls = new Hls();
    hls.loadSource(source);
    hls.attachMedia(video);
  } else if (video.canPlayType('application/vnd.apple.mpegurl')) {
    video.src = source;
  } else {
    console.log('HLS playback unsupported');
  }
</script>
</body>
</html>
"#;

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(PLAYER_PAGE)
}

/// GET /stream.m3u8
pub async fn stream_playlist(State(view): State<AppState>) -> Response {
    let playlist = view.playlist();
    debug!(bytes = playlist.len(), "served playlist");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        playlist,
    )
        .into_response()
}

/// GET /graph.dot
pub async fn graph_dot(State(view): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/vnd.graphviz; charset=utf-8")],
        view.graph_dot(),
    )
        .into_response()
}

/// Health check endpoint
pub async fn health_check(State(view): State<AppState>) -> Response {
    Json(view.health()).into_response()
}

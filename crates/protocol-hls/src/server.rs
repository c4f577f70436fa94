use anyhow::Result;
use axum::{routing::get, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{handlers::*, HlsView};

pub struct HlsServer {
    view: Arc<HlsView>,
    segment_root: PathBuf,
    port: u16,
}

impl HlsServer {
    pub fn new(view: HlsView, segment_root: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            view: Arc::new(view),
            segment_root: segment_root.into(),
            port,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/stream.m3u8", get(stream_playlist))
            .route("/graph.dot", get(graph_dot))
            .route("/health", get(health_check))
            .nest_service(
                self.view.segment_url_prefix(),
                ServeDir::new(&self.segment_root),
            )
            .with_state(Arc::clone(&self.view))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> Result<()> {
        let app = self.router();
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(
            %addr,
            segments = %self.segment_root.display(),
            "flock stream listening on http://{}/stream.m3u8",
            addr
        );

        axum::serve(listener, app).await?;
        Ok(())
    }
}

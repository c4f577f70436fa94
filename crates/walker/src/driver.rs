use common::{FlockConfig, FlockError};
use rand::rngs::StdRng;
use segment_catalog::CatalogReloader;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::scheduler::{RandomWalkScheduler, Randomness, WalkPolicy};
use crate::window::PlaybackWindow;

pub const DEFAULT_RELOAD_EVERY: u64 = 100;
pub const DEFAULT_EMPTY_RETRY: Duration = Duration::from_secs(5);

/// Real-time pacing loop.
///
/// Pulls one segment at a time from the scheduler, records it in the window
/// and then sleeps for as long as that segment plays. Every `reload_every`
/// steps the catalog is reloaded on the blocking pool while pacing goes on.
///
/// The walk always runs over the catalog the reloader maintains.
pub struct Driver<R = StdRng> {
    scheduler: RandomWalkScheduler<R>,
    window: Arc<PlaybackWindow>,
    reloader: Arc<CatalogReloader>,
    reload_every: u64,
    empty_retry: Duration,
    steps: u64,
    pending_reload: Option<JoinHandle<()>>,
}

impl Driver<StdRng> {
    pub fn new(
        reloader: Arc<CatalogReloader>,
        window: Arc<PlaybackWindow>,
        policy: WalkPolicy,
    ) -> Self {
        let scheduler = RandomWalkScheduler::new(Arc::clone(reloader.catalog()), policy);
        Self::from_parts(scheduler, window, reloader)
    }
}

impl<R: Randomness + 'static> Driver<R> {
    /// Driver whose walk draws from `rng`.
    pub fn with_rng(
        reloader: Arc<CatalogReloader>,
        window: Arc<PlaybackWindow>,
        policy: WalkPolicy,
        rng: R,
    ) -> Self {
        let scheduler =
            RandomWalkScheduler::with_rng(Arc::clone(reloader.catalog()), policy, rng);
        Self::from_parts(scheduler, window, reloader)
    }

    fn from_parts(
        scheduler: RandomWalkScheduler<R>,
        window: Arc<PlaybackWindow>,
        reloader: Arc<CatalogReloader>,
    ) -> Self {
        Self {
            scheduler,
            window,
            reloader,
            reload_every: DEFAULT_RELOAD_EVERY,
            empty_retry: DEFAULT_EMPTY_RETRY,
            steps: 0,
            pending_reload: None,
        }
    }

    /// Take reload cadence and empty-catalog retry from the configuration.
    pub fn configured(mut self, config: &FlockConfig) -> Self {
        self.reload_every = config.reload_every.max(1);
        self.empty_retry = config.empty_retry();
        self
    }

    pub fn with_reload_every(mut self, steps: u64) -> Self {
        self.reload_every = steps.max(1);
        self
    }

    pub fn with_empty_retry(mut self, retry: Duration) -> Self {
        self.empty_retry = retry;
        self
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run on the current tokio runtime until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drive the walk forever. Nothing that happens inside a step ends the
    /// loop; an empty catalog only idles it.
    pub async fn run(mut self) {
        info!(
            reload_every = self.reload_every,
            capacity = self.window.capacity(),
            "driver started"
        );
        loop {
            self.tick().await;
        }
    }

    async fn tick(&mut self) {
        match self.scheduler.step() {
            Ok(step) => {
                let duration = step.segment.duration();
                let sequence = self.window.append(step.segment.clone());
                self.steps += 1;
                debug!(
                    sequence,
                    segment = %step.segment.key(),
                    choice = ?step.choice,
                    "scheduled segment"
                );

                if self.steps % self.reload_every == 0 {
                    self.dispatch_reload();
                }
                sleep(duration).await;
            }
            Err(FlockError::EmptyCatalog) => {
                warn!("segment catalog is empty, reloading before the next step");
                self.reload_now().await;
                if self.reloader.catalog().is_empty() {
                    warn!(retry_in = ?self.empty_retry, "segment catalog still empty");
                    sleep(self.empty_retry).await;
                }
            }
            Err(err) => {
                error!(error = %err, "walk step failed");
                sleep(self.empty_retry).await;
            }
        }
    }

    /// Start a reload in the background unless the previous one is still
    /// running.
    fn dispatch_reload(&mut self) {
        if let Some(pending) = &self.pending_reload {
            if !pending.is_finished() {
                debug!("previous reload still running, skipping");
                return;
            }
        }

        let reloader = Arc::clone(&self.reloader);
        self.pending_reload = Some(task::spawn_blocking(move || {
            if let Err(err) = reloader.reload() {
                warn!(error = %err, "catalog reload failed");
            }
        }));
    }

    async fn reload_now(&mut self) {
        if let Some(pending) = self.pending_reload.take() {
            if let Err(err) = pending.await {
                error!(error = %err, "previous reload task panicked");
            }
        }

        let reloader = Arc::clone(&self.reloader);
        match task::spawn_blocking(move || reloader.reload()).await {
            Ok(Ok(report)) => debug!(?report, "reload finished"),
            Ok(Err(err)) => warn!(error = %err, "catalog reload failed"),
            Err(err) => error!(error = %err, "reload task panicked"),
        }
    }
}

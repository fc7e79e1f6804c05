//! The owner task: holds the grid store, the page and the reset watcher, and
//! is the only place any of them change.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pixel_types::models::{AUTO_RESET_DELAY, POLL_INTERVAL, TOTAL_PIXELS};

use crate::input::{Intent, USAGE};
use crate::page::{Hint, Page, pick_emoji};
use crate::render;
use crate::service::PixelBackend;
use crate::store::{GridStore, GridUpdate};
use crate::subscription::Subscription;
use crate::watcher::ResetWatcher;

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub total_pixels: u32,
    pub poll_interval: Duration,
    pub reset_delay: Duration,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            total_pixels: TOTAL_PIXELS,
            poll_interval: POLL_INTERVAL,
            reset_delay: AUTO_RESET_DELAY,
        }
    }
}

pub struct App<B: PixelBackend> {
    backend: Arc<B>,
    settings: AppSettings,
    page: Page,
    store: GridStore,
    watcher: ResetWatcher,
    updates_tx: mpsc::UnboundedSender<GridUpdate>,
    updates_rx: mpsc::UnboundedReceiver<GridUpdate>,
    subscription: Option<Subscription>,
    poller: Option<JoinHandle<()>>,
}

impl<B: PixelBackend> App<B> {
    pub fn new(backend: Arc<B>, settings: AppSettings) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            watcher: ResetWatcher::new(settings.reset_delay),
            settings,
            page: Page::new(),
            store: GridStore::new(),
            updates_tx,
            updates_rx,
            subscription: None,
            poller: None,
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn store(&self) -> &GridStore {
        &self.store
    }

    pub fn reset_pending(&self) -> bool {
        self.watcher.is_pending()
    }

    /// Initialize the table, load the grid, then start live updates and
    /// periodic reconciliation.
    pub async fn start(&mut self) {
        self.backend.initialize(self.settings.total_pixels).await;
        let pixels = self.backend.list_all().await;
        info!("Loaded {} pixels", pixels.len());
        self.apply(GridUpdate::Snapshot(pixels));

        let tx = self.updates_tx.clone();
        let subscribed = self
            .backend
            .subscribe(move |change| {
                let _ = tx.send(GridUpdate::Change(change));
            })
            .await;
        match subscribed {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => warn!("Live updates unavailable, relying on polling: {}", e),
        }

        self.poller = Some(spawn_poller(
            self.backend.clone(),
            self.settings.poll_interval,
            self.updates_tx.clone(),
        ));
        self.page.mark_ready();
    }

    /// Wait for the next update from the changefeed or the poller.
    pub async fn next_update(&mut self) -> Option<GridUpdate> {
        self.updates_rx.recv().await
    }

    /// Merge an update into the store and let the watcher look at the result.
    /// Returns whether the grid changed.
    pub fn apply(&mut self, update: GridUpdate) -> bool {
        let changed = self.store.apply(update);
        self.watcher.observe(self.store.is_fully_adopted(), &self.backend);
        changed
    }

    /// Re-fetch the whole grid now. A failed fetch leaves the grid as it is.
    pub async fn refresh(&mut self) -> bool {
        match self.backend.fetch_all().await {
            Ok(pixels) => self.apply(GridUpdate::Snapshot(pixels)),
            Err(e) => {
                warn!("Refresh failed, keeping current grid: {}", e);
                false
            }
        }
    }

    /// Act on one user intent. While an alert is showing, the next intent
    /// only acknowledges it.
    pub async fn handle(&mut self, intent: Intent) -> Option<Hint> {
        if self.page.dismiss_alert() {
            return None;
        }
        match intent {
            Intent::Click(id) => {
                self.page.click(self.store.get(id));
                None
            }
            Intent::Name(name) => {
                self.page.set_name(&name);
                None
            }
            Intent::Color(choice) => {
                if self.page.selected().is_some() && !self.page.choose_color(&choice) {
                    return Some(Hint(
                        "Pick a color from 1 to 12, or one of the listed hex values.".to_string(),
                    ));
                }
                None
            }
            Intent::Submit => self.submit().await,
            Intent::Cancel => {
                self.page.cancel();
                None
            }
            Intent::Refresh => {
                self.refresh().await;
                None
            }
            Intent::Help => Some(Hint(USAGE.to_string())),
            Intent::Quit => None,
            Intent::Unknown(input) => Some(Hint(format!(
                "Unknown command `{}`. Type `help` for the list.",
                input
            ))),
        }
    }

    async fn submit(&mut self) -> Option<Hint> {
        let submission = self.page.submission()?;
        let emoji = pick_emoji(&mut rand::rng());
        debug!(
            "Adopting pixel {} as {} with {}",
            submission.pixel_id, submission.adopter, emoji
        );

        let success = self
            .backend
            .adopt(
                submission.pixel_id,
                &submission.adopter,
                &submission.color,
                emoji,
            )
            .await;
        if success {
            self.refresh().await;
        }
        self.page.complete_submission(success);
        None
    }

    /// Acknowledge a pending alert without doing anything else.
    pub fn dismiss_alert(&mut self) -> bool {
        self.page.dismiss_alert()
    }

    pub fn render(&self) -> String {
        render::render(&self.page, &self.store)
    }

    /// Stop the poller, the subscription and any pending reset.
    pub async fn shutdown(&mut self) {
        self.watcher.cancel();
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
    }
}

fn spawn_poller<B: PixelBackend>(
    backend: Arc<B>,
    period: Duration,
    tx: mpsc::UnboundedSender<GridUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately; the grid was just loaded.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match backend.fetch_all().await {
                Ok(pixels) => {
                    if tx.send(GridUpdate::Snapshot(pixels)).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Poll failed, keeping current grid: {}", e),
            }
        }
    })
}

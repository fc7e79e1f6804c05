//! In-memory stand-in for the pixel backend, with the same write semantics
//! as the real server.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pixel_types::api::{Resolution, UpsertResponse};
use pixel_types::events::{ChangeEvent, ChangeKind};
use pixel_types::models::{PIXELS_TABLE, Pixel};

use crate::service::{PixelBackend, ServiceError};
use crate::subscription::Subscription;

type Handler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: Mutex<BTreeMap<u32, Pixel>>,
    handlers: Mutex<Vec<(u64, Handler)>>,
    next_handler: AtomicU64,
    resets: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = Pixel>) -> Self {
        let backend = Self::new();
        {
            let mut map = backend.inner.rows.lock().unwrap();
            for row in rows {
                map.insert(row.id, row);
            }
        }
        backend
    }

    pub fn rows(&self) -> Vec<Pixel> {
        self.inner.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn row(&self, id: u32) -> Option<Pixel> {
        self.inner.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn reset_count(&self) -> usize {
        self.inner.resets.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.lock().unwrap().len()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Adopt behind the client's back, as another visitor would.
    pub fn adopt_elsewhere(&self, id: u32, adopter: &str) {
        let changed = {
            let mut rows = self.inner.rows.lock().unwrap();
            let Some(row) = rows.get_mut(&id) else {
                return;
            };
            row.adopted = true;
            row.adopter = adopter.to_string();
            row.color = "#00B894".to_string();
            row.emoji = "🥳".to_string();
            row.version += 1;
            row.clone()
        };
        self.notify([(ChangeKind::Update, changed)]);
    }

    fn check_writes(&self) -> Result<(), ServiceError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    fn notify(&self, changes: impl IntoIterator<Item = (ChangeKind, Pixel)>) {
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();

        for (kind, pixel) in changes {
            for handler in &handlers {
                handler(ChangeEvent {
                    event_type: kind,
                    table: PIXELS_TABLE.to_string(),
                    new: pixel.clone(),
                });
            }
        }
    }
}

fn unavailable() -> ServiceError {
    ServiceError::Status {
        status: 503,
        body: "backend unavailable".to_string(),
    }
}

impl PixelBackend for MemoryBackend {
    async fn fetch_all(&self) -> Result<Vec<Pixel>, ServiceError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.rows())
    }

    async fn upsert(
        &self,
        pixels: &[Pixel],
        resolution: Resolution,
    ) -> Result<UpsertResponse, ServiceError> {
        self.check_writes()?;

        let mut summary = UpsertResponse::default();
        let mut changes = Vec::new();
        {
            let mut rows = self.inner.rows.lock().unwrap();
            for pixel in pixels {
                match rows.get_mut(&pixel.id) {
                    None => {
                        let row = Pixel {
                            version: 0,
                            ..pixel.clone()
                        };
                        rows.insert(row.id, row.clone());
                        summary.inserted += 1;
                        changes.push((ChangeKind::Insert, row));
                    }
                    Some(_) if resolution == Resolution::IgnoreDuplicates => summary.ignored += 1,
                    Some(existing) => {
                        let version = existing.version + 1;
                        *existing = Pixel {
                            version,
                            ..pixel.clone()
                        };
                        summary.updated += 1;
                        changes.push((ChangeKind::Update, existing.clone()));
                    }
                }
            }
        }

        self.notify(changes);
        Ok(summary)
    }

    async fn try_adopt(
        &self,
        id: u32,
        adopter: &str,
        color: &str,
        emoji: &str,
    ) -> Result<Pixel, ServiceError> {
        self.check_writes()?;

        let adopted = {
            let mut rows = self.inner.rows.lock().unwrap();
            let row = rows.get_mut(&id).ok_or(ServiceError::Status {
                status: 404,
                body: String::new(),
            })?;
            if row.adopted {
                return Err(ServiceError::AlreadyAdopted(id));
            }
            row.adopted = true;
            row.adopter = adopter.to_string();
            row.color = color.to_string();
            row.emoji = emoji.to_string();
            row.adopted_at = Some(chrono::Utc::now());
            row.version += 1;
            row.clone()
        };

        self.notify([(ChangeKind::Update, adopted.clone())]);
        Ok(adopted)
    }

    async fn try_reset_all(&self) -> Result<usize, ServiceError> {
        self.check_writes()?;

        let reset: Vec<Pixel> = {
            let mut rows = self.inner.rows.lock().unwrap();
            rows.values_mut()
                .map(|row| {
                    *row = Pixel {
                        version: row.version + 1,
                        ..Pixel::unadopted(row.id)
                    };
                    row.clone()
                })
                .collect()
        };
        self.inner.resets.fetch_add(1, Ordering::SeqCst);

        let count = reset.len();
        self.notify(reset.into_iter().map(|p| (ChangeKind::Update, p)));
        Ok(count)
    }

    async fn subscribe<F>(&self, handler: F) -> Result<Subscription, ServiceError>
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_handler.fetch_add(1, Ordering::SeqCst);
        self.inner
            .handlers
            .lock()
            .unwrap()
            .push((id, Arc::new(handler)));

        let inner = self.inner.clone();
        Ok(Subscription::spawn(move |stop| async move {
            let _ = stop.await;
            inner.handlers.lock().unwrap().retain(|(h, _)| *h != id);
        }))
    }
}

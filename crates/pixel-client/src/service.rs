//! Pixel Service Client: the façade every part of the client uses to reach the
//! backend.
//!
//! [`PixelBackend`] splits into fallible primitives, which a transport
//! implements, and the four façade operations (`list_all`, `initialize`,
//! `adopt`, `reset_all`) built on top of them. The façade never returns an
//! error: failures are logged and turned into an empty list or `false`.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use url::Url;

use pixel_types::api::{AdoptRequest, ResetResponse, Resolution, UpsertResponse};
use pixel_types::events::{ChangeEvent, EventFilter, FeedCommand, FeedEvent};
use pixel_types::models::{PIXELS_TABLE, Pixel};

use crate::config::ClientConfig;
use crate::subscription::Subscription;

/// How long to wait for the server to acknowledge a Subscribe.
const SUBSCRIBE_ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("pixel {0} is already adopted")]
    AlreadyAdopted(u32),

    #[error("realtime connection failed: {0}")]
    Realtime(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("subscription rejected: {0}")]
    Rejected(String),
}

pub trait PixelBackend: Send + Sync + 'static {
    // -- Primitives --

    /// Every row, ordered by id.
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<Pixel>, ServiceError>> + Send;

    fn upsert(
        &self,
        pixels: &[Pixel],
        resolution: Resolution,
    ) -> impl Future<Output = Result<UpsertResponse, ServiceError>> + Send;

    /// Conditional adoption; fails with `AlreadyAdopted` if someone got there first.
    fn try_adopt(
        &self,
        id: u32,
        adopter: &str,
        color: &str,
        emoji: &str,
    ) -> impl Future<Output = Result<Pixel, ServiceError>> + Send;

    /// Returns how many rows were reset.
    fn try_reset_all(&self) -> impl Future<Output = Result<usize, ServiceError>> + Send;

    /// Invoke `handler` for every insert/update on the pixel table until the
    /// returned handle is unsubscribed or dropped.
    fn subscribe<F>(
        &self,
        handler: F,
    ) -> impl Future<Output = Result<Subscription, ServiceError>> + Send
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static;

    // -- Façade --

    fn list_all(&self) -> impl Future<Output = Vec<Pixel>> + Send {
        async move {
            match self.fetch_all().await {
                Ok(mut pixels) => {
                    pixels.sort_by_key(|p| p.id);
                    pixels
                }
                Err(e) => {
                    error!("Error fetching pixels: {}", e);
                    Vec::new()
                }
            }
        }
    }

    /// Make sure rows `0..total` exist. Rows that already exist are never
    /// overwritten, adopted or not.
    fn initialize(&self, total: u32) -> impl Future<Output = bool> + Send {
        async move {
            let existing = match self.fetch_all().await {
                Ok(pixels) => pixels,
                Err(e) => {
                    error!("Error initializing pixels: {}", e);
                    return false;
                }
            };

            let gaps = IdGaps::find(&existing, total);
            if !gaps.unexpected.is_empty() {
                warn!(
                    "Leaving {} pixel rows outside 0..{} untouched: {:?}",
                    gaps.unexpected.len(),
                    total,
                    gaps.unexpected
                );
            }
            if gaps.missing.is_empty() {
                debug!("All {} pixels already present", total);
                return true;
            }

            info!("Creating {} missing pixels", gaps.missing.len());
            let rows: Vec<Pixel> = (0..total).map(Pixel::unadopted).collect();
            match self.upsert(&rows, Resolution::IgnoreDuplicates).await {
                Ok(summary) => {
                    info!(
                        "Initialized pixels: {} inserted, {} already present",
                        summary.inserted, summary.ignored
                    );
                    true
                }
                Err(e) => {
                    error!("Error initializing pixels: {}", e);
                    false
                }
            }
        }
    }

    fn adopt(
        &self,
        id: u32,
        adopter: &str,
        color: &str,
        emoji: &str,
    ) -> impl Future<Output = bool> + Send {
        async move {
            match self.try_adopt(id, adopter, color, emoji).await {
                Ok(_) => true,
                Err(e) => {
                    error!("Error adopting pixel {}: {}", id, e);
                    false
                }
            }
        }
    }

    fn reset_all(&self) -> impl Future<Output = bool> + Send {
        async move {
            match self.try_reset_all().await {
                Ok(count) => {
                    info!("Reset {} pixels", count);
                    true
                }
                Err(e) => {
                    error!("Error resetting pixels: {}", e);
                    false
                }
            }
        }
    }
}

/// Ids missing from `0..total`, and ids present that fall outside it.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IdGaps {
    pub missing: Vec<u32>,
    pub unexpected: Vec<u32>,
}

impl IdGaps {
    pub fn find(existing: &[Pixel], total: u32) -> Self {
        let present: HashSet<u32> = existing.iter().map(|p| p.id).collect();
        let missing = (0..total).filter(|id| !present.contains(id)).collect();
        let mut unexpected: Vec<u32> = present.into_iter().filter(|id| *id >= total).collect();
        unexpected.sort_unstable();
        Self {
            missing,
            unexpected,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP + WebSocket transport
// ---------------------------------------------------------------------------

type FeedSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Talks to the pixel backend over REST and the realtime WebSocket.
#[derive(Clone)]
pub struct HttpPixelService {
    http: reqwest::Client,
    base_url: Url,
    pixels_url: Url,
    reset_url: Url,
    realtime_url: Url,
    anon_key: String,
}

impl HttpPixelService {
    pub fn new(config: &ClientConfig) -> Result<Self, ServiceError> {
        let base_url = config.backend_url.clone();
        let pixels_url = base_url.join("rest/v1/pixels")?;
        let reset_url = base_url.join("rest/v1/pixels/reset")?;

        let mut realtime_url = base_url.join("realtime/v1/websocket")?;
        let scheme = if base_url.scheme() == "https" { "wss" } else { "ws" };
        realtime_url
            .set_scheme(scheme)
            .map_err(|_| ServiceError::Rejected(format!("cannot use {} for realtime", base_url)))?;
        realtime_url
            .query_pairs_mut()
            .append_pair("apikey", &config.anon_key);

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            pixels_url,
            reset_url,
            realtime_url,
            anon_key: config.anon_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http.request(method, url).header("apikey", &self.anon_key)
    }

    /// Pass successful responses through; turn everything else into `Status`.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Open the socket and complete the Subscribe handshake.
    async fn open_feed(&self) -> Result<FeedSocket, ServiceError> {
        let (mut socket, _) = connect_async(self.realtime_url.as_str()).await?;

        let subscribe = FeedCommand::Subscribe {
            table: PIXELS_TABLE.to_string(),
            event: EventFilter::All,
        };
        socket
            .send(Message::text(serde_json::to_string(&subscribe)?))
            .await?;

        tokio::time::timeout(SUBSCRIBE_ACK_TIMEOUT, wait_for_ack(&mut socket))
            .await
            .map_err(|_| ServiceError::Rejected("no acknowledgement from server".into()))??;

        Ok(socket)
    }
}

impl PixelBackend for HttpPixelService {
    async fn fetch_all(&self) -> Result<Vec<Pixel>, ServiceError> {
        let response = self
            .request(reqwest::Method::GET, self.pixels_url.clone())
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn upsert(
        &self,
        pixels: &[Pixel],
        resolution: Resolution,
    ) -> Result<UpsertResponse, ServiceError> {
        let response = self
            .request(reqwest::Method::POST, self.pixels_url.clone())
            .query(&[("resolution", resolution.as_str())])
            .json(pixels)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn try_adopt(
        &self,
        id: u32,
        adopter: &str,
        color: &str,
        emoji: &str,
    ) -> Result<Pixel, ServiceError> {
        let url = self.base_url.join(&format!("rest/v1/pixels/{}/adopt", id))?;
        let body = AdoptRequest {
            adopter: adopter.to_string(),
            color: color.to_string(),
            emoji: emoji.to_string(),
        };
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(ServiceError::AlreadyAdopted(id));
        }
        Ok(Self::check(response).await?.json().await?)
    }

    async fn try_reset_all(&self) -> Result<usize, ServiceError> {
        let response = self
            .request(reqwest::Method::POST, self.reset_url.clone())
            .send()
            .await?;
        let summary: ResetResponse = Self::check(response).await?.json().await?;
        Ok(summary.reset)
    }

    async fn subscribe<F>(&self, handler: F) -> Result<Subscription, ServiceError>
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let socket = self.open_feed().await?;
        info!("Subscribed to {} changes", PIXELS_TABLE);
        Ok(Subscription::spawn(move |stop| run_feed(socket, handler, stop)))
    }
}

async fn wait_for_ack(socket: &mut FeedSocket) -> Result<(), ServiceError> {
    while let Some(msg) = socket.next().await {
        let Message::Text(text) = msg? else {
            continue;
        };
        match serde_json::from_str::<FeedEvent>(&text)? {
            FeedEvent::Subscribed { .. } => return Ok(()),
            FeedEvent::Error { message } => return Err(ServiceError::Rejected(message)),
            FeedEvent::Change(_) => {}
        }
    }
    Err(ServiceError::Rejected("connection closed before acknowledging".into()))
}

/// Deliver changes to `handler` until stopped or the server goes away.
async fn run_feed<F>(socket: FeedSocket, handler: F, mut stop: oneshot::Receiver<()>)
where
    F: Fn(ChangeEvent) + Send + Sync + 'static,
{
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            _ = &mut stop => {
                if let Ok(text) = serde_json::to_string(&FeedCommand::Unsubscribe) {
                    let _ = write.send(Message::text(text)).await;
                }
                let _ = write.send(Message::Close(None)).await;
                debug!("Unsubscribed from {} changes", PIXELS_TABLE);
                break;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<FeedEvent>(&text) {
                    Ok(FeedEvent::Change(change)) => handler(change),
                    Ok(FeedEvent::Error { message }) => warn!("Realtime error: {}", message),
                    Ok(FeedEvent::Subscribed { .. }) => {}
                    Err(e) => warn!("Malformed realtime frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    warn!("Realtime connection closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Realtime connection error: {}", e);
                    break;
                }
            }
        }
    }
}

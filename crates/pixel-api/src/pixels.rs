use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{error, info, warn};

use pixel_db::models::{AdoptOutcome, PixelRow, RowChange};
use pixel_types::api::{AdoptRequest, ResetResponse, UpsertQuery, UpsertResponse};
use pixel_types::events::{ChangeEvent, ChangeKind};
use pixel_types::models::{NAME_MAX_LEN, PIXELS_TABLE, Pixel, is_known_emoji, is_palette_color};

use crate::AppState;

/// GET /rest/v1/pixels: every row, ordered by id.
pub async fn list_pixels(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let rows = run_blocking(&state, |db| db.list_pixels()).await?;
    let pixels: Vec<Pixel> = rows.into_iter().map(to_pixel).collect();
    Ok(Json(pixels))
}

/// POST /rest/v1/pixels: bulk insert-or-update keyed by id.
pub async fn upsert_pixels(
    State(state): State<AppState>,
    Query(query): Query<UpsertQuery>,
    Json(pixels): Json<Vec<Pixel>>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut seen = HashSet::with_capacity(pixels.len());
    for pixel in &pixels {
        if !seen.insert(pixel.id) {
            warn!("Upsert batch repeats pixel {}", pixel.id);
            return Err(StatusCode::BAD_REQUEST);
        }
        if pixel.adopter.chars().count() > NAME_MAX_LEN {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let rows: Vec<PixelRow> = pixels.iter().map(to_row).collect();
    let resolution = query.resolution;
    let summary = run_blocking(&state, move |db| db.upsert_pixels(&rows, resolution)).await?;

    let inserted = summary
        .changes
        .iter()
        .filter(|c| c.kind == ChangeKind::Insert)
        .count();
    let response = UpsertResponse {
        inserted,
        updated: summary.changes.len() - inserted,
        ignored: summary.ignored,
    };

    if !summary.changes.is_empty() {
        info!(
            "Upsert ({}): {} inserted, {} updated, {} ignored",
            resolution.as_str(),
            response.inserted,
            response.updated,
            response.ignored
        );
    }

    state.feed.publish_all(summary.changes.into_iter().map(to_event));

    Ok(Json(response))
}

/// POST /rest/v1/pixels/{id}/adopt: claim an unadopted pixel.
pub async fn adopt_pixel(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(req): Json<AdoptRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let req = validate_adoption(req)?;
    let adopted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let outcome = run_blocking(&state, move |db| {
        db.adopt_pixel(id, &req.adopter, &req.color, &req.emoji, &adopted_at)
    })
    .await?;

    match outcome {
        AdoptOutcome::Adopted(row) => {
            info!("Pixel {} adopted by {}", row.id, row.adopter);
            let pixel = to_pixel(row);
            state.feed.publish(ChangeEvent {
                event_type: ChangeKind::Update,
                table: PIXELS_TABLE.to_string(),
                new: pixel.clone(),
            });
            Ok(Json(pixel))
        }
        AdoptOutcome::AlreadyAdopted(current) => {
            info!("Pixel {} already adopted by {}, rejecting", current.id, current.adopter);
            Err(StatusCode::CONFLICT)
        }
        AdoptOutcome::NotFound => Err(StatusCode::NOT_FOUND),
    }
}

/// POST /rest/v1/pixels/reset: every row back to the unadopted default.
pub async fn reset_pixels(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let rows = run_blocking(&state, |db| db.reset_all()).await?;
    let reset = rows.len();

    info!("Reset {} pixels", reset);

    state.feed.publish_all(rows.into_iter().map(|row| {
        to_event(RowChange {
            kind: ChangeKind::Update,
            row,
        })
    }));

    Ok(Json(ResetResponse { reset }))
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// Run blocking DB work off the async runtime.
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&pixel_db::Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

fn validate_adoption(req: AdoptRequest) -> Result<AdoptRequest, StatusCode> {
    let adopter = req.adopter.trim();
    if adopter.is_empty() || adopter.chars().count() > NAME_MAX_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !is_palette_color(&req.color) || !is_known_emoji(&req.emoji) {
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok(AdoptRequest {
        adopter: adopter.to_string(),
        color: req.color.to_ascii_uppercase(),
        emoji: req.emoji,
    })
}

fn to_event(change: RowChange) -> ChangeEvent {
    ChangeEvent {
        event_type: change.kind,
        table: PIXELS_TABLE.to_string(),
        new: to_pixel(change.row),
    }
}

fn to_row(pixel: &Pixel) -> PixelRow {
    PixelRow {
        id: pixel.id,
        adopted: pixel.adopted,
        color: pixel.color.clone(),
        adopter: pixel.adopter.clone(),
        emoji: pixel.emoji.clone(),
        adopted_at: pixel
            .adopted_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        version: 0,
    }
}

fn to_pixel(row: PixelRow) -> Pixel {
    let adopted_at = row.adopted_at.as_deref().and_then(|raw| {
        raw.parse::<DateTime<Utc>>()
            .or_else(|_| {
                // SQLite's datetime('now') has no timezone; read it as UTC.
                chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| ndt.and_utc())
            })
            .map_err(|e| warn!("Corrupt adopted_at '{}' on pixel {}: {}", raw, row.id, e))
            .ok()
    });

    Pixel {
        id: row.id,
        adopted: row.adopted,
        color: row.color,
        adopter: row.adopter,
        emoji: row.emoji,
        adopted_at,
        version: u64::try_from(row.version).unwrap_or_default(),
    }
}

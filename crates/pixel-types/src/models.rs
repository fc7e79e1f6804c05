use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Grid contract --

pub const GRID_WIDTH: u32 = 10;
pub const GRID_HEIGHT: u32 = 8;
pub const TOTAL_PIXELS: u32 = GRID_WIDTH * GRID_HEIGHT;

/// Backend table that holds one row per pixel.
pub const PIXELS_TABLE: &str = "pixels";

/// Color of a pixel nobody has adopted yet.
pub const DEFAULT_COLOR: &str = "#E5E7EB";

/// Longest adopter name accepted, in characters.
pub const NAME_MAX_LEN: usize = 20;

/// No row ever carries this id, so `id <> RESET_SENTINEL_ID` matches every row.
pub const RESET_SENTINEL_ID: i64 = -1;

/// Full re-fetch cadence on the client.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Delay between observing a fully adopted grid and resetting it.
pub const AUTO_RESET_DELAY: Duration = Duration::from_millis(10_000);

pub const COLORS: [&str; 12] = [
    "#FF6B6B", // red
    "#FFFFFF", // white
    "#FF9F43", // orange
    "#48DBFB", // sky blue
    "#5F27CD", // purple
    "#F368E0", // hot pink
    "#00B894", // jade
    "#FFDC00", // bright yellow
    "#A3CB38", // lime green
    "#341F97", // deep indigo
    "#FF793F", // coral
    "#222F3E", // dark gray-blue
];

pub const EMOJIS: [&str; 24] = [
    "😀", "😃", "😄", "😁", "😆", "😅", "😂", "🤣", "😊", "😇", "🙂", "☺️", "😋", "😛", "🤗",
    "🤭", "🥰", "😍", "🤩", "😘", "😗", "😚", "😙", "🥳",
];

pub fn is_palette_color(color: &str) -> bool {
    COLORS.iter().any(|c| c.eq_ignore_ascii_case(color))
}

pub fn is_known_emoji(emoji: &str) -> bool {
    EMOJIS.contains(&emoji)
}

/// One cell of the grid, as stored by the backend and mirrored by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    pub id: u32,
    pub adopted: bool,
    pub color: String,
    pub adopter: String,
    pub emoji: String,
    #[serde(default)]
    pub adopted_at: Option<DateTime<Utc>>,
    /// Write stamp in epoch milliseconds, strictly increasing per row across
    /// writes and database rebuilds. Clients merge on it.
    #[serde(default)]
    pub version: u64,
}

impl Pixel {
    /// A fresh, unadopted pixel.
    pub fn unadopted(id: u32) -> Self {
        Self {
            id,
            adopted: false,
            color: DEFAULT_COLOR.to_string(),
            adopter: String::new(),
            emoji: String::new(),
            adopted_at: None,
            version: 0,
        }
    }

    /// Whether the row is in the canonical unadopted state.
    pub fn is_default(&self) -> bool {
        !self.adopted
            && self.adopter.is_empty()
            && self.emoji.is_empty()
            && self.adopted_at.is_none()
            && self.color.eq_ignore_ascii_case(DEFAULT_COLOR)
    }

    /// Row-major (column, row) position in the grid.
    pub fn position(&self) -> (u32, u32) {
        (self.id % GRID_WIDTH, self.id / GRID_WIDTH)
    }
}

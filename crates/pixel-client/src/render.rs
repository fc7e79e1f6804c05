//! Text rendering of the page. Cells are painted with 24-bit ANSI
//! backgrounds; everything else is plain text.

use pixel_types::models::{
    AUTO_RESET_DELAY, COLORS, DEFAULT_COLOR, GRID_HEIGHT, GRID_WIDTH, Pixel, TOTAL_PIXELS,
};

use crate::page::{Page, Phase};
use crate::store::GridStore;

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";
const MISSING_CELL: &str = " ·  ";

pub const LOADING: &str = "Loading pixels...";
pub const TITLE: &str = "Adopt a Pixel";
pub const LIVE: &str = "🔄 Live updates";
pub const MODAL_TITLE: &str = "🥺 Will you adopt me?";
pub const CANCEL_LABEL: &str = "Maybe later";
pub const ADOPT_LABEL: &str = "Yes, adopt! 💖";

pub fn render(page: &Page, store: &GridStore) -> String {
    if page.phase() == Phase::Loading {
        return format!("{}\n", LOADING);
    }

    let mut lines = vec![
        TITLE.to_string(),
        format!(
            "Click on a grey pixel to adopt it! ({}/{} adopted)",
            store.adopted_count(),
            TOTAL_PIXELS
        ),
        format!("Grid: {} × {} pixels", GRID_WIDTH, GRID_HEIGHT),
        LIVE.to_string(),
        String::new(),
    ];
    lines.extend(grid_lines(store.pixels(), page.selected()));

    if store.is_fully_adopted() {
        lines.push(String::new());
        lines.push(banner());
    }

    if let Some(pixel_id) = page.selected() {
        lines.push(String::new());
        lines.extend(modal_lines(page, pixel_id));
    }

    if let Some(alert) = page.alert() {
        lines.push(String::new());
        lines.push(format!("⚠️  {}", alert));
        lines.push(format!("{}(press Enter to continue){}", DIM, RESET));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn banner() -> String {
    format!(
        "🎉 All pixels adopted! Resetting in {} seconds... 🎉",
        AUTO_RESET_DELAY.as_secs()
    )
}

/// Cells are placed by id, so a row missing from the store leaves a hole
/// instead of shifting its neighbours.
fn grid_lines(pixels: &[Pixel], selected: Option<u32>) -> Vec<String> {
    let mut slots: Vec<Option<&Pixel>> = vec![None; TOTAL_PIXELS as usize];
    for pixel in pixels {
        let (col, row) = pixel.position();
        if row < GRID_HEIGHT {
            slots[(row * GRID_WIDTH + col) as usize] = Some(pixel);
        }
    }

    let mut ruler = String::from("   ");
    for col in 0..GRID_WIDTH {
        ruler.push_str(&format!("{:^4}", col));
    }

    let mut lines = vec![ruler];
    for (row, chunk) in slots.chunks(GRID_WIDTH as usize).enumerate() {
        let mut line = format!("{:>2} ", row);
        for slot in chunk {
            match slot {
                Some(pixel) => line.push_str(&cell(pixel, selected == Some(pixel.id))),
                None => line.push_str(MISSING_CELL),
            }
        }
        lines.push(line);
    }
    lines
}

fn cell(pixel: &Pixel, selected: bool) -> String {
    let (r, g, b) = hex_to_rgb(&pixel.color)
        .or_else(|| hex_to_rgb(DEFAULT_COLOR))
        .unwrap_or((229, 231, 235));
    let content = if pixel.adopted && !pixel.emoji.is_empty() {
        pixel.emoji.as_str()
    } else if selected {
        "<>"
    } else {
        "  "
    };
    format!("\x1b[48;2;{};{};{}m {} {}", r, g, b, content, RESET)
}

fn modal_lines(page: &Page, pixel_id: u32) -> Vec<String> {
    let form = page.form();
    let mut lines = vec![
        MODAL_TITLE.to_string(),
        format!("Pixel #{}", pixel_id),
        format!("Name: {}", form.name),
        "Color:".to_string(),
    ];

    for (idx, color) in COLORS.iter().enumerate() {
        let (r, g, b) = hex_to_rgb(color).unwrap_or((0, 0, 0));
        let marker = if *color == form.color { " ◀" } else { "" };
        lines.push(format!(
            "  {:>2} \x1b[48;2;{};{};{}m    {} {}{}",
            idx + 1,
            r,
            g,
            b,
            RESET,
            color,
            marker
        ));
    }

    let adopt = if page.submission().is_some() {
        format!("[{}]", ADOPT_LABEL)
    } else {
        format!("{}[{}] (type a name first){}", DIM, ADOPT_LABEL, RESET)
    };
    lines.push(format!("[{}]  {}", CANCEL_LABEL, adopt));
    lines
}

/// `#RRGGBB` (case-insensitive, `#` optional) to its components.
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

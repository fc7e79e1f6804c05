use rand::Rng;
use rand::seq::IndexedRandom;

use pixel_types::models::{COLORS, EMOJIS, NAME_MAX_LEN, Pixel};

pub const ADOPT_FAILED_ALERT: &str = "Failed to adopt pixel. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Adopting { pixel_id: u32 },
}

/// One-off guidance printed under the screen, gone on the next redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint(pub String);

/// How the user picked a color: 1-based palette position or a hex value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorChoice {
    Index(usize),
    Hex(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdoptionForm {
    pub name: String,
    pub color: &'static str,
}

impl Default for AdoptionForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: COLORS[0],
        }
    }
}

/// Everything `adopt` needs, taken from the open form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub pixel_id: u32,
    pub adopter: String,
    pub color: String,
}

/// Interaction state of the page: `loading → ready`, and within ready
/// `idle ⇄ adopting`.
#[derive(Debug)]
pub struct Page {
    phase: Phase,
    mode: Mode,
    form: AdoptionForm,
    /// Shown on every render until the user acknowledges it.
    alert: Option<String>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Self {
            phase: Phase::Loading,
            mode: Mode::Idle,
            form: AdoptionForm::default(),
            alert: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn form(&self) -> &AdoptionForm {
        &self.form
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    /// Acknowledge the pending alert. Returns whether there was one.
    pub fn dismiss_alert(&mut self) -> bool {
        self.alert.take().is_some()
    }

    pub fn selected(&self) -> Option<u32> {
        match self.mode {
            Mode::Adopting { pixel_id } => Some(pixel_id),
            Mode::Idle => None,
        }
    }

    pub fn mark_ready(&mut self) {
        self.phase = Phase::Ready;
    }

    /// Open the form for an unadopted pixel. Returns whether it opened.
    pub fn click(&mut self, pixel: Option<&Pixel>) -> bool {
        if self.phase == Phase::Loading || self.selected().is_some() {
            return false;
        }
        match pixel {
            Some(pixel) if !pixel.adopted => {
                self.mode = Mode::Adopting { pixel_id: pixel.id };
                true
            }
            _ => false,
        }
    }

    pub fn set_name(&mut self, name: &str) -> bool {
        if self.selected().is_none() {
            return false;
        }
        self.form.name = name.chars().take(NAME_MAX_LEN).collect();
        true
    }

    /// Only palette entries are accepted.
    pub fn choose_color(&mut self, choice: &ColorChoice) -> bool {
        if self.selected().is_none() {
            return false;
        }
        let color = match choice {
            ColorChoice::Index(n) => n.checked_sub(1).and_then(|i| COLORS.get(i)).copied(),
            ColorChoice::Hex(hex) => COLORS.iter().find(|c| c.eq_ignore_ascii_case(hex)).copied(),
        };
        match color {
            Some(color) => {
                self.form.color = color;
                true
            }
            None => false,
        }
    }

    pub fn cancel(&mut self) {
        self.mode = Mode::Idle;
        self.form = AdoptionForm::default();
    }

    /// The pending adoption, if the form is open with a non-blank name.
    pub fn submission(&self) -> Option<Submission> {
        let pixel_id = self.selected()?;
        let adopter = self.form.name.trim();
        if adopter.is_empty() {
            return None;
        }
        Some(Submission {
            pixel_id,
            adopter: adopter.to_string(),
            color: self.form.color.to_string(),
        })
    }

    /// Close the form after a successful adoption; keep it open and raise
    /// an alert otherwise.
    pub fn complete_submission(&mut self, success: bool) {
        if success {
            self.cancel();
        } else {
            self.alert = Some(ADOPT_FAILED_ALERT.to_string());
        }
    }
}

pub fn pick_emoji<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    EMOJIS.choose(rng).copied().unwrap_or(EMOJIS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_page() -> Page {
        let mut page = Page::new();
        page.mark_ready();
        page
    }

    fn adopted(id: u32) -> Pixel {
        Pixel {
            adopted: true,
            adopter: "Ava".to_string(),
            ..Pixel::unadopted(id)
        }
    }

    #[test]
    fn clicks_are_ignored_while_loading() {
        let mut page = Page::new();
        assert!(!page.click(Some(&Pixel::unadopted(3))));
        assert_eq!(page.mode(), Mode::Idle);
    }

    #[test]
    fn clicking_opens_only_unadopted_pixels() {
        let mut page = ready_page();
        assert!(!page.click(Some(&adopted(3))));
        assert!(!page.click(None));
        assert_eq!(page.mode(), Mode::Idle);

        assert!(page.click(Some(&Pixel::unadopted(4))));
        assert_eq!(page.mode(), Mode::Adopting { pixel_id: 4 });
    }

    #[test]
    fn name_is_truncated() {
        let mut page = ready_page();
        page.click(Some(&Pixel::unadopted(0)));
        page.set_name("Bartholomew the Magnificent");
        assert_eq!(page.form().name.chars().count(), NAME_MAX_LEN);
        assert_eq!(page.form().name, "Bartholomew the Magn");
    }

    #[test]
    fn only_palette_colors_are_accepted() {
        let mut page = ready_page();
        page.click(Some(&Pixel::unadopted(0)));

        assert!(page.choose_color(&ColorChoice::Index(2)));
        assert_eq!(page.form().color, COLORS[1]);

        assert!(page.choose_color(&ColorChoice::Hex(COLORS[5].to_lowercase())));
        assert_eq!(page.form().color, COLORS[5]);

        assert!(!page.choose_color(&ColorChoice::Index(0)));
        assert!(!page.choose_color(&ColorChoice::Index(13)));
        assert!(!page.choose_color(&ColorChoice::Hex("#123456".into())));
        assert_eq!(page.form().color, COLORS[5]);
    }

    #[test]
    fn blank_names_cannot_be_submitted() {
        let mut page = ready_page();
        page.click(Some(&Pixel::unadopted(9)));
        assert_eq!(page.submission(), None);

        page.set_name("   ");
        assert_eq!(page.submission(), None);

        page.set_name("  Ava ");
        let submission = page.submission().unwrap();
        assert_eq!(submission.pixel_id, 9);
        assert_eq!(submission.adopter, "Ava");
        assert_eq!(submission.color, COLORS[0]);
    }

    #[test]
    fn cancel_resets_the_form() {
        let mut page = ready_page();
        page.click(Some(&Pixel::unadopted(1)));
        page.set_name("Ava");
        page.choose_color(&ColorChoice::Index(4));

        page.cancel();
        assert_eq!(page.mode(), Mode::Idle);
        assert_eq!(page.form(), &AdoptionForm::default());
    }

    #[test]
    fn failed_submission_keeps_the_form_open() {
        let mut page = ready_page();
        page.click(Some(&Pixel::unadopted(1)));
        page.set_name("Ava");

        page.complete_submission(false);
        assert_eq!(page.alert(), Some(ADOPT_FAILED_ALERT));
        assert_eq!(page.selected(), Some(1));
        assert_eq!(page.form().name, "Ava");

        assert!(page.dismiss_alert());
        assert!(!page.dismiss_alert());
        assert_eq!(page.alert(), None);
        assert_eq!(page.selected(), Some(1));

        page.complete_submission(true);
        assert_eq!(page.mode(), Mode::Idle);
        assert_eq!(page.form().name, "");
    }

    #[test]
    fn emoji_comes_from_the_set() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            assert!(EMOJIS.contains(&pick_emoji(&mut rng)));
        }
    }
}

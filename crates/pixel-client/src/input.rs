use crate::page::ColorChoice;

pub const USAGE: &str = "\
Commands:
  click <id>         open the adoption form for a grey pixel (a bare id works too)
  name <text>        set the adopter name (max 20 characters)
  color <1-12|#hex>  pick a palette color
  submit             adopt the selected pixel
  cancel             close the form
  refresh            reload the grid
  help               show this message
  quit               exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Click(u32),
    Name(String),
    Color(ColorChoice),
    Submit,
    Cancel,
    Refresh,
    Help,
    Quit,
    /// Anything unparseable; carries the offending input.
    Unknown(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_intent(line: &str) -> Option<Intent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let unknown = || Intent::Unknown(line.to_string());
    let intent = match command.to_ascii_lowercase().as_str() {
        "click" => rest.parse().map(Intent::Click).unwrap_or_else(|_| unknown()),
        "name" => Intent::Name(rest.to_string()),
        "color" => parse_color(rest).map(Intent::Color).unwrap_or_else(unknown),
        "submit" | "adopt" if rest.is_empty() => Intent::Submit,
        "cancel" if rest.is_empty() => Intent::Cancel,
        "refresh" if rest.is_empty() => Intent::Refresh,
        "help" | "?" => Intent::Help,
        "quit" | "exit" | "q" if rest.is_empty() => Intent::Quit,
        _ if rest.is_empty() => command.parse().map(Intent::Click).unwrap_or_else(|_| unknown()),
        _ => unknown(),
    };
    Some(intent)
}

fn parse_color(arg: &str) -> Option<ColorChoice> {
    if arg.starts_with('#') {
        return Some(ColorChoice::Hex(arg.to_string()));
    }
    arg.parse().ok().map(ColorChoice::Index)
}

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use pixel_client::app::{App, AppSettings};
use pixel_client::config::ClientConfig;
use pixel_client::input::{Intent, parse_intent};
use pixel_client::page::Hint;
use pixel_client::service::HttpPixelService;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout belongs to the grid
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixel_client=info".into()),
        )
        .init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            eprintln!("       Set PIXEL_BACKEND_URL and PIXEL_ANON_KEY in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let service = HttpPixelService::new(&config)?;
    info!("Using pixel backend at {}", config.backend_url);

    let mut app = App::new(Arc::new(service), AppSettings::default());
    draw(&app.render(), None);
    app.start().await;
    draw(&app.render(), Some(&Hint("Type `help` for commands.".into())));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read input: {}", e);
                        break;
                    }
                };
                let Some(intent) = parse_intent(&line) else {
                    if app.dismiss_alert() {
                        draw(&app.render(), None);
                    }
                    continue;
                };
                if intent == Intent::Quit {
                    break;
                }
                let hint = app.handle(intent).await;
                draw(&app.render(), hint.as_ref());
            }
            Some(update) = app.next_update() => {
                if app.apply(update) {
                    draw(&app.render(), None);
                }
            }
        }
    }

    app.shutdown().await;
    Ok(())
}

fn draw(screen: &str, hint: Option<&Hint>) {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "{}{}", CLEAR_SCREEN, screen);
    if let Some(Hint(message)) = hint {
        let _ = writeln!(out, "\n{}", message);
    }
    let _ = write!(out, "> ");
    let _ = out.flush();
}

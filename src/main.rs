use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use neochat::app::App;
use neochat::config::Config;
use neochat::tui::{self, EventHandler};
use neochat::{handler, ui};

#[derive(Parser)]
#[command(name = "neochat")]
#[command(version, about = "Terminal chat client for streaming NDJSON chat backends")]
struct Cli {
    /// Base URL of the chat backend (the client posts to <url>/v1/chat)
    #[arg(short, long)]
    url: Option<String>,

    /// Keep the session in this directory so it survives a restart
    #[arg(short, long)]
    session_dir: Option<PathBuf>,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config, then let flags override it
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {}", e);
        Config::new()
    });
    if let Some(url) = cli.url {
        config.base_url = url;
    }
    if let Some(dir) = cli.session_dir {
        config.session_dir = Some(dir);
    }
    if let Some(dir) = cli.log_dir {
        config.log_dir = Some(dir);
    }

    // The terminal belongs to the UI, so logs go to a daily file
    let log_dir = config.resolved_log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "neochat.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!(base_url = %config.base_url, session_dir = ?config.session_dir, "starting");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &config).await;
    tui::restore()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "exited with error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, config: &Config) -> Result<()> {
    let mut events = EventHandler::new();
    let mut app = App::new(config, events.sender());

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event),
            None => break,
        }
    }

    tracing::info!("shutting down");
    Ok(())
}

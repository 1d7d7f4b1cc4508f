use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bullion_core::dashboard::Dashboard;
use bullion_core::domain::chat::ChatMode;
use bullion_core::refresh::RefreshController;
use bullion_core::render::{render_text, DashboardView};

#[derive(Debug, Parser)]
#[command(name = "bullion_worker")]
struct Args {
    /// Sync once, print the dashboard and exit.
    #[arg(long)]
    once: bool,

    /// Initial chat mode: fast, grounded or thinking.
    #[arg(long, default_value = "fast")]
    mode: ChatMode,

    /// Seconds between automatic syncs. Overrides REFRESH_INTERVAL_SECS.
    #[arg(long)]
    refresh_interval_secs: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = bullion_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    // stdout belongs to the dashboard.
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Some(secs) = args.refresh_interval_secs {
        anyhow::ensure!(secs >= 1, "--refresh-interval-secs must be at least 1");
        settings.refresh_interval_secs = secs;
    }

    let dashboard = Dashboard::from_settings(&settings)?;
    dashboard.set_chat_mode(args.mode).await;

    if args.once {
        return run_once(&dashboard).await;
    }

    run_interactive(dashboard).await
}

async fn run_once(dashboard: &Arc<Dashboard>) -> anyhow::Result<()> {
    if let Some(sync) = dashboard.refresh().await {
        sync.await.context("market sync task failed")?;
    }

    let (text, failed) = dashboard
        .with_state(|s| {
            let view = DashboardView::build(s, chrono::Utc::now());
            (render_text(&view), s.error.is_some())
        })
        .await;
    print!("{text}");

    if failed {
        let err = anyhow::anyhow!("market sync failed");
        sentry_anyhow::capture_anyhow(&err);
        return Err(err);
    }
    Ok(())
}

async fn run_interactive(dashboard: Arc<Dashboard>) -> anyhow::Result<()> {
    let mut revision = dashboard.subscribe();
    let controller = RefreshController::start(dashboard.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!("dashboard running; /refresh, /mode <m>, /toggle <n>, /quit or type a question");

    loop {
        tokio::select! {
            changed = revision.changed() => {
                if changed.is_err() {
                    break;
                }
                redraw(&dashboard).await;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::Refresh => {
                        let _ = dashboard.refresh().await;
                    }
                    Input::Mode(mode) => dashboard.set_chat_mode(mode).await,
                    Input::Toggle(index) => {
                        if dashboard.toggle_card_at(index).await.is_none() {
                            tracing::warn!(index, "no card at this position");
                        }
                    }
                    Input::Chat(query) => {
                        dashboard.send_chat(query);
                    }
                    Input::Invalid(reason) => tracing::warn!(%reason, "ignored input"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    controller.stop();
    Ok(())
}

async fn redraw(dashboard: &Dashboard) {
    let text = dashboard
        .with_state(|s| render_text(&DashboardView::build(s, chrono::Utc::now())))
        .await;
    print!("\x1b[2J\x1b[H{text}");
}

#[derive(Debug, PartialEq)]
enum Input {
    Empty,
    Quit,
    Refresh,
    Mode(ChatMode),
    Toggle(usize),
    Chat(String),
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Chat(line.to_string());
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((command, ""));
    match name {
        "quit" | "exit" => Input::Quit,
        "refresh" => Input::Refresh,
        "mode" => match arg.parse() {
            Ok(mode) => Input::Mode(mode),
            Err(e) => Input::Invalid(format!("{e:#}")),
        },
        "toggle" => match arg.parse() {
            Ok(index) => Input::Toggle(index),
            Err(_) => Input::Invalid(format!("card index expected, got {arg:?}")),
        },
        other => Input::Invalid(format!("unknown command /{other}")),
    }
}

fn init_sentry(settings: &bullion_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

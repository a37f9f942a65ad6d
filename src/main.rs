use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use tmuxdash::api::{ApiClient, Collaborator};
use tmuxdash::app::{BackgroundEvent, Dashboard};
use tmuxdash::command;
use tmuxdash::config::Config;
use tmuxdash::dispatch::{Dispatcher, TargetContext};
use tmuxdash::guard::SessionGuard;
use tmuxdash::model::Selection;
use tmuxdash::poller::Poller;
use tmuxdash::{reconcile, runtime, view};

#[derive(Parser)]
#[command(name = "tmuxdash", version, about = "Watch and drive tmux through a dashboard backend")]
struct Cli {
    /// Config file (default: <config dir>/tmuxdash/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend API root, e.g. http://127.0.0.1:5001/api
    #[arg(long, global = true, env = "TMUXDASH_API_BASE")]
    api_base: Option<String>,

    #[arg(long, global = true, env = "TMUXDASH_USER")]
    user: Option<String>,

    #[arg(long, global = true, env = "TMUXDASH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Bearer token from an earlier login; skips the password exchange.
    #[arg(long, global = true, env = "TMUXDASH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mirror the live tree and accept operator commands on stdin.
    Watch {
        /// Focus a single pane (pane view) instead of the overview.
        #[arg(long)]
        pane: Option<String>,
    },
    /// Fetch once and print the tree.
    Snapshot,
    /// Print a pane's detail and captured output.
    Pane { id: String },
    /// Dispatch one action, e.g. `send send_keys keys='["Enter"]' --pane %3`.
    Send {
        action: String,
        /// key=value payload fields
        pairs: Vec<String>,
        #[arg(long)]
        pane: Option<String>,
    },
    /// Check whether the backend is reachable.
    Health,
}

fn init_tracing() -> Result<()> {
    // Log to file if TMUXDASH_LOG_FILE is set, otherwise stderr
    let log_writer: Box<dyn io::Write + Send> = match std::env::var("TMUXDASH_LOG_FILE").ok() {
        Some(path) => Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {path}"))?,
        ),
        None => Box::new(io::stderr()),
    };
    tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(log_writer))
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
    Ok(())
}

/// Establish a credential for the one-shot subcommands. Returns whether a
/// password login happened, in which case the caller logs out afterwards.
async fn authenticate(
    client: &ApiClient,
    guard: &mut SessionGuard,
    cli: &Cli,
    config: &Config,
) -> Result<bool> {
    let user = cli.user.as_deref().or(config.user.as_deref());
    if cli.token.is_none() {
        if let (Some(user), Some(password)) = (user, cli.password.as_deref()) {
            let session = guard.login(client, user, password).await?;
            info!(user = %session.user, "Logged in");
            return Ok(true);
        }
    }
    guard.check_session(client).await;
    anyhow::ensure!(
        guard.is_authenticated(),
        "not logged in: pass --user and --password, or --token"
    );
    Ok(false)
}

async fn run_watch(client: ApiClient, cli: &Cli, config: &Config, pane: Option<String>) -> Result<()> {
    let (bg_tx, bg_rx) = mpsc::unbounded_channel::<BackgroundEvent>();
    let mut app = Dashboard::new(client, Poller::new(config.poll_interval()), bg_tx);
    if let Some(pane) = pane {
        app = app.with_route_pane(pane);
    }

    let user = cli.user.as_deref().or(config.user.as_deref());
    match (&cli.token, user, cli.password.as_deref()) {
        (None, Some(user), Some(password)) => app.login(user, password),
        _ => app.probe_session(),
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    let clear = stdout.is_terminal();
    let result = runtime::run_watch(&mut app, bg_rx, stdin, &mut stdout, clear).await;
    info!("tmuxdash shut down");
    result
}

async fn run_once(client: &ApiClient, cli: &Cli, config: &Config) -> Result<()> {
    let mut out = io::stdout();
    let mut guard = SessionGuard::new();
    let logged_in = authenticate(client, &mut guard, cli, config).await?;
    let result = match &cli.command {
        Command::Snapshot => print_snapshot(client, &mut out).await,
        Command::Pane { id } => print_pane(client, &mut out, id).await,
        Command::Send {
            action,
            pairs,
            pane,
        } => send(client, &mut out, action, pairs, pane.as_deref()).await,
        Command::Watch { .. } | Command::Health => Ok(()),
    };
    if logged_in {
        guard.logout(client).await;
    }
    result
}

async fn print_snapshot(client: &ApiClient, out: &mut impl Write) -> Result<()> {
    let snapshot = client.fetch_snapshot().await?;
    let selection = reconcile::reconcile(&snapshot, &Selection::default(), None);
    write!(out, "{}", view::render_tree(&snapshot, &selection))?;
    write!(out, "{}", view::render_network(&snapshot.network))?;
    Ok(())
}

async fn print_pane(client: &ApiClient, out: &mut impl Write, pane_id: &str) -> Result<()> {
    let detail = client.fetch_pane_detail(pane_id).await?;
    write!(out, "{}", view::render_detail(&detail))?;
    Ok(())
}

async fn send(
    client: &ApiClient,
    out: &mut impl Write,
    action: &str,
    pairs: &[String],
    pane: Option<&str>,
) -> Result<()> {
    let payload = command::parse_pairs(pairs.iter().map(String::as_str))?;

    // Targets fall back to the current tmux focus, as in `watch`.
    let snapshot = client.fetch_snapshot().await?;
    let selection = reconcile::reconcile(&snapshot, &Selection::default(), pane);
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    let ctx = TargetContext {
        detail_pane: None,
        active_tab_pane: non_empty(&selection.pane),
        route_pane: pane.map(str::to_string),
        selected_window: non_empty(&selection.window),
        selected_session: non_empty(&selection.session),
    };

    let mut dispatcher = Dispatcher::new();
    let prepared = dispatcher.prepare(action, payload, &ctx, Some(&snapshot.allowed_actions))?;
    let outcome = dispatcher.run(client, &prepared).await.result?;
    let text = outcome.stdout.trim();
    if !text.is_empty() {
        writeln!(out, "{text}")?;
    }
    match &prepared.target {
        Some(target) => writeln!(out, "{action} -> {target}: ok")?,
        None => writeln!(out, "{action}: ok")?,
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    let api_base = cli.api_base.clone().unwrap_or_else(|| config.api_base.clone());
    let mut client = ApiClient::new(&api_base, config.request_timeout())?;
    if let Some(token) = &cli.token {
        client = client.with_token(token.clone());
    }
    info!(api_base = %client.base_url(), "tmuxdash starting");

    match &cli.command {
        Command::Watch { pane } => run_watch(client, &cli, &config, pane.clone()).await,
        Command::Health => {
            anyhow::ensure!(
                client.health_check().await,
                "backend at {} is unreachable",
                client.base_url()
            );
            println!("ok {}", client.base_url());
            Ok(())
        }
        _ => run_once(&client, &cli, &config).await,
    }
}

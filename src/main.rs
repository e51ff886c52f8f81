mod aggregate;
mod config;
mod encoding;
mod entries;
mod error;
mod forecast;
mod ipc;
mod reports;
mod session;
mod store;
mod table;
mod validate;

use anyhow::Context;
use clap::Parser;
use config::Config;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const ENV_LOG: &str = "SCHOOLD_LOG";

/// School dashboard sidecar: JSON requests on stdin, one response per line
/// on stdout.
#[derive(Parser, Debug)]
#[command(name = "schoold", version, about)]
struct Args {
    /// TOML configuration file (or set SCHOOLD_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite record store to open at startup
    #[arg(long)]
    store: Option<PathBuf>,

    /// Position model weights (JSON)
    #[arg(long)]
    model: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries responses; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let path = args
        .config
        .clone()
        .or_else(|| std::env::var(config::ENV_CONFIG).ok().map(PathBuf::from));
    let mut cfg = match path {
        Some(p) => Config::load(&p).with_context(|| format!("load config {}", p.display()))?,
        None => Config::default(),
    };
    cfg.apply_env(|k| std::env::var(k).ok());
    if let Some(p) = &args.store {
        cfg.store.path = Some(p.clone());
    }
    if let Some(p) = &args.model {
        cfg.forecast.model_path = Some(p.clone());
    }
    Ok(cfg)
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let cfg = load_config(&args)?;

    let mut state = ipc::AppState::new(cfg);
    if let Some(path) = state.config.store.path.clone() {
        // A store that will not open leaves the sidecar up; store.open can retry.
        if let Err(e) = state.open_store(&path) {
            tracing::error!(error = %format!("{e:#}"), "record store unavailable at startup");
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "schoold ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}

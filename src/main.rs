mod bookings;
mod cli;
mod config;
mod dorms;
mod error;
mod http;
mod journal;
mod models;
mod session;
mod views;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dormbook", about = "Browse dormitories and manage bookings")]
pub struct Args {
    #[arg(short, long, help = "Run a single command and exit (e.g. \"/dorms max_price=2500\")")]
    pub command: Option<String>,

    #[arg(long, env = "DORMBOOK_BASE_URL", help = "API base URL (overrides config)")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Activity journal directory")]
    pub journal_dir: Option<PathBuf>,

    #[arg(long, help = "Do not write an activity journal")]
    pub no_journal: bool,

    #[arg(long, help = "Verbose output (log requests and store changes)")]
    pub verbose: bool,

    #[arg(long, help = "Debug output (log HTTP details and settings)")]
    pub debug: bool,
}

fn init_tracing(args: &Args) {
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dormbook={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args);

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load()?
    };

    if let Some(base_url) = &args.base_url {
        cfg.api.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(dir) = &args.journal_dir {
        cfg.journal.dir = Some(dir.clone());
    }
    if args.no_journal {
        cfg.journal.enabled = false;
    }

    if let Err(errors) = cfg.validate() {
        for error in &errors {
            eprintln!("Config error {}", error);
        }
        return Err(anyhow::anyhow!(
            "Invalid configuration ({} error(s))",
            errors.len()
        ));
    }
    tracing::debug!(config = ?cfg, "resolved configuration");

    let session_id = uuid::Uuid::new_v4().to_string();
    let journal = if cfg.journal.enabled {
        let dir = cfg
            .journal
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".dormbook").join("journal"));
        let mut journal = journal::Journal::open(&dir, &session_id)?;
        journal.session_start(&cfg.api.base_url)?;
        Some(journal)
    } else {
        None
    };

    let transport = http::UreqTransport::new(&cfg.api.base_url, cfg.api.timeout_ms);
    let ctx = cli::Context::new(cfg, Box::new(transport), session_id, journal);

    // Nothing renders until we know whether a session exists
    ctx.session.verify();

    if let Some(line) = &args.command {
        cli::run_once(&ctx, line)
    } else {
        cli::run_repl(ctx)
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kanban_hub::{serve, HubState};
use kanban_storage::BoardDb;
use std::{
    fs::{File, OpenOptions},
    io,
    net::SocketAddr,
    path::PathBuf,
    sync::Mutex,
};
use tracing::{error, info};
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    EnvFilter,
};

const DEFAULT_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_DB: &str = "kanban.db";
const DEFAULT_LOG_DIR: &str = ".kanban/logs";

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    db_path: PathBuf,
    debug: bool,
    log_dir: String,
}

#[derive(Parser, Debug)]
#[command(name = "kanban-hub", about = "HTTP API for the kanban board")]
struct Args {
    #[arg(long, default_value = "", global = true)]
    db: String,
    #[arg(long, default_value = "", global = true)]
    log_dir: String,
    #[arg(long, default_value_t = false, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Option<HubCommand>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum HubCommand {
    /// Run the API server (default).
    Serve {
        #[arg(long, default_value = "")]
        addr: String,
    },
    /// Create a user and print its bearer token.
    AddUser { username: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args);
    init_logging(&config);

    match args.command {
        Some(HubCommand::AddUser { username }) => add_user(&config, &username),
        Some(HubCommand::Serve { .. }) | None => run_server(&config).await,
    }
}

fn add_user(config: &Config, username: &str) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        anyhow::bail!("Username cannot be empty");
    }
    let db = BoardDb::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    let (user, token) = db.create_user(username)?;
    info!(event = "user_created", id = user.id, username = %user.username);
    println!("{token}");
    Ok(())
}

async fn run_server(config: &Config) -> Result<()> {
    let addr: SocketAddr = config
        .addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.addr))?;
    let db = BoardDb::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(event = "hub_start", addr = %addr, db = %config.db_path.display());

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    if let Err(err) = serve(listener, HubState::new(db), shutdown).await {
        error!(event = "hub_error", error = %err);
        return Err(err.into());
    }
    info!(event = "hub_stop");
    Ok(())
}

fn load_config(args: &Args) -> Config {
    let addr_flag = match &args.command {
        Some(HubCommand::Serve { addr }) => addr.as_str(),
        _ => "",
    };
    Config {
        addr: resolve(addr_flag, "KANBAN_HUB_ADDR", DEFAULT_ADDR),
        db_path: PathBuf::from(resolve(&args.db, "KANBAN_HUB_DB", DEFAULT_DB)),
        debug: args.debug || env_true("KANBAN_HUB_DEBUG"),
        log_dir: resolve(&args.log_dir, "KANBAN_LOG_DIR", DEFAULT_LOG_DIR),
    }
}

/// Logs go to stdout and, when the log dir is usable, `kanban-hub.log`.
fn init_logging(config: &Config) {
    let level = if config.debug {
        "debug".to_string()
    } else {
        std::env::var("KANBAN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match open_log_file(&config.log_dir) {
        Some(file) => BoxMakeWriter::new(io::stdout.and(Mutex::new(file))),
        None => BoxMakeWriter::new(io::stdout),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init();
}

fn open_log_file(log_dir: &str) -> Option<File> {
    if log_dir.trim().is_empty() {
        return None;
    }
    let dir = PathBuf::from(log_dir);
    let opened = std::fs::create_dir_all(&dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("kanban-hub.log"))
    });
    match opened {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("log_file_error: {err}");
            None
        }
    }
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

/// Flag, else environment variable, else default.
fn resolve(flag: &str, env_key: &str, default: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    default.to_string()
}

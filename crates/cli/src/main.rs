use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use server::config::ServerConfig;
use server::{create_router, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const APP_NAME: &str = "vanity-stream";
const LOCAL_CONFIG_FILE: &str = "vanity-stream.toml";
const USER_CONFIG_FILE: &str = "config.toml";

#[derive(Parser)]
#[command(name = "vanity-stream")]
#[command(about = "Streams live vanity address search progress over SSE", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to ./vanity-stream.toml, then the user config dir)
    #[arg(short, long, global = true, env = "VANITY_STREAM_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve(ServeArgs),
    /// Write a config file with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the resolved config and whether the search worker can be found
    Check,
}

/// Settings given on the command line win over the config file.
#[derive(Args, Debug, Default, Clone)]
struct ServeArgs {
    #[arg(long, env = "VANITY_STREAM_HOST")]
    host: Option<String>,

    #[arg(short, long, env = "VANITY_STREAM_PORT")]
    port: Option<u16>,

    /// Search worker executable
    #[arg(long, env = "VANITY_STREAM_WORKER")]
    worker_binary: Option<PathBuf>,

    /// Directory of static files to serve
    #[arg(long, env = "VANITY_STREAM_WEB_DIR")]
    web_dir: Option<PathBuf>,

    /// Maximum concurrent search sessions
    #[arg(long, env = "VANITY_STREAM_MAX_SESSIONS")]
    max_sessions: Option<usize>,

    /// Maximum matches a client may request per search
    #[arg(long, env = "VANITY_STREAM_MAX_COUNT")]
    max_count: Option<u32>,
}

impl ServeArgs {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(worker_binary) = self.worker_binary {
            config.worker_binary = worker_binary;
        }
        if self.web_dir.is_some() {
            config.web_dir = self.web_dir;
        }
        if self.max_sessions.is_some() {
            config.max_sessions = self.max_sessions;
        }
        if let Some(max_count) = self.max_count {
            config.max_count = max_count;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(args)) => serve(cli.config.as_deref(), args).await,
        Some(Commands::Init { force }) => init_config(cli.config, force).await,
        Some(Commands::Check) => check(cli.config.as_deref()).await,
        None => serve(cli.config.as_deref(), cli.serve).await,
    }
}

/// Config files tried in order when `--config` is not given.
fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(APP_NAME).join(USER_CONFIG_FILE));
    }
    candidates
}

async fn load_config(explicit: Option<&Path>) -> Result<(ServerConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Config file {} does not exist", path.display());
        }
        return Ok((ServerConfig::read(path).await, Some(path.to_path_buf())));
    }

    for candidate in config_candidates() {
        if candidate.exists() {
            let config = ServerConfig::read(&candidate).await;
            return Ok((config, Some(candidate)));
        }
    }

    Ok((ServerConfig::default(), None))
}

/// Locate the worker: an existing path as given, otherwise a bare name
/// looked up on `PATH`.
fn resolve_worker_binary(configured: &Path) -> Option<PathBuf> {
    if configured.is_file() {
        return Some(configured.to_path_buf());
    }

    if configured.components().count() == 1 {
        return which::which(configured).ok();
    }

    None
}

async fn serve(config_path: Option<&Path>, args: ServeArgs) -> Result<()> {
    init_tracing();

    let (mut config, loaded_from) = load_config(config_path).await?;
    args.apply(&mut config);

    match &loaded_from {
        Some(path) => tracing::info!(path = %path.display(), "Loaded config"),
        None => tracing::info!("No config file found, using defaults"),
    }

    match resolve_worker_binary(&config.worker_binary) {
        Some(resolved) => {
            tracing::info!(worker = %resolved.display(), "Search worker found");
            config.worker_binary = resolved;
        }
        None => tracing::warn!(
            worker = %config.worker_binary.display(),
            "Search worker not found; searches will fail until it is built"
        ),
    }

    let bind_address = config.bind_address();
    let port = config.port;
    let state = AppState::new(config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    println!();
    println!("Vanity Stream");
    println!("════════════════════════════════════════");
    println!();
    println!("  Search:      http://localhost:{}/generate?pattern=abc", port);
    println!("  Swagger UI:  http://localhost:{}/swagger-ui", port);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}

async fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE));

    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    ServerConfig::default()
        .write(&path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote default config to {}", path.display());

    Ok(())
}

async fn check(config_path: Option<&Path>) -> Result<()> {
    let (config, loaded_from) = load_config(config_path).await?;

    println!();
    match loaded_from {
        Some(path) => println!("Config:   {}", path.display()),
        None => println!("Config:   (defaults)"),
    }
    println!("Listen:   {}", config.bind_address());
    match &config.web_dir {
        Some(dir) => println!("Web dir:  {}", dir.display()),
        None => println!("Web dir:  (none)"),
    }
    match config.max_sessions {
        Some(limit) => println!("Sessions: at most {}", limit),
        None => println!("Sessions: unlimited"),
    }

    match resolve_worker_binary(&config.worker_binary) {
        Some(resolved) => println!("Worker:   {}", resolved.display()),
        None => {
            println!("Worker:   {} (not found)", config.worker_binary.display());
            println!();
            bail!("Search worker is not available");
        }
    }
    println!();

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "vanity_stream=info,server=info,orchestrator=info,tower_http=info".into()
        }))
        .init();
}

//! `shutter` server binary.
//!
//! Reads `shutter.toml` (or the path given with `--config`), bootstraps the
//! image directory and the CSV ledger, loads the blocklist, and serves the
//! intake webhook over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `auth_password_hash`:
//!
//! ```
//! cargo run -p shutter-server --bin shutter -- --hash-password
//! ```

use std::{
  fs::OpenOptions,
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
};

use anyhow::{Context as _, anyhow};
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use shutter_core::{
  blocklist::Blocklist,
  intake::IntakeHandler,
  ledger::{IndexedLedger, SubmissionLedger},
};
use shutter_ledger_csv::CsvLedger;
use shutter_server::{AppState, ServerConfig, fetch::HttpFetcher, reply::OutboundReplier};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Shutter image intake server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "shutter.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  // Helper mode: hash a password and exit.
  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("SHUTTER"))
    .build()
    .context("failed to read config file")?;

  let cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  init_tracing(cfg.log_file.as_deref().map(expand_tilde).as_deref())?;

  // Bootstrap storage before the first request can arrive.
  let image_dir = expand_tilde(&cfg.image_dir);
  tokio::fs::create_dir_all(&image_dir)
    .await
    .with_context(|| format!("failed to create image directory {image_dir:?}"))?;

  let ledger_path = expand_tilde(&cfg.ledger_path);
  let ledger = CsvLedger::open(&ledger_path)
    .await
    .with_context(|| format!("failed to open ledger at {ledger_path:?}"))?;

  let blocklist_path = expand_tilde(&cfg.blocklist_path);
  let blocklist = Blocklist::load(&blocklist_path)
    .with_context(|| format!("failed to load blocklist {blocklist_path:?}"))?;
  tracing::info!(blocked = blocklist.len(), "blocklist loaded");

  if cfg.ledger_index {
    let indexed = IndexedLedger::build(ledger)
      .await
      .context("failed to index ledger")?;
    tracing::info!(subjects = indexed.subjects(), "ledger index built");
    serve(&cfg, indexed, blocklist, image_dir).await
  } else {
    serve(&cfg, ledger, blocklist, image_dir).await
  }
}

async fn serve<L>(
  cfg: &ServerConfig,
  ledger: L,
  blocklist: Blocklist,
  image_dir: PathBuf,
) -> anyhow::Result<()>
where
  L: SubmissionLedger + 'static,
{
  let fetcher = HttpFetcher::new(cfg.payload_base_url.clone())
    .context("failed to build payload fetcher")?;
  let replier = OutboundReplier::from_url(cfg.reply_url.clone())
    .context("failed to build reply client")?;
  let auth = cfg.auth().map_err(|e| anyhow!(e))?;

  let handler = IntakeHandler::new(
    Arc::new(ledger),
    blocklist,
    cfg.policy(),
    fetcher,
    replier,
    image_dir,
  );
  let state = AppState {
    handler: Arc::new(handler),
    auth:    auth.map(Arc::new),
  };

  let app = shutter_server::router(state);
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!(cooldown = %cfg.policy().describe(), "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Log to stderr, or append to `log_file` when given. Per-request chatter
/// from the HTTP stack is kept at `warn` unless overridden.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy()
    .add_directive("hyper=warn".parse()?)
    .add_directive("reqwest=warn".parse()?);

  match log_file {
    Some(path) => {
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {path:?}"))?;
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    }
    None => tracing_subscriber::fmt().with_env_filter(filter).init(),
  }
  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

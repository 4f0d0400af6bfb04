//! duet server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `DUET_*`
//! environment variables, opens the primary store and the mirror, and serves
//! the JSON API over HTTP.
//!
//! # First run
//!
//! ```text
//! duet bootstrap --organization Acme --email owner@acme.test
//! duet serve
//! ```

use std::{
  io::{self, BufRead, Write},
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use duet_api::{AppState, ServerConfig, auth::hash_password};
use duet_core::{
  store::PrimaryStore,
  team::{AvailableFeature, MembershipLevel},
};
use duet_mirror::SqliteMirror;
use duet_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Duet person/event API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,

  /// Create an organization and its owner. The password is read from stdin.
  Bootstrap {
    #[arg(long)]
    organization:  String,
    #[arg(long)]
    email:         String,
    /// Entitle the organization to more than one project.
    #[arg(long)]
    multi_project: bool,
  },

  /// Rebuild mirror rows from the primary store.
  Backfill {
    /// Only this team; every team if omitted.
    #[arg(long)]
    team:    Option<i64>,
    /// Report what would change without writing.
    #[arg(long)]
    dry_run: bool,
  },

  /// Print the argon2 hash for a password entered on stdin.
  HashPassword,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  match cli.command.unwrap_or(Command::Serve) {
    Command::HashPassword => {
      let password = read_password()?;
      let hash = hash_password(&password)
        .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
      println!("{hash}");
      Ok(())
    }
    Command::Serve => serve(load_config(&cli.config)?).await,
    Command::Bootstrap { organization, email, multi_project } => {
      bootstrap(load_config(&cli.config)?, organization, email, multi_project).await
    }
    Command::Backfill { team, dry_run } => {
      backfill(load_config(&cli.config)?, team, dry_run).await
    }
  }
}

fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let defaults = ServerConfig::default();
  let settings = config::Config::builder()
    .set_default("host", defaults.host)?
    .set_default("port", i64::from(defaults.port))?
    .set_default("store_path", defaults.store_path.to_string_lossy().into_owned())?
    .set_default("mirror_path", defaults.mirror_path.to_string_lossy().into_owned())?
    .set_default("person_backend", defaults.person_backend.to_string())?
    .set_default("per_project_access", defaults.per_project_access)?
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("DUET"))
    .build()
    .context("failed to read config file")?;

  let mut cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  cfg.store_path = expand_tilde(&cfg.store_path);
  cfg.mirror_path = expand_tilde(&cfg.mirror_path);
  Ok(cfg)
}

async fn open_stores(cfg: &ServerConfig) -> anyhow::Result<(SqliteStore, SqliteMirror)> {
  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let mirror = SqliteMirror::open(&cfg.mirror_path)
    .await
    .with_context(|| format!("failed to open mirror at {:?}", cfg.mirror_path))?;
  Ok((store, mirror))
}

async fn serve(cfg: ServerConfig) -> anyhow::Result<()> {
  let (store, mirror) = open_stores(&cfg).await?;
  let address = format!("{}:{}", cfg.host, cfg.port);
  tracing::info!(
    backend = %cfg.person_backend,
    per_project_access = cfg.per_project_access,
    "stores opened"
  );

  let app = duet_api::router(AppState::new(store, mirror, cfg));

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

async fn bootstrap(
  cfg: ServerConfig,
  organization: String,
  email: String,
  multi_project: bool,
) -> anyhow::Result<()> {
  let (store, _) = open_stores(&cfg).await?;

  let password = read_password()?;
  anyhow::ensure!(!password.is_empty(), "password may not be empty");
  let hash = hash_password(&password)
    .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;

  let features = if multi_project {
    vec![AvailableFeature::OrganizationsProjects]
  } else {
    vec![]
  };
  let org = store
    .create_organization(organization, features)
    .await
    .context("failed to create organization")?;
  let user = store
    .create_user(email, hash, Some(org.id))
    .await
    .context("failed to create user")?;
  store
    .add_membership(org.id, user.id, MembershipLevel::Owner)
    .await
    .context("failed to add membership")?;

  tracing::info!(organization = %org.id, user_id = user.id, "bootstrapped");
  println!("organization {} owned by {}", org.id, user.email);
  Ok(())
}

async fn backfill(cfg: ServerConfig, team: Option<i64>, dry_run: bool) -> anyhow::Result<()> {
  let (store, mirror) = open_stores(&cfg).await?;
  let primary_ids: Vec<i64> = match team {
    Some(id) => vec![id],
    None => store
      .list_all_teams()
      .await
      .context("failed to list teams")?
      .into_iter()
      .map(|t| t.id)
      .collect(),
  };

  let state = AppState::new(store, mirror, cfg);
  // Teams deleted from the primary can still own rows in the mirror.
  let team_ids = match team {
    Some(_) => primary_ids,
    None => state.replicator.teams_to_reconcile(primary_ids).await?,
  };
  for team_id in team_ids {
    let report = if dry_run {
      state.replicator.plan(team_id).await?.report()
    } else {
      state.replicator.backfill(team_id).await?
    };
    println!(
      "team {team_id}: persons +{} -{}, events +{} -{}{}",
      report.persons_upserted,
      report.persons_deleted,
      report.events_upserted,
      report.events_deleted,
      if dry_run { " (dry run)" } else { "" },
    );
  }
  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
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

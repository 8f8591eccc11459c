//! Command-line front end for slimdb migrations.
//!
//! Migrations are Rust types, so the runner has to be compiled together with
//! them. An application embeds the CLI in a small binary of its own:
//!
//! ```ignore
//! mod migrations; // holds the `register_migration!` units
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     slimdb_cli::init_tracing();
//!     let registry = slimdb::migrate::MigrationRegistry::collect()?;
//!     slimdb_cli::run(std::env::args().collect(), registry).await
//! }
//! ```

mod cli;
mod commands;
mod config;

pub use cli::{Cli, Command, parse_args};
pub use commands::execute;
pub use config::{ConfigFile, ProjectConfig};

use anyhow::Context;
use slimdb::MySqlConnection;
use slimdb::migrate::{DirectorySource, MigrationRegistry};
use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a subscriber installed by the embedding application wins
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub async fn run(args: Vec<String>, registry: MigrationRegistry) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = parse_args(&args)?;
    let project = ProjectConfig::load(&cli.config)?;
    let migrations = project.migrations(cli.dir.clone());

    match &cli.command {
        Command::Help => {
            cli::print_help();
            return Ok(());
        }
        Command::New { name } => {
            return commands::new_migration(&migrations.directory, name, &mut std::io::stdout());
        }
        _ => {}
    }

    let connect = project.connect_config(config::env_var)?;
    let mut conn = MySqlConnection::connect(&connect)
        .await
        .with_context(|| format!("failed to connect to {}:{}", connect.host, connect.port))?;

    let mut stdout = std::io::stdout();
    // Files on disk decide what exists when the directory is present, the
    // compiled-in registry otherwise (e.g. a deployed binary without sources).
    let result = if migrations.directory.is_dir() {
        let source = DirectorySource::new(&migrations.directory, registry);
        execute(&cli.command, &mut conn, source, migrations, &mut stdout).await
    } else {
        tracing::debug!(
            dir = %migrations.directory.display(),
            "migrations directory not found, using registered migrations only"
        );
        execute(&cli.command, &mut conn, registry, migrations, &mut stdout).await
    };

    if let Err(err) = conn.disconnect().await {
        tracing::warn!(error = %err, "failed to close the connection cleanly");
    }
    result
}

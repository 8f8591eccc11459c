use anyhow::Context;
use serde::Deserialize;
use slimdb::ConnectConfig;
use slimdb::ConnectSettings;
use slimdb::migrate::MigrationConfig;
use std::path::{Path, PathBuf};

/// `slimdb.toml`:
///
/// ```toml
/// [database]
/// host = "127.0.0.1"
/// dbname = "shop"
/// username = "app"
/// password = "${SHOP_DB_PASSWORD}"
///
/// [migrations]
/// table = "migrations"
/// directory = "migrations"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub database: ConnectSettings,
    pub migrations: MigrationConfig,
}

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub config_dir: PathBuf,
    pub file: ConfigFile,
}

impl ProjectConfig {
    /// Load `config_path`. A missing file yields defaults, so everything can come
    /// from the environment.
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let config_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(Self {
                config_dir,
                file: ConfigFile::default(),
            });
        }

        let raw = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file {}", config_path.display()))?;
        let file = Self::parse(&raw)
            .with_context(|| format!("failed to parse config file {}", config_path.display()))?;

        Ok(Self { config_dir, file })
    }

    fn parse(raw: &str) -> anyhow::Result<ConfigFile> {
        Ok(toml::from_str(raw)?)
    }

    pub fn resolve_path(&self, p: impl AsRef<Path>) -> PathBuf {
        let p = p.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config_dir.join(p)
        }
    }

    /// Ledger/directory settings, with `dir` (from `--dir`) taking precedence.
    /// Relative directories are resolved against the config file's directory,
    /// `--dir` against the working directory.
    pub fn migrations(&self, dir: Option<PathBuf>) -> MigrationConfig {
        let directory = match dir {
            Some(dir) => dir,
            None => self.resolve_path(&self.file.migrations.directory),
        };
        self.file.migrations.clone().directory(directory)
    }

    /// Connection settings: environment first, then the `[database]` table.
    pub fn connect_config<L>(&self, lookup: L) -> anyhow::Result<ConnectConfig>
    where
        L: Fn(&str) -> Option<String> + Copy,
    {
        let env = ConnectSettings::from_lookup(lookup)?;
        let file = self.file.database.clone().expand_env(lookup)?;
        env.or(file)
            .build()
            .context("incomplete database settings (config file or SLIMDB_* variables)")
    }
}

pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

//! Connection settings.
//!
//! Settings come from a TOML table, from `SLIMDB_*` environment variables, or
//! both (environment wins). `host`, `dbname`, `username` and `password` are
//! required; `port` defaults to 3306 and `charset` to `utf8mb4`.
//!
//! ```toml
//! host = "127.0.0.1"
//! dbname = "shop"
//! username = "app"
//! password = "${SHOP_DB_PASSWORD}"
//! ```

use crate::error::{OrmError, OrmResult};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// Partially specified connection settings, as read from one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(alias = "database")]
    pub dbname: Option<String>,
    #[serde(alias = "user")]
    pub username: Option<String>,
    pub password: Option<String>,
    pub charset: Option<String>,
}

impl ConnectSettings {
    /// Read `SLIMDB_HOST`, `SLIMDB_PORT`, `SLIMDB_DATABASE`, `SLIMDB_USERNAME`,
    /// `SLIMDB_PASSWORD` and `SLIMDB_CHARSET`.
    pub fn from_env() -> OrmResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> OrmResult<Self> {
        let port = match lookup("SLIMDB_PORT") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| OrmError::config(format!("SLIMDB_PORT is not a port: {raw}")))?,
            ),
            None => None,
        };
        Ok(Self {
            host: lookup("SLIMDB_HOST"),
            port,
            dbname: lookup("SLIMDB_DATABASE"),
            username: lookup("SLIMDB_USERNAME"),
            password: lookup("SLIMDB_PASSWORD"),
            charset: lookup("SLIMDB_CHARSET"),
        })
    }

    /// Parse a TOML table, expanding `${VAR}` references in string values.
    pub fn from_toml_str(input: &str) -> OrmResult<Self> {
        let settings: Self = toml::from_str(input)
            .map_err(|e| OrmError::config(format!("invalid connection settings: {e}")))?;
        settings.expand_env(|key| std::env::var(key).ok())
    }

    /// Expand `${VAR}` references in every string field.
    pub fn expand_env(self, lookup: impl Fn(&str) -> Option<String>) -> OrmResult<Self> {
        let expand = |field: Option<String>| -> OrmResult<Option<String>> {
            field.map(|s| expand_env_vars(&s, &lookup)).transpose()
        };
        Ok(Self {
            host: expand(self.host)?,
            port: self.port,
            dbname: expand(self.dbname)?,
            username: expand(self.username)?,
            password: expand(self.password)?,
            charset: expand(self.charset)?,
        })
    }

    /// Fill unset fields of `self` from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            host: self.host.or(fallback.host),
            port: self.port.or(fallback.port),
            dbname: self.dbname.or(fallback.dbname),
            username: self.username.or(fallback.username),
            password: self.password.or(fallback.password),
            charset: self.charset.or(fallback.charset),
        }
    }

    /// Validate and apply defaults.
    pub fn build(self) -> OrmResult<ConnectConfig> {
        fn required(value: Option<String>, key: &str) -> OrmResult<String> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(OrmError::config(format!("missing `{key}` setting"))),
            }
        }

        Ok(ConnectConfig {
            host: required(self.host, "host")?,
            dbname: required(self.dbname, "dbname")?,
            username: required(self.username, "username")?,
            // may legitimately be empty, but must be present
            password: self
                .password
                .ok_or_else(|| OrmError::config("missing `password` setting"))?,
            port: self.port.unwrap_or(DEFAULT_PORT),
            charset: self
                .charset
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CHARSET.to_string()),
        })
    }
}

/// Complete, validated connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub username: String,
    pub password: String,
    pub charset: String,
}

impl fmt::Debug for ConnectConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("username", &self.username)
            .field("password", &"***")
            .field("charset", &self.charset)
            .finish()
    }
}

impl ConnectConfig {
    pub fn new(
        host: impl Into<String>,
        dbname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            dbname: dbname.into(),
            username: username.into(),
            password: password.into(),
            charset: DEFAULT_CHARSET.to_string(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn from_toml_str(input: &str) -> OrmResult<Self> {
        ConnectSettings::from_toml_str(input)?.build()
    }

    pub fn from_file(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrmError::config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_env() -> OrmResult<Self> {
        ConnectSettings::from_env()?.build()
    }

    /// Driver options for `mysql_async`.
    #[cfg(feature = "mysql")]
    pub fn to_opts(&self) -> mysql_async::Opts {
        mysql_async::OptsBuilder::default()
            .ip_or_hostname(self.host.clone())
            .tcp_port(self.port)
            .db_name(Some(self.dbname.clone()))
            .user(Some(self.username.clone()))
            .pass(Some(self.password.clone()))
            .init(vec![format!("SET NAMES {}", self.charset)])
            .into()
    }
}

/// Replace `${VAR}` with the variable's value. An unset variable is an error.
fn expand_env_vars(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> OrmResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                return Err(OrmError::config(format!(
                    "unterminated env var reference: ${{{key}}}"
                )));
            }
            if key.is_empty() {
                return Err(OrmError::config("invalid env var reference: ${}"));
            }

            let value = lookup(&key).ok_or_else(|| {
                OrmError::config(format!("missing env var for config expansion: {key}"))
            })?;
            out.push_str(&value);
            continue;
        }

        out.push(c);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn toml_with_defaults() {
        let config = ConnectConfig::from_toml_str(
            r#"
            host = "db.local"
            database = "shop"
            user = "app"
            password = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.dbname, "shop");
        assert_eq!(config.username, "app");
        assert_eq!(config.port, 3306);
        assert_eq!(config.charset, "utf8mb4");
    }

    #[test]
    fn missing_required_key_is_config_error() {
        let err = ConnectConfig::from_toml_str("host = \"db\"\ndbname = \"shop\"\npassword = \"x\"")
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(ConnectConfig::from_toml_str("hots = \"db\"").unwrap_err().is_config());
    }

    #[test]
    fn env_settings_override_file() {
        let env = ConnectSettings::from_lookup(vars(&[
            ("SLIMDB_HOST", "10.0.0.5"),
            ("SLIMDB_PORT", "3307"),
        ]))
        .unwrap();
        let file = ConnectSettings {
            host: Some("localhost".into()),
            dbname: Some("shop".into()),
            username: Some("app".into()),
            password: Some("secret".into()),
            ..Default::default()
        };
        let config = env.or(file).build().unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 3307);
        assert_eq!(config.password, "secret");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn bad_port_is_config_error() {
        let err = ConnectSettings::from_lookup(vars(&[("SLIMDB_PORT", "mysql")])).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn expands_env_references() {
        let settings = ConnectSettings {
            password: Some("${DB_PASS}".into()),
            host: Some("db-${REGION}.internal".into()),
            ..Default::default()
        }
        .expand_env(vars(&[("DB_PASS", "hunter2"), ("REGION", "eu")]))
        .unwrap();
        assert_eq!(settings.password.as_deref(), Some("hunter2"));
        assert_eq!(settings.host.as_deref(), Some("db-eu.internal"));

        let err = ConnectSettings {
            host: Some("${NOPE}".into()),
            ..Default::default()
        }
        .expand_env(vars(&[]))
        .unwrap_err();
        assert!(err.is_config());
    }
}

//! New-migration file generator.

use super::registry::{is_valid_identifier, unit_name};
use crate::error::{OrmError, OrmResult};
use chrono::NaiveDateTime;
use heck::ToSnakeCase;
use std::path::{Path, PathBuf};

fn normalize_name(name: &str) -> OrmResult<String> {
    let mut s: String = name
        .to_snake_case()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    while s.contains("__") {
        s = s.replace("__", "_");
    }
    let s = s.trim_matches('_').to_string();
    if s.is_empty() {
        return Err(OrmError::invalid_argument(
            "migration name becomes empty after normalization",
        ));
    }
    Ok(s)
}

/// Identifier for a migration named `name` created at `at`.
///
/// `("CreateUsersTable", 2024-06-01 12:00:00)` gives
/// `2024_06_01_120000_create_users_table`.
pub fn identifier_for(name: &str, at: NaiveDateTime) -> OrmResult<String> {
    let identifier = format!("{}_{}", at.format("%Y_%m_%d_%H%M%S"), normalize_name(name)?);
    if !is_valid_identifier(&identifier) {
        return Err(OrmError::invalid_argument(format!(
            "cannot build a migration identifier from `{name}`"
        )));
    }
    Ok(identifier)
}

/// Write a new migration file into `dir` and return its path.
///
/// The file holds a unit struct named after the identifier, a [`Migration`](super::Migration)
/// impl to fill in, and its registration.
pub fn scaffold(dir: &Path, name: &str, at: NaiveDateTime) -> OrmResult<PathBuf> {
    let identifier = identifier_for(name, at)?;
    let path = dir.join(format!("{identifier}.rs"));
    if path.exists() {
        return Err(OrmError::invalid_argument(format!(
            "migration file already exists: {}",
            path.display()
        )));
    }

    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, render_template(&identifier))?;
    tracing::info!(path = %path.display(), "created migration");
    Ok(path)
}

/// `create_<table>_table` names get that table filled in.
fn guess_table(identifier: &str) -> &str {
    let name = identifier.splitn(5, '_').nth(4).unwrap_or_default();
    name.strip_prefix("create_")
        .and_then(|rest| rest.strip_suffix("_table"))
        .filter(|table| !table.is_empty())
        .unwrap_or("table_name")
}

fn render_template(identifier: &str) -> String {
    let unit = unit_name(identifier);
    let table = guess_table(identifier);
    format!(
        r#"use slimdb::OrmResult;
use slimdb::migrate::{{Migration, Schema}};

#[derive(Default)]
pub struct {unit};

#[slimdb::async_trait]
impl Migration for {unit} {{
    async fn up(&self, schema: &mut Schema<'_>) -> OrmResult<()> {{
        schema
            .create("{table}", |t| {{
                t.id();
                t.timestamps();
            }})
            .await?;
        Ok(())
    }}

    async fn down(&self, schema: &mut Schema<'_>) -> OrmResult<()> {{
        schema.drop("{table}").await?;
        Ok(())
    }}
}}

slimdb::register_migration!("{identifier}", {unit});
"#
    )
}

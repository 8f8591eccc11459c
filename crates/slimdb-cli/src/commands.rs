use crate::cli::Command;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use slimdb::Connection;
use slimdb::migrate::{MigrationConfig, MigrationRunner, MigrationSource, MigrationState, scaffold};
use std::io::Write;
use std::path::Path;

/// Run a database command against `conn`, writing human output to `out`.
pub async fn execute<S: MigrationSource>(
    command: &Command,
    conn: &mut dyn Connection,
    source: S,
    config: MigrationConfig,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let mut runner = MigrationRunner::with_config(conn, source, config);

    match command {
        Command::Migrate => {
            let report = runner.migrate().await?;
            if report.is_empty() {
                writeln!(out, "Nothing to migrate.")?;
            } else {
                for identifier in &report.applied {
                    writeln!(out, "Migrated:    {identifier}")?;
                }
                writeln!(out, "Ran {} migration(s).", report.applied.len())?;
            }
        }
        Command::Rollback { steps } => {
            let report = runner.rollback(*steps).await?;
            if report.is_empty() {
                writeln!(out, "Nothing to roll back.")?;
            } else {
                for identifier in &report.rolled_back {
                    writeln!(out, "Rolled back: {identifier}")?;
                }
                writeln!(out, "Rolled back {} migration(s).", report.rolled_back.len())?;
            }
        }
        Command::Status => {
            let states = runner.status().await?;
            write_status(&states, out)?;
        }
        Command::Reset => {
            runner.reset_ledger().await?;
            writeln!(
                out,
                "Cleared the `{}` ledger. Existing tables were not touched.",
                runner.config().table
            )?;
        }
        Command::Help | Command::New { .. } => {
            anyhow::bail!("`{command:?}` does not use a database connection")
        }
    }
    Ok(())
}

fn write_status(states: &[MigrationState], out: &mut dyn Write) -> anyhow::Result<()> {
    if states.is_empty() {
        writeln!(out, "No migrations found.")?;
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Migration").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Run at").add_attribute(Attribute::Bold),
        ]);

    for state in states {
        let (status, color) = if state.applied {
            ("Ran", Color::Green)
        } else {
            ("Pending", Color::Yellow)
        };
        let run_at = state
            .applied_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(&state.identifier),
            Cell::new(status).fg(color),
            Cell::new(run_at),
        ]);
    }

    let ran = states.iter().filter(|s| s.applied).count();
    writeln!(out, "{table}")?;
    writeln!(
        out,
        "Total: {}, Ran: {ran}, Pending: {}",
        states.len(),
        states.len() - ran
    )?;
    Ok(())
}

/// `slimdb new <name>`: write a migration file stamped with the local time.
pub fn new_migration(dir: &Path, name: &str, out: &mut dyn Write) -> anyhow::Result<()> {
    let path = scaffold(dir, name, chrono::Local::now().naive_local())?;
    let module = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| stem.splitn(5, '_').nth(4))
        .unwrap_or("migration");

    writeln!(out, "Created migration: {}", path.display())?;
    writeln!(
        out,
        "Include it in your migrations module:\n  #[path = \"{}\"]\n  mod {module};",
        path.file_name().and_then(|s| s.to_str()).unwrap_or_default()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slimdb::Row;
    use slimdb::migrate::{Migration, MigrationRegistry, Schema};
    use slimdb::testing::{MockConnection, TxEvent};
    use slimdb::{OrmResult, Value};

    #[derive(Default)]
    struct CreateUsersTable;

    #[slimdb::async_trait]
    impl Migration for CreateUsersTable {
        async fn up(&self, schema: &mut Schema<'_>) -> OrmResult<()> {
            schema
                .create("users", |t| {
                    t.id();
                })
                .await?;
            Ok(())
        }

        async fn down(&self, schema: &mut Schema<'_>) -> OrmResult<()> {
            schema.drop("users").await?;
            Ok(())
        }
    }

    const USERS: &str = "2024_06_01_120000_create_users_table";

    fn registry() -> MigrationRegistry {
        let mut registry = MigrationRegistry::new();
        registry.register_type::<CreateUsersTable>(USERS).unwrap();
        registry
    }

    /// A database where the ledger table exists and holds `applied`.
    fn database(applied: &[&str]) -> MockConnection {
        let mut conn = MockConnection::new().with_database("shop");
        conn.on_query(
            "information_schema.tables",
            vec![Row::from_pairs([("name", "migrations")])],
        );
        conn.on_query(
            "SELECT migration, run_at FROM migrations",
            applied
                .iter()
                .map(|m| Row::from_pairs([("migration", Value::from(*m)), ("run_at", Value::Null)]))
                .collect(),
        );
        conn
    }

    async fn run(command: Command, conn: &mut MockConnection) -> String {
        let mut out = Vec::new();
        execute(&command, conn, registry(), MigrationConfig::default(), &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn migrate_prints_each_unit() {
        let mut conn = database(&[]);
        let out = run(Command::Migrate, &mut conn).await;
        assert!(out.contains(&format!("Migrated:    {USERS}")));
        assert!(out.contains("Ran 1 migration(s)."));
        assert_eq!(conn.tx_events(), [TxEvent::Begin, TxEvent::Commit]);
    }

    #[tokio::test]
    async fn migrate_with_nothing_pending() {
        let mut conn = database(&[USERS]);
        let out = run(Command::Migrate, &mut conn).await;
        assert_eq!(out, "Nothing to migrate.\n");
        assert!(conn.tx_events().is_empty());
    }

    #[tokio::test]
    async fn rollback_prints_each_unit() {
        let mut conn = database(&[USERS]);
        let out = run(Command::Rollback { steps: 1 }, &mut conn).await;
        assert!(out.contains(&format!("Rolled back: {USERS}")));
        assert_eq!(conn.count_matching("DELETE FROM migrations"), 1);
    }

    #[tokio::test]
    async fn status_renders_table() {
        let mut conn = database(&[]);
        let out = run(Command::Status, &mut conn).await;
        assert!(out.contains(USERS));
        assert!(out.contains("Pending"));
        assert!(out.contains("Total: 1, Ran: 0, Pending: 1"));
    }

    #[tokio::test]
    async fn reset_truncates_ledger() {
        let mut conn = database(&[USERS]);
        let out = run(Command::Reset, &mut conn).await;
        assert!(out.contains("Cleared the `migrations` ledger"));
        assert_eq!(conn.last_statement().unwrap().0, "TRUNCATE TABLE `migrations`");
    }

    #[tokio::test]
    async fn failures_propagate() {
        let mut conn = database(&[]);
        conn.fail_on("CREATE TABLE `users`", "table is locked");
        let mut out = Vec::new();
        let err = execute(
            &Command::Migrate,
            &mut conn,
            registry(),
            MigrationConfig::default(),
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(format!("{err:#}").contains(USERS));
        assert!(out.is_empty());
    }

    #[test]
    fn new_migration_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        new_migration(dir.path(), "create_posts_table", &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Created migration:"));
        assert!(out.contains("mod create_posts_table;"));

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }
}

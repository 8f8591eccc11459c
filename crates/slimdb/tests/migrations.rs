use slimdb::migrate::{
    Migration, MigrationConfig, MigrationRegistry, MigrationRunner, Schema,
};
use slimdb::testing::{MockConnection, MockReply, TxEvent};
use slimdb::{Connection, OrmError, OrmResult, Row, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

const CREATE_USERS: &str = "2024_06_01_120000_create_users_table";
const CREATE_POSTS: &str = "2024_06_02_090000_create_posts_table";
const CREATE_TAGS: &str = "2024_06_03_170500_create_tags_table";

/// Just enough of a MySQL server for the runner: a table set and a ledger.
#[derive(Default)]
struct FakeDb {
    tables: BTreeSet<String>,
    ledger: Vec<String>,
}

fn quoted_name(rest: &str) -> String {
    rest.split('`').next().unwrap_or_default().to_string()
}

fn text(params: &[Value]) -> String {
    params
        .first()
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn handle(db: &Mutex<FakeDb>, ledger: &str, sql: &str, params: &[Value]) -> Option<MockReply> {
    let mut db = db.lock().unwrap();

    if sql.contains("information_schema.tables") {
        let rows = db
            .tables
            .iter()
            .map(|t| Row::from_pairs([("name", t.as_str())]))
            .collect();
        return Some(MockReply::Rows(rows));
    }
    if let Some(rest) = sql.strip_prefix("CREATE TABLE `") {
        db.tables.insert(quoted_name(rest));
        return Some(MockReply::Affected(0));
    }
    if let Some(rest) = sql
        .strip_prefix("DROP TABLE IF EXISTS `")
        .or_else(|| sql.strip_prefix("DROP TABLE `"))
    {
        db.tables.remove(&quoted_name(rest));
        return Some(MockReply::Affected(0));
    }
    if sql.starts_with(&format!("SELECT migration, run_at FROM {ledger}")) {
        let rows = db
            .ledger
            .iter()
            .map(|m| Row::from_pairs([("migration", Value::from(m.as_str())), ("run_at", Value::Null)]))
            .collect();
        return Some(MockReply::Rows(rows));
    }
    if sql.starts_with(&format!("INSERT INTO {ledger}")) {
        db.ledger.push(text(params));
        return Some(MockReply::Affected(1));
    }
    if sql.starts_with(&format!("DELETE FROM {ledger}")) {
        let identifier = text(params);
        let before = db.ledger.len();
        db.ledger.retain(|m| *m != identifier);
        return Some(MockReply::Affected((before - db.ledger.len()) as u64));
    }
    if sql == format!("TRUNCATE TABLE `{ledger}`") {
        db.ledger.clear();
        return Some(MockReply::Affected(0));
    }
    None
}

fn connect(db: &Arc<Mutex<FakeDb>>, ledger: &'static str) -> MockConnection {
    let db = Arc::clone(db);
    MockConnection::new()
        .with_database("shop")
        .with_handler(move |sql, params| handle(&db, ledger, sql, params))
}

type Journal = Arc<Mutex<Vec<String>>>;

/// Creates its table on `up` and drops it on `down`, journaling both.
struct TableUnit {
    table: &'static str,
    fail_up: bool,
    journal: Journal,
}

#[slimdb::async_trait]
impl Migration for TableUnit {
    async fn up(&self, schema: &mut Schema<'_>) -> OrmResult<()> {
        self.journal.lock().unwrap().push(format!("up:{}", self.table));
        schema
            .create(self.table, |t| {
                t.id();
                t.string("name", 100);
            })
            .await?;
        if self.fail_up {
            return Err(OrmError::schema(format!("{} exploded", self.table)));
        }
        Ok(())
    }

    async fn down(&self, schema: &mut Schema<'_>) -> OrmResult<()> {
        self.journal.lock().unwrap().push(format!("down:{}", self.table));
        schema.drop(self.table).await?;
        Ok(())
    }
}

fn registry(journal: &Journal, units: &[(&'static str, &'static str)], failing: Option<&str>) -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    for &(identifier, table) in units {
        let journal = Arc::clone(journal);
        let fail_up = failing == Some(identifier);
        registry
            .register(identifier, move || -> Box<dyn Migration> {
                Box::new(TableUnit {
                    table,
                    fail_up,
                    journal: Arc::clone(&journal),
                })
            })
            .unwrap();
    }
    registry
}

fn three_units() -> [(&'static str, &'static str); 3] {
    // registered out of order on purpose
    [
        (CREATE_TAGS, "tags"),
        (CREATE_USERS, "users"),
        (CREATE_POSTS, "posts"),
    ]
}

#[tokio::test]
async fn migrate_applies_pending_in_identifier_order() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");

    let report = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None))
        .migrate()
        .await
        .unwrap();

    assert_eq!(report.applied, [CREATE_USERS, CREATE_POSTS, CREATE_TAGS]);
    assert_eq!(
        *journal.lock().unwrap(),
        ["up:users", "up:posts", "up:tags"]
    );
    assert_eq!(db.lock().unwrap().ledger, [CREATE_USERS, CREATE_POSTS, CREATE_TAGS]);
    assert_eq!(conn.tx_events(), [TxEvent::Begin, TxEvent::Commit]);

    let tables = db.lock().unwrap().tables.clone();
    assert!(["migrations", "users", "posts", "tags"]
        .iter()
        .all(|t| tables.contains(*t)));
}

#[tokio::test]
async fn ledger_table_is_created_once() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");

    {
        let mut runner = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None));
        runner.migrate().await.unwrap();
        runner.status().await.unwrap();
    }

    assert_eq!(conn.count_matching("CREATE TABLE `migrations`"), 1);
    let ddl = conn
        .sql_log()
        .into_iter()
        .find(|sql| sql.starts_with("CREATE TABLE `migrations`"))
        .unwrap()
        .to_string();
    assert!(ddl.contains("`migration` varchar(255) NOT NULL"));
    assert!(ddl.contains("`run_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP"));
}

#[tokio::test]
async fn second_migrate_is_a_no_op() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");

    {
        let mut runner = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None));
        runner.migrate().await.unwrap();
        let again = runner.migrate().await.unwrap();
        assert!(again.is_empty());
    }

    assert_eq!(conn.count_matching("INSERT INTO migrations"), 3);
    assert_eq!(conn.tx_events(), [TxEvent::Begin, TxEvent::Commit]);
    assert_eq!(journal.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn rollback_reverts_newest_first() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");

    {
        let mut runner = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None));
        runner.migrate().await.unwrap();
        let report = runner.rollback(3).await.unwrap();
        assert_eq!(report.rolled_back, [CREATE_TAGS, CREATE_POSTS, CREATE_USERS]);
    }

    assert_eq!(
        journal.lock().unwrap()[3..],
        ["down:tags", "down:posts", "down:users"]
    );
    let db = db.lock().unwrap();
    assert!(db.ledger.is_empty());
    assert_eq!(db.tables.iter().collect::<Vec<_>>(), ["migrations"]);
    assert_eq!(
        conn.tx_events(),
        [TxEvent::Begin, TxEvent::Commit, TxEvent::Begin, TxEvent::Commit]
    );
}

#[tokio::test]
async fn rollback_stops_at_what_was_applied() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");
    let mut runner = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None));

    assert!(runner.rollback(1).await.unwrap().is_empty());

    runner.migrate().await.unwrap();
    let first = runner.rollback(1).await.unwrap();
    assert_eq!(first.rolled_back, [CREATE_TAGS]);
    let rest = runner.rollback(10).await.unwrap();
    assert_eq!(rest.rolled_back, [CREATE_POSTS, CREATE_USERS]);
    assert!(runner.rollback(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn rollback_follows_ledger_order_not_identifier_order() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");

    {
        let early = [(CREATE_USERS, "users"), (CREATE_TAGS, "tags")];
        let mut runner = MigrationRunner::new(&mut conn, registry(&journal, &early, None));
        runner.migrate().await.unwrap();
    }
    {
        // a unit dated between the two already applied arrives later
        let mut runner = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None));
        let report = runner.migrate().await.unwrap();
        assert_eq!(report.applied, [CREATE_POSTS]);
    }
    assert_eq!(db.lock().unwrap().ledger, [CREATE_USERS, CREATE_TAGS, CREATE_POSTS]);

    let mut runner = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None));
    let first = runner.rollback(1).await.unwrap();
    assert_eq!(first.rolled_back, [CREATE_POSTS]);

    runner.migrate().await.unwrap();
    let two = runner.rollback(2).await.unwrap();
    assert_eq!(two.rolled_back, [CREATE_POSTS, CREATE_TAGS]);
    assert_eq!(db.lock().unwrap().ledger, [CREATE_USERS]);
    assert_eq!(
        journal.lock().unwrap()[3..],
        ["down:posts", "up:posts", "down:posts", "down:tags"]
    );
}

#[tokio::test]
async fn failed_unit_rolls_back_the_batch() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");

    let err = MigrationRunner::new(
        &mut conn,
        registry(&journal, &three_units(), Some(CREATE_POSTS)),
    )
    .migrate()
    .await
    .unwrap_err();

    match &err {
        OrmError::Migration { migration, source } => {
            assert_eq!(migration, CREATE_POSTS);
            assert!(source.is_schema());
        }
        other => panic!("expected a migration error, got {other:?}"),
    }
    assert!(err.to_string().contains("posts exploded"));
    assert_eq!(*journal.lock().unwrap(), ["up:users", "up:posts"]);
    assert_eq!(conn.tx_events(), [TxEvent::Begin, TxEvent::Rollback]);
    assert_eq!(conn.count_matching("INSERT INTO migrations"), 1);
}

#[tokio::test]
async fn implicit_ddl_commit_leaves_nothing_to_roll_back() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations").with_implicit_ddl_commit();

    let err = MigrationRunner::new(
        &mut conn,
        registry(&journal, &three_units(), Some(CREATE_USERS)),
    )
    .migrate()
    .await
    .unwrap_err();

    assert!(matches!(err, OrmError::Migration { .. }));
    // the CREATE TABLE inside the unit already ended the transaction
    assert_eq!(conn.tx_events(), [TxEvent::Begin]);
    assert!(!conn.in_transaction());
    assert!(db.lock().unwrap().tables.contains("users"));
}

#[tokio::test]
async fn failing_ledger_write_names_the_unit() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");
    conn.fail_on("INSERT INTO migrations", "disk full");

    let err = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None))
        .migrate()
        .await
        .unwrap_err();

    assert!(err.to_string().contains(CREATE_USERS));
    assert!(err.to_string().contains("disk full"));
}

#[tokio::test]
async fn status_reports_applied_and_pending() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    db.lock().unwrap().ledger.push(CREATE_USERS.to_string());
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");

    let states = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None))
        .status()
        .await
        .unwrap();

    let summary: Vec<(&str, bool)> = states
        .iter()
        .map(|s| (s.identifier.as_str(), s.applied))
        .collect();
    assert_eq!(
        summary,
        [(CREATE_USERS, true), (CREATE_POSTS, false), (CREATE_TAGS, false)]
    );
    assert!(journal.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reset_ledger_keeps_tables() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "migrations");

    {
        let mut runner = MigrationRunner::new(&mut conn, registry(&journal, &three_units(), None));
        runner.migrate().await.unwrap();
        runner.reset_ledger().await.unwrap();
        assert_eq!(runner.pending().await.unwrap().len(), 3);
    }

    assert_eq!(conn.count_matching("TRUNCATE TABLE `migrations`"), 1);
    assert!(db.lock().unwrap().tables.contains("users"));
}

#[tokio::test]
async fn custom_ledger_table() {
    let db = Arc::new(Mutex::new(FakeDb::default()));
    let journal = Journal::default();
    let mut conn = connect(&db, "schema_history");

    let report = MigrationRunner::with_config(
        &mut conn,
        registry(&journal, &three_units(), None),
        MigrationConfig::default().table("schema_history"),
    )
    .migrate()
    .await
    .unwrap();

    assert_eq!(report.applied.len(), 3);
    assert_eq!(conn.count_matching("CREATE TABLE `schema_history`"), 1);
    assert_eq!(conn.count_matching("INSERT INTO schema_history"), 3);
    assert_eq!(conn.count_matching("CREATE TABLE `migrations`"), 0);
}

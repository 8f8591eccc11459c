use slimdb::migrate::{Migration, MigrationRegistry, MigrationRunner, MigrationSource, Schema};
use slimdb::testing::MockConnection;
use slimdb::{OrmResult, Row};

#[derive(Default)]
pub struct CreateWidgetsTable;

#[slimdb::async_trait]
impl Migration for CreateWidgetsTable {
    async fn up(&self, schema: &mut Schema<'_>) -> OrmResult<()> {
        schema
            .create("widgets", |t| {
                t.id();
                t.string("label", 64);
                t.decimal("price", 8, 2).default(0);
                t.timestamps();
            })
            .await?;
        Ok(())
    }

    async fn down(&self, schema: &mut Schema<'_>) -> OrmResult<()> {
        schema.drop("widgets").await?;
        Ok(())
    }
}

slimdb::register_migration!("2023_12_31_235959_create_widgets_table", CreateWidgetsTable);

#[test]
fn collected_from_inventory() {
    let registry = MigrationRegistry::collect().unwrap();
    assert!(registry.contains("2023_12_31_235959_create_widgets_table"));
    assert!(
        registry
            .identifiers()
            .unwrap()
            .contains(&"2023_12_31_235959_create_widgets_table".to_string())
    );
}

#[tokio::test]
async fn registered_unit_runs() {
    let mut conn = MockConnection::new().with_database("shop");
    // ledger exists, nothing applied yet
    conn.on_query(
        "information_schema.tables",
        vec![Row::from_pairs([("name", "migrations")])],
    );

    let report = MigrationRunner::new(&mut conn, MigrationRegistry::collect().unwrap())
        .migrate()
        .await
        .unwrap();

    assert_eq!(report.applied, ["2023_12_31_235959_create_widgets_table"]);
    let create = conn
        .sql_log()
        .into_iter()
        .find(|sql| sql.starts_with("CREATE TABLE `widgets`"))
        .unwrap()
        .to_string();
    assert!(create.contains("`price` decimal(8,2) NOT NULL DEFAULT 0"));
    assert!(create.contains("PRIMARY KEY (`id`)"));
    assert_eq!(
        conn.last_statement().unwrap().0,
        "INSERT INTO migrations (migration) VALUES (?)"
    );
}

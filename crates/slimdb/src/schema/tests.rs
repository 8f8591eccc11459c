use super::*;
use crate::value::Value;

#[test]
fn test_function_defaults_unquoted() {
    let mut c = ColumnDefinition::new("created_at", "timestamp");
    c.default("CURRENT_TIMESTAMP");
    assert_eq!(
        c.to_sql(),
        "`created_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP"
    );

    for f in ["NOW()", "now()", "CURRENT_TIMESTAMP(6)", "CURRENT_DATE", "UTC_TIMESTAMP()"] {
        assert!(is_function_default(f), "{f}");
    }
    for f in ["NOW", "hello", "CURRENT_TIMESTAMP; DROP", "now() + 1"] {
        assert!(!is_function_default(f), "{f}");
    }
}

#[test]
fn test_text_default_quoted_and_escaped() {
    let mut c = ColumnDefinition::new("greeting", "varchar(20)");
    c.default("hello");
    assert_eq!(c.to_sql(), "`greeting` varchar(20) NOT NULL DEFAULT 'hello'");

    c.default("it's");
    assert!(c.to_sql().ends_with("DEFAULT 'it''s'"));
}

#[test]
fn test_raw_default_wins() {
    let mut c = ColumnDefinition::new("updated_at", "timestamp");
    c.default("hello")
        .default_raw("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP");
    assert_eq!(
        c.to_sql(),
        "`updated_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP"
    );
    assert!(matches!(c.default_value(), Some(DefaultValue::Raw(_))));
}

#[test]
fn test_non_text_defaults() {
    let mut c = ColumnDefinition::new("active", "tinyint(1)");
    c.default(true);
    assert!(c.to_sql().ends_with("DEFAULT 1"));
    c.default(2.5);
    assert!(c.to_sql().ends_with("DEFAULT 2.5"));
    c.nullable().default(Value::Null);
    assert_eq!(c.to_sql(), "`active` tinyint(1) NULL DEFAULT NULL");
}

#[test]
fn test_modifier_order() {
    let mut c = ColumnDefinition::new("code", "int");
    c.after("name")
        .unique()
        .comment("public code")
        .auto_increment()
        .default(0)
        .unsigned();
    assert_eq!(
        c.to_sql(),
        "`code` int UNSIGNED NOT NULL DEFAULT 0 AUTO_INCREMENT COMMENT 'public code' UNIQUE AFTER `name`"
    );
}

#[test]
fn test_create_table() {
    let mut t = TableBlueprint::new("posts");
    t.id();
    t.big_integer("user_id").unsigned();
    t.string("title", 200);
    t.decimal("price", 10, 2).default(0);
    t.boolean("published").default(false);
    t.index(["user_id", "published"]);
    t.unique(["title"]).name("posts_title_unique");
    t.foreign("user_id", "users").on_delete("CASCADE");
    t.engine("InnoDB");
    t.charset("utf8mb4");

    assert_eq!(
        t.build_create_table(),
        "CREATE TABLE `posts` (\n\
         \x20 `id` bigint UNSIGNED NOT NULL AUTO_INCREMENT,\n\
         \x20 `user_id` bigint UNSIGNED NOT NULL,\n\
         \x20 `title` varchar(200) NOT NULL,\n\
         \x20 `price` decimal(10,2) NOT NULL DEFAULT 0,\n\
         \x20 `published` tinyint(1) NOT NULL DEFAULT 0,\n\
         \x20 PRIMARY KEY (`id`),\n\
         \x20 KEY `index_posts_user_id_published_idx` (`user_id`, `published`),\n\
         \x20 UNIQUE KEY `posts_title_unique` (`title`),\n\
         \x20 CONSTRAINT `fk_posts_user_id` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`) ON DELETE CASCADE ON UPDATE CASCADE\n\
         ) CHARSET=utf8mb4 ENGINE=InnoDB;"
    );
}

#[test]
fn test_composite_primary_key() {
    let mut t = TableBlueprint::new("pivot");
    t.integer("a").primary();
    t.integer("b").primary();
    let sql = t.build_create_table();
    assert_eq!(sql.matches("PRIMARY KEY").count(), 1);
    assert!(sql.contains("PRIMARY KEY (`a`, `b`)"));
}

#[test]
fn test_timestamps() {
    let mut t = TableBlueprint::new("users");
    t.timestamps();
    let sql = t.build_create_table();
    assert!(sql.contains("`created_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP,"));
    assert!(sql.contains(
        "`updated_at` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP"
    ));
}

#[test]
fn test_redeclared_column_replaces_in_place() {
    let mut t = TableBlueprint::new("t");
    t.string("a", 10);
    t.integer("b");
    t.text("a").nullable();
    let names: Vec<&str> = t.columns().iter().map(|c| c.name()).collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(t.columns()[0].sql_type(), "text");
}

#[test]
fn test_alter_table_order() {
    let mut t = TableBlueprint::new("users");
    t.drop_index("old_idx");
    t.string("nickname", 50).nullable().after("name");
    t.change("email", "varchar(191)").unique();
    t.index(["nickname"]);
    t.unique(["email"]);
    t.foreign("team_id", "teams").references("uuid").name("users_team_fk");
    t.drop_column("legacy");
    t.drop_foreign("users_old_fk");

    assert_eq!(
        t.build_alter_table(),
        "ALTER TABLE `users`\n\
         ADD COLUMN `nickname` varchar(50) NULL AFTER `name`,\n\
         ADD INDEX `index_users_nickname_idx` (`nickname`),\n\
         ADD UNIQUE INDEX `unique_users_email_idx` (`email`),\n\
         ADD CONSTRAINT `users_team_fk` FOREIGN KEY (`team_id`) REFERENCES `teams` (`uuid`) ON DELETE RESTRICT ON UPDATE CASCADE,\n\
         DROP INDEX `old_idx`,\n\
         MODIFY COLUMN `email` varchar(191) NOT NULL UNIQUE,\n\
         DROP COLUMN `legacy`,\n\
         DROP FOREIGN KEY `users_old_fk`;"
    );
}

#[test]
fn test_empty_blueprint() {
    let mut t = TableBlueprint::new("t");
    assert!(t.is_empty());
    t.option("auto_increment", 100);
    assert!(!t.is_empty());
}

#[test]
fn test_comment_escaped() {
    let mut c = ColumnDefinition::new("n", "int");
    c.comment("user's count");
    assert!(c.to_sql().ends_with("COMMENT 'user''s count'"));
}

//! [`Connection`] over a single `mysql_async` connection.

use crate::client::Connection;
use crate::config::ConnectConfig;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::Value;
use async_trait::async_trait;
use chrono::NaiveDate;
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Conn, Params, Row as MySqlRow};

/// A MySQL connection.
///
/// Statements with parameters go through the binary protocol, statements
/// without through the text protocol (some DDL cannot be prepared).
pub struct MySqlConnection {
    conn: Conn,
    database: String,
    in_transaction: bool,
    last_insert_id: Option<u64>,
}

impl MySqlConnection {
    pub async fn connect(config: &ConnectConfig) -> OrmResult<Self> {
        let conn = Conn::new(config.to_opts())
            .await
            .map_err(|e| OrmError::Connection(format!("failed to connect to {}: {e}", config.host)))?;
        tracing::debug!(host = %config.host, database = %config.dbname, "connected");
        Ok(Self {
            conn,
            database: config.dbname.clone(),
            in_transaction: false,
            last_insert_id: None,
        })
    }

    /// Close the connection gracefully.
    pub async fn disconnect(self) -> OrmResult<()> {
        self.conn.disconnect().await?;
        Ok(())
    }

    /// MySQL ends an open transaction before running DDL and a few
    /// administrative statements, whether or not they succeed.
    fn note_implicit_commit(&mut self, sql: &str) {
        if self.in_transaction && causes_implicit_commit(sql) {
            tracing::debug!("transaction closed by implicit commit");
            self.in_transaction = false;
        }
    }
}

/// Whether `sql` commits the current transaction implicitly in MySQL.
///
/// Temporary tables are the exception among `CREATE`/`DROP` statements.
fn causes_implicit_commit(sql: &str) -> bool {
    let mut words = sql
        .split_whitespace()
        .map(|word| word.trim_start_matches('(').to_ascii_uppercase());
    let Some(first) = words.next() else {
        return false;
    };
    match first.as_str() {
        "CREATE" | "DROP" => words.next().is_some_and(|second| second != "TEMPORARY"),
        "ALTER" | "RENAME" | "TRUNCATE" | "GRANT" | "REVOKE" | "LOCK" | "UNLOCK" | "INSTALL"
        | "UNINSTALL" | "ANALYZE" | "CHECK" | "OPTIMIZE" | "REPAIR" | "FLUSH" | "CACHE" => true,
        "LOAD" => words.next().is_some_and(|second| second == "INDEX"),
        _ => false,
    }
}

fn statement_error(sql: &str, err: mysql_async::Error) -> OrmError {
    match err {
        mysql_async::Error::Server(e) => OrmError::execution(sql, e),
        other => other.into(),
    }
}

fn to_params(params: &[Value]) -> Params {
    if params.is_empty() {
        return Params::Empty;
    }
    Params::Positional(params.iter().map(to_mysql_value).collect())
}

fn to_mysql_value(value: &Value) -> mysql_async::Value {
    use chrono::{Datelike, Timelike};
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(v) => mysql_async::Value::Int(i64::from(*v)),
        Value::Int(v) => mysql_async::Value::Int(*v),
        Value::UInt(v) => mysql_async::Value::UInt(*v),
        Value::Float(v) => mysql_async::Value::Double(*v),
        Value::Text(v) => mysql_async::Value::Bytes(v.as_bytes().to_vec()),
        Value::Bytes(v) => mysql_async::Value::Bytes(v.clone()),
        Value::Date(d) => {
            mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        Value::DateTime(dt) => mysql_async::Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
    }
}

fn from_mysql_value(value: mysql_async::Value, column_type: ColumnType) -> Value {
    match value {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match column_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => s
                    .parse::<i64>()
                    .map(Value::Int)
                    .or_else(|_| s.parse::<u64>().map(Value::UInt))
                    .unwrap_or(Value::Text(s)),
                ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
                    s.parse::<f64>().map(Value::Float).unwrap_or(Value::Text(s))
                }
                // DECIMAL stays textual to keep its precision
                _ => Value::Text(s),
            },
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(v) => Value::Int(v),
        mysql_async::Value::UInt(v) => Value::UInt(v),
        mysql_async::Value::Float(v) => Value::Float(f64::from(v)),
        mysql_async::Value::Double(v) => Value::Float(v),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day));
            let converted = match column_type {
                ColumnType::MYSQL_TYPE_DATE => date.map(Value::Date),
                _ => date
                    .and_then(|d| {
                        d.and_hms_micro_opt(u32::from(hour), u32::from(min), u32::from(sec), micro)
                    })
                    .map(Value::DateTime),
            };
            // zero dates such as 0000-00-00 have no chrono form
            converted.unwrap_or_else(|| {
                Value::Text(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{min:02}:{sec:02}"
                ))
            })
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + u32::from(hours);
            let sign = if negative { "-" } else { "" };
            Value::Text(format!("{sign}{total_hours:02}:{mins:02}:{secs:02}.{micros:06}"))
        }
    }
}

fn convert_row(row: &MySqlRow) -> Row {
    let columns = row.columns_ref();
    let names = columns.iter().map(|c| c.name_str().to_string()).collect();
    let values = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let raw = row.as_ref(idx).cloned().unwrap_or(mysql_async::Value::NULL);
            from_mysql_value(raw, column.column_type())
        })
        .collect();
    Row::new(names, values)
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let result: Result<Vec<MySqlRow>, _> = if params.is_empty() {
            self.conn.query(sql).await
        } else {
            self.conn.exec(sql, to_params(params)).await
        };
        self.note_implicit_commit(sql);
        let rows = result.map_err(|e| statement_error(sql, e))?;
        Ok(rows.iter().map(convert_row).collect())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let result = if params.is_empty() {
            self.conn.query_drop(sql).await
        } else {
            self.conn.exec_drop(sql, to_params(params)).await
        };
        self.note_implicit_commit(sql);
        result.map_err(|e| statement_error(sql, e))?;

        if let Some(id) = self.conn.last_insert_id().filter(|id| *id > 0) {
            self.last_insert_id = Some(id);
        }
        Ok(self.conn.affected_rows())
    }

    async fn begin_transaction(&mut self) -> OrmResult<()> {
        if self.in_transaction {
            return Err(OrmError::Connection("transaction already open".into()));
        }
        self.conn
            .query_drop("START TRANSACTION")
            .await
            .map_err(|e| statement_error("START TRANSACTION", e))?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.conn
            .query_drop("COMMIT")
            .await
            .map_err(|e| statement_error("COMMIT", e))?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.conn
            .query_drop("ROLLBACK")
            .await
            .map_err(|e| statement_error("ROLLBACK", e))
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    fn database_name(&self) -> &str {
        &self.database
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_protocol_integers_are_parsed() {
        let v = from_mysql_value(
            mysql_async::Value::Bytes(b"42".to_vec()),
            ColumnType::MYSQL_TYPE_LONGLONG,
        );
        assert_eq!(v, Value::Int(42));
    }

    #[test]
    fn decimals_stay_textual() {
        let v = from_mysql_value(
            mysql_async::Value::Bytes(b"10.50".to_vec()),
            ColumnType::MYSQL_TYPE_NEWDECIMAL,
        );
        assert_eq!(v, Value::from("10.50"));
    }

    #[test]
    fn datetimes_convert_both_ways() {
        let dt = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap();
        let raw = to_mysql_value(&Value::DateTime(dt));
        assert_eq!(
            from_mysql_value(raw, ColumnType::MYSQL_TYPE_DATETIME),
            Value::DateTime(dt)
        );
    }

    #[test]
    fn ddl_commits_implicitly() {
        assert!(causes_implicit_commit("CREATE TABLE `users` (`id` int)"));
        assert!(causes_implicit_commit("  drop table if exists `users`"));
        assert!(causes_implicit_commit("ALTER TABLE `users` ADD `name` varchar(255)"));
        assert!(causes_implicit_commit("RENAME TABLE `a` TO `b`"));
        assert!(causes_implicit_commit("TRUNCATE TABLE `migrations`"));
        assert!(causes_implicit_commit("LOAD INDEX INTO CACHE t1"));
    }

    #[test]
    fn data_statements_stay_in_transaction() {
        assert!(!causes_implicit_commit("CREATE TEMPORARY TABLE scratch (id int)"));
        assert!(!causes_implicit_commit("DROP TEMPORARY TABLE scratch"));
        assert!(!causes_implicit_commit("INSERT INTO migrations (migration) VALUES (?)"));
        assert!(!causes_implicit_commit("SELECT * FROM information_schema.tables"));
        assert!(!causes_implicit_commit("LOAD DATA INFILE 'x.csv' INTO TABLE t"));
        assert!(!causes_implicit_commit(""));
    }

    #[test]
    fn zero_date_falls_back_to_text() {
        let v = from_mysql_value(
            mysql_async::Value::Date(0, 0, 0, 0, 0, 0, 0),
            ColumnType::MYSQL_TYPE_DATETIME,
        );
        assert_eq!(v, Value::from("0000-00-00 00:00:00"));
    }
}

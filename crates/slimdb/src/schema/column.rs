//! Column definitions.

use crate::value::Value;
use std::sync::OnceLock;

/// Whether a text default is one of the SQL functions MySQL accepts unquoted.
///
/// Anything outside this list is quoted as a string literal.
pub fn is_function_default(s: &str) -> bool {
    static FUNCTION_DEFAULT_RE: OnceLock<regex::Regex> = OnceLock::new();
    FUNCTION_DEFAULT_RE
        .get_or_init(|| {
            regex::Regex::new(
                r"(?i)^\s*(?:(?:CURRENT_TIMESTAMP|CURRENT_DATE|CURRENT_TIME|LOCALTIME|LOCALTIMESTAMP)(?:\(\d*\))?|(?:NOW|UTC_TIMESTAMP|CURDATE|CURTIME)\(\d*\))\s*$",
            )
            .expect("invalid built-in default-function regex")
        })
        .is_match(s)
}

/// Escape a string for use inside a single-quoted SQL literal.
pub(crate) fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

/// A column default.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A value rendered as a SQL literal (quoted unless it is an allow-listed function).
    Literal(Value),
    /// A SQL expression rendered verbatim.
    Raw(String),
}

impl DefaultValue {
    pub fn to_sql(&self) -> String {
        match self {
            DefaultValue::Raw(expr) => expr.clone(),
            DefaultValue::Literal(value) => literal_sql(value),
        }
    }
}

fn literal_sql(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(s) if is_function_default(s) => s.trim().to_string(),
        Value::Text(s) => quote_literal(s),
        Value::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
            format!("X'{hex}'")
        }
        other @ (Value::Date(_) | Value::DateTime(_)) => quote_literal(&other.to_string()),
    }
}

/// One column's type and modifiers.
///
/// Handed out as `&mut ColumnDefinition` by the blueprint helpers so modifiers
/// can be chained:
///
/// ```ignore
/// t.string("email", 191).unique().comment("login address");
/// t.decimal("price", 10, 2).unsigned().default(0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    name: String,
    sql_type: String,
    nullable: bool,
    default: Option<Value>,
    default_raw: Option<String>,
    primary: bool,
    unique: bool,
    auto_increment: bool,
    unsigned: bool,
    after: Option<String>,
    comment: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: false,
            default: None,
            default_raw: None,
            primary: false,
            unique: false,
            auto_increment: false,
            unsigned: false,
            after: None,
            comment: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn not_null(&mut self) -> &mut Self {
        self.nullable = false;
        self
    }

    /// Literal default. Text is quoted unless it names an allow-listed
    /// function such as `CURRENT_TIMESTAMP` or `NOW()`.
    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(value.into());
        self
    }

    /// Default expression rendered verbatim. Takes precedence over [`default`](Self::default).
    pub fn default_raw(&mut self, expr: impl Into<String>) -> &mut Self {
        self.default_raw = Some(expr.into());
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self
    }

    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    /// Place the column after `column` (ALTER TABLE only).
    pub fn after(&mut self, column: impl Into<String>) -> &mut Self {
        self.after = Some(column.into());
        self
    }

    pub fn comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.comment = Some(comment.into());
        self
    }

    /// The effective default, raw winning over literal.
    pub fn default_value(&self) -> Option<DefaultValue> {
        match (&self.default_raw, &self.default) {
            (Some(raw), _) => Some(DefaultValue::Raw(raw.clone())),
            (None, Some(value)) => Some(DefaultValue::Literal(value.clone())),
            (None, None) => None,
        }
    }

    /// Render the column definition fragment, e.g.
    /// `` `id` bigint UNSIGNED NOT NULL AUTO_INCREMENT ``.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("`{}` {}", self.name, self.sql_type);

        if self.unsigned {
            sql.push_str(" UNSIGNED");
        }

        sql.push_str(if self.nullable { " NULL" } else { " NOT NULL" });

        if let Some(default) = self.default_value() {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql());
        }

        if self.auto_increment {
            sql.push_str(" AUTO_INCREMENT");
        }

        if let Some(comment) = &self.comment {
            sql.push_str(" COMMENT ");
            sql.push_str(&quote_literal(comment));
        }

        if self.unique {
            sql.push_str(" UNIQUE");
        }

        if let Some(after) = &self.after {
            sql.push_str(&format!(" AFTER `{after}`"));
        }

        sql
    }
}

//! The concrete SQL dialects.

use crate::codec::{Codec, PostgresCodec, RawValue, SqlTextCodec};
use crate::error::DalResult;
use crate::expr::{DatePart, Expression, Operator};
use crate::types::FieldType;

use super::{SqlCompiler, SqlDialect};
use crate::dialect::{Capabilities, ColumnMode};

/// Reference SQL: unquoted identifiers and only the portable operator set.
/// Used to pin down compiled output independently of any engine.
#[derive(Debug, Clone)]
pub struct RefSql {
    codec: SqlTextCodec,
}

impl Default for RefSql {
    fn default() -> Self {
        Self {
            codec: SqlTextCodec::new("ref-sql"),
        }
    }
}

impl SqlDialect for RefSql {
    fn backend(&self) -> &'static str {
        "ref-sql"
    }

    fn value_codec(&self) -> &dyn Codec {
        &self.codec
    }

    fn features(&self) -> Capabilities {
        Capabilities {
            subselect: true,
            joins: true,
            for_update: true,
            distinct_on: false,
            native_boolean: false,
            ddl: true,
        }
    }

    fn quote(&self, ident: &str) -> String {
        ident.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct Sqlite {
    codec: SqlTextCodec,
}

impl Default for Sqlite {
    fn default() -> Self {
        Self {
            codec: SqlTextCodec::new("sqlite"),
        }
    }
}

impl SqlDialect for Sqlite {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn value_codec(&self) -> &dyn Codec {
        &self.codec
    }

    fn features(&self) -> Capabilities {
        Capabilities {
            subselect: true,
            joins: true,
            for_update: false,
            distinct_on: false,
            native_boolean: false,
            ddl: true,
        }
    }

    fn render_operator(
        &self,
        compiler: &SqlCompiler<'_>,
        expr: &Expression,
        mode: ColumnMode,
    ) -> DalResult<String> {
        match expr.op {
            // REGEXP is bound to a user function on connect
            Operator::Regexp => compiler.infix(expr, "REGEXP", mode),
            _ => compiler.render_base(expr, mode),
        }
    }

    fn extract(&self, part: DatePart, arg: &str) -> String {
        let format = match part {
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
            DatePart::Day => "%d",
            DatePart::Hour => "%H",
            DatePart::Minute => "%M",
            DatePart::Second => "%S",
        };
        format!("CAST(strftime('{}', {}) AS INTEGER)", format, arg)
    }

    fn epoch(&self, arg: &str) -> Option<String> {
        Some(format!("CAST(strftime('%s', {}) AS INTEGER)", arg))
    }

    fn random(&self) -> Option<&'static str> {
        Some("Random()")
    }

    fn text_cast_type(&self) -> &'static str {
        "TEXT"
    }

    fn sql_type(&self, ty: &FieldType) -> String {
        match ty {
            FieldType::Id => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            other => RefSql::default().sql_type(other),
        }
    }

    fn pagination(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, Some(o)) => format!(" LIMIT -1 OFFSET {}", o),
            (limit, offset) => RefSql::default().pagination(limit, offset),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Postgres {
    codec: PostgresCodec,
}

impl SqlDialect for Postgres {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn value_codec(&self) -> &dyn Codec {
        &self.codec
    }

    fn features(&self) -> Capabilities {
        Capabilities {
            subselect: true,
            joins: true,
            for_update: true,
            distinct_on: true,
            native_boolean: true,
            ddl: true,
        }
    }

    fn render_raw(&self, raw: &RawValue) -> String {
        match raw {
            RawValue::Bytes(b) => format!("'\\x{}'::bytea", hex::encode(b)),
            RawValue::Json(j) => format!("{}::json", self.quote_string(&j.to_string())),
            other => RefSql::default().render_raw(other),
        }
    }

    fn render_operator(
        &self,
        compiler: &SqlCompiler<'_>,
        expr: &Expression,
        mode: ColumnMode,
    ) -> DalResult<String> {
        match expr.op {
            Operator::Regexp => compiler.infix(expr, "~", mode),
            _ => compiler.render_base(expr, mode),
        }
    }

    fn ilike_keyword(&self) -> Option<&'static str> {
        Some("ILIKE")
    }

    fn epoch(&self, arg: &str) -> Option<String> {
        Some(format!("EXTRACT(EPOCH FROM {})", arg))
    }

    fn random(&self) -> Option<&'static str> {
        Some("RANDOM()")
    }

    fn text_cast_type(&self) -> &'static str {
        "TEXT"
    }

    fn sql_type(&self, ty: &FieldType) -> String {
        match ty {
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::Double => "FLOAT8".to_string(),
            FieldType::Blob => "BYTEA".to_string(),
            FieldType::Json => "JSON".to_string(),
            FieldType::Id => "SERIAL PRIMARY KEY".to_string(),
            other => RefSql::default().sql_type(other),
        }
    }

    fn left_join_keyword(&self) -> &'static str {
        "LEFT OUTER JOIN"
    }

    fn drop_table_suffix(&self) -> &'static str {
        " CASCADE"
    }
}

#[derive(Debug, Clone)]
pub struct MySql {
    codec: SqlTextCodec,
}

impl Default for MySql {
    fn default() -> Self {
        Self {
            codec: SqlTextCodec::new("mysql"),
        }
    }
}

impl SqlDialect for MySql {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    fn value_codec(&self) -> &dyn Codec {
        &self.codec
    }

    fn features(&self) -> Capabilities {
        Capabilities {
            subselect: true,
            joins: true,
            for_update: true,
            distinct_on: false,
            native_boolean: false,
            ddl: true,
        }
    }

    fn quote(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn render_operator(
        &self,
        compiler: &SqlCompiler<'_>,
        expr: &Expression,
        mode: ColumnMode,
    ) -> DalResult<String> {
        match expr.op {
            Operator::Regexp => compiler.infix(expr, "REGEXP", mode),
            _ => compiler.render_base(expr, mode),
        }
    }

    fn epoch(&self, arg: &str) -> Option<String> {
        Some(format!("UNIX_TIMESTAMP({})", arg))
    }

    fn random(&self) -> Option<&'static str> {
        Some("RAND()")
    }

    fn substring_function(&self) -> &'static str {
        "SUBSTRING"
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn text_cast_type(&self) -> &'static str {
        "CHAR"
    }

    fn sql_type(&self, ty: &FieldType) -> String {
        match ty {
            FieldType::Text | FieldType::Json => "LONGTEXT".to_string(),
            FieldType::Integer | FieldType::Reference(_) => "INT".to_string(),
            FieldType::DateTime => "DATETIME".to_string(),
            FieldType::Blob => "LONGBLOB".to_string(),
            FieldType::Id => "INT AUTO_INCREMENT NOT NULL".to_string(),
            other => RefSql::default().sql_type(other),
        }
    }

    fn primary_key_clause(&self, column: &str) -> Option<String> {
        Some(format!("PRIMARY KEY ({})", self.quote(column)))
    }

    fn inline_references(&self) -> bool {
        false
    }

    fn pagination(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, Some(o)) => format!(" LIMIT {} OFFSET {}", u64::MAX, o),
            (limit, offset) => RefSql::default().pagination(limit, offset),
        }
    }

    fn empty_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} () VALUES ();", table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(RefSql::default().quote("person"), "person");
        assert_eq!(Sqlite::default().quote("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(MySql::default().quote("order"), "`order`");
    }

    #[test]
    fn test_blob_literals() {
        let raw = RawValue::Bytes(vec![0, 255]);
        assert_eq!(Postgres::default().render_raw(&raw), "'\\x00ff'::bytea");
        assert_eq!(Sqlite::default().render_raw(&raw), "X'00ff'");
    }

    #[test]
    fn test_offset_without_limit() {
        assert_eq!(Sqlite::default().pagination(None, Some(5)), " LIMIT -1 OFFSET 5");
        assert_eq!(Postgres::default().pagination(None, Some(5)), " OFFSET 5");
        assert_eq!(
            MySql::default().pagination(None, Some(5)),
            " LIMIT 18446744073709551615 OFFSET 5"
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Postgres::default().sql_type(&FieldType::Blob), "BYTEA");
        assert_eq!(MySql::default().sql_type(&FieldType::string()), "VARCHAR(512)");
        assert_eq!(
            Sqlite::default().sql_type(&FieldType::Id),
            "INTEGER PRIMARY KEY AUTOINCREMENT"
        );
    }
}

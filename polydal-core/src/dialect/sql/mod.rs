//! Relational dialects.
//!
//! Every SQL dialect shares one compiler and one statement assembler; a
//! dialect only supplies the hooks where its backend differs (identifier
//! quoting, literal escaping, type names, a few operators).

mod compiler;
mod ddl;
mod dialects;
mod statement;

pub use compiler::SqlCompiler;
pub(crate) use compiler::describe;
pub use dialects::{MySql, Postgres, RefSql, Sqlite};

use crate::codec::{Codec, RawValue};
use crate::error::DalResult;
use crate::expr::{DatePart, Expression};
use crate::types::FieldType;

use super::{Capabilities, ColumnMode};

/// Per-backend hooks of the SQL compiler
pub trait SqlDialect: Send + Sync {
    fn backend(&self) -> &'static str;

    fn value_codec(&self) -> &dyn Codec;

    fn features(&self) -> Capabilities;

    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Literal SQL for an encoded value
    fn render_raw(&self, raw: &RawValue) -> String {
        match raw {
            RawValue::Null => "NULL".to_string(),
            RawValue::Bool(true) => "TRUE".to_string(),
            RawValue::Bool(false) => "FALSE".to_string(),
            RawValue::Int(i) => i.to_string(),
            RawValue::Float(f) if f.is_finite() => f.to_string(),
            RawValue::Float(_) => "NULL".to_string(),
            RawValue::Decimal(d) => d.to_string(),
            RawValue::Text(s) => self.quote_string(s),
            RawValue::Bytes(b) => format!("X'{}'", hex::encode(b)),
            RawValue::Json(j) => self.quote_string(&j.to_string()),
        }
    }

    /// Render one operator node. Dialects override to special-case a few
    /// operators and defer the rest to [`SqlCompiler::render_base`].
    fn render_operator(
        &self,
        compiler: &SqlCompiler<'_>,
        expr: &Expression,
        mode: ColumnMode,
    ) -> DalResult<String> {
        compiler.render_base(expr, mode)
    }

    /// Native case-insensitive LIKE keyword, if any
    fn ilike_keyword(&self) -> Option<&'static str> {
        None
    }

    fn extract(&self, part: DatePart, arg: &str) -> String {
        format!("EXTRACT({} FROM {})", part.as_str().to_uppercase(), arg)
    }

    fn epoch(&self, _arg: &str) -> Option<String> {
        None
    }

    fn random(&self) -> Option<&'static str> {
        None
    }

    fn length_function(&self) -> &'static str {
        "LENGTH"
    }

    fn substring_function(&self) -> &'static str {
        "SUBSTR"
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("({})", parts.join(" || "))
    }

    /// Type used to widen non-text operands of pattern operators
    fn text_cast_type(&self) -> &'static str {
        "VARCHAR(512)"
    }

    fn sql_type(&self, ty: &FieldType) -> String {
        match ty {
            FieldType::String(n) => format!("VARCHAR({})", n),
            FieldType::Text | FieldType::Json => "TEXT".to_string(),
            FieldType::Boolean => "CHAR(1)".to_string(),
            FieldType::Integer | FieldType::Reference(_) => "INTEGER".to_string(),
            FieldType::BigInt => "BIGINT".to_string(),
            FieldType::Double => "DOUBLE".to_string(),
            FieldType::Decimal { precision, scale } => format!("NUMERIC({},{})", precision, scale),
            FieldType::Date => "DATE".to_string(),
            FieldType::Time => "TIME".to_string(),
            FieldType::DateTime => "TIMESTAMP".to_string(),
            FieldType::Blob => "BLOB".to_string(),
            FieldType::Upload => "VARCHAR(512)".to_string(),
            FieldType::ListString | FieldType::ListInteger | FieldType::ListReference(_) => {
                "TEXT".to_string()
            }
            FieldType::Id => "INTEGER PRIMARY KEY".to_string(),
        }
    }

    /// Table-level primary key clause for backends that cannot declare it
    /// inline with the column type
    fn primary_key_clause(&self, _column: &str) -> Option<String> {
        None
    }

    /// Backends that ignore inline `REFERENCES` need a table constraint
    fn inline_references(&self) -> bool {
        true
    }

    fn left_join_keyword(&self) -> &'static str {
        "LEFT JOIN"
    }

    fn pagination(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!(" LIMIT {}", l),
            (None, Some(o)) => format!(" OFFSET {}", o),
            (None, None) => String::new(),
        }
    }

    fn empty_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} DEFAULT VALUES;", table)
    }

    fn drop_table_suffix(&self) -> &'static str {
        ""
    }
}

/// Implement [`super::Dialect`] for SQL dialect types by delegating to the
/// shared compiler and statement assembler.
macro_rules! sql_dialect {
    ($($t:ty),*) => {
        $(impl $crate::dialect::Dialect for $t {
            fn name(&self) -> &str {
                SqlDialect::backend(self)
            }

            fn codec(&self) -> &dyn $crate::codec::Codec {
                SqlDialect::value_codec(self)
            }

            fn capabilities(&self) -> $crate::dialect::Capabilities {
                SqlDialect::features(self)
            }

            fn compile(
                &self,
                operand: &$crate::expr::Operand,
                expected: Option<&$crate::types::FieldType>,
                mode: $crate::dialect::ColumnMode,
            ) -> $crate::error::DalResult<$crate::dialect::Fragment> {
                SqlCompiler::new(self)
                    .operand(operand, expected, mode)
                    .map($crate::dialect::Fragment::Sql)
            }

            fn select(
                &self,
                select: &$crate::expr::Select,
            ) -> $crate::error::DalResult<$crate::dialect::CompiledStatement> {
                statement::select(self, select)
            }

            fn count(
                &self,
                table: &std::sync::Arc<$crate::schema::TableInfo>,
                query: Option<&$crate::expr::Expression>,
                distinct: Option<&$crate::expr::Operand>,
            ) -> $crate::error::DalResult<$crate::dialect::CompiledStatement> {
                statement::count(self, table, query, distinct)
            }

            fn insert(
                &self,
                table: &std::sync::Arc<$crate::schema::TableInfo>,
                values: &[($crate::schema::Field, $crate::value::Value)],
            ) -> $crate::error::DalResult<$crate::dialect::CompiledStatement> {
                statement::insert(self, table, values)
            }

            fn update(
                &self,
                table: &std::sync::Arc<$crate::schema::TableInfo>,
                query: Option<&$crate::expr::Expression>,
                assignments: &[($crate::schema::Field, $crate::expr::Operand)],
            ) -> $crate::error::DalResult<$crate::dialect::CompiledStatement> {
                statement::update(self, table, query, assignments)
            }

            fn delete(
                &self,
                table: &std::sync::Arc<$crate::schema::TableInfo>,
                query: Option<&$crate::expr::Expression>,
            ) -> $crate::error::DalResult<$crate::dialect::CompiledStatement> {
                statement::delete(self, table, query)
            }

            fn create_table(
                &self,
                table: &$crate::schema::Table,
            ) -> $crate::error::DalResult<String> {
                ddl::create_table(self, table)
            }

            fn drop_table(&self, table: &$crate::schema::Table) -> $crate::error::DalResult<String> {
                ddl::drop_table(self, table)
            }

            fn create_index(
                &self,
                table: &$crate::schema::Table,
                name: &str,
                fields: &[$crate::schema::Field],
                unique: bool,
            ) -> $crate::error::DalResult<String> {
                ddl::create_index(self, table, name, fields, unique)
            }
        })*
    };
}

sql_dialect!(RefSql, Sqlite, Postgres, MySql);

//! Dialect compilers.
//!
//! A dialect turns expression trees and selects into the concrete query its
//! backend understands: SQL text for the relational dialects, a structured
//! command for the document dialect. Dialects hold no mutable state and can
//! be shared freely across threads.

pub mod document;
pub mod sql;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::codec::Codec;
use crate::error::{DalError, DalResult};
use crate::expr::{Expression, Operand, Select};
use crate::schema::{Field, Table, TableInfo};
use crate::types::FieldType;
use crate::value::Value;

pub use document::{DocumentCommand, DocumentDialect};
pub use sql::{MySql, Postgres, RefSql, Sqlite};

/// How a field is spelled in the rendered output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnMode {
    /// Column name only (standalone single-table expressions)
    Bare,
    /// `table.column`, used in filters and ordering
    Addressable,
    /// `table.column` and `expr AS alias`, used in select lists
    Labeled,
}

/// A compiled sub-expression
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Sql(String),
    Document(JsonValue),
}

impl Fragment {
    pub fn as_sql(&self) -> Option<&str> {
        match self {
            Fragment::Sql(s) => Some(s),
            Fragment::Document(_) => None,
        }
    }

    pub fn as_document(&self) -> Option<&JsonValue> {
        match self {
            Fragment::Document(d) => Some(d),
            Fragment::Sql(_) => None,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::Sql(s) => write!(f, "{}", s),
            Fragment::Document(d) => write!(f, "{}", d),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatementBody {
    Sql(String),
    Document(DocumentCommand),
}

/// A statement ready for the connection, with its ordered output labels
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub colnames: Vec<String>,
    pub body: StatementBody,
}

impl CompiledStatement {
    pub fn sql(sql: String, colnames: Vec<String>) -> Self {
        Self {
            colnames,
            body: StatementBody::Sql(sql),
        }
    }

    pub fn document(command: DocumentCommand, colnames: Vec<String>) -> Self {
        Self {
            colnames,
            body: StatementBody::Document(command),
        }
    }

    pub fn as_sql(&self) -> Option<&str> {
        match &self.body {
            StatementBody::Sql(s) => Some(s),
            StatementBody::Document(_) => None,
        }
    }

    pub fn as_document(&self) -> Option<&DocumentCommand> {
        match &self.body {
            StatementBody::Document(c) => Some(c),
            StatementBody::Sql(_) => None,
        }
    }

    /// Stable text form, used for logging and cache keys
    pub fn text(&self) -> String {
        match &self.body {
            StatementBody::Sql(s) => s.clone(),
            StatementBody::Document(c) => serde_json::to_string(c).unwrap_or_default(),
        }
    }
}

/// What a backend can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub subselect: bool,
    pub joins: bool,
    pub for_update: bool,
    pub distinct_on: bool,
    pub native_boolean: bool,
    pub ddl: bool,
}

/// A backend compiler
pub trait Dialect: Send + Sync {
    fn name(&self) -> &str;

    fn codec(&self) -> &dyn Codec;

    fn capabilities(&self) -> Capabilities;

    /// Render one operand. `expected` is the type a literal should take.
    fn compile(
        &self,
        operand: &Operand,
        expected: Option<&FieldType>,
        mode: ColumnMode,
    ) -> DalResult<Fragment>;

    /// Render a standalone expression.
    fn compile_expression(&self, expr: &Expression, mode: ColumnMode) -> DalResult<Fragment> {
        self.compile(&Operand::Expr(Box::new(expr.clone())), None, mode)
    }

    fn select(&self, select: &Select) -> DalResult<CompiledStatement>;

    /// Count rows of `table` matching `query`, or distinct values of `distinct`.
    fn count(
        &self,
        table: &Arc<TableInfo>,
        query: Option<&Expression>,
        distinct: Option<&Operand>,
    ) -> DalResult<CompiledStatement>;

    fn insert(&self, table: &Arc<TableInfo>, values: &[(Field, Value)]) -> DalResult<CompiledStatement>;

    fn update(
        &self,
        table: &Arc<TableInfo>,
        query: Option<&Expression>,
        assignments: &[(Field, Operand)],
    ) -> DalResult<CompiledStatement>;

    fn delete(&self, table: &Arc<TableInfo>, query: Option<&Expression>) -> DalResult<CompiledStatement>;

    fn create_table(&self, table: &Table) -> DalResult<String>;

    fn drop_table(&self, table: &Table) -> DalResult<String>;

    fn create_index(&self, table: &Table, name: &str, fields: &[Field], unique: bool) -> DalResult<String>;
}

/// Output label of a requested field or expression
pub fn colname(operand: &Operand, rendered: impl FnOnce() -> DalResult<String>) -> DalResult<String> {
    match operand {
        Operand::Field(f) => Ok(f.longname()),
        Operand::Expr(e) => match &e.op {
            crate::expr::Operator::Alias(name) => Ok(name.clone()),
            _ => rendered(),
        },
        _ => rendered(),
    }
}

/// Backend name -> dialect
#[derive(Clone)]
pub struct DialectRegistry {
    dialects: HashMap<String, Arc<dyn Dialect>>,
}

impl DialectRegistry {
    pub fn empty() -> Self {
        Self {
            dialects: HashMap::new(),
        }
    }

    /// Registry with every built-in dialect
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("ref-sql", Arc::new(RefSql::default()));
        registry.register("sqlite", Arc::new(Sqlite::default()));
        registry.register("postgres", Arc::new(Postgres::default()));
        registry.register("postgresql", Arc::new(Postgres::default()));
        registry.register("mysql", Arc::new(MySql::default()));
        let document: Arc<dyn Dialect> = Arc::new(DocumentDialect::default());
        registry.register("mongodb", Arc::clone(&document));
        registry.register("document", document);
        registry
    }

    pub fn register(&mut self, name: &str, dialect: Arc<dyn Dialect>) {
        self.dialects.insert(name.to_ascii_lowercase(), dialect);
    }

    pub fn get(&self, name: &str) -> DalResult<Arc<dyn Dialect>> {
        self.dialects
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DalError::UnknownDialect(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for DialectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectRegistry")
            .field("dialects", &self.names())
            .finish()
    }
}

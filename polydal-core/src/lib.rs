//! polydal core - backend-independent query expressions, dialect compilers
//! and row reconstruction.
//!
//! This crate holds everything that turns a query into backend text and
//! backend rows back into typed records. It performs no I/O: connections,
//! caching and configuration live in the `polydal` crate.
//!
//! # Main Components
//!
//! - **Expression model**: immutable trees of fields, literals and operators
//! - **Schema**: table and field metadata, aliases, virtual fields
//! - **Dialects**: SQL dialects and the document dialect with its
//!   find / aggregation pipeline planner
//! - **Codecs**: per-backend value encoding and decoding
//! - **Rows**: reconstruction of nested per-table records
//!
//! # Example
//!
//! ```rust
//! use polydal_core::prelude::*;
//! use serde_json::json;
//!
//! let item = Table::builder("item")
//!     .field(("price", FieldType::Double))
//!     .build()
//!     .unwrap();
//! let price = item.field("price").unwrap();
//! let query = price.gt(10) & price.lt(20);
//!
//! let sql = RefSql::default().compile_expression(&query, ColumnMode::Bare).unwrap();
//! assert_eq!(sql.as_sql(), Some("((price > 10) AND (price < 20))"));
//!
//! let doc = DocumentDialect::default().compile_expression(&query, ColumnMode::Bare).unwrap();
//! assert_eq!(
//!     doc.as_document(),
//!     Some(&json!({"$and": [{"price": {"$gt": 10}}, {"price": {"$lt": 20}}]}))
//! );
//! ```

pub mod codec;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod rows;
pub mod schema;
pub mod tables;
pub mod types;
pub mod value;

// Re-export main types for convenience
pub use codec::{Codec, DocumentCodec, PostgresCodec, RawRow, RawValue, SqlTextCodec};
pub use dialect::document::{cascade_actions, flatten_document, CascadeAction, Escalation};
pub use dialect::{
    colname, Capabilities, ColumnMode, CompiledStatement, Dialect, DialectRegistry, DocumentCommand,
    DocumentDialect, Fragment, MySql, Postgres, RefSql, Sqlite, StatementBody,
};
pub use error::{DalError, DalResult};
pub use expr::{Composable, DatePart, Distinct, Expression, IntoOperand, Join, Operand, Operator, Select, SelectOptions};
pub use rows::{Record, Row, RowParser, Rows, SkippedRow};
pub use schema::{Field, FieldSpec, OnDelete, Table, TableBuilder, TableInfo};
pub use tables::TableMap;
pub use types::FieldType;
pub use value::Value;

/// Everything needed to define tables and build queries
pub mod prelude {
    pub use crate::dialect::{ColumnMode, Dialect, DocumentDialect, MySql, Postgres, RefSql, Sqlite};
    pub use crate::expr::{Composable, Expression, IntoOperand, Operand, Select};
    pub use crate::schema::{FieldSpec, OnDelete, Table};
    pub use crate::types::FieldType;
    pub use crate::value::Value;
}

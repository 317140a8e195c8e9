//! polydal - backend-agnostic queries over SQL and document stores.
//!
//! The compilers and the row parser live in [`polydal_core`]; this crate
//! adds what it takes to run them: the [`Adapter`], the connection
//! boundary, the select cache, configuration and logging.

pub mod adapter;
pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod logging;

pub use adapter::{Adapter, Conflict, ConflictHandler, ConflictOutcome};
pub use cache::{CacheStats, Lookup, SelectCache};
pub use config::{AdapterConfig, CacheConfig};
pub use connection::{Connection, ConnectionError, ResultSet, ScriptedConnection};
pub use context::{CacheOutcome, ExecutionContext, StatementRecord};
pub use error::{DbError, DbResult};
pub use logging::init_tracing;

pub use polydal_core;

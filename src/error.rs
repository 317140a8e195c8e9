use polydal_core::DalError;
use thiserror::Error;

use crate::connection::ConnectionError;

#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Compile(#[from] DalError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Table '{0}' is not defined")]
    TableNotDefined(String),

    #[error("Conflict on table '{table}': {message}")]
    Conflict { table: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

impl serde::Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<anyhow::Error> for DbError {
    fn from(err: anyhow::Error) -> Self {
        DbError::Config(format!("{:#}", err))
    }
}

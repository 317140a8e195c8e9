//! Adapter orchestration.
//!
//! The [`Adapter`] ties one backend together: it picks the dialect from the
//! configured URI, keeps the table definitions, injects common filters,
//! compiles statements, runs them on the connection and rebuilds rows.
//! Calls are synchronous; the connection is never used concurrently.

pub mod conflict;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use polydal_core::{
    cascade_actions, flatten_document, CompiledStatement, Dialect, DialectRegistry, Expression,
    Field, FieldType, Operand, RowParser, Rows, Select, Table, TableMap, Value,
};

use crate::cache::{CacheStats, Lookup, SelectCache};
use crate::config::AdapterConfig;
use crate::connection::{Connection, ConnectionError, ResultSet};
use crate::context::{CacheOutcome, ExecutionContext, StatementRecord};
use crate::error::{DbError, DbResult};

pub use conflict::{Conflict, ConflictHandler, ConflictOutcome};

/// A select after table resolution and common-filter injection
struct Prepared {
    select: Select,
    tables: Vec<Table>,
}

pub struct Adapter {
    config: AdapterConfig,
    dialect: Arc<dyn Dialect>,
    connection: Mutex<Box<dyn Connection>>,
    cache: SelectCache<ResultSet>,
    /// Definitions by physical table name
    tables: BTreeMap<String, Table>,
    conflict_handlers: BTreeMap<String, ConflictHandler>,
}

impl Adapter {
    /// Adapter over `connection`, with the dialect named by the URI scheme.
    pub fn new(config: AdapterConfig, connection: impl Connection + 'static) -> DbResult<Self> {
        Self::with_registry(config, connection, &DialectRegistry::with_defaults())
    }

    pub fn with_registry(
        config: AdapterConfig,
        connection: impl Connection + 'static,
        registry: &DialectRegistry,
    ) -> DbResult<Self> {
        let backend = config.backend()?;
        let dialect = registry.get(&backend)?;
        tracing::info!("Adapter ready: dialect '{}' for {}", dialect.name(), config.uri);
        let cache = SelectCache::new(config.cache.capacity, config.cache_ttl());
        let connection: Box<dyn Connection> = Box::new(connection);
        Ok(Self {
            config,
            dialect,
            connection: Mutex::new(connection),
            cache,
            tables: BTreeMap::new(),
            conflict_handlers: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Register a table definition. Aliases of it need no registration.
    pub fn define_table(&mut self, table: Table) -> DbResult<()> {
        if let Some(existing) = self.tables.get(table.sql_name()) {
            if existing != &table {
                return Err(polydal_core::DalError::NameConflict {
                    name: table.sql_name().to_string(),
                }
                .into());
            }
        }
        tracing::debug!("Defined table '{}'", table.sql_name());
        self.tables.insert(table.sql_name().to_string(), table);
        Ok(())
    }

    /// The registered definition of `name`
    pub fn table(&self, name: &str) -> DbResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotDefined(name.to_string()))
    }

    /// Redirect unique-constraint failures on inserts into `table`.
    pub fn on_conflict<F>(&mut self, table: &str, handler: F) -> DbResult<()>
    where
        F: Fn(&Conflict<'_>) -> ConflictOutcome + Send + Sync + 'static,
    {
        let table = self.table(table)?.sql_name().to_string();
        self.conflict_handlers.insert(table, Arc::new(handler));
        Ok(())
    }

    /// Definitions of every table a select touches, bound to the identity
    /// (alias) the select uses.
    pub fn resolve_tables(&self, select: &Select) -> DbResult<Vec<Table>> {
        let mut map = TableMap::from_select(select)?;
        for join in select.options.join.iter().chain(&select.options.left) {
            map.insert(join.table.info())?;
        }
        self.bind_tables(&map)
    }

    fn bind_tables(&self, map: &TableMap) -> DbResult<Vec<Table>> {
        map.iter()
            .map(|info| {
                let table = self.table(&info.sql_name)?;
                Ok(table.rebind(Arc::clone(info)))
            })
            .collect()
    }

    /// AND every participating table's common filter into the select.
    /// Joined tables get theirs in the ON clause. Filters already present
    /// are not added twice.
    pub fn inject_common_filters(&self, select: Select) -> DbResult<Select> {
        if select.options.ignore_common_filters {
            return Ok(select);
        }
        let tables = self.resolve_tables(&select)?;
        Ok(apply_common_filters(select, &tables))
    }

    fn prepare(&self, select: &Select) -> DbResult<Prepared> {
        let tables = self.resolve_tables(select)?;
        let mut select = if select.options.ignore_common_filters {
            select.clone()
        } else {
            apply_common_filters(select.clone(), &tables)
        };
        if select.options.orderby_on_limitby.is_none() {
            select.options.orderby_on_limitby = Some(self.config.orderby_on_limitby);
        }
        Ok(Prepared { select, tables })
    }

    /// Compile a select as it would be executed.
    pub fn compile_select(&self, select: &Select) -> DbResult<CompiledStatement> {
        let prepared = self.prepare(select)?;
        Ok(self.dialect.select(&prepared.select)?)
    }

    pub fn select(&self, select: &Select, ctx: &mut ExecutionContext) -> DbResult<Rows> {
        let prepared = self.prepare(select)?;
        let statement = self.dialect.select(&prepared.select)?;
        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.fetch(&statement, prepared.select.fields.len())?;
        let rows = self.parse(&prepared, &statement, &result)?;
        ctx.record(StatementRecord {
            text: statement.text(),
            started_at,
            duration: start.elapsed(),
            cache: CacheOutcome::Bypass,
            rows: rows.len() as u64,
            rows_skipped: rows.skipped().len(),
        });
        Ok(rows)
    }

    /// Like [`Adapter::select`], but served from the cache while an entry
    /// for the same backend and statement is alive. Concurrent callers of
    /// a missing entry share a single execution.
    pub fn select_cached(
        &self,
        select: &Select,
        ttl: Option<Duration>,
        ctx: &mut ExecutionContext,
    ) -> DbResult<Rows> {
        if select.options.for_update {
            return self.select(select, ctx);
        }
        let prepared = self.prepare(select)?;
        let statement = self.dialect.select(&prepared.select)?;
        let text = statement.text();
        let key = SelectCache::<ResultSet>::cache_key(&self.config.uri, &text);

        let started_at = Utc::now();
        let start = Instant::now();
        let arity = prepared.select.fields.len();
        let (result, lookup) = self
            .cache
            .get_or_compute(&key, ttl, || self.fetch(&statement, arity))?;
        let cache = match lookup {
            Lookup::Hit => CacheOutcome::Hit,
            Lookup::Miss => CacheOutcome::Miss,
        };
        tracing::trace!("Select cache {:?} for {}", lookup, key);

        let rows = self.parse(&prepared, &statement, &result)?;
        ctx.record(StatementRecord {
            text,
            started_at,
            duration: start.elapsed(),
            cache,
            rows: rows.len() as u64,
            rows_skipped: rows.skipped().len(),
        });
        Ok(rows)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of rows of `table` matching `query`, or of distinct values
    /// of `distinct`.
    pub fn count(
        &self,
        table: &Table,
        query: Option<Expression>,
        distinct: Option<Operand>,
        ctx: &mut ExecutionContext,
    ) -> DbResult<u64> {
        let query = self.filtered_query(table, query)?;
        let statement = self.dialect.count(table.info(), query.as_ref(), distinct.as_ref())?;
        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.fetch(&statement, 1)?;

        let raw = match &result {
            ResultSet::Rows(rows) => rows.first().and_then(|row| row.first()).cloned(),
            ResultSet::Documents(docs) => docs
                .first()
                .and_then(|doc| flatten_document(doc, &document_keys(&statement)).into_iter().next()),
        };
        let count = match raw {
            None => 0,
            Some(raw) => match self.dialect.codec().decode(raw, &FieldType::Integer)? {
                Value::Null => 0,
                value => value
                    .as_i64()
                    .and_then(|n| u64::try_from(n).ok())
                    .ok_or_else(|| DbError::UnexpectedResult(format!("count returned {}", value)))?,
            },
        };
        ctx.record(StatementRecord {
            text: statement.text(),
            started_at,
            duration: start.elapsed(),
            cache: CacheOutcome::Bypass,
            rows: count,
            rows_skipped: 0,
        });
        Ok(count)
    }

    /// Insert a row, filling declared defaults for omitted fields. Returns
    /// the generated key when the backend reports one.
    pub fn insert(
        &self,
        table: &Table,
        values: Vec<(Field, Value)>,
        ctx: &mut ExecutionContext,
    ) -> DbResult<Option<Value>> {
        let mut values = values;
        for field in table.fields() {
            if field.is_primary_key() || values.iter().any(|(f, _)| f.name() == field.name()) {
                continue;
            }
            if let Some(default) = field.default_value() {
                values.push((field.clone(), default.clone()));
            }
        }
        let statement = self.dialect.insert(table.info(), &values)?;

        let mut connection = self.connection.lock();
        match self.execute_on(&mut **connection, &statement, ctx) {
            Ok(_) => Ok(connection.last_insert_id()?),
            Err(DbError::Connection(ConnectionError::UniqueViolation(message))) => {
                drop(connection);
                self.resolve_conflict(table, &values, message)
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_conflict(&self, table: &Table, values: &[(Field, Value)], message: String) -> DbResult<Option<Value>> {
        let Some(handler) = self.conflict_handlers.get(table.sql_name()) else {
            return Err(ConnectionError::UniqueViolation(message).into());
        };
        tracing::warn!("Unique constraint conflict on '{}' redirected to handler: {}", table.name(), message);
        let conflict = Conflict {
            table: table.name(),
            values,
            message: &message,
        };
        match handler(&conflict) {
            ConflictOutcome::Resolved(id) => Ok(id),
            ConflictOutcome::Reject(reason) => Err(DbError::Conflict {
                table: table.name().to_string(),
                message: reason,
            }),
            ConflictOutcome::Propagate => Err(ConnectionError::UniqueViolation(message).into()),
        }
    }

    pub fn update(
        &self,
        table: &Table,
        query: Option<Expression>,
        assignments: &[(Field, Operand)],
        ctx: &mut ExecutionContext,
    ) -> DbResult<u64> {
        let query = self.filtered_query(table, query)?;
        let statement = self.dialect.update(table.info(), query.as_ref(), assignments)?;
        self.execute(&statement, ctx)
    }

    /// Delete matching rows. Document backends enforce no references, so
    /// the `ondelete` actions of referencing collections are applied here.
    pub fn delete(&self, table: &Table, query: Option<Expression>, ctx: &mut ExecutionContext) -> DbResult<u64> {
        let query = self.filtered_query(table, query)?;
        let statement = self.dialect.delete(table.info(), query.as_ref())?;
        if statement.as_document().is_none() {
            return self.execute(&statement, ctx);
        }

        let referencing: Vec<Table> = self
            .tables
            .values()
            .filter(|t| !t.references_to(table.sql_name()).is_empty())
            .cloned()
            .collect();
        if referencing.is_empty() {
            return self.execute(&statement, ctx);
        }

        let id = Field::primary_key_of(table.info());
        let mut ids_select = Select::new([id.clone()]).ignore_common_filters();
        ids_select.query = query;
        let ids: Vec<Value> = self
            .select(&ids_select, ctx)?
            .iter()
            .map(|row| row.value(&id).cloned())
            .collect::<Result<_, _>>()?;

        let deleted = self.execute(&statement, ctx)?;
        for action in cascade_actions(&referencing, table, &ids)? {
            tracing::debug!("Cascading delete of '{}' to '{}'", table.name(), action.collection());
            self.execute(&CompiledStatement::document(action.command(), Vec::new()), ctx)?;
        }
        Ok(deleted)
    }

    pub fn commit(&self) -> DbResult<()> {
        Ok(self.connection.lock().commit()?)
    }

    pub fn rollback(&self) -> DbResult<()> {
        Ok(self.connection.lock().rollback()?)
    }

    /// `query` with the common filters of every table it touches, `table`
    /// included.
    fn filtered_query(&self, table: &Table, query: Option<Expression>) -> DbResult<Option<Expression>> {
        let mut map = TableMap::new();
        map.insert(table.info())?;
        if let Some(q) = &query {
            map.add_expression(q)?;
        }
        let mut query = query;
        for bound in self.bind_tables(&map)? {
            if let Some(filter) = bound.common_filter() {
                query = Some(and_once(query, filter));
            }
        }
        Ok(query)
    }

    fn fetch(&self, statement: &CompiledStatement, arity: usize) -> DbResult<ResultSet> {
        let start = Instant::now();
        let result = self.connection.lock().fetch_all(statement, arity);
        self.log_statement(statement, start.elapsed());
        Ok(result?)
    }

    fn execute(&self, statement: &CompiledStatement, ctx: &mut ExecutionContext) -> DbResult<u64> {
        let mut connection = self.connection.lock();
        self.execute_on(&mut **connection, statement, ctx)
    }

    fn execute_on(
        &self,
        connection: &mut dyn Connection,
        statement: &CompiledStatement,
        ctx: &mut ExecutionContext,
    ) -> DbResult<u64> {
        let started_at = Utc::now();
        let start = Instant::now();
        let result = connection.execute(statement);
        let duration = start.elapsed();
        self.log_statement(statement, duration);
        let affected = result?;
        ctx.record(StatementRecord {
            text: statement.text(),
            started_at,
            duration,
            cache: CacheOutcome::Bypass,
            rows: affected,
            rows_skipped: 0,
        });
        Ok(affected)
    }

    fn log_statement(&self, statement: &CompiledStatement, elapsed: Duration) {
        if self.config.log_statements {
            tracing::debug!("[{}] {} ({:?})", self.dialect.name(), statement.text(), elapsed);
        }
    }

    fn parse(&self, prepared: &Prepared, statement: &CompiledStatement, result: &ResultSet) -> DbResult<Rows> {
        let parser = RowParser::new(self.dialect.codec(), &prepared.select.fields, &statement.colnames)
            .with_tables(&prepared.tables)
            .strict(self.config.strict_decode);
        let rows = match result {
            ResultSet::Rows(raw) => parser.parse(raw.clone())?,
            ResultSet::Documents(docs) => parser.parse_documents(docs, &document_keys(statement))?,
        };
        for skipped in rows.skipped() {
            tracing::warn!("Skipped row {}: {}", skipped.index, skipped.error);
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("uri", &self.config.uri)
            .field("dialect", &self.dialect.name())
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn apply_common_filters(mut select: Select, tables: &[Table]) -> Select {
    for table in tables {
        let Some(filter) = table.common_filter() else {
            continue;
        };
        let id = table.info().id;
        let joined = select
            .options
            .join
            .iter_mut()
            .chain(select.options.left.iter_mut())
            .find(|j| j.table.info().id == id);
        match joined {
            Some(join) => {
                if !join.on.has_conjunct(&filter) {
                    join.on = join.on.clone().and(filter);
                }
            }
            None => select.query = Some(and_once(select.query.take(), filter)),
        }
    }
    select
}

fn and_once(query: Option<Expression>, term: Expression) -> Expression {
    match query {
        Some(q) if q.has_conjunct(&term) => q,
        Some(q) => q.and(term),
        None => term,
    }
}

/// Document keys to read from returned documents
fn document_keys(statement: &CompiledStatement) -> Vec<String> {
    match statement.as_document().map(|c| c.keys()) {
        Some(keys) if !keys.is_empty() => keys.to_vec(),
        _ => statement.colnames.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ScriptedConnection;
    use polydal_core::{Composable, FieldSpec, OnDelete, RawValue};
    use serde_json::json;

    fn person() -> Table {
        Table::builder("person")
            .field(("name", FieldType::string()))
            .field(FieldSpec::new("active", FieldType::Boolean).default(true))
            .common_filter(|t| t.field("active").map(|f| f.equal(true)).unwrap_or_else(|_| Expression::constant(true)))
            .build()
            .unwrap()
    }

    fn adapter(uri: &str, conn: ScriptedConnection, tables: &[Table]) -> Adapter {
        let mut adapter = Adapter::new(AdapterConfig::from_uri(uri), conn).unwrap();
        for t in tables {
            adapter.define_table(t.clone()).unwrap();
        }
        adapter
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let err = Adapter::new(AdapterConfig::from_uri("oracle://db"), ScriptedConnection::new()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown dialect: oracle");
    }

    #[test]
    fn test_undefined_table() {
        let p = person();
        let db = adapter("ref-sql:", ScriptedConnection::new(), &[]);
        let err = db.compile_select(&Select::new([p.field("name").unwrap()])).unwrap_err();
        assert!(matches!(err, DbError::TableNotDefined(ref t) if t == "person"));
    }

    #[test]
    fn test_define_table_name_conflict() {
        let mut db = adapter("ref-sql:", ScriptedConnection::new(), &[person()]);
        assert!(db.define_table(person()).is_err());
    }

    #[test]
    fn test_common_filter_injected_once() {
        let p = person();
        let db = adapter("ref-sql:", ScriptedConnection::new(), &[p.clone()]);
        let name = p.field("name").unwrap();
        let s = Select::new([name.clone()]).filter(name.equal("Ann"));

        let once = db.inject_common_filters(s.clone()).unwrap();
        let twice = db.inject_common_filters(once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            db.compile_select(&s).unwrap().as_sql().unwrap(),
            "SELECT person.name FROM person WHERE ((person.name = 'Ann') AND (person.active = 'T'));"
        );
        assert_eq!(
            db.compile_select(&s.ignore_common_filters()).unwrap().as_sql().unwrap(),
            "SELECT person.name FROM person WHERE (person.name = 'Ann');"
        );
    }

    #[test]
    fn test_select_parses_rows_and_records_context() {
        let p = person();
        let conn = ScriptedConnection::new().on_fetch(
            "FROM person",
            vec![
                vec![RawValue::Text("T".into()), RawValue::Text("Ann".into())],
                vec![RawValue::Text("maybe".into()), RawValue::Text("Bob".into())],
            ],
        );
        let db = adapter("ref-sql:", conn, &[p.clone()]);
        let mut ctx = ExecutionContext::new();
        let s = Select::new([p.field("active").unwrap(), p.field("name").unwrap()]);
        let rows = db.select(&s, &mut ctx).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows.skipped().len(), 1);
        assert_eq!(rows.first().unwrap().get("person", "name").unwrap(), &Value::Str("Ann".into()));
        let record = ctx.last().unwrap();
        assert_eq!((record.rows, record.rows_skipped), (1, 1));
        assert_eq!(record.cache, CacheOutcome::Bypass);
    }

    #[test]
    fn test_strict_decode_fails_the_result() {
        let p = person();
        let conn = ScriptedConnection::new().on_fetch("FROM person", vec![vec![RawValue::Text("maybe".into())]]);
        let mut config = AdapterConfig::from_uri("ref-sql:");
        config.strict_decode = true;
        let mut db = Adapter::new(config, conn).unwrap();
        db.define_table(p.clone()).unwrap();
        let err = db
            .select(&Select::new([p.field("active").unwrap()]), &mut ExecutionContext::new())
            .unwrap_err();
        assert!(err.to_string().contains("person.active"));
    }

    #[test]
    fn test_cached_select_runs_once() {
        let p = person();
        let conn = ScriptedConnection::new().on_fetch("FROM person", vec![vec![RawValue::Text("Ann".into())]]);
        let db = adapter("ref-sql:", conn.clone(), &[p.clone()]);
        let s = Select::new([p.field("name").unwrap()]);
        let mut ctx = ExecutionContext::new();

        let first = db.select_cached(&s, None, &mut ctx).unwrap();
        let second = db.select_cached(&s, None, &mut ctx).unwrap();
        assert_eq!(first.to_json(), second.to_json());
        assert_eq!(conn.executions(), 1);
        assert_eq!(ctx.cache_hits(), 1);
        assert_eq!(ctx.statements()[0].cache, CacheOutcome::Miss);
    }

    #[test]
    fn test_count_applies_common_filter() {
        let p = person();
        let conn = ScriptedConnection::new().on_fetch("COUNT", vec![vec![RawValue::Int(3)]]);
        let db = adapter("ref-sql:", conn.clone(), &[p.clone()]);
        let n = db.count(&p, None, None, &mut ExecutionContext::new()).unwrap();
        assert_eq!(n, 3);
        assert_eq!(conn.executed()[0], "SELECT COUNT(*) FROM person WHERE (person.active = 'T');");
    }

    #[test]
    fn test_insert_fills_defaults() {
        let p = person();
        let conn = ScriptedConnection::new().with_insert_ids(vec![Value::Int(5)]);
        let db = adapter("ref-sql:", conn.clone(), &[p.clone()]);
        let id = db
            .insert(&p, vec![(p.field("name").unwrap(), "Ann".into())], &mut ExecutionContext::new())
            .unwrap();
        assert_eq!(id, Some(Value::Int(5)));
        assert_eq!(conn.executed()[0], "INSERT INTO person(name, active) VALUES ('Ann', 'T');");
    }

    #[test]
    fn test_unique_violation_redirects_to_handler() {
        let p = person();
        let conn = ScriptedConnection::new().on_error(
            "INSERT",
            ConnectionError::UniqueViolation("person.name".into()),
        );
        let mut db = adapter("ref-sql:", conn, &[p.clone()]);
        let values = vec![(p.field("name").unwrap(), Value::from("Ann"))];
        let mut ctx = ExecutionContext::new();

        let err = db.insert(&p, values.clone(), &mut ctx).unwrap_err();
        assert!(matches!(err, DbError::Connection(ConnectionError::UniqueViolation(_))));

        db.on_conflict("person", |c| match c.value("name") {
            Some(Value::Str(name)) if name == "Ann" => ConflictOutcome::Resolved(Some(Value::Int(1))),
            _ => ConflictOutcome::Reject(format!("duplicate: {}", c.message)),
        })
        .unwrap();
        assert_eq!(db.insert(&p, values, &mut ctx).unwrap(), Some(Value::Int(1)));
        let err = db
            .insert(&p, vec![(p.field("name").unwrap(), "Bob".into())], &mut ctx)
            .unwrap_err();
        assert_eq!(err.to_string(), "Conflict on table 'person': duplicate: person.name");
    }

    #[test]
    fn test_document_delete_cascades() {
        let owner = Table::builder("owner").field(("name", FieldType::string())).build().unwrap();
        let pet = Table::builder("pet")
            .field(FieldSpec::new("owner", FieldType::Reference("owner".into())).ondelete(OnDelete::SetNull))
            .build()
            .unwrap();
        let conn = ScriptedConnection::new().on_find("\"command\":\"find\"", vec![json!({"_id": 7})]);
        let db = adapter("mongodb://localhost/test", conn.clone(), &[owner.clone(), pet]);
        let mut ctx = ExecutionContext::new();

        let deleted = db
            .delete(&owner, Some(owner.field("name").unwrap().equal("Ann")), &mut ctx)
            .unwrap();
        assert_eq!(deleted, 1);
        let executed = conn.executed();
        assert_eq!(executed.len(), 3);
        assert!(executed[0].contains("\"command\":\"find\""));
        assert!(executed[1].contains("\"command\":\"delete\""));
        assert!(executed[2].contains("\"$set\":{\"owner\":null}"));
        assert!(executed[2].contains("\"$in\":[7]"));
    }

    #[test]
    fn test_commit_and_rollback_reach_connection() {
        let conn = ScriptedConnection::new();
        let db = adapter("sqlite://test.db", conn.clone(), &[]);
        db.commit().unwrap();
        db.rollback().unwrap();
        assert_eq!((conn.commits(), conn.rollbacks()), (1, 1));
    }
}

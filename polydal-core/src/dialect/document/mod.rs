//! Document-store dialect.
//!
//! Compiles the same expression trees the SQL dialects render into filter
//! documents, projections and aggregation pipelines. A select is first
//! compiled as a plain `find`; anything the filter language cannot express
//! raises an escalation marker and the select is rebuilt as a pipeline
//! (see [`pipeline`]).

mod cascade;
mod expr;
mod filter;
mod pipeline;

pub use cascade::{cascade_actions, CascadeAction};
pub use filter::{false_filter, Escalation};

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::codec::{Codec, DocumentCodec, RawRow, RawValue};
use crate::error::{DalError, DalResult};
use crate::expr::{Expression, Operand, Operator, Select};
use crate::schema::{Field, Table, TableInfo};
use crate::tables::TableMap;
use crate::types::FieldType;
use crate::value::Value;

use super::{Capabilities, ColumnMode, CompiledStatement, Dialect, Fragment};

use expr::{ExprCompiler, Scope};
use filter::FilterCompiler;

pub(crate) const DIALECT: &str = "mongodb";

/// A command for a document store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DocumentCommand {
    Find {
        collection: String,
        filter: JsonValue,
        projection: JsonValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        sort: Option<JsonValue>,
        #[serde(skip_serializing_if = "Option::is_none")]
        skip: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
        /// Document keys of the output columns, in order
        keys: Vec<String>,
    },
    Aggregate {
        collection: String,
        pipeline: Vec<JsonValue>,
        keys: Vec<String>,
    },
    Count {
        collection: String,
        filter: JsonValue,
    },
    Insert {
        collection: String,
        document: JsonValue,
    },
    Update {
        collection: String,
        filter: JsonValue,
        /// Update document, or a pipeline (array) for computed updates
        update: JsonValue,
    },
    Delete {
        collection: String,
        filter: JsonValue,
    },
}

impl DocumentCommand {
    pub fn collection(&self) -> &str {
        match self {
            DocumentCommand::Find { collection, .. }
            | DocumentCommand::Aggregate { collection, .. }
            | DocumentCommand::Count { collection, .. }
            | DocumentCommand::Insert { collection, .. }
            | DocumentCommand::Update { collection, .. }
            | DocumentCommand::Delete { collection, .. } => collection,
        }
    }

    /// Keys to pull out of each returned document
    pub fn keys(&self) -> &[String] {
        match self {
            DocumentCommand::Find { keys, .. } | DocumentCommand::Aggregate { keys, .. } => keys,
            _ => &[],
        }
    }

    pub fn pipeline(&self) -> Option<&[JsonValue]> {
        match self {
            DocumentCommand::Aggregate { pipeline, .. } => Some(pipeline),
            _ => None,
        }
    }

    pub fn filter(&self) -> Option<&JsonValue> {
        match self {
            DocumentCommand::Find { filter, .. }
            | DocumentCommand::Count { filter, .. }
            | DocumentCommand::Update { filter, .. }
            | DocumentCommand::Delete { filter, .. } => Some(filter),
            _ => None,
        }
    }
}

/// Turn a returned document into a row, one value per key. Dotted keys
/// address nested documents; missing keys read as null.
pub fn flatten_document(doc: &JsonValue, keys: &[String]) -> RawRow {
    keys.iter()
        .map(|key| {
            key.split('.')
                .try_fold(doc, |node, part| node.get(part))
                .cloned()
                .map(RawValue::from)
                .unwrap_or(RawValue::Null)
        })
        .collect()
}

/// Key a field is stored under
pub(crate) fn storage_name(field: &Field) -> &str {
    if field.is_primary_key() {
        "_id"
    } else {
        field.name()
    }
}

/// Literal for comparison against something of type `expected`; numeric
/// literals against numeric fields keep their written form.
pub(crate) fn literal(
    codec: &DocumentCodec,
    value: &Value,
    expected: Option<&FieldType>,
    field: Option<&Field>,
) -> DalResult<JsonValue> {
    if value.is_null() {
        return Ok(JsonValue::Null);
    }
    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Decimal(_));
    let ty = match expected {
        Some(ty) if numeric && ty.is_numeric() => value.natural_type(),
        Some(ty) => ty.clone(),
        None => value.natural_type(),
    };
    let longname = field.map(Field::longname);
    let coerced = value.coerce(&ty, longname.as_deref())?;
    Ok(codec.encode_coerced(&coerced, &ty)?.to_json())
}

/// Value as stored in `field`
pub(crate) fn stored(codec: &DocumentCodec, value: &Value, field: &Field) -> DalResult<JsonValue> {
    let longname = field.longname();
    let coerced = value.coerce(field.field_type(), Some(&longname))?;
    Ok(codec.encode_coerced(&coerced, field.field_type())?.to_json())
}

/// The single collection an operation runs against
pub(crate) fn single_collection(tables: &TableMap) -> DalResult<&Arc<TableInfo>> {
    match tables.len() {
        0 => Err(DalError::InvalidQuery("no collection referenced".to_string())),
        1 => tables
            .first()
            .ok_or_else(|| DalError::InvalidQuery("no collection referenced".to_string())),
        _ => Err(DalError::not_supported(
            DIALECT,
            format!("query across collections {}", tables.names().join(", ")),
        )),
    }
}

/// Filter stages for a pipeline: conditions the filter language cannot
/// express are materialized in a leading `$project`, then matched.
pub(crate) fn filter_stages(
    codec: &DocumentCodec,
    query: Option<&Expression>,
    passthrough: &[Field],
) -> DalResult<Vec<JsonValue>> {
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    let mut compiler = FilterCompiler::pipeline(codec);
    let filter = compiler.compile(query)?;
    let conditions = compiler.into_materialized();

    let mut stages = Vec::new();
    if !conditions.is_empty() {
        let mut project = Map::new();
        for field in passthrough {
            project.insert(storage_name(field).to_string(), json!(1));
        }
        for (name, condition) in conditions {
            project.insert(name, condition);
        }
        stages.push(json!({ "$project": project }));
    }
    if filter != json!({}) {
        stages.push(json!({ "$match": filter }));
    }
    Ok(stages)
}

/// Filter for single-collection writes: a plain filter when possible,
/// `$expr` otherwise.
fn write_filter(codec: &DocumentCodec, query: Option<&Expression>) -> DalResult<JsonValue> {
    let Some(query) = query else {
        return Ok(json!({}));
    };
    let mut simple = FilterCompiler::simple(codec);
    let filter = simple.compile(query)?;
    if simple.markers().is_empty() {
        return Ok(filter);
    }
    let scope = Scope::default();
    let condition = ExprCompiler::new(codec, &scope).expression(query)?;
    Ok(json!({ "$expr": condition }))
}

fn check_collection(table: &TableInfo, query: Option<&Expression>) -> DalResult<()> {
    if let Some(query) = query {
        let tables = TableMap::from_expression(query)?;
        if tables.iter().any(|t| t.sql_name != table.sql_name) {
            return Err(DalError::not_supported(
                DIALECT,
                format!("filter on '{}' referencing other collections", table.name),
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct DocumentDialect {
    codec: DocumentCodec,
}

impl DocumentDialect {
    /// `field + n` / `field - n` on the assigned field itself
    fn increment(&self, field: &Field, operand: &Operand) -> DalResult<Option<JsonValue>> {
        let Operand::Expr(e) = operand else {
            return Ok(None);
        };
        let negate = match e.op {
            Operator::Add => false,
            Operator::Sub => true,
            _ => return Ok(None),
        };
        match (&e.first, &e.second) {
            (Operand::Field(f), Some(Operand::Value(v))) if f == field && field.field_type().is_numeric() => {
                let step = match (v, negate) {
                    (Value::Int(i), true) => Value::Int(-i),
                    (Value::Float(x), true) => Value::Float(-x),
                    (Value::Decimal(d), true) => Value::Decimal(-*d),
                    (other, false) => other.clone(),
                    _ => return Ok(None),
                };
                literal(&self.codec, &step, Some(field.field_type()), Some(field)).map(Some)
            }
            _ => Ok(None),
        }
    }
}

impl Dialect for DocumentDialect {
    fn name(&self) -> &str {
        DIALECT
    }

    fn codec(&self) -> &dyn Codec {
        &self.codec
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            subselect: false,
            joins: false,
            for_update: false,
            distinct_on: false,
            native_boolean: true,
            ddl: false,
        }
    }

    /// Queries render as filter documents (or `$expr` when the filter
    /// language falls short); other operands as aggregation expressions.
    fn compile(&self, operand: &Operand, expected: Option<&FieldType>, _mode: ColumnMode) -> DalResult<Fragment> {
        match operand {
            Operand::Expr(e) if e.is_query() => write_filter(&self.codec, Some(e)).map(Fragment::Document),
            Operand::Value(v) => literal(&self.codec, v, expected, None).map(Fragment::Document),
            other => {
                let scope = Scope::default();
                ExprCompiler::new(&self.codec, &scope)
                    .operand(other, expected)
                    .map(Fragment::Document)
            }
        }
    }

    fn select(&self, select: &Select) -> DalResult<CompiledStatement> {
        pipeline::compile_select(&self.codec, select)
    }

    fn count(
        &self,
        table: &Arc<TableInfo>,
        query: Option<&Expression>,
        distinct: Option<&Operand>,
    ) -> DalResult<CompiledStatement> {
        check_collection(table, query)?;
        let collection = table.sql_name.clone();
        let counter = json!({ "$group": { "_id": null, "count": { "$sum": 1 } } });

        let Some(distinct) = distinct else {
            let mut simple = FilterCompiler::simple(&self.codec);
            let filter = match query {
                Some(q) => simple.compile(q)?,
                None => json!({}),
            };
            if simple.markers().is_empty() {
                return Ok(CompiledStatement::document(
                    DocumentCommand::Count { collection, filter },
                    vec!["count".to_string()],
                ));
            }
            let mut stages = filter_stages(&self.codec, query, &[])?;
            stages.push(counter);
            return Ok(CompiledStatement::document(
                DocumentCommand::Aggregate {
                    collection,
                    pipeline: stages,
                    keys: vec!["count".to_string()],
                },
                vec!["count".to_string()],
            ));
        };

        // distinct counting always needs a pipeline: one $group collects
        // the distinct values, a second counts them
        let mut passthrough = Vec::new();
        distinct.walk_fields(&mut |f| passthrough.push(f.clone()));
        let mut stages = filter_stages(&self.codec, query, &passthrough)?;
        let scope = Scope::default();
        let key = ExprCompiler::new(&self.codec, &scope).operand(distinct, None)?;
        stages.push(json!({ "$group": { "_id": key } }));
        stages.push(counter);
        Ok(CompiledStatement::document(
            DocumentCommand::Aggregate {
                collection,
                pipeline: stages,
                keys: vec!["count".to_string()],
            },
            vec!["count".to_string()],
        ))
    }

    fn insert(&self, table: &Arc<TableInfo>, values: &[(Field, Value)]) -> DalResult<CompiledStatement> {
        let mut document = Map::new();
        for (field, value) in values {
            if field.table().sql_name != table.sql_name {
                return Err(DalError::UnknownField {
                    table: table.name.clone(),
                    field: field.longname(),
                });
            }
            document.insert(storage_name(field).to_string(), stored(&self.codec, value, field)?);
        }
        Ok(CompiledStatement::document(
            DocumentCommand::Insert {
                collection: table.sql_name.clone(),
                document: JsonValue::Object(document),
            },
            Vec::new(),
        ))
    }

    fn update(
        &self,
        table: &Arc<TableInfo>,
        query: Option<&Expression>,
        assignments: &[(Field, Operand)],
    ) -> DalResult<CompiledStatement> {
        if assignments.is_empty() {
            return Err(DalError::InvalidQuery(format!(
                "update of '{}' without assignments",
                table.name
            )));
        }
        check_collection(table, query)?;

        let mut set = Map::new();
        let mut inc = Map::new();
        let mut computed = false;
        for (field, operand) in assignments {
            if field.table().sql_name != table.sql_name {
                return Err(DalError::UnknownField {
                    table: table.name.clone(),
                    field: field.longname(),
                });
            }
            let key = storage_name(field).to_string();
            match operand {
                Operand::Value(v) => {
                    set.insert(key, stored(&self.codec, v, field)?);
                }
                other => match self.increment(field, other)? {
                    Some(step) => {
                        inc.insert(key, step);
                    }
                    None => computed = true,
                },
            }
        }

        let update = if computed {
            // pipeline update: every assignment becomes a $set expression
            let scope = Scope::default();
            let compiler = ExprCompiler::new(&self.codec, &scope);
            let mut stage = Map::new();
            for (field, operand) in assignments {
                let value = match operand {
                    Operand::Value(v) => json!({ "$literal": stored(&self.codec, v, field)? }),
                    other => compiler.operand(other, Some(field.field_type()))?,
                };
                stage.insert(storage_name(field).to_string(), value);
            }
            json!([{ "$set": stage }])
        } else {
            let mut doc = Map::new();
            if !set.is_empty() {
                doc.insert("$set".to_string(), JsonValue::Object(set));
            }
            if !inc.is_empty() {
                doc.insert("$inc".to_string(), JsonValue::Object(inc));
            }
            JsonValue::Object(doc)
        };

        Ok(CompiledStatement::document(
            DocumentCommand::Update {
                collection: table.sql_name.clone(),
                filter: write_filter(&self.codec, query)?,
                update,
            },
            Vec::new(),
        ))
    }

    fn delete(&self, table: &Arc<TableInfo>, query: Option<&Expression>) -> DalResult<CompiledStatement> {
        check_collection(table, query)?;
        Ok(CompiledStatement::document(
            DocumentCommand::Delete {
                collection: table.sql_name.clone(),
                filter: write_filter(&self.codec, query)?,
            },
            Vec::new(),
        ))
    }

    fn create_table(&self, _table: &Table) -> DalResult<String> {
        Err(DalError::not_supported(DIALECT, "create_table"))
    }

    fn drop_table(&self, _table: &Table) -> DalResult<String> {
        Err(DalError::not_supported(DIALECT, "drop_table"))
    }

    fn create_index(&self, _table: &Table, _name: &str, _fields: &[Field], _unique: bool) -> DalResult<String> {
        Err(DalError::not_supported(DIALECT, "create_index"))
    }
}

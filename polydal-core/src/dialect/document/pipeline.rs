//! Select planning for the document dialect.
//!
//! Planning runs in two phases. The simple attempt compiles the select as a
//! `find` (filter, projection, sort, skip, limit) and records an
//! [`Escalation`] for every construct `find` cannot express. Any marker
//! discards the attempt and the select is rebuilt from scratch as an
//! aggregation pipeline with the stage order
//!
//! `$project` (materialized conditions), `$match`, `$group` (two of them
//! when counting distinct values), `$project` (output shape plus
//! `__having__`), `$match` on `__having__`, `$project` dropping it, then
//! `$sort`, `$skip`, `$limit`.

use serde_json::{json, Map, Value as JsonValue};

use super::expr::{ExprCompiler, Scope};
use super::filter::{Escalation, FilterCompiler};
use super::{filter_stages, literal, single_collection, storage_name, DocumentCommand, DIALECT};
use crate::codec::DocumentCodec;
use crate::dialect::{colname, CompiledStatement};
use crate::dialect::sql::describe;
use crate::error::{DalError, DalResult};
use crate::expr::{Distinct, Expression, Operand, Operator, Select};
use crate::schema::Field;
use crate::tables::TableMap;

/// Outcome of the simple attempt
#[derive(Debug)]
pub(crate) enum Attempt {
    Simple(DocumentCommand),
    Escalate(Vec<Escalation>),
}

pub(crate) fn compile_select(codec: &DocumentCodec, select: &Select) -> DalResult<CompiledStatement> {
    validate(select)?;
    let colnames = select
        .fields
        .iter()
        .map(|f| colname(f, || Ok(describe(f))))
        .collect::<DalResult<Vec<_>>>()?;
    let command = match attempt_simple(codec, select)? {
        Attempt::Simple(find) => find,
        Attempt::Escalate(_) => rebuild_pipeline(codec, select)?,
    };
    Ok(CompiledStatement::document(command, colnames))
}

fn validate(select: &Select) -> DalResult<()> {
    let opts = &select.options;
    if select.fields.is_empty() {
        return Err(DalError::InvalidQuery("select without output fields".to_string()));
    }
    if opts.for_update {
        return Err(DalError::not_supported(DIALECT, "FOR UPDATE"));
    }
    if !opts.join.is_empty() || !opts.left.is_empty() {
        return Err(DalError::not_supported(DIALECT, "join"));
    }
    if matches!(opts.distinct, Distinct::On(_)) {
        return Err(DalError::not_supported(DIALECT, "DISTINCT ON"));
    }
    Ok(())
}

fn collection(select: &Select) -> DalResult<String> {
    let tables = TableMap::from_select(select)?;
    single_collection(&tables).map(|info| info.sql_name.clone())
}

/// Sort key of a plain (possibly descending) field
fn sort_field(operand: &Operand) -> Option<(&Field, i64)> {
    match operand {
        Operand::Field(f) => Some((f, 1)),
        Operand::Expr(e) if e.op == Operator::Desc => e.first.as_field().map(|f| (f, -1)),
        _ => None,
    }
}

fn default_order(select: &Select, grouped: bool) -> bool {
    let opts = &select.options;
    select.options.orderby.is_empty()
        && select.is_paginated()
        && opts.orderby_on_limitby.unwrap_or(true)
        && !grouped
        && opts.distinct == Distinct::None
}

pub(crate) fn attempt_simple(codec: &DocumentCodec, select: &Select) -> DalResult<Attempt> {
    let opts = &select.options;
    let mut markers = Vec::new();
    if !opts.groupby.is_empty() {
        markers.push(Escalation::new("groupby"));
    }
    if opts.having.is_some() {
        markers.push(Escalation::new("having"));
    }
    if opts.distinct == Distinct::Rows {
        markers.push(Escalation::new("distinct"));
    }
    for field in &select.fields {
        if field.has_aggregate() {
            markers.push(Escalation::new(format!("aggregate {}", describe(field))));
        } else if field.as_field().is_none() {
            markers.push(Escalation::new(format!("computed output {}", describe(field))));
        }
    }
    for key in &opts.orderby {
        if sort_field(key).is_none() {
            markers.push(Escalation::new(format!("computed ordering {}", describe(key))));
        }
    }
    let mut filter_compiler = FilterCompiler::simple(codec);
    let filter = match &select.query {
        Some(q) => filter_compiler.compile(q)?,
        None => json!({}),
    };
    markers.extend(filter_compiler.markers().iter().cloned());
    if !markers.is_empty() {
        return Ok(Attempt::Escalate(markers));
    }

    let mut projection = Map::new();
    let mut keys = Vec::with_capacity(select.fields.len());
    for field in select.fields.iter().filter_map(Operand::as_field) {
        let key = storage_name(field);
        projection.insert(key.to_string(), json!(1));
        keys.push(key.to_string());
    }
    if !projection.contains_key("_id") {
        projection.insert("_id".to_string(), json!(0));
    }

    let mut sort = Map::new();
    for (field, direction) in opts.orderby.iter().filter_map(sort_field) {
        sort.insert(storage_name(field).to_string(), json!(direction));
    }
    if default_order(select, false) {
        sort.insert("_id".to_string(), json!(1));
    }

    Ok(Attempt::Simple(DocumentCommand::Find {
        collection: collection(select)?,
        filter,
        projection: JsonValue::Object(projection),
        sort: (!sort.is_empty()).then_some(JsonValue::Object(sort)),
        skip: opts.offset,
        limit: opts.limit,
        keys,
    }))
}

/// Every aggregate below `operand`, in first-seen order
fn collect_aggregates(operand: &Operand, out: &mut Vec<Expression>) {
    if let Operand::Expr(e) = operand {
        if e.op.is_aggregate() {
            if !out.contains(e) {
                out.push((**e).clone());
            }
            return;
        }
        collect_aggregates(&e.first, out);
        if let Some(second) = &e.second {
            collect_aggregates(second, out);
        }
    }
}

/// The operand counted with `COUNT(DISTINCT)`, if any. Two stages can
/// only count one distinct operand.
fn distinct_operand(aggregates: &[Expression]) -> DalResult<Option<&Operand>> {
    let mut found: Option<&Operand> = None;
    for aggregate in aggregates {
        if aggregate.op != (Operator::Count { distinct: true }) {
            continue;
        }
        match found {
            Some(first) if first != &aggregate.first => {
                return Err(DalError::not_supported(
                    DIALECT,
                    format!("COUNT(DISTINCT) of both {} and {}", describe(first), describe(&aggregate.first)),
                ));
            }
            _ => found = Some(&aggregate.first),
        }
    }
    Ok(found)
}

fn group_id(ids: Map<String, JsonValue>) -> JsonValue {
    if ids.is_empty() {
        JsonValue::Null
    } else {
        JsonValue::Object(ids)
    }
}

/// Output key of a requested field in the final projection
fn output_key(operand: &Operand, index: usize) -> String {
    match operand {
        Operand::Field(f) => f.name().to_string(),
        Operand::Expr(e) => match &e.op {
            Operator::Alias(name) => name.clone(),
            _ => format!("__expr_{}", index),
        },
        _ => format!("__expr_{}", index),
    }
}

pub(crate) fn rebuild_pipeline(codec: &DocumentCodec, select: &Select) -> DalResult<DocumentCommand> {
    let opts = &select.options;
    let collection = collection(select)?;
    let mut stages = filter_stages(codec, select.query.as_ref(), &select.referenced_fields())?;

    let groupby: Vec<Operand> = if opts.distinct == Distinct::Rows && opts.groupby.is_empty() {
        select.fields.iter().map(|f| f.unwrapped().clone()).collect()
    } else {
        opts.groupby.clone()
    };
    let mut aggregates = Vec::new();
    for operand in select.fields.iter().chain(&opts.orderby) {
        collect_aggregates(operand, &mut aggregates);
    }
    if let Some(having) = &opts.having {
        collect_aggregates(&Operand::Expr(Box::new(having.clone())), &mut aggregates);
    }
    let grouped = !groupby.is_empty() || !aggregates.is_empty();

    let mut scope = Scope::default();
    if grouped {
        let ungrouped = Scope::default();
        let pre = ExprCompiler::new(codec, &ungrouped);
        let mut post = Scope::grouped();
        let mut ids = Map::new();
        for (i, key) in groupby.iter().enumerate() {
            let name = format!("g{}", i);
            ids.insert(name.clone(), pre.operand(key, None)?);
            post.bind(key.unwrapped().clone(), json!(format!("$_id.{}", name)));
        }
        match distinct_operand(&aggregates)? {
            None => {
                let mut group = Map::new();
                group.insert("_id".to_string(), group_id(ids));
                for (i, aggregate) in aggregates.iter().enumerate() {
                    let name = format!("__agg_{}", i);
                    let (accumulator, reader) = pre.accumulator(aggregate, &name)?;
                    group.insert(name, accumulator);
                    post.bind(Operand::Expr(Box::new(aggregate.clone())), reader);
                }
                stages.push(json!({ "$group": group }));
            }
            Some(counted) => {
                // first $group collects the distinct values per group key,
                // the second counts them and combines the partials
                let mut first_id = ids.clone();
                first_id.insert("__distinct".to_string(), pre.operand(counted, None)?);
                let mut first = Map::new();
                first.insert("_id".to_string(), JsonValue::Object(first_id));
                let regrouped: Map<String, JsonValue> = ids
                    .keys()
                    .map(|name| (name.clone(), json!(format!("$_id.{}", name))))
                    .collect();
                let mut second = Map::new();
                second.insert("_id".to_string(), group_id(regrouped));
                for (i, aggregate) in aggregates.iter().enumerate() {
                    let rollup = pre.rollup(aggregate, &format!("__agg_{}", i))?;
                    first.extend(rollup.partial);
                    second.extend(rollup.combine);
                    post.bind(Operand::Expr(Box::new(aggregate.clone())), rollup.reader);
                }
                stages.push(json!({ "$group": first }));
                stages.push(json!({ "$group": second }));
            }
        }
        scope = post;
    }

    let compiler = ExprCompiler::new(codec, &scope);
    let mut project = Map::new();
    project.insert("_id".to_string(), json!(0));
    let mut keys = Vec::with_capacity(select.fields.len());
    for (i, operand) in select.fields.iter().enumerate() {
        let key = output_key(operand, i);
        let value = match operand.unwrapped() {
            Operand::Value(v) => json!({ "$literal": literal(codec, v, None, None)? }),
            other => compiler.operand(other, None)?,
        };
        project.insert(key.clone(), value);
        keys.push(key);
    }

    if let Some(having) = &opts.having {
        project.insert("__having__".to_string(), compiler.expression(having)?);
    }

    let mut order = opts.orderby.clone();
    if default_order(select, grouped) {
        if let Some(table) = TableMap::from_select(select)?.first() {
            order.push(Operand::Field(Field::primary_key_of(table)));
        }
    }
    let mut sort = Map::new();
    for (i, key) in order.iter().enumerate() {
        let (inner, direction) = match key {
            Operand::Expr(e) if e.op == Operator::Desc => (e.first.unwrapped(), -1),
            other => (other.unwrapped(), 1),
        };
        let existing = select
            .fields
            .iter()
            .position(|f| f.unwrapped() == inner)
            .map(|pos| keys[pos].clone());
        let name = match existing {
            Some(name) => name,
            None => {
                let name = format!("__sort_{}", i);
                project.insert(name.clone(), compiler.operand(inner, None)?);
                name
            }
        };
        sort.insert(name, json!(direction));
    }

    stages.push(json!({ "$project": project }));
    if opts.having.is_some() {
        stages.push(json!({ "$match": { "__having__": true } }));
        stages.push(json!({ "$project": { "__having__": 0 } }));
    }
    if !sort.is_empty() {
        stages.push(json!({ "$sort": sort }));
    }
    if let Some(skip) = opts.offset {
        stages.push(json!({ "$skip": skip }));
    }
    if let Some(limit) = opts.limit {
        stages.push(json!({ "$limit": limit }));
    }

    Ok(DocumentCommand::Aggregate {
        collection,
        pipeline: stages,
        keys,
    })
}

//! Statement assembly: select, count, insert, update, delete.

use std::sync::Arc;

use crate::dialect::{colname, ColumnMode, CompiledStatement};
use crate::error::{DalError, DalResult};
use crate::expr::{Distinct, Expression, IntoOperand, Operand, Operator, Select};
use crate::schema::{Field, TableInfo};
use crate::tables::TableMap;
use crate::value::Value;

use super::{SqlCompiler, SqlDialect};

fn table_ref(d: &dyn SqlDialect, info: &TableInfo) -> String {
    if info.is_alias() {
        format!("{} AS {}", d.quote(&info.sql_name), d.quote(&info.name))
    } else {
        d.quote(&info.sql_name)
    }
}

fn join_list(c: &SqlCompiler<'_>, operands: &[Operand]) -> DalResult<String> {
    operands
        .iter()
        .map(|o| c.operand(o, None, ColumnMode::Addressable))
        .collect::<DalResult<Vec<_>>>()
        .map(|parts| parts.join(", "))
}

/// Select text without the trailing `;`, also used for nested selects.
pub(crate) fn select_sql(d: &dyn SqlDialect, select: &Select) -> DalResult<String> {
    assemble(d, select, None)
}

pub(crate) fn select(d: &dyn SqlDialect, select: &Select) -> DalResult<CompiledStatement> {
    let sql = assemble(d, select, None)?;
    let c = SqlCompiler::new(d);
    let colnames = select
        .fields
        .iter()
        .map(|f| colname(f, || c.operand(f, None, ColumnMode::Labeled)))
        .collect::<DalResult<Vec<_>>>()?;
    Ok(CompiledStatement::sql(format!("{};", sql), colnames))
}

fn assemble(d: &dyn SqlDialect, select: &Select, base: Option<&Arc<TableInfo>>) -> DalResult<String> {
    let caps = d.features();
    let opts = &select.options;
    if opts.for_update && !caps.for_update {
        return Err(DalError::not_supported(d.backend(), "FOR UPDATE"));
    }
    if matches!(opts.distinct, Distinct::On(_)) && !caps.distinct_on {
        return Err(DalError::not_supported(d.backend(), "DISTINCT ON"));
    }
    if select.fields.is_empty() {
        return Err(DalError::InvalidQuery("select without output fields".to_string()));
    }
    let c = SqlCompiler::new(d);

    let mut tables = TableMap::new();
    if let Some(base) = base {
        tables.insert(base)?;
    }
    for field in select.referenced_fields() {
        tables.add_field(&field)?;
    }
    let mut targets = TableMap::new();
    for join in opts.join.iter().chain(&opts.left) {
        let info = join.table.info();
        if targets.get(&info.name).is_some_and(|t| t.id == info.id) {
            return Err(DalError::InvalidQuery(format!(
                "table '{}' appears in more than one join clause",
                info.name
            )));
        }
        targets.insert(info)?;
        tables.add_expression(&join.on)?;
    }
    // every participating table, checked for name collisions
    let mut all = tables.clone();
    all.merge(&targets)?;

    let cross: Vec<&Arc<TableInfo>> = tables.iter().filter(|t| !targets.contains(&t.name)).collect();
    if cross.is_empty() {
        return Err(DalError::InvalidQuery(
            "select has no table outside its join clauses".to_string(),
        ));
    }

    let mut from = cross
        .iter()
        .map(|t| table_ref(d, t))
        .collect::<Vec<_>>()
        .join(" CROSS JOIN ");
    for join in &opts.join {
        from.push_str(&format!(
            " JOIN {} ON {}",
            table_ref(d, join.table.info()),
            c.expression(&join.on, ColumnMode::Addressable)?
        ));
    }
    for join in &opts.left {
        from.push_str(&format!(
            " {} {} ON {}",
            d.left_join_keyword(),
            table_ref(d, join.table.info()),
            c.expression(&join.on, ColumnMode::Addressable)?
        ));
    }

    let fields = select
        .fields
        .iter()
        .map(|f| c.operand(f, None, ColumnMode::Labeled))
        .collect::<DalResult<Vec<_>>>()?
        .join(", ");

    let mut sql = match &opts.distinct {
        Distinct::None => format!("SELECT {} FROM {}", fields, from),
        Distinct::Rows => format!("SELECT DISTINCT {} FROM {}", fields, from),
        Distinct::On(keys) => format!(
            "SELECT DISTINCT ON ({}) {} FROM {}",
            join_list(&c, keys)?,
            fields,
            from
        ),
    };

    if let Some(query) = &select.query {
        sql.push_str(&format!(" WHERE {}", c.expression(query, ColumnMode::Addressable)?));
    }
    if !opts.groupby.is_empty() {
        sql.push_str(&format!(" GROUP BY {}", join_list(&c, &opts.groupby)?));
    }
    if let Some(having) = &opts.having {
        sql.push_str(&format!(" HAVING {}", c.expression(having, ColumnMode::Addressable)?));
    }

    if !opts.orderby.is_empty() {
        sql.push_str(&format!(" ORDER BY {}", join_list(&c, &opts.orderby)?));
    } else if needs_default_order(select) {
        let mut keys = Vec::new();
        if let Distinct::On(on) = &opts.distinct {
            keys.push(join_list(&c, on)?);
        }
        for info in cross.iter().copied().chain(targets.iter()) {
            keys.push(format!("{}.{}", d.quote(&info.name), d.quote(&info.primary_key)));
        }
        sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
    }

    sql.push_str(&d.pagination(opts.limit, opts.offset));
    if opts.for_update {
        sql.push_str(" FOR UPDATE");
    }
    Ok(sql)
}

/// Paginated selects get a stable order, except when grouped, fully
/// aggregated or row-distinct, where a key order is not well defined.
fn needs_default_order(select: &Select) -> bool {
    let opts = &select.options;
    select.is_paginated()
        && opts.orderby_on_limitby.unwrap_or(true)
        && opts.groupby.is_empty()
        && !select.is_aggregate_only()
        && opts.distinct != Distinct::Rows
}

pub(crate) fn count(
    d: &dyn SqlDialect,
    table: &Arc<TableInfo>,
    query: Option<&Expression>,
    distinct: Option<&Operand>,
) -> DalResult<CompiledStatement> {
    let counter = match distinct {
        Some(operand) => Expression::new(Operator::Count { distinct: true }, operand.clone(), None),
        None => Expression::new(
            Operator::Count { distinct: false },
            Operand::Value(Value::Null),
            None,
        ),
    };
    let c = SqlCompiler::new(d);
    let label = c.expression(&counter, ColumnMode::Labeled)?;
    let mut select = Select::new([counter]);
    select.query = query.cloned();
    let sql = assemble(d, &select, Some(table))?;
    Ok(CompiledStatement::sql(format!("{};", sql), vec![label]))
}

fn check_target(table: &TableInfo, field: &Field) -> DalResult<()> {
    if field.table().sql_name != table.sql_name {
        return Err(DalError::UnknownField {
            table: table.name.clone(),
            field: field.longname(),
        });
    }
    Ok(())
}

pub(crate) fn insert(
    d: &dyn SqlDialect,
    table: &Arc<TableInfo>,
    values: &[(Field, Value)],
) -> DalResult<CompiledStatement> {
    let name = d.quote(&table.sql_name);
    if values.is_empty() {
        return Ok(CompiledStatement::sql(d.empty_insert(&name), Vec::new()));
    }
    let c = SqlCompiler::new(d);
    let mut columns = Vec::with_capacity(values.len());
    let mut literals = Vec::with_capacity(values.len());
    for (field, value) in values {
        check_target(table, field)?;
        columns.push(d.quote(field.name()));
        literals.push(c.stored_literal(value, field)?);
    }
    let sql = format!(
        "INSERT INTO {}({}) VALUES ({});",
        name,
        columns.join(", "),
        literals.join(", ")
    );
    Ok(CompiledStatement::sql(sql, Vec::new()))
}

/// WHERE clause for update/delete on `table`. A filter touching other
/// tables is rewritten to a primary-key membership test.
fn where_clause(d: &dyn SqlDialect, table: &Arc<TableInfo>, query: Option<&Expression>) -> DalResult<String> {
    let Some(query) = query else {
        return Ok(String::new());
    };
    let c = SqlCompiler::new(d);
    let tables = TableMap::from_expression(query)?;
    let local = !table.is_alias() && tables.iter().all(|t| t.id == table.id);
    if local {
        return Ok(format!(" WHERE {}", c.expression(query, ColumnMode::Bare)?));
    }
    if !d.features().subselect {
        return Err(DalError::not_supported(d.backend(), "filter spanning other tables"));
    }
    let pk = Field::primary_key_of(table);
    let mut sub = Select::new([pk.into_operand()]);
    sub.query = Some(query.clone());
    let sub_sql = assemble(d, &sub, Some(table))?;
    Ok(format!(" WHERE ({} IN ({}))", d.quote(&table.primary_key), sub_sql))
}

pub(crate) fn update(
    d: &dyn SqlDialect,
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
    let c = SqlCompiler::new(d);
    let mut sets = Vec::with_capacity(assignments.len());
    for (field, operand) in assignments {
        check_target(table, field)?;
        let value = match operand {
            Operand::Value(v) => c.stored_literal(v, field)?,
            other => {
                let mut foreign = false;
                other.walk_fields(&mut |f| foreign |= f.table().sql_name != table.sql_name);
                if foreign {
                    return Err(DalError::not_supported(
                        d.backend(),
                        format!("assignment to {} from another table", field.longname()),
                    ));
                }
                c.operand(other, Some(field.field_type()), ColumnMode::Bare)?
            }
        };
        sets.push(format!("{}={}", d.quote(field.name()), value));
    }
    let sql = format!(
        "UPDATE {} SET {}{};",
        d.quote(&table.sql_name),
        sets.join(", "),
        where_clause(d, table, query)?
    );
    Ok(CompiledStatement::sql(sql, Vec::new()))
}

pub(crate) fn delete(
    d: &dyn SqlDialect,
    table: &Arc<TableInfo>,
    query: Option<&Expression>,
) -> DalResult<CompiledStatement> {
    let sql = format!(
        "DELETE FROM {}{};",
        d.quote(&table.sql_name),
        where_clause(d, table, query)?
    );
    Ok(CompiledStatement::sql(sql, Vec::new()))
}

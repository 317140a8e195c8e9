use crate::error::{DalError, DalResult};
use crate::schema::{Field, Table};
use crate::types::FieldType;

use super::{SqlCompiler, SqlDialect};

pub(crate) fn create_table(d: &dyn SqlDialect, table: &Table) -> DalResult<String> {
    let c = SqlCompiler::new(d);
    let mut columns = Vec::with_capacity(table.fields().len());
    let mut constraints = Vec::new();

    for field in table.fields() {
        let name = d.quote(field.name());
        let mut column = format!("{} {}", name, d.sql_type(field.field_type()));
        if field.is_primary_key() {
            match (field.field_type(), d.primary_key_clause(field.name())) {
                (FieldType::Id, Some(clause)) => constraints.push(clause),
                (FieldType::Id, None) => {}
                _ => constraints.push(format!("PRIMARY KEY ({})", name)),
            }
            columns.push(column);
            continue;
        }
        if field.notnull() {
            column.push_str(" NOT NULL");
        }
        if field.unique() {
            column.push_str(" UNIQUE");
        }
        if let Some(default) = field.default_value() {
            column.push_str(&format!(" DEFAULT {}", c.stored_literal(default, field)?));
        }
        if let FieldType::Reference(target) = field.field_type() {
            let target_sql = d.quote(target);
            let key = d.quote("id");
            if d.inline_references() {
                column.push_str(&format!(
                    " REFERENCES {} ({}) ON DELETE {}",
                    target_sql,
                    key,
                    field.ondelete()
                ));
            } else {
                constraints.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                    name,
                    target_sql,
                    key,
                    field.ondelete()
                ));
            }
        }
        columns.push(column);
    }

    columns.extend(constraints);
    Ok(format!(
        "CREATE TABLE {}(\n    {}\n);",
        d.quote(table.sql_name()),
        columns.join(",\n    ")
    ))
}

pub(crate) fn drop_table(d: &dyn SqlDialect, table: &Table) -> DalResult<String> {
    Ok(format!(
        "DROP TABLE {}{};",
        d.quote(table.sql_name()),
        d.drop_table_suffix()
    ))
}

pub(crate) fn create_index(
    d: &dyn SqlDialect,
    table: &Table,
    name: &str,
    fields: &[Field],
    unique: bool,
) -> DalResult<String> {
    if fields.is_empty() {
        return Err(DalError::InvalidQuery(format!("index '{}' has no fields", name)));
    }
    let mut columns = Vec::with_capacity(fields.len());
    for field in fields {
        if field.table().sql_name != table.sql_name() {
            return Err(DalError::UnknownField {
                table: table.name().to_string(),
                field: field.longname(),
            });
        }
        columns.push(d.quote(field.name()));
    }
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({});",
        if unique { "UNIQUE " } else { "" },
        d.quote(name),
        d.quote(table.sql_name()),
        columns.join(", ")
    ))
}

//! SQL Adapter Tests
//!
//! Tests for:
//! - Join assembly and common filters through the adapter
//! - Default ordering of paginated selects
//! - Null checks and empty membership tests
//! - Row reconstruction with virtual fields
//! - Writes spanning several tables

mod common;

use common::{adapter, adapter_with, shop};
use polydal::{AdapterConfig, DbError, ExecutionContext, ScriptedConnection};
use polydal_core::{Composable, DalError, IntoOperand, RawValue, Select, Value};

fn sql(db: &polydal::Adapter, select: &Select) -> String {
    db.compile_select(select).unwrap().as_sql().unwrap().to_string()
}

#[test]
fn test_unjoined_table_is_cross_joined_once() {
    let s = shop();
    let db = adapter("ref-sql:", ScriptedConnection::new(), &s.tables());
    let select = Select::new([
        s.person.field("name").unwrap(),
        s.pet.field("name").unwrap(),
        s.item.field("name").unwrap(),
    ])
    .join(&s.pet, s.pet.field("owner").unwrap().equal(s.person.id().unwrap()));

    let text = sql(&db, &select);
    assert_eq!(
        text,
        "SELECT person.name, pet.name, item.name FROM person CROSS JOIN item \
         JOIN pet ON (pet.owner = person.id) WHERE (item.deleted = 'F');"
    );
    assert_eq!(text.matches("CROSS JOIN").count(), 1);
    assert_eq!(text.matches("JOIN pet").count(), 1);
}

#[test]
fn test_joined_table_filter_goes_into_on_clause() {
    let s = shop();
    let db = adapter("ref-sql:", ScriptedConnection::new(), &s.tables());
    let person_name = s.person.field("name").unwrap();
    let item_name = s.item.field("name").unwrap();
    let select = Select::new([person_name.clone(), item_name.clone()])
        .left_join(&s.item, item_name.equal(person_name));

    assert_eq!(
        sql(&db, &select),
        "SELECT person.name, item.name FROM person \
         LEFT JOIN item ON ((item.name = person.name) AND (item.deleted = 'F'));"
    );
}

#[test]
fn test_inner_and_left_joins_keep_every_table_once() {
    let s = shop();
    let db = adapter("postgres://localhost/shop", ScriptedConnection::new(), &s.tables());
    let label = s.toy.field("label").unwrap();
    let select = Select::new([s.person.field("name").unwrap(), label.clone()])
        .join(&s.pet, s.pet.field("owner").unwrap().equal(s.person.id().unwrap()))
        .left_join(&s.toy, label.equal(s.pet.field("name").unwrap()));

    let text = sql(&db, &select);
    assert_eq!(text.matches("\"person\"").count(), 3);
    assert!(text.contains("FROM \"person\" JOIN \"pet\""));
    assert!(text.contains("LEFT OUTER JOIN \"toy\""));
    assert!(!text.contains("CROSS JOIN"));
}

#[test]
fn test_pagination_order_follows_config() {
    let s = shop();
    let name = s.person.field("name").unwrap();
    let select = Select::new([name.clone()]).limitby(10, 20);

    let db = adapter("ref-sql:", ScriptedConnection::new(), &s.tables());
    assert_eq!(
        sql(&db, &select),
        "SELECT person.name FROM person ORDER BY person.id LIMIT 10 OFFSET 10;"
    );

    let mut config = AdapterConfig::from_uri("ref-sql:");
    config.orderby_on_limitby = false;
    let db = adapter_with(config, ScriptedConnection::new(), &s.tables());
    assert_eq!(sql(&db, &select), "SELECT person.name FROM person LIMIT 10 OFFSET 10;");

    // explicit per-query choice wins over the configuration
    assert_eq!(
        sql(&db, &select.clone().orderby_on_limitby(true)),
        "SELECT person.name FROM person ORDER BY person.id LIMIT 10 OFFSET 10;"
    );
}

#[test]
fn test_grouped_pagination_has_no_default_order() {
    let s = shop();
    let db = adapter("ref-sql:", ScriptedConnection::new(), &s.tables());
    let owner = s.pet.field("owner").unwrap();
    let select = Select::new([owner.operand(), s.pet.id().unwrap().count().operand()])
        .groupby([owner.clone()])
        .limit(5);
    assert_eq!(
        sql(&db, &select),
        "SELECT pet.owner, COUNT(pet.id) FROM pet GROUP BY pet.owner LIMIT 5;"
    );
}

#[test]
fn test_null_and_empty_membership() {
    let s = shop();
    let db = adapter("sqlite://shop.db", ScriptedConnection::new(), &s.tables());
    let email = s.person.field("email").unwrap();

    let select = Select::new([email.clone()]).filter(email.equal(None::<&str>));
    assert!(sql(&db, &select).ends_with("WHERE (\"person\".\"email\" IS NULL);"));

    let select = Select::new([email.clone()]).filter(email.belongs(Vec::<&str>::new()));
    assert!(sql(&db, &select).ends_with("WHERE (1=0);"));
}

#[test]
fn test_select_builds_nested_rows_with_virtual_fields() {
    let s = shop();
    let conn = ScriptedConnection::new().on_fetch(
        "FROM person",
        vec![
            vec![RawValue::Int(1), RawValue::Text("ann".into()), RawValue::Text("Rex".into())],
            vec![RawValue::Int(2), RawValue::Text("bob".into()), RawValue::Null],
        ],
    );
    let db = adapter("ref-sql:", conn.clone(), &s.tables());
    let select = Select::new([
        s.person.id().unwrap(),
        s.person.field("name").unwrap(),
        s.pet.field("name").unwrap(),
    ])
    .left_join(&s.pet, s.pet.field("owner").unwrap().equal(s.person.id().unwrap()));

    let mut ctx = ExecutionContext::new();
    let rows = db.select(&select, &mut ctx).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.colnames, vec!["person.id", "person.name", "pet.name"]);

    let first = rows.first().unwrap();
    assert_eq!(first.get("person", "id").unwrap(), &Value::Int(1));
    assert_eq!(first.get("person", "shout").unwrap(), &Value::Str("ANN".into()));
    assert_eq!(first.get("pet", "name").unwrap(), &Value::Str("Rex".into()));

    let second = rows.iter().nth(1).unwrap();
    assert_eq!(second.get("pet", "name").unwrap(), &Value::Null);

    assert_eq!(conn.executions(), 1);
    assert_eq!(ctx.statements().len(), 1);
    assert_eq!(ctx.last().unwrap().rows, 2);
}

#[test]
fn test_virtual_field_skipped_on_partial_select() {
    let s = shop();
    let conn = ScriptedConnection::new().on_fetch("FROM person", vec![vec![RawValue::Int(1)]]);
    let db = adapter("ref-sql:", conn, &s.tables());
    let rows = db
        .select(&Select::new([s.person.id().unwrap()]), &mut ExecutionContext::new())
        .unwrap();
    let row = rows.first().unwrap();
    assert!(row.get("person", "shout").is_err());
}

#[test]
fn test_unsupported_for_update_never_reaches_connection() {
    let s = shop();
    let conn = ScriptedConnection::new();
    let db = adapter("sqlite://shop.db", conn.clone(), &s.tables());
    let select = Select::new([s.person.field("name").unwrap()]).for_update();

    let err = db.select(&select, &mut ExecutionContext::new()).unwrap_err();
    assert!(matches!(err, DbError::Compile(DalError::NotSupported { .. })));
    assert_eq!(conn.executions(), 0);
}

#[test]
fn test_update_applies_common_filter() {
    let s = shop();
    let conn = ScriptedConnection::new().on_execute("UPDATE item", 4);
    let db = adapter("ref-sql:", conn.clone(), &s.tables());
    let qty = s.item.field("qty").unwrap();
    let name = s.item.field("name").unwrap();

    let updated = db
        .update(
            &s.item,
            Some(name.equal("pen")),
            &[(qty.clone(), (qty.clone() + 1).into_operand())],
            &mut ExecutionContext::new(),
        )
        .unwrap();
    assert_eq!(updated, 4);
    assert_eq!(
        conn.executed(),
        vec!["UPDATE item SET qty=(qty + 1) WHERE ((name = 'pen') AND (deleted = 'F'));"]
    );
}

#[test]
fn test_delete_spanning_tables_uses_subselect() {
    let s = shop();
    let conn = ScriptedConnection::new();
    let db = adapter("ref-sql:", conn.clone(), &s.tables());
    let query = s.pet.field("owner").unwrap().equal(s.person.id().unwrap())
        & s.person.field("name").unwrap().equal("Ann");

    db.delete(&s.pet, Some(query), &mut ExecutionContext::new()).unwrap();
    assert_eq!(
        conn.executed(),
        vec![
            "DELETE FROM pet WHERE (id IN (SELECT pet.id FROM pet CROSS JOIN person \
             WHERE ((pet.owner = person.id) AND (person.name = 'Ann'))));"
        ]
    );
}

#[test]
fn test_insert_and_count_roundtrip() {
    let s = shop();
    let conn = ScriptedConnection::new()
        .with_insert_ids(vec![Value::Int(11)])
        .on_fetch("COUNT", vec![vec![RawValue::Text("1".into())]]);
    let db = adapter("ref-sql:", conn.clone(), &s.tables());
    let mut ctx = ExecutionContext::new();

    let id = db
        .insert(
            &s.item,
            vec![
                (s.item.field("name").unwrap(), "pen".into()),
                (s.item.field("price").unwrap(), Value::Float(1.5)),
            ],
            &mut ctx,
        )
        .unwrap();
    assert_eq!(id, Some(Value::Int(11)));
    assert_eq!(
        conn.executed()[0],
        "INSERT INTO item(name, price, qty, deleted) VALUES ('pen', 1.5, 0, 'F');"
    );

    let n = db.count(&s.item, None, None, &mut ctx).unwrap();
    assert_eq!(n, 1);
    assert_eq!(ctx.statements().len(), 2);
}

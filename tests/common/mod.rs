//! Common test utilities for adapter tests
//!
//! Provides shared fixtures for:
//! - A small shop schema (person, pet, toy, item)
//! - Adapters over a scripted connection

#![allow(dead_code)]

use polydal::{Adapter, AdapterConfig, ScriptedConnection};
use polydal_core::{Composable, FieldSpec, FieldType, OnDelete, Table, Value};

pub struct Shop {
    pub person: Table,
    pub pet: Table,
    pub toy: Table,
    pub item: Table,
}

impl Shop {
    pub fn tables(&self) -> Vec<Table> {
        vec![
            self.person.clone(),
            self.pet.clone(),
            self.toy.clone(),
            self.item.clone(),
        ]
    }
}

pub fn shop() -> Shop {
    let person = Table::builder("person")
        .field(("name", FieldType::string()))
        .field(FieldSpec::new("email", FieldType::string()).unique())
        .virtual_field("shout", |row| {
            let name = row.get("person", "name")?;
            Ok(Value::Str(name.as_str().unwrap_or_default().to_uppercase()))
        })
        .build()
        .unwrap();
    let pet = Table::builder("pet")
        .field(("name", FieldType::string()))
        .field(FieldSpec::new("owner", FieldType::Reference("person".into())).ondelete(OnDelete::Cascade))
        .build()
        .unwrap();
    let toy = Table::builder("toy")
        .field(("label", FieldType::string()))
        .build()
        .unwrap();
    let item = Table::builder("item")
        .field(("name", FieldType::string()))
        .field(("kind", FieldType::string()))
        .field(("price", FieldType::Double))
        .field(FieldSpec::new("qty", FieldType::Integer).default(0))
        .field(FieldSpec::new("deleted", FieldType::Boolean).default(false))
        .common_filter(|t| match t.field("deleted") {
            Ok(deleted) => deleted.equal(false),
            Err(_) => polydal_core::Expression::constant(true),
        })
        .build()
        .unwrap();
    Shop { person, pet, toy, item }
}

pub fn adapter(uri: &str, conn: ScriptedConnection, tables: &[Table]) -> Adapter {
    adapter_with(AdapterConfig::from_uri(uri), conn, tables)
}

pub fn adapter_with(config: AdapterConfig, conn: ScriptedConnection, tables: &[Table]) -> Adapter {
    let mut adapter = Adapter::new(config, conn).expect("Failed to create adapter");
    for table in tables {
        adapter.define_table(table.clone()).expect("Failed to define table");
    }
    adapter
}

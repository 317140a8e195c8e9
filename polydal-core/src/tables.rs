//! Participating tables of an expression tree.

use std::sync::Arc;

use crate::error::{DalError, DalResult};
use crate::expr::{Expression, Operand, Select};
use crate::schema::{Field, TableInfo};

/// Deduplicated tables in first-seen order.
///
/// Two distinct table objects may not share a name: a self-join must alias
/// one side.
#[derive(Debug, Clone, Default)]
pub struct TableMap {
    tables: Vec<Arc<TableInfo>>,
}

impl TableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_expression(expr: &Expression) -> DalResult<Self> {
        let mut map = Self::new();
        map.add_expression(expr)?;
        Ok(map)
    }

    /// Tables of the output fields and the filter, not of joins.
    pub fn from_select(select: &Select) -> DalResult<Self> {
        let mut map = Self::new();
        for operand in &select.fields {
            map.add_operand(operand)?;
        }
        if let Some(q) = &select.query {
            map.add_expression(q)?;
        }
        Ok(map)
    }

    pub fn insert(&mut self, info: &Arc<TableInfo>) -> DalResult<()> {
        match self.tables.iter().find(|t| t.name == info.name) {
            Some(existing) if existing.id != info.id => Err(DalError::NameConflict {
                name: info.name.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.tables.push(Arc::clone(info));
                Ok(())
            }
        }
    }

    pub fn add_field(&mut self, field: &Field) -> DalResult<()> {
        self.insert(field.table())
    }

    pub fn add_operand(&mut self, operand: &Operand) -> DalResult<()> {
        let mut result = Ok(());
        operand.walk_fields(&mut |f| {
            if result.is_ok() {
                result = self.add_field(f);
            }
        });
        result
    }

    pub fn add_expression(&mut self, expr: &Expression) -> DalResult<()> {
        self.add_operand(&expr.first)?;
        if let Some(second) = &expr.second {
            self.add_operand(second)?;
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &TableMap) -> DalResult<()> {
        for info in &other.tables {
            self.insert(info)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TableInfo>> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TableInfo>> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn first(&self) -> Option<&Arc<TableInfo>> {
        self.tables.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Composable;
    use crate::schema::Table;
    use crate::types::FieldType;

    fn person() -> Table {
        Table::builder("person")
            .field(("name", FieldType::string()))
            .field(("boss", FieldType::Reference("person".into())))
            .build()
            .unwrap()
    }

    #[test]
    fn test_collects_distinct_tables_in_order() {
        let p = person();
        let pet = Table::builder("pet")
            .field(("owner", FieldType::Reference("person".into())))
            .build()
            .unwrap();
        let q = pet.field("owner").unwrap().equal(p.id().unwrap())
            & p.field("name").unwrap().equal("x");
        let map = TableMap::from_expression(&q).unwrap();
        assert_eq!(map.names(), vec!["pet", "person"]);
    }

    #[test]
    fn test_same_name_distinct_tables_conflict() {
        let a = person();
        let b = person();
        let q = a.field("name").unwrap().equal(b.field("name").unwrap());
        let err = TableMap::from_expression(&q).unwrap_err();
        assert_eq!(
            err,
            DalError::NameConflict {
                name: "person".to_string()
            }
        );
    }

    #[test]
    fn test_alias_resolves_conflict() {
        let p = person();
        let boss = p.with_alias("boss");
        let q = p.field("boss").unwrap().equal(boss.id().unwrap());
        let map = TableMap::from_expression(&q).unwrap();
        assert_eq!(map.names(), vec!["person", "boss"]);
        assert_eq!(map.get("boss").unwrap().sql_name, "person");
    }
}

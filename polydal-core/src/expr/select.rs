use super::{Expression, IntoOperand, Operand};
use crate::schema::{Field, Table};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Distinct {
    #[default]
    None,
    /// `SELECT DISTINCT`
    Rows,
    /// `SELECT DISTINCT ON (...)`
    On(Vec<Operand>),
}

/// An explicit join: `table ON condition`
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: Table,
    pub on: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOptions {
    pub join: Vec<Join>,
    pub left: Vec<Join>,
    pub groupby: Vec<Operand>,
    pub having: Option<Expression>,
    pub orderby: Vec<Operand>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: Distinct,
    pub for_update: bool,
    /// Order paginated results by primary key when no order is given.
    /// `None` defers to the adapter configuration.
    pub orderby_on_limitby: Option<bool>,
    pub ignore_common_filters: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            join: Vec::new(),
            left: Vec::new(),
            groupby: Vec::new(),
            having: None,
            orderby: Vec::new(),
            limit: None,
            offset: None,
            distinct: Distinct::None,
            for_update: false,
            orderby_on_limitby: None,
            ignore_common_filters: false,
        }
    }
}

/// A full select: output fields, filter and options
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub fields: Vec<Operand>,
    pub query: Option<Expression>,
    pub options: SelectOptions,
}

impl Select {
    pub fn new<I, T>(fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        Self {
            fields: fields.into_iter().map(IntoOperand::into_operand).collect(),
            query: None,
            options: SelectOptions::default(),
        }
    }

    /// All physical fields of `table`
    pub fn all(table: &Table) -> Self {
        Self::new(table.fields().iter().cloned())
    }

    pub fn filter(mut self, query: Expression) -> Self {
        self.query = Some(match self.query.take() {
            Some(existing) => existing & query,
            None => query,
        });
        self
    }

    pub fn join(mut self, table: &Table, on: Expression) -> Self {
        self.options.join.push(Join {
            table: table.clone(),
            on,
        });
        self
    }

    pub fn left_join(mut self, table: &Table, on: Expression) -> Self {
        self.options.left.push(Join {
            table: table.clone(),
            on,
        });
        self
    }

    pub fn groupby<I, T>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        self.options.groupby = keys.into_iter().map(IntoOperand::into_operand).collect();
        self
    }

    pub fn having(mut self, condition: Expression) -> Self {
        self.options.having = Some(condition);
        self
    }

    pub fn orderby<I, T>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        self.options.orderby = keys.into_iter().map(IntoOperand::into_operand).collect();
        self
    }

    /// Rows `[start, end)`, like a slice
    pub fn limitby(mut self, start: u64, end: u64) -> Self {
        self.options.offset = (start > 0).then_some(start);
        self.options.limit = Some(end.saturating_sub(start));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.options.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.options.distinct = Distinct::Rows;
        self
    }

    pub fn distinct_on<I, T>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoOperand,
    {
        self.options.distinct = Distinct::On(keys.into_iter().map(IntoOperand::into_operand).collect());
        self
    }

    pub fn for_update(mut self) -> Self {
        self.options.for_update = true;
        self
    }

    pub fn orderby_on_limitby(mut self, enabled: bool) -> Self {
        self.options.orderby_on_limitby = Some(enabled);
        self
    }

    pub fn ignore_common_filters(mut self) -> Self {
        self.options.ignore_common_filters = true;
        self
    }

    pub fn is_paginated(&self) -> bool {
        self.options.limit.is_some() || self.options.offset.is_some()
    }

    /// Every requested output is an aggregate
    pub fn is_aggregate_only(&self) -> bool {
        !self.fields.is_empty() && self.fields.iter().all(|f| f.unwrapped().has_aggregate())
    }

    /// Fields named in the output list, filter, joins, grouping and ordering
    pub fn referenced_fields(&self) -> Vec<Field> {
        let mut out: Vec<Field> = Vec::new();
        let mut visit = |f: &Field| {
            if !out.contains(f) {
                out.push(f.clone());
            }
        };
        for operand in &self.fields {
            operand.walk_fields(&mut visit);
        }
        if let Some(q) = &self.query {
            q.walk_fields(&mut visit);
        }
        for operand in self.options.groupby.iter().chain(&self.options.orderby) {
            operand.walk_fields(&mut visit);
        }
        if let Some(h) = &self.options.having {
            h.walk_fields(&mut visit);
        }
        if let Distinct::On(keys) = &self.options.distinct {
            for k in keys {
                k.walk_fields(&mut visit);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Composable;
    use crate::types::FieldType;

    #[test]
    fn test_limitby_maps_to_limit_offset() {
        let t = Table::builder("t").field(("a", FieldType::Text)).build().unwrap();
        let s = Select::all(&t).limitby(10, 30);
        assert_eq!(s.options.offset, Some(10));
        assert_eq!(s.options.limit, Some(20));
        let s = Select::all(&t).limitby(0, 5);
        assert_eq!(s.options.offset, None);
        assert!(s.is_paginated());
    }

    #[test]
    fn test_filters_accumulate() {
        let t = Table::builder("t").field(("a", FieldType::Integer)).build().unwrap();
        let a = t.field("a").unwrap();
        let s = Select::new([a.clone()]).filter(a.gt(1)).filter(a.lt(9));
        assert_eq!(s.query.unwrap().conjuncts().len(), 2);
    }

    #[test]
    fn test_aggregate_only() {
        let t = Table::builder("t").field(("a", FieldType::Integer)).build().unwrap();
        let a = t.field("a").unwrap();
        assert!(Select::new([a.count(), a.max().with_alias("top")]).is_aggregate_only());
        assert!(!Select::new([a.operand(), a.count().operand()]).is_aggregate_only());
    }
}

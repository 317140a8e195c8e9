//! Expression model.
//!
//! Expressions are immutable value trees over fields and literals. They have
//! no backend knowledge; every dialect renders the same tree.

mod builder;
mod operator;
mod select;

pub use builder::Composable;
pub use operator::{DatePart, Operator};
pub use select::{Distinct, Join, Select, SelectOptions};

use std::ops::{BitAnd, BitOr, Not};

use crate::schema::Field;
use crate::types::FieldType;
use crate::value::Value;

/// Operand of an expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(Field),
    Value(Value),
    Expr(Box<Expression>),
    /// Nested select, used as the right side of `belongs`
    Select(Box<Select>),
}

impl Operand {
    pub fn field_type(&self) -> FieldType {
        match self {
            Operand::Field(f) => f.field_type().clone(),
            Operand::Value(v) => v.natural_type(),
            Operand::Expr(e) => e.result_type.clone(),
            Operand::Select(s) => s
                .fields
                .first()
                .map(Operand::field_type)
                .unwrap_or(FieldType::Id),
        }
    }

    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Operand::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Operand::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&Expression> {
        match self {
            Operand::Expr(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Value(Value::Null))
    }

    /// True when an aggregate appears anywhere below this operand
    pub fn has_aggregate(&self) -> bool {
        match self {
            Operand::Expr(e) => e.has_aggregate(),
            _ => false,
        }
    }

    /// Visit every field reachable without entering nested selects.
    pub fn walk_fields(&self, visit: &mut dyn FnMut(&Field)) {
        match self {
            Operand::Field(f) => visit(f),
            Operand::Expr(e) => e.walk_fields(visit),
            Operand::Value(_) | Operand::Select(_) => {}
        }
    }

    /// Strip `AS` and `DESC` wrappers.
    pub fn unwrapped(&self) -> &Operand {
        match self {
            Operand::Expr(e) if matches!(e.op, Operator::Alias(_) | Operator::Desc) => {
                e.first.unwrapped()
            }
            other => other,
        }
    }
}

/// Conversion into an expression operand
pub trait IntoOperand {
    fn into_operand(self) -> Operand;
}

impl IntoOperand for Operand {
    fn into_operand(self) -> Operand {
        self
    }
}

impl IntoOperand for Field {
    fn into_operand(self) -> Operand {
        Operand::Field(self)
    }
}

impl IntoOperand for &Field {
    fn into_operand(self) -> Operand {
        Operand::Field(self.clone())
    }
}

impl IntoOperand for Expression {
    fn into_operand(self) -> Operand {
        Operand::Expr(Box::new(self))
    }
}

impl IntoOperand for &Expression {
    fn into_operand(self) -> Operand {
        Operand::Expr(Box::new(self.clone()))
    }
}

impl IntoOperand for Select {
    fn into_operand(self) -> Operand {
        Operand::Select(Box::new(self))
    }
}

impl IntoOperand for Value {
    fn into_operand(self) -> Operand {
        Operand::Value(self)
    }
}

macro_rules! literal_operand {
    ($($t:ty),*) => {
        $(impl IntoOperand for $t {
            fn into_operand(self) -> Operand {
                Operand::Value(Value::from(self))
            }
        })*
    };
}

literal_operand!(
    bool,
    i64,
    i32,
    u32,
    f64,
    &str,
    String,
    rust_decimal::Decimal,
    chrono::NaiveDate,
    chrono::NaiveTime,
    chrono::NaiveDateTime,
    serde_json::Value
);

impl<T: Into<Value>> IntoOperand for Vec<T> {
    fn into_operand(self) -> Operand {
        Operand::Value(Value::from(self))
    }
}

impl<T: Into<Value>> IntoOperand for Option<T> {
    fn into_operand(self) -> Operand {
        Operand::Value(Value::from(self))
    }
}

/// An AST node: operator applied to one or two operands
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub op: Operator,
    pub first: Operand,
    pub second: Option<Operand>,
    pub result_type: FieldType,
}

impl Expression {
    pub fn new(op: Operator, first: Operand, second: Option<Operand>) -> Self {
        let result_type = op.result_type(&first.field_type());
        Self {
            op,
            first,
            second,
            result_type,
        }
    }

    pub fn unary(op: Operator, first: impl IntoOperand) -> Self {
        Self::new(op, first.into_operand(), None)
    }

    pub fn binary(op: Operator, first: impl IntoOperand, second: impl IntoOperand) -> Self {
        Self::new(op, first.into_operand(), Some(second.into_operand()))
    }

    /// Override the derived result type.
    pub fn with_type(mut self, ty: FieldType) -> Self {
        self.result_type = ty;
        self
    }

    /// Statically true or false predicate
    pub fn constant(value: bool) -> Self {
        Self::new(Operator::Const, Operand::Value(Value::Bool(value)), None)
    }

    /// Random ordering
    pub fn random() -> Self {
        Self::new(Operator::Random, Operand::Value(Value::Null), None)
    }

    /// Value of a literal boolean node
    pub fn const_value(&self) -> Option<bool> {
        match (&self.op, &self.first) {
            (Operator::Const, Operand::Value(v)) => v.as_bool(),
            _ => None,
        }
    }

    pub fn is_query(&self) -> bool {
        self.op.is_boolean()
    }

    pub fn second_is_null(&self) -> bool {
        self.second.as_ref().map(Operand::is_null).unwrap_or(false)
    }

    pub fn and(self, other: Expression) -> Expression {
        match (self.const_value(), other.const_value()) {
            (Some(true), _) | (_, Some(false)) => other,
            (Some(false), _) | (_, Some(true)) => self,
            _ => Expression::binary(Operator::And, self, other),
        }
    }

    pub fn or(self, other: Expression) -> Expression {
        match (self.const_value(), other.const_value()) {
            (Some(true), _) | (_, Some(false)) => self,
            (Some(false), _) | (_, Some(true)) => other,
            _ => Expression::binary(Operator::Or, self, other),
        }
    }

    /// Negation; `not(not(q))` returns `q` itself.
    pub fn negate(self) -> Expression {
        if let Some(b) = self.const_value() {
            return Expression::constant(!b);
        }
        match self.op {
            Operator::Not => match self.first {
                Operand::Expr(inner) => *inner,
                first => Expression::new(Operator::Not, first, None),
            },
            _ => Expression::unary(Operator::Not, self),
        }
    }

    /// Top-level AND terms
    pub fn conjuncts(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a Expression>) {
        if self.op == Operator::And {
            if let (Operand::Expr(a), Some(Operand::Expr(b))) = (&self.first, &self.second) {
                a.collect_conjuncts(out);
                b.collect_conjuncts(out);
                return;
            }
        }
        out.push(self);
    }

    pub fn has_conjunct(&self, term: &Expression) -> bool {
        let wanted = term.conjuncts();
        let present = self.conjuncts();
        wanted.iter().all(|w| present.contains(w))
    }

    pub fn has_aggregate(&self) -> bool {
        self.op.is_aggregate()
            || self.first.has_aggregate()
            || self.second.as_ref().map(Operand::has_aggregate).unwrap_or(false)
    }

    pub fn walk_fields(&self, visit: &mut dyn FnMut(&Field)) {
        self.first.walk_fields(visit);
        if let Some(second) = &self.second {
            second.walk_fields(visit);
        }
    }

    pub fn fields(&self) -> Vec<Field> {
        let mut out: Vec<Field> = Vec::new();
        self.walk_fields(&mut |f| {
            if !out.contains(f) {
                out.push(f.clone());
            }
        });
        out
    }
}

impl Not for Expression {
    type Output = Expression;

    fn not(self) -> Expression {
        self.negate()
    }
}

impl BitAnd for Expression {
    type Output = Expression;

    fn bitand(self, rhs: Expression) -> Expression {
        self.and(rhs)
    }
}

impl BitOr for Expression {
    type Output = Expression;

    fn bitor(self, rhs: Expression) -> Expression {
        self.or(rhs)
    }
}

impl BitAnd<bool> for Expression {
    type Output = Expression;

    fn bitand(self, rhs: bool) -> Expression {
        self.and(Expression::constant(rhs))
    }
}

impl BitOr<bool> for Expression {
    type Output = Expression;

    fn bitor(self, rhs: bool) -> Expression {
        self.or(Expression::constant(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Table;

    fn item() -> Table {
        Table::builder("item")
            .field(("price", FieldType::Double))
            .field(("name", FieldType::string()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_double_negation_is_structural() {
        let t = item();
        let q = t.field("price").unwrap().gt(10);
        let nn = !!q.clone();
        assert_eq!(nn, q);
        assert_eq!((!q.clone()).op, Operator::Not);
    }

    #[test]
    fn test_literal_booleans_short_circuit() {
        let q = item().field("price").unwrap().gt(10);
        assert_eq!(q.clone() & true, q);
        assert_eq!((q.clone() | true).const_value(), Some(true));
        assert_eq!((q.clone() & false).const_value(), Some(false));
        assert_eq!(q.clone() | false, q);
        assert_eq!((!Expression::constant(true)).const_value(), Some(false));
    }

    #[test]
    fn test_result_type_follows_first_operand() {
        let price = item().field("price").unwrap();
        assert_eq!((price.clone() * 2).result_type, FieldType::Double);
        assert_eq!(price.count().result_type, FieldType::Integer);
        assert_eq!(price.gt(1).result_type, FieldType::Boolean);
    }

    #[test]
    fn test_conjuncts_and_fields() {
        let t = item();
        let price = t.field("price").unwrap();
        let name = t.field("name").unwrap();
        let a = price.gt(1);
        let b = name.equal("x");
        let c = price.lt(5);
        let q = a.clone() & b.clone() & c.clone();
        assert_eq!(q.conjuncts().len(), 3);
        assert!(q.has_conjunct(&b));
        assert!(q.has_conjunct(&(a.clone() & c)));
        assert!(!q.has_conjunct(&price.ge(1)));
        assert_eq!(q.fields(), vec![price, name]);
    }

    #[test]
    fn test_expressions_compare_structurally() {
        let t = item();
        let q1 = t.field("price").unwrap().gt(10);
        let q2 = t.field("price").unwrap().gt(10);
        assert_eq!(q1, q2);
        let other = t.with_alias("other");
        assert_ne!(q1, other.field("price").unwrap().gt(10));
    }
}

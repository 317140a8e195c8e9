//! Fluent construction of expressions over fields and expressions.

use std::ops::{Add, Div, Mul, Rem, Sub};

use super::{DatePart, Expression, IntoOperand, Operand, Operator};
use crate::schema::Field;
use crate::types::FieldType;

/// Operators available on anything that can stand as the first operand.
///
/// `equal`/`not_equal` stand in for `==`/`!=`, which Rust reserves for
/// structural comparison. Comparing with `None` yields a null check.
pub trait Composable {
    fn operand(&self) -> Operand;

    fn compose(&self, op: Operator, other: impl IntoOperand) -> Expression {
        Expression::new(op, self.operand(), Some(other.into_operand()))
    }

    fn compose_unary(&self, op: Operator) -> Expression {
        Expression::new(op, self.operand(), None)
    }

    fn equal(&self, other: impl IntoOperand) -> Expression {
        self.compose(Operator::Eq, other)
    }

    fn not_equal(&self, other: impl IntoOperand) -> Expression {
        self.compose(Operator::Ne, other)
    }

    fn lt(&self, other: impl IntoOperand) -> Expression {
        self.compose(Operator::Lt, other)
    }

    fn le(&self, other: impl IntoOperand) -> Expression {
        self.compose(Operator::Le, other)
    }

    fn gt(&self, other: impl IntoOperand) -> Expression {
        self.compose(Operator::Gt, other)
    }

    fn ge(&self, other: impl IntoOperand) -> Expression {
        self.compose(Operator::Ge, other)
    }

    fn is_null(&self) -> Expression {
        self.compose(Operator::Eq, Operand::Value(crate::value::Value::Null))
    }

    fn is_not_null(&self) -> Expression {
        self.compose(Operator::Ne, Operand::Value(crate::value::Value::Null))
    }

    /// Membership in a list of values or in the output of a nested select
    fn belongs(&self, values: impl IntoOperand) -> Expression {
        self.compose(Operator::Belongs, values)
    }

    fn like(&self, pattern: impl IntoOperand) -> Expression {
        self.compose(
            Operator::Like {
                case_sensitive: true,
                escape: None,
            },
            pattern,
        )
    }

    fn like_escape(&self, pattern: impl IntoOperand, escape: char) -> Expression {
        self.compose(
            Operator::Like {
                case_sensitive: true,
                escape: Some(escape),
            },
            pattern,
        )
    }

    fn ilike(&self, pattern: impl IntoOperand) -> Expression {
        self.compose(
            Operator::Like {
                case_sensitive: false,
                escape: None,
            },
            pattern,
        )
    }

    fn regexp(&self, pattern: impl IntoOperand) -> Expression {
        self.compose(Operator::Regexp, pattern)
    }

    fn startswith(&self, prefix: impl IntoOperand) -> Expression {
        self.compose(Operator::StartsWith, prefix)
    }

    fn endswith(&self, suffix: impl IntoOperand) -> Expression {
        self.compose(Operator::EndsWith, suffix)
    }

    /// Substring match on text, element match on list fields. A list value
    /// matches when any (or, with `all`, every) element is contained.
    fn contains(&self, value: impl IntoOperand) -> Expression {
        self.compose(
            Operator::Contains {
                all: false,
                case_sensitive: true,
            },
            value,
        )
    }

    fn contains_all(&self, values: impl IntoOperand) -> Expression {
        self.compose(
            Operator::Contains {
                all: true,
                case_sensitive: true,
            },
            values,
        )
    }

    fn icontains(&self, value: impl IntoOperand) -> Expression {
        self.compose(
            Operator::Contains {
                all: false,
                case_sensitive: false,
            },
            value,
        )
    }

    fn lower(&self) -> Expression {
        self.compose_unary(Operator::Lower)
    }

    fn upper(&self) -> Expression {
        self.compose_unary(Operator::Upper)
    }

    fn len(&self) -> Expression {
        self.compose_unary(Operator::Length)
    }

    /// 1-based start, like SQL
    fn substring(&self, start: i64, length: i64) -> Expression {
        self.compose_unary(Operator::Substring { start, length })
    }

    fn coalesce(&self, fallback: impl IntoOperand) -> Expression {
        self.compose(Operator::Coalesce, fallback)
    }

    fn coalesce_zero(&self) -> Expression {
        self.compose_unary(Operator::CoalesceZero)
    }

    fn extract(&self, part: DatePart) -> Expression {
        self.compose_unary(Operator::Extract(part))
    }

    fn year(&self) -> Expression {
        self.extract(DatePart::Year)
    }

    fn month(&self) -> Expression {
        self.extract(DatePart::Month)
    }

    fn day(&self) -> Expression {
        self.extract(DatePart::Day)
    }

    fn hour(&self) -> Expression {
        self.extract(DatePart::Hour)
    }

    fn minutes(&self) -> Expression {
        self.extract(DatePart::Minute)
    }

    fn seconds(&self) -> Expression {
        self.extract(DatePart::Second)
    }

    fn epoch(&self) -> Expression {
        self.compose_unary(Operator::Epoch)
    }

    fn cast(&self, ty: FieldType) -> Expression {
        self.compose_unary(Operator::Cast(ty))
    }

    fn count(&self) -> Expression {
        self.compose_unary(Operator::Count { distinct: false })
    }

    fn count_distinct(&self) -> Expression {
        self.compose_unary(Operator::Count { distinct: true })
    }

    fn sum(&self) -> Expression {
        self.compose_unary(Operator::Sum)
    }

    fn avg(&self) -> Expression {
        self.compose_unary(Operator::Avg)
    }

    fn min(&self) -> Expression {
        self.compose_unary(Operator::Min)
    }

    fn max(&self) -> Expression {
        self.compose_unary(Operator::Max)
    }

    fn with_alias(&self, alias: &str) -> Expression {
        self.compose_unary(Operator::Alias(alias.to_string()))
    }

    /// Descending sort key
    fn desc(&self) -> Expression {
        self.compose_unary(Operator::Desc)
    }
}

impl Composable for Field {
    fn operand(&self) -> Operand {
        Operand::Field(self.clone())
    }
}

impl Composable for Expression {
    fn operand(&self) -> Operand {
        Operand::Expr(Box::new(self.clone()))
    }
}

macro_rules! arithmetic {
    ($lhs:ty, $($trait:ident $method:ident $op:ident),*) => {
        $(impl<T: IntoOperand> $trait<T> for $lhs {
            type Output = Expression;

            fn $method(self, rhs: T) -> Expression {
                Expression::new(Operator::$op, self.into_operand(), Some(rhs.into_operand()))
            }
        })*
    };
}

arithmetic!(Field, Add add Add, Sub sub Sub, Mul mul Mul, Div div Div, Rem rem Mod);
arithmetic!(&Field, Add add Add, Sub sub Sub, Mul mul Mul, Div div Div, Rem rem Mod);
arithmetic!(Expression, Add add Add, Sub sub Sub, Mul mul Mul, Div div Div, Rem rem Mod);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Table;
    use crate::value::Value;

    #[test]
    fn test_null_comparison_keeps_null_operand() {
        let t = Table::builder("person")
            .field(("name", FieldType::string()))
            .build()
            .unwrap();
        let name = t.field("name").unwrap();
        let q = name.equal(None::<&str>);
        assert!(q.second_is_null());
        assert_eq!(q, name.is_null());
        assert!(!name.equal("x").second_is_null());
    }

    #[test]
    fn test_arithmetic_chains() {
        let t = Table::builder("line")
            .field(("qty", FieldType::Integer))
            .field(("price", FieldType::Double))
            .build()
            .unwrap();
        let total = t.field("qty").unwrap() * t.field("price").unwrap() + 1;
        assert_eq!(total.op, Operator::Add);
        assert_eq!(total.second, Some(Operand::Value(Value::Int(1))));
        let first = total.first.as_expr().unwrap();
        assert_eq!(first.op, Operator::Mul);
    }

    #[test]
    fn test_alias_and_desc_unwrap() {
        let t = Table::builder("x")
            .field(("n", FieldType::Integer))
            .build()
            .unwrap();
        let n = t.field("n").unwrap();
        let sorted = n.sum().with_alias("total").desc().into_operand();
        assert_eq!(sorted.unwrapped(), &n.sum().into_operand());
    }
}

//! The closed set of operator tags.

use std::fmt;

use crate::types::FieldType;

/// Component extracted from a date/time value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Month => "month",
            DatePart::Day => "day",
            DatePart::Hour => "hour",
            DatePart::Minute => "minute",
            DatePart::Second => "second",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    // boolean
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Belongs,
    Like {
        case_sensitive: bool,
        escape: Option<char>,
    },
    Regexp,
    StartsWith,
    EndsWith,
    Contains {
        all: bool,
        case_sensitive: bool,
    },
    /// Literal boolean; the first operand holds the value
    Const,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // functions
    Lower,
    Upper,
    Length,
    Substring {
        start: i64,
        length: i64,
    },
    Coalesce,
    CoalesceZero,
    Extract(DatePart),
    Epoch,
    Cast(FieldType),
    Random,

    // aggregates
    Count {
        distinct: bool,
    },
    Sum,
    Avg,
    Min,
    Max,

    // output shaping
    Alias(String),
    Desc,
}

impl Operator {
    /// Operators whose result is a boolean predicate
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            Operator::And
                | Operator::Or
                | Operator::Not
                | Operator::Eq
                | Operator::Ne
                | Operator::Lt
                | Operator::Le
                | Operator::Gt
                | Operator::Ge
                | Operator::Belongs
                | Operator::Like { .. }
                | Operator::Regexp
                | Operator::StartsWith
                | Operator::EndsWith
                | Operator::Contains { .. }
                | Operator::Const
        )
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Operator::Count { .. } | Operator::Sum | Operator::Avg | Operator::Min | Operator::Max
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }

    /// Result type given the type of the first operand
    pub fn result_type(&self, first: &FieldType) -> FieldType {
        if self.is_boolean() {
            return FieldType::Boolean;
        }
        match self {
            Operator::Count { .. } => FieldType::Integer,
            Operator::Length | Operator::Extract(_) => FieldType::Integer,
            Operator::Epoch => FieldType::BigInt,
            Operator::Avg => FieldType::Double,
            Operator::Random => FieldType::Double,
            Operator::Cast(ty) => ty.clone(),
            Operator::Lower | Operator::Upper | Operator::Substring { .. } => {
                if first.is_textual() {
                    first.clone()
                } else {
                    FieldType::string()
                }
            }
            Operator::Sum if first.is_integral() => FieldType::BigInt,
            Operator::Add | Operator::Sub | Operator::Mul | Operator::Mod | Operator::Div
                if matches!(first, FieldType::Id | FieldType::Reference(_)) =>
            {
                FieldType::BigInt
            }
            _ => first.clone(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => write!(f, "AND"),
            Operator::Or => write!(f, "OR"),
            Operator::Not => write!(f, "NOT"),
            Operator::Eq => write!(f, "EQ"),
            Operator::Ne => write!(f, "NE"),
            Operator::Lt => write!(f, "LT"),
            Operator::Le => write!(f, "LE"),
            Operator::Gt => write!(f, "GT"),
            Operator::Ge => write!(f, "GE"),
            Operator::Belongs => write!(f, "BELONGS"),
            Operator::Like {
                case_sensitive: true,
                ..
            } => write!(f, "LIKE"),
            Operator::Like { .. } => write!(f, "ILIKE"),
            Operator::Regexp => write!(f, "REGEXP"),
            Operator::StartsWith => write!(f, "STARTSWITH"),
            Operator::EndsWith => write!(f, "ENDSWITH"),
            Operator::Contains { all: true, .. } => write!(f, "CONTAINS(all)"),
            Operator::Contains { .. } => write!(f, "CONTAINS"),
            Operator::Const => write!(f, "CONST"),
            Operator::Add => write!(f, "ADD"),
            Operator::Sub => write!(f, "SUB"),
            Operator::Mul => write!(f, "MUL"),
            Operator::Div => write!(f, "DIV"),
            Operator::Mod => write!(f, "MOD"),
            Operator::Lower => write!(f, "LOWER"),
            Operator::Upper => write!(f, "UPPER"),
            Operator::Length => write!(f, "LENGTH"),
            Operator::Substring { start, length } => write!(f, "SUBSTRING({}, {})", start, length),
            Operator::Coalesce => write!(f, "COALESCE"),
            Operator::CoalesceZero => write!(f, "COALESCE_ZERO"),
            Operator::Extract(part) => write!(f, "EXTRACT({})", part.as_str()),
            Operator::Epoch => write!(f, "EPOCH"),
            Operator::Cast(ty) => write!(f, "CAST({})", ty),
            Operator::Random => write!(f, "RANDOM"),
            Operator::Count { distinct: true } => write!(f, "COUNT(DISTINCT)"),
            Operator::Count { .. } => write!(f, "COUNT"),
            Operator::Sum => write!(f, "SUM"),
            Operator::Avg => write!(f, "AVG"),
            Operator::Min => write!(f, "MIN"),
            Operator::Max => write!(f, "MAX"),
            Operator::Alias(name) => write!(f, "AS {}", name),
            Operator::Desc => write!(f, "DESC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_types() {
        assert_eq!(
            Operator::Count { distinct: false }.result_type(&FieldType::Text),
            FieldType::Integer
        );
        assert_eq!(Operator::Eq.result_type(&FieldType::Double), FieldType::Boolean);
        assert_eq!(Operator::Add.result_type(&FieldType::Double), FieldType::Double);
        assert_eq!(Operator::Sum.result_type(&FieldType::Integer), FieldType::BigInt);
        assert_eq!(Operator::Upper.result_type(&FieldType::Integer), FieldType::string());
        assert_eq!(
            Operator::Cast(FieldType::Text).result_type(&FieldType::Integer),
            FieldType::Text
        );
    }

    #[test]
    fn test_classification() {
        assert!(Operator::Sum.is_aggregate());
        assert!(!Operator::Sum.is_boolean());
        assert!(Operator::Like {
            case_sensitive: false,
            escape: None
        }
        .is_boolean());
        assert!(Operator::Ge.is_comparison());
    }
}

//! Aggregation-expression rendering for pipeline stages.

use serde_json::{json, Value as JsonValue};

use super::filter::pattern_regex;
use super::{literal, storage_name, DIALECT};
use crate::codec::DocumentCodec;
use crate::dialect::sql::describe;
use crate::error::{DalError, DalResult};
use crate::expr::{DatePart, Expression, Operand, Operator};
use crate::types::FieldType;
use crate::value::Value;

/// Operands an earlier stage already computed, with the expression that
/// reads them back. A grouped scope rejects raw field access.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    bindings: Vec<(Operand, JsonValue)>,
    grouped: bool,
}

impl Scope {
    pub fn grouped() -> Self {
        Self {
            bindings: Vec::new(),
            grouped: true,
        }
    }

    pub fn bind(&mut self, operand: Operand, reader: JsonValue) {
        self.bindings.push((operand, reader));
    }

    fn lookup(&self, operand: &Operand) -> Option<&JsonValue> {
        self.bindings
            .iter()
            .find(|(bound, _)| bound == operand)
            .map(|(_, reader)| reader)
    }

    fn lookup_expr(&self, expr: &Expression) -> Option<&JsonValue> {
        self.bindings
            .iter()
            .find(|(bound, _)| matches!(bound, Operand::Expr(e) if **e == *expr))
            .map(|(_, reader)| reader)
    }
}

pub(crate) struct ExprCompiler<'a> {
    codec: &'a DocumentCodec,
    scope: &'a Scope,
}

fn path(name: &str) -> JsonValue {
    JsonValue::String(format!("${}", name))
}

/// Strings starting with `$` would read as field paths
fn protect(lit: JsonValue) -> JsonValue {
    match lit.as_str() {
        Some(s) if s.starts_with('$') => json!({ "$literal": lit }),
        _ => lit,
    }
}

impl<'a> ExprCompiler<'a> {
    pub fn new(codec: &'a DocumentCodec, scope: &'a Scope) -> Self {
        Self { codec, scope }
    }

    fn unsupported(&self, expr: &Expression) -> DalError {
        let mut operands = vec![describe(&expr.first)];
        if let Some(second) = &expr.second {
            operands.push(describe(second));
        }
        let refs: Vec<&str> = operands.iter().map(String::as_str).collect();
        DalError::unsupported(DIALECT, &expr.op, &refs)
    }

    pub fn operand(&self, operand: &Operand, expected: Option<&FieldType>) -> DalResult<JsonValue> {
        let unwrapped = operand.unwrapped();
        if let Some(reader) = self.scope.lookup(unwrapped) {
            return Ok(reader.clone());
        }
        match unwrapped {
            Operand::Field(f) if self.scope.grouped => Err(DalError::InvalidQuery(format!(
                "{} is neither grouped nor aggregated",
                f.longname()
            ))),
            Operand::Field(f) => Ok(path(storage_name(f))),
            Operand::Value(v) => literal(self.codec, v, expected, None).map(protect),
            Operand::Expr(e) => self.expression(e),
            Operand::Select(_) => Err(DalError::not_supported(DIALECT, "nested select")),
        }
    }

    fn second<'b>(&self, expr: &'b Expression) -> DalResult<&'b Operand> {
        expr.second
            .as_ref()
            .ok_or_else(|| DalError::InvalidQuery(format!("{} needs a second operand", expr.op)))
    }

    /// Both operands, the second typed after the first
    fn pair(&self, expr: &Expression) -> DalResult<[JsonValue; 2]> {
        let ty = expr.first.field_type();
        let a = self.operand(&expr.first, None)?;
        let b = match self.second(expr)? {
            Operand::Value(v) => protect(literal(self.codec, v, Some(&ty), expr.first.as_field())?),
            other => self.operand(other, Some(&ty))?,
        };
        Ok([a, b])
    }

    fn as_text(&self, expr: &Expression) -> DalResult<JsonValue> {
        let input = self.operand(&expr.first, None)?;
        if expr.first.field_type().is_textual() {
            Ok(input)
        } else {
            Ok(json!({ "$toString": input }))
        }
    }

    fn regex_match(&self, input: JsonValue, regex: String, insensitive: bool) -> JsonValue {
        if insensitive {
            json!({ "$regexMatch": { "input": input, "regex": regex, "options": "i" } })
        } else {
            json!({ "$regexMatch": { "input": input, "regex": regex } })
        }
    }

    pub fn expression(&self, expr: &Expression) -> DalResult<JsonValue> {
        if let Some(reader) = self.scope.lookup_expr(expr) {
            return Ok(reader.clone());
        }
        let op = &expr.op;
        match op {
            Operator::And | Operator::Or => {
                let key = if *op == Operator::And { "$and" } else { "$or" };
                let a = self.operand(&expr.first, None)?;
                let b = self.operand(self.second(expr)?, None)?;
                Ok(json!({ key: [a, b] }))
            }
            Operator::Not => Ok(json!({ "$not": [self.operand(&expr.first, None)?] })),
            Operator::Const => expr
                .const_value()
                .map(JsonValue::Bool)
                .ok_or_else(|| self.unsupported(expr)),
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
                let key = match op {
                    Operator::Eq => "$eq",
                    Operator::Ne => "$ne",
                    Operator::Lt => "$lt",
                    Operator::Le => "$lte",
                    Operator::Gt => "$gt",
                    _ => "$gte",
                };
                Ok(json!({ key: self.pair(expr)? }))
            }
            Operator::Belongs => {
                let ty = expr.first.field_type();
                let a = self.operand(&expr.first, None)?;
                match self.second(expr)? {
                    Operand::Value(Value::List(items)) if items.is_empty() => Ok(json!(false)),
                    Operand::Value(Value::List(items)) => {
                        let literals = items
                            .iter()
                            .map(|item| literal(self.codec, item, Some(&ty), expr.first.as_field()).map(protect))
                            .collect::<DalResult<Vec<_>>>()?;
                        Ok(json!({ "$in": [a, literals] }))
                    }
                    Operand::Select(_) => Err(DalError::not_supported(DIALECT, "nested select")),
                    other => Ok(json!({ "$in": [a, self.operand(other, None)?] })),
                }
            }
            Operator::Like { .. } | Operator::Regexp | Operator::StartsWith | Operator::EndsWith => {
                let (regex, insensitive) =
                    pattern_regex(op, self.second(expr)?).ok_or_else(|| self.unsupported(expr))?;
                Ok(self.regex_match(self.as_text(expr)?, regex, insensitive))
            }
            Operator::Contains { all, case_sensitive } => self.contains(expr, *all, *case_sensitive),
            Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Mod => {
                let key = match op {
                    Operator::Add => "$add",
                    Operator::Sub => "$subtract",
                    Operator::Mul => "$multiply",
                    Operator::Div => "$divide",
                    _ => "$mod",
                };
                Ok(json!({ key: self.pair(expr)? }))
            }
            Operator::Lower => Ok(json!({ "$toLower": self.operand(&expr.first, None)? })),
            Operator::Upper => Ok(json!({ "$toUpper": self.operand(&expr.first, None)? })),
            Operator::Length => Ok(json!({ "$strLenCP": self.operand(&expr.first, None)? })),
            Operator::Substring { start, length } => Ok(json!({
                "$substrCP": [self.operand(&expr.first, None)?, (start - 1).max(0), length]
            })),
            Operator::Coalesce => {
                let [a, b] = self.pair(expr)?;
                Ok(json!({ "$ifNull": [a, b] }))
            }
            Operator::CoalesceZero => Ok(json!({ "$ifNull": [self.operand(&expr.first, None)?, 0] })),
            Operator::Extract(part) => {
                let key = match part {
                    DatePart::Year => "$year",
                    DatePart::Month => "$month",
                    DatePart::Day => "$dayOfMonth",
                    DatePart::Hour => "$hour",
                    DatePart::Minute => "$minute",
                    DatePart::Second => "$second",
                };
                Ok(json!({ key: self.operand(&expr.first, None)? }))
            }
            Operator::Epoch => Ok(json!({
                "$divide": [{ "$toLong": self.operand(&expr.first, None)? }, 1000]
            })),
            Operator::Cast(ty) => {
                let key = match ty {
                    FieldType::String(_) | FieldType::Text => "$toString",
                    FieldType::Integer => "$toInt",
                    FieldType::BigInt => "$toLong",
                    FieldType::Double => "$toDouble",
                    FieldType::Decimal { .. } => "$toDecimal",
                    FieldType::Date | FieldType::DateTime => "$toDate",
                    FieldType::Boolean => "$toBool",
                    _ => return Err(self.unsupported(expr)),
                };
                Ok(json!({ key: self.operand(&expr.first, None)? }))
            }
            Operator::Random => Ok(json!({ "$rand": {} })),
            Operator::Count { .. } | Operator::Sum | Operator::Avg | Operator::Min | Operator::Max => {
                Err(DalError::InvalidQuery(format!(
                    "aggregate {} outside of a grouping stage",
                    describe(&Operand::Expr(Box::new(expr.clone())))
                )))
            }
            Operator::Alias(_) | Operator::Desc => self.operand(&expr.first, None),
        }
    }

    fn contains(&self, expr: &Expression, all: bool, case_sensitive: bool) -> DalResult<JsonValue> {
        let items = match self.second(expr)? {
            Operand::Value(Value::List(items)) => items.clone(),
            Operand::Value(v) => vec![v.clone()],
            _ => return Err(self.unsupported(expr)),
        };
        let first_type = expr.first.field_type();
        let terms = match first_type.element_type() {
            Some(element) if case_sensitive => {
                let list = self.operand(&expr.first, None)?;
                items
                    .iter()
                    .map(|item| {
                        literal(self.codec, item, Some(&element), expr.first.as_field())
                            .map(|lit| json!({ "$in": [protect(lit), { "$ifNull": [list.clone(), []] }] }))
                    })
                    .collect::<DalResult<Vec<_>>>()?
            }
            Some(_) => return Err(self.unsupported(expr)),
            None => {
                let input = self.as_text(expr)?;
                items
                    .iter()
                    .map(|item| {
                        let text = item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string());
                        self.regex_match(input.clone(), regex::escape(&text), !case_sensitive)
                    })
                    .collect()
            }
        };
        Ok(match terms.len() {
            0 => json!(all),
            1 => terms.into_iter().next().unwrap_or_default(),
            _ if all => json!({ "$and": terms }),
            _ => json!({ "$or": terms }),
        })
    }

    /// Accumulator for one aggregate in a `$group`, and the expression that
    /// reads its result once grouped under `name`.
    pub fn accumulator(&self, aggregate: &Expression, name: &str) -> DalResult<(JsonValue, JsonValue)> {
        let reader = path(name);
        let arg = || self.operand(&aggregate.first, None);
        match aggregate.op {
            Operator::Count { distinct: false } if aggregate.first.is_null() => {
                Ok((json!({ "$sum": 1 }), reader))
            }
            Operator::Count { distinct: false } => Ok((
                json!({ "$sum": { "$cond": [{ "$gt": [arg()?, null] }, 1, 0] } }),
                reader,
            )),
            Operator::Sum => Ok((json!({ "$sum": arg()? }), reader)),
            Operator::Avg => Ok((json!({ "$avg": arg()? }), reader)),
            Operator::Min => Ok((json!({ "$min": arg()? }), reader)),
            Operator::Max => Ok((json!({ "$max": arg()? }), reader)),
            _ => Err(self.unsupported(aggregate)),
        }
    }

    /// One aggregate spread over the two `$group` stages of a distinct
    /// count: partials per distinct value, then their combination per group.
    pub fn rollup(&self, aggregate: &Expression, name: &str) -> DalResult<Rollup> {
        let reader = path(name);
        let combine = |op: &str| vec![(name.to_string(), json!({ op: reader.clone() }))];
        match aggregate.op {
            Operator::Count { distinct: true } => Ok(Rollup {
                partial: Vec::new(),
                combine: vec![(name.to_string(), json!({ "$sum": 1 }))],
                reader,
            }),
            Operator::Count { distinct: false } | Operator::Sum => {
                let (partial, reader) = self.accumulator(aggregate, name)?;
                Ok(Rollup {
                    partial: vec![(name.to_string(), partial)],
                    combine: combine("$sum"),
                    reader,
                })
            }
            Operator::Min | Operator::Max => {
                let (partial, reader) = self.accumulator(aggregate, name)?;
                let op = if aggregate.op == Operator::Min { "$min" } else { "$max" };
                Ok(Rollup {
                    partial: vec![(name.to_string(), partial)],
                    combine: combine(op),
                    reader,
                })
            }
            Operator::Avg => {
                let arg = self.operand(&aggregate.first, None)?;
                let counted = format!("{}_n", name);
                let count_reader = path(&counted);
                Ok(Rollup {
                    partial: vec![
                        (name.to_string(), json!({ "$sum": arg.clone() })),
                        (counted.clone(), json!({ "$sum": { "$cond": [{ "$gt": [arg, null] }, 1, 0] } })),
                    ],
                    combine: vec![
                        (name.to_string(), json!({ "$sum": reader.clone() })),
                        (counted, json!({ "$sum": count_reader.clone() })),
                    ],
                    reader: json!({ "$cond": [
                        { "$eq": [count_reader.clone(), 0] },
                        null,
                        { "$divide": [reader, count_reader] }
                    ] }),
                })
            }
            _ => Err(self.unsupported(aggregate)),
        }
    }
}

/// Accumulators of an aggregate split across two `$group` stages
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Rollup {
    pub partial: Vec<(String, JsonValue)>,
    pub combine: Vec<(String, JsonValue)>,
    pub reader: JsonValue,
}

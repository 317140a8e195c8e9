//! Filter documents.
//!
//! In simple mode every leaf the filter language cannot express is replaced
//! by a placeholder and recorded as an [`Escalation`]; the caller discards
//! the result and recompiles in pipeline mode. In pipeline mode those
//! leaves are materialized as boolean `__cond_N` fields (for a leading
//! `$project`) and matched by name.

use serde_json::{json, Map, Value as JsonValue};

use super::expr::{ExprCompiler, Scope};
use super::{literal, storage_name, DIALECT};
use crate::codec::DocumentCodec;
use crate::error::{DalError, DalResult};
use crate::expr::{Expression, Operand, Operator};
use crate::schema::Field;
use crate::types::FieldType;
use crate::value::Value;

/// Marker raised while compiling a simple filter: the named construct needs
/// an aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub reason: String,
}

impl Escalation {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Statically false filter
pub fn false_filter() -> JsonValue {
    json!({ "_id": { "$exists": false } })
}

fn is_true(doc: &JsonValue) -> bool {
    doc.as_object().map(Map::is_empty).unwrap_or(false)
}

fn is_false(doc: &JsonValue) -> bool {
    *doc == false_filter()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Simple,
    Pipeline,
}

pub(crate) struct FilterCompiler<'a> {
    codec: &'a DocumentCodec,
    mode: Mode,
    markers: Vec<Escalation>,
    materialized: Vec<(String, JsonValue)>,
}

/// LIKE pattern to an anchored regular expression
pub(crate) fn like_to_regex(pattern: &str, escape: Option<char>) -> String {
    let mut out = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if Some(c) == escape {
            if let Some(next) = chars.next() {
                out.push_str(&regex::escape(&next.to_string()));
            }
            continue;
        }
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Regex for a pattern-style operator with a literal right side, or `None`
/// when the operator takes a non-literal.
pub(crate) fn pattern_regex(op: &Operator, second: &Operand) -> Option<(String, bool)> {
    let text = match second {
        Operand::Value(Value::Str(s)) => s.as_str(),
        _ => return None,
    };
    match op {
        Operator::Like { case_sensitive, escape } => Some((like_to_regex(text, *escape), !case_sensitive)),
        Operator::Regexp => Some((text.to_string(), false)),
        Operator::StartsWith => Some((format!("^{}", regex::escape(text)), false)),
        Operator::EndsWith => Some((format!("{}$", regex::escape(text)), false)),
        Operator::Contains { case_sensitive, .. } => Some((regex::escape(text), !case_sensitive)),
        _ => None,
    }
}

fn regex_doc(pattern: String, insensitive: bool) -> JsonValue {
    if insensitive {
        json!({ "$regex": pattern, "$options": "i" })
    } else {
        json!({ "$regex": pattern })
    }
}

fn comparison_key(op: &Operator) -> Option<&'static str> {
    match op {
        Operator::Eq => Some("$eq"),
        Operator::Ne => Some("$ne"),
        Operator::Lt => Some("$lt"),
        Operator::Le => Some("$lte"),
        Operator::Gt => Some("$gt"),
        Operator::Ge => Some("$gte"),
        _ => None,
    }
}

impl<'a> FilterCompiler<'a> {
    pub fn simple(codec: &'a DocumentCodec) -> Self {
        Self::with_mode(codec, Mode::Simple)
    }

    pub fn pipeline(codec: &'a DocumentCodec) -> Self {
        Self::with_mode(codec, Mode::Pipeline)
    }

    fn with_mode(codec: &'a DocumentCodec, mode: Mode) -> Self {
        Self {
            codec,
            mode,
            markers: Vec::new(),
            materialized: Vec::new(),
        }
    }

    pub fn markers(&self) -> &[Escalation] {
        &self.markers
    }

    pub fn into_materialized(self) -> Vec<(String, JsonValue)> {
        self.materialized
    }

    pub fn compile(&mut self, query: &Expression) -> DalResult<JsonValue> {
        if query.has_aggregate() {
            return Err(DalError::InvalidQuery(format!(
                "aggregate in filter: {}",
                crate::dialect::sql::describe(&Operand::Expr(Box::new(query.clone())))
            )));
        }
        self.node(query)
    }

    /// Leaf the filter language cannot express
    fn escalate(&mut self, expr: &Expression, reason: &str) -> DalResult<JsonValue> {
        match self.mode {
            Mode::Simple => {
                self.markers.push(Escalation::new(format!("{}: {}", reason, expr.op)));
                Ok(JsonValue::Null)
            }
            Mode::Pipeline => {
                let scope = Scope::default();
                let condition = ExprCompiler::new(self.codec, &scope).expression(expr)?;
                let name = format!("__cond_{}", self.materialized.len());
                self.materialized.push((name.clone(), condition));
                Ok(json!({ name: true }))
            }
        }
    }

    fn operand(&mut self, operand: &Operand) -> DalResult<JsonValue> {
        match operand {
            Operand::Expr(e) => self.node(e),
            Operand::Value(v) => match v.as_bool() {
                Some(true) => Ok(json!({})),
                Some(false) => Ok(false_filter()),
                None => Err(DalError::InvalidQuery(format!("{} used as a condition", v))),
            },
            Operand::Field(f) if *f.field_type() == FieldType::Boolean => {
                Ok(json!({ storage_name(f): true }))
            }
            Operand::Field(f) => Err(DalError::InvalidQuery(format!(
                "field {} used as a condition",
                f.longname()
            ))),
            Operand::Select(_) => Err(DalError::not_supported(DIALECT, "nested select")),
        }
    }

    fn node(&mut self, expr: &Expression) -> DalResult<JsonValue> {
        match &expr.op {
            Operator::And | Operator::Or => self.junction(expr),
            Operator::Not => {
                let inner = self.operand(&expr.first)?;
                if is_true(&inner) {
                    Ok(false_filter())
                } else if is_false(&inner) {
                    Ok(json!({}))
                } else {
                    Ok(json!({ "$nor": [inner] }))
                }
            }
            Operator::Const => match expr.const_value() {
                Some(true) => Ok(json!({})),
                Some(false) => Ok(false_filter()),
                None => Err(DalError::unsupported(DIALECT, &expr.op, &[])),
            },
            op if op.is_comparison() => self.comparison(expr),
            Operator::Belongs => self.belongs(expr),
            Operator::Contains { all, case_sensitive } => self.contains(expr, *all, *case_sensitive),
            Operator::Like { .. } | Operator::Regexp | Operator::StartsWith | Operator::EndsWith => {
                self.pattern(expr)
            }
            _ => self.escalate(expr, "computed condition"),
        }
    }

    fn junction(&mut self, expr: &Expression) -> DalResult<JsonValue> {
        let and = expr.op == Operator::And;
        let key = if and { "$and" } else { "$or" };
        let second = expr
            .second
            .as_ref()
            .ok_or_else(|| DalError::InvalidQuery(format!("{} needs a second operand", expr.op)))?;
        let mut terms = Vec::new();
        for side in [&expr.first, second] {
            let doc = self.operand(side)?;
            // boolean literals resolve here: filter documents cannot hold them
            match (and, is_true(&doc), is_false(&doc)) {
                (true, true, _) | (false, _, true) => continue,
                (true, _, true) => return Ok(false_filter()),
                (false, true, _) => return Ok(json!({})),
                _ => {}
            }
            match doc.get(key).and_then(JsonValue::as_array) {
                Some(nested) if doc.as_object().map(Map::len) == Some(1) => terms.extend(nested.iter().cloned()),
                _ => terms.push(doc),
            }
        }
        match terms.len() {
            0 if and => Ok(json!({})),
            0 => Ok(false_filter()),
            1 => Ok(terms.remove(0)),
            _ => Ok(json!({ key: terms })),
        }
    }

    /// `(field, literal)` when the node has that shape
    fn field_and_value<'e>(&self, expr: &'e Expression) -> Option<(&'e Field, &'e Value)> {
        match (&expr.first, &expr.second) {
            (Operand::Field(f), Some(Operand::Value(v))) => Some((f, v)),
            _ => None,
        }
    }

    fn comparison(&mut self, expr: &Expression) -> DalResult<JsonValue> {
        let Some((field, value)) = self.field_and_value(expr) else {
            return self.escalate(expr, "comparison between expressions");
        };
        let name = storage_name(field);
        if value.is_null() {
            return match expr.op {
                Operator::Eq => Ok(json!({ name: null })),
                Operator::Ne => Ok(json!({ name: { "$ne": null } })),
                _ => Err(DalError::unsupported(DIALECT, &expr.op, &[&field.longname(), "NULL"])),
            };
        }
        let key = comparison_key(&expr.op).ok_or_else(|| DalError::unsupported(DIALECT, &expr.op, &[]))?;
        let lit = literal(self.codec, value, Some(field.field_type()), Some(field))?;
        Ok(json!({ name: { key: lit } }))
    }

    fn belongs(&mut self, expr: &Expression) -> DalResult<JsonValue> {
        if let Some(Operand::Select(_)) = &expr.second {
            return Err(DalError::not_supported(DIALECT, "nested select"));
        }
        let Some((field, value)) = self.field_and_value(expr) else {
            return self.escalate(expr, "membership of an expression");
        };
        let items = match value {
            Value::List(items) => items.clone(),
            other => vec![other.clone()],
        };
        if items.is_empty() {
            return Ok(false_filter());
        }
        let literals = items
            .iter()
            .map(|item| literal(self.codec, item, Some(field.field_type()), Some(field)))
            .collect::<DalResult<Vec<_>>>()?;
        Ok(json!({ storage_name(field): { "$in": literals } }))
    }

    fn pattern(&mut self, expr: &Expression) -> DalResult<JsonValue> {
        let Some((field, _)) = self.field_and_value(expr) else {
            return self.escalate(expr, "pattern on an expression");
        };
        if !field.field_type().is_textual() {
            return self.escalate(expr, "pattern on a non-text field");
        }
        let second = expr.second.as_ref().unwrap_or(&Operand::Value(Value::Null));
        match pattern_regex(&expr.op, second) {
            Some((regex, insensitive)) => Ok(json!({ storage_name(field): regex_doc(regex, insensitive) })),
            None => self.escalate(expr, "pattern with a non-text operand"),
        }
    }

    fn contains(&mut self, expr: &Expression, all: bool, case_sensitive: bool) -> DalResult<JsonValue> {
        let Some((field, value)) = self.field_and_value(expr) else {
            return self.escalate(expr, "containment on an expression");
        };
        let name = storage_name(field);
        let items = match value {
            Value::List(items) => items.clone(),
            other => vec![other.clone()],
        };
        if items.is_empty() {
            return Ok(if all { json!({}) } else { false_filter() });
        }
        let joiner = if all { "$and" } else { "$or" };

        if let Some(element) = field.field_type().element_type() {
            if case_sensitive {
                let literals = items
                    .iter()
                    .map(|item| literal(self.codec, item, Some(&element), Some(field)))
                    .collect::<DalResult<Vec<_>>>()?;
                return Ok(match (all, literals.len()) {
                    (_, 1) => json!({ name: literals[0] }),
                    (true, _) => json!({ name: { "$all": literals } }),
                    (false, _) => json!({ name: { "$in": literals } }),
                });
            }
            let terms: Vec<JsonValue> = items
                .iter()
                .map(|item| {
                    let text = item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string());
                    json!({ name: regex_doc(format!("^{}$", regex::escape(&text)), true) })
                })
                .collect();
            return Ok(if terms.len() == 1 {
                terms.into_iter().next().unwrap_or_default()
            } else {
                json!({ joiner: terms })
            });
        }

        if !field.field_type().is_textual() {
            return self.escalate(expr, "containment on a non-text field");
        }
        let mut terms = Vec::with_capacity(items.len());
        for item in &items {
            match item {
                Value::Str(text) => terms.push(json!({ name: regex_doc(regex::escape(text), !case_sensitive) })),
                _ => return self.escalate(expr, "containment of a non-text value"),
            }
        }
        Ok(if terms.len() == 1 {
            terms.into_iter().next().unwrap_or_default()
        } else {
            json!({ joiner: terms })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Composable;
    use crate::schema::Table;

    fn item() -> Table {
        Table::builder("item")
            .field(("name", FieldType::string()))
            .field(("price", FieldType::Double))
            .field(("qty", FieldType::Integer))
            .field(("tags", FieldType::ListString))
            .field(("active", FieldType::Boolean))
            .build()
            .unwrap()
    }

    fn simple(q: &Expression) -> (JsonValue, Vec<Escalation>) {
        let codec = DocumentCodec;
        let mut compiler = FilterCompiler::simple(&codec);
        let doc = compiler.compile(q).unwrap();
        (doc, compiler.markers().to_vec())
    }

    #[test]
    fn test_range_is_a_plain_filter() {
        let t = item();
        let price = t.field("price").unwrap();
        let (doc, markers) = simple(&(price.gt(10) & price.lt(20)));
        assert_eq!(doc, json!({"$and": [{"price": {"$gt": 10}}, {"price": {"$lt": 20}}]}));
        assert!(markers.is_empty());
    }

    #[test]
    fn test_nested_junctions_flatten() {
        let t = item();
        let qty = t.field("qty").unwrap();
        let (doc, _) = simple(&(qty.gt(1) & qty.lt(9) & qty.not_equal(5)));
        assert_eq!(
            doc,
            json!({"$and": [{"qty": {"$gt": 1}}, {"qty": {"$lt": 9}}, {"qty": {"$ne": 5}}]})
        );
    }

    #[test]
    fn test_null_and_membership() {
        let t = item();
        let name = t.field("name").unwrap();
        assert_eq!(simple(&name.equal(None::<&str>)).0, json!({"name": null}));
        assert_eq!(simple(&name.not_equal(None::<&str>)).0, json!({"name": {"$ne": null}}));
        assert_eq!(
            simple(&t.field("qty").unwrap().belongs(vec![1, 2])).0,
            json!({"qty": {"$in": [1, 2]}})
        );
        assert_eq!(simple(&name.belongs(Vec::<&str>::new())).0, false_filter());
        assert_eq!(simple(&t.id().unwrap().equal(4)).0, json!({"_id": {"$eq": 4}}));
    }

    #[test]
    fn test_negation_uses_nor() {
        let t = item();
        let q = !t.field("qty").unwrap().gt(3);
        assert_eq!(simple(&q).0, json!({"$nor": [{"qty": {"$gt": 3}}]}));
    }

    #[test]
    fn test_constants_resolve_statically() {
        let t = item();
        let q = t.field("qty").unwrap().gt(3);
        let raw_and = Expression::binary(Operator::And, q.clone(), Expression::constant(true));
        assert_eq!(simple(&raw_and).0, json!({"qty": {"$gt": 3}}));
        let raw_or = Expression::binary(Operator::Or, q, Expression::constant(true));
        assert_eq!(simple(&raw_or).0, json!({}));
        assert_eq!(simple(&Expression::constant(false)).0, false_filter());
    }

    #[test]
    fn test_patterns_become_regex() {
        let t = item();
        let name = t.field("name").unwrap();
        assert_eq!(simple(&name.like("a_c%")).0, json!({"name": {"$regex": "^a.c.*$"}}));
        assert_eq!(
            simple(&name.ilike("x.y")).0,
            json!({"name": {"$regex": "^x\\.y$", "$options": "i"}})
        );
        assert_eq!(simple(&name.startswith("ab")).0, json!({"name": {"$regex": "^ab"}}));
        assert_eq!(
            simple(&name.icontains("pen")).0,
            json!({"name": {"$regex": "pen", "$options": "i"}})
        );
        assert_eq!(
            simple(&name.like_escape("100!%", '!')).0,
            json!({"name": {"$regex": "^100%$"}})
        );
    }

    #[test]
    fn test_list_containment() {
        let t = item();
        let tags = t.field("tags").unwrap();
        assert_eq!(simple(&tags.contains("red")).0, json!({"tags": "red"}));
        assert_eq!(
            simple(&tags.contains_all(vec!["a", "b"])).0,
            json!({"tags": {"$all": ["a", "b"]}})
        );
        assert_eq!(
            simple(&tags.contains(vec!["a", "b"])).0,
            json!({"tags": {"$in": ["a", "b"]}})
        );
    }

    #[test]
    fn test_computed_conditions_escalate() {
        let t = item();
        let price = t.field("price").unwrap();
        let qty = t.field("qty").unwrap();
        let q = price.gt(10) & (price.clone() * qty.clone()).gt(100);
        let (_, markers) = simple(&q);
        assert_eq!(markers.len(), 1);
        assert!(markers[0].reason.starts_with("comparison between expressions"));

        let codec = DocumentCodec;
        let mut compiler = FilterCompiler::pipeline(&codec);
        let doc = compiler.compile(&q).unwrap();
        assert_eq!(doc, json!({"$and": [{"price": {"$gt": 10}}, {"__cond_0": true}]}));
        assert_eq!(
            compiler.into_materialized(),
            vec![(
                "__cond_0".to_string(),
                json!({"$gt": [{"$multiply": ["$price", "$qty"]}, 100]})
            )]
        );
    }

    #[test]
    fn test_pattern_on_number_escalates() {
        let t = item();
        let (_, markers) = simple(&t.field("qty").unwrap().like("1%"));
        assert_eq!(markers, vec![Escalation::new("pattern on a non-text field: LIKE")]);
    }

    #[test]
    fn test_aggregate_in_filter_is_rejected() {
        let t = item();
        let q = t.field("qty").unwrap().sum().gt(3);
        let codec = DocumentCodec;
        assert!(FilterCompiler::simple(&codec).compile(&q).is_err());
    }
}

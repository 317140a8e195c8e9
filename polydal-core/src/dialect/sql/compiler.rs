//! Expression to SQL text.

use crate::codec::bar;
use crate::error::{DalError, DalResult};
use crate::expr::{Expression, Operand, Operator};
use crate::schema::Field;
use crate::types::FieldType;
use crate::value::Value;

use super::statement;
use super::SqlDialect;
use crate::dialect::ColumnMode;

/// Post-order renderer over one dialect's hooks
pub struct SqlCompiler<'a> {
    dialect: &'a dyn SqlDialect,
}

/// Readable form of an operand for error messages
pub(crate) fn describe(operand: &Operand) -> String {
    match operand {
        Operand::Field(f) => f.longname(),
        Operand::Value(v) => v.to_string(),
        Operand::Expr(e) => match &e.second {
            Some(second) => format!("{}({}, {})", e.op, describe(&e.first), describe(second)),
            None => format!("{}({})", e.op, describe(&e.first)),
        },
        Operand::Select(_) => "SELECT ...".to_string(),
    }
}

/// Escape LIKE wildcards with `\`
pub(crate) fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Text of a literal used inside a pattern
fn pattern_text(value: &Value) -> String {
    match value {
        Value::Str(s) | Value::Key(s) => s.clone(),
        Value::Reference { id, .. } => pattern_text(id),
        other => other.to_json().to_string().trim_matches('"').to_string(),
    }
}

impl<'a> SqlCompiler<'a> {
    pub fn new(dialect: &'a dyn SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &'a dyn SqlDialect {
        self.dialect
    }

    pub fn unsupported(&self, expr: &Expression) -> DalError {
        let mut operands = vec![describe(&expr.first)];
        if let Some(second) = &expr.second {
            operands.push(describe(second));
        }
        let refs: Vec<&str> = operands.iter().map(String::as_str).collect();
        DalError::unsupported(self.dialect.backend(), &expr.op, &refs)
    }

    pub fn table_name(&self, info: &crate::schema::TableInfo) -> String {
        self.dialect.quote(&info.name)
    }

    pub fn field(&self, field: &Field, mode: ColumnMode) -> String {
        match mode {
            ColumnMode::Bare => self.dialect.quote(field.name()),
            ColumnMode::Addressable | ColumnMode::Labeled => format!(
                "{}.{}",
                self.dialect.quote(field.table_name()),
                self.dialect.quote(field.name())
            ),
        }
    }

    /// Literal for comparison against something of type `expected`.
    ///
    /// Numeric literals compared with numeric columns are kept as written;
    /// everything else is coerced to the expected type first.
    pub fn literal(&self, value: &Value, expected: Option<&FieldType>, field: Option<&Field>) -> DalResult<String> {
        if value.is_null() {
            return Ok("NULL".to_string());
        }
        let numeric_literal = matches!(value, Value::Int(_) | Value::Float(_) | Value::Decimal(_));
        let ty = match expected {
            Some(ty) if numeric_literal && ty.is_numeric() => value.natural_type(),
            Some(ty) => ty.clone(),
            None => value.natural_type(),
        };
        let longname = field.map(Field::longname);
        let coerced = value.coerce(&ty, longname.as_deref())?;
        let raw = self.dialect.value_codec().encode_coerced(&coerced, &ty)?;
        Ok(self.dialect.render_raw(&raw))
    }

    /// Literal for storage in `field` (insert/update)
    pub fn stored_literal(&self, value: &Value, field: &Field) -> DalResult<String> {
        let longname = field.longname();
        let coerced = value.coerce(field.field_type(), Some(&longname))?;
        let raw = self
            .dialect
            .value_codec()
            .encode_coerced(&coerced, field.field_type())?;
        Ok(self.dialect.render_raw(&raw))
    }

    pub fn operand(&self, operand: &Operand, expected: Option<&FieldType>, mode: ColumnMode) -> DalResult<String> {
        match operand {
            Operand::Field(f) => Ok(self.field(f, mode)),
            Operand::Value(v) => self.literal(v, expected, None),
            Operand::Expr(e) => self.expression(e, mode),
            Operand::Select(s) => {
                if !self.dialect.features().subselect {
                    return Err(DalError::not_supported(self.dialect.backend(), "nested select"));
                }
                statement::select_sql(self.dialect, s).map(|sql| format!("({})", sql))
            }
        }
    }

    pub fn expression(&self, expr: &Expression, mode: ColumnMode) -> DalResult<String> {
        self.dialect.render_operator(self, expr, mode)
    }

    /// First operand, widened to text when it is not textual
    fn text_operand(&self, expr: &Expression, mode: ColumnMode) -> DalResult<String> {
        let sql = self.operand(&expr.first, None, mode)?;
        if expr.first.field_type().is_textual() {
            Ok(sql)
        } else {
            Ok(format!("CAST({} AS {})", sql, self.dialect.text_cast_type()))
        }
    }

    fn second<'b>(&self, expr: &'b Expression) -> DalResult<&'b Operand> {
        expr.second
            .as_ref()
            .ok_or_else(|| DalError::InvalidQuery(format!("{} needs a second operand", expr.op)))
    }

    /// Second operand with its literal typed after the first operand
    fn typed_second(&self, expr: &Expression, mode: ColumnMode) -> DalResult<String> {
        let ty = expr.first.field_type();
        match self.second(expr)? {
            Operand::Value(v) => self.literal(v, Some(&ty), expr.first.as_field()),
            other => self.operand(other, Some(&ty), mode),
        }
    }

    pub fn infix(&self, expr: &Expression, symbol: &str, mode: ColumnMode) -> DalResult<String> {
        let a = self.operand(&expr.first, None, mode)?;
        let b = self.typed_second(expr, mode)?;
        Ok(format!("({} {} {})", a, symbol, b))
    }

    fn function(&self, name: &str, expr: &Expression, mode: ColumnMode) -> DalResult<String> {
        let inner_mode = inner(mode);
        Ok(format!("{}({})", name, self.operand(&expr.first, None, inner_mode)?))
    }

    fn like_clause(&self, target: &str, pattern: &str, case_sensitive: bool, escape: Option<char>) -> String {
        let body = if case_sensitive {
            format!("{} LIKE {}", target, pattern)
        } else {
            match self.dialect.ilike_keyword() {
                Some(kw) => format!("{} {} {}", target, kw, pattern),
                None => format!("LOWER({}) LIKE LOWER({})", target, pattern),
            }
        };
        match escape {
            Some(c) => format!("({} ESCAPE {})", body, self.dialect.quote_string(&c.to_string())),
            None => format!("({})", body),
        }
    }

    /// `target LIKE prefix || value || suffix` with wildcards in the value escaped
    fn affix_like(
        &self,
        expr: &Expression,
        prefix: &str,
        suffix: &str,
        case_sensitive: bool,
        mode: ColumnMode,
    ) -> DalResult<String> {
        let target = self.text_operand(expr, mode)?;
        match self.second(expr)? {
            Operand::Value(Value::List(items)) => {
                let terms = items
                    .iter()
                    .map(|item| {
                        let pattern = format!("{}{}{}", prefix, like_escape(&pattern_text(item)), suffix);
                        self.like_clause(&target, &self.dialect.quote_string(&pattern), case_sensitive, Some('\\'))
                    })
                    .collect::<Vec<_>>();
                Ok(join_terms(terms, "OR"))
            }
            Operand::Value(v) => {
                let pattern = format!("{}{}{}", prefix, like_escape(&pattern_text(v)), suffix);
                Ok(self.like_clause(&target, &self.dialect.quote_string(&pattern), case_sensitive, Some('\\')))
            }
            other => {
                let b = self.operand(other, None, mode)?;
                let mut parts = Vec::new();
                if !prefix.is_empty() {
                    parts.push(self.dialect.quote_string(prefix));
                }
                parts.push(b);
                if !suffix.is_empty() {
                    parts.push(self.dialect.quote_string(suffix));
                }
                Ok(self.like_clause(&target, &self.dialect.concat(&parts), case_sensitive, None))
            }
        }
    }

    fn contains(&self, expr: &Expression, all: bool, case_sensitive: bool, mode: ColumnMode) -> DalResult<String> {
        let first_type = expr.first.field_type();
        if !first_type.is_list() {
            if let Operand::Value(Value::List(items)) = self.second(expr)? {
                let target = self.text_operand(expr, mode)?;
                let terms = items
                    .iter()
                    .map(|item| {
                        let pattern = format!("%{}%", like_escape(&pattern_text(item)));
                        self.like_clause(&target, &self.dialect.quote_string(&pattern), case_sensitive, Some('\\'))
                    })
                    .collect::<Vec<_>>();
                return Ok(combine(terms, all));
            }
            return self.affix_like(expr, "%", "%", case_sensitive, mode);
        }

        // list fields are stored bar-encoded: match `|item|`
        let target = self.operand(&expr.first, None, mode)?;
        let items = match self.second(expr)? {
            Operand::Value(Value::List(items)) => items.clone(),
            Operand::Value(v) => vec![v.clone()],
            _ => return Err(self.unsupported(expr)),
        };
        let terms = items
            .iter()
            .map(|item| {
                let text = bar::bar_escape(&pattern_text(item));
                let pattern = format!("%|{}|%", like_escape(&text));
                self.like_clause(&target, &self.dialect.quote_string(&pattern), case_sensitive, Some('\\'))
            })
            .collect::<Vec<_>>();
        Ok(combine(terms, all))
    }

    fn belongs(&self, expr: &Expression, mode: ColumnMode) -> DalResult<String> {
        let a = self.operand(&expr.first, None, mode)?;
        let ty = expr.first.field_type();
        match self.second(expr)? {
            Operand::Value(Value::List(items)) if items.is_empty() => Ok(FALSE.to_string()),
            Operand::Value(Value::List(items)) => {
                let literals = items
                    .iter()
                    .map(|item| self.literal(item, Some(&ty), expr.first.as_field()))
                    .collect::<DalResult<Vec<_>>>()?;
                Ok(format!("({} IN ({}))", a, literals.join(", ")))
            }
            Operand::Select(select) => {
                if !self.dialect.features().subselect {
                    return Err(DalError::not_supported(self.dialect.backend(), "nested select"));
                }
                let sub = statement::select_sql(self.dialect, select)?;
                Ok(format!("({} IN ({}))", a, sub))
            }
            Operand::Value(v) => {
                let literal = self.literal(v, Some(&ty), expr.first.as_field())?;
                Ok(format!("({} IN ({}))", a, literal))
            }
            other => {
                let b = self.operand(other, None, mode)?;
                Ok(format!("({} IN ({}))", a, b))
            }
        }
    }

    /// Rendering shared by every SQL dialect
    pub fn render_base(&self, expr: &Expression, mode: ColumnMode) -> DalResult<String> {
        match &expr.op {
            Operator::And | Operator::Or => {
                let keyword = if expr.op == Operator::And { "AND" } else { "OR" };
                let a = self.operand(&expr.first, None, mode)?;
                let b = self.operand(self.second(expr)?, None, mode)?;
                Ok(format!("({} {} {})", a, keyword, b))
            }
            Operator::Not => Ok(format!("(NOT {})", self.operand(&expr.first, None, mode)?)),
            Operator::Const => match expr.const_value() {
                Some(true) => Ok(TRUE.to_string()),
                Some(false) => Ok(FALSE.to_string()),
                None => Err(self.unsupported(expr)),
            },
            Operator::Eq if expr.second_is_null() => {
                Ok(format!("({} IS NULL)", self.operand(&expr.first, None, mode)?))
            }
            Operator::Ne if expr.second_is_null() => {
                Ok(format!("({} IS NOT NULL)", self.operand(&expr.first, None, mode)?))
            }
            Operator::Eq => self.infix(expr, "=", mode),
            Operator::Ne => self.infix(expr, "<>", mode),
            Operator::Lt => self.infix(expr, "<", mode),
            Operator::Le => self.infix(expr, "<=", mode),
            Operator::Gt => self.infix(expr, ">", mode),
            Operator::Ge => self.infix(expr, ">=", mode),
            Operator::Belongs => self.belongs(expr, mode),
            Operator::Like {
                case_sensitive,
                escape,
            } => {
                let target = self.text_operand(expr, mode)?;
                let pattern = match self.second(expr)? {
                    Operand::Value(v) => self.literal(v, Some(&FieldType::Text), None)?,
                    other => self.operand(other, None, mode)?,
                };
                Ok(self.like_clause(&target, &pattern, *case_sensitive, *escape))
            }
            Operator::StartsWith => self.affix_like(expr, "", "%", true, mode),
            Operator::EndsWith => self.affix_like(expr, "%", "", true, mode),
            Operator::Contains {
                all,
                case_sensitive,
            } => self.contains(expr, *all, *case_sensitive, mode),
            Operator::Regexp => Err(self.unsupported(expr)),
            Operator::Add => self.infix(expr, "+", mode),
            Operator::Sub => self.infix(expr, "-", mode),
            Operator::Mul => self.infix(expr, "*", mode),
            Operator::Div => self.infix(expr, "/", mode),
            Operator::Mod => self.infix(expr, "%", mode),
            Operator::Lower => self.function("LOWER", expr, mode),
            Operator::Upper => self.function("UPPER", expr, mode),
            Operator::Length => self.function(self.dialect.length_function(), expr, mode),
            Operator::Substring { start, length } => Ok(format!(
                "{}({},{},{})",
                self.dialect.substring_function(),
                self.operand(&expr.first, None, inner(mode))?,
                start,
                length
            )),
            Operator::Coalesce => {
                let a = self.operand(&expr.first, None, inner(mode))?;
                let ty = expr.first.field_type();
                let b = match self.second(expr)? {
                    Operand::Value(v) => self.literal(v, Some(&ty), expr.first.as_field())?,
                    other => self.operand(other, None, inner(mode))?,
                };
                Ok(format!("COALESCE({},{})", a, b))
            }
            Operator::CoalesceZero => Ok(format!(
                "COALESCE({},0)",
                self.operand(&expr.first, None, inner(mode))?
            )),
            Operator::Extract(part) => {
                let arg = self.operand(&expr.first, None, inner(mode))?;
                Ok(self.dialect.extract(*part, &arg))
            }
            Operator::Epoch => {
                let arg = self.operand(&expr.first, None, inner(mode))?;
                self.dialect.epoch(&arg).ok_or_else(|| self.unsupported(expr))
            }
            Operator::Cast(ty) => Ok(format!(
                "CAST({} AS {})",
                self.operand(&expr.first, None, inner(mode))?,
                self.dialect.sql_type(ty)
            )),
            Operator::Random => self
                .dialect
                .random()
                .map(str::to_string)
                .ok_or_else(|| self.unsupported(expr)),
            Operator::Count { distinct } => {
                let arg = if expr.first.is_null() {
                    "*".to_string()
                } else {
                    self.operand(&expr.first, None, inner(mode))?
                };
                if *distinct {
                    Ok(format!("COUNT(DISTINCT {})", arg))
                } else {
                    Ok(format!("COUNT({})", arg))
                }
            }
            Operator::Sum => self.function("SUM", expr, mode),
            Operator::Avg => self.function("AVG", expr, mode),
            Operator::Min => self.function("MIN", expr, mode),
            Operator::Max => self.function("MAX", expr, mode),
            Operator::Alias(name) => {
                let inner_sql = self.operand(&expr.first, None, inner(mode))?;
                match mode {
                    ColumnMode::Labeled => Ok(format!("{} AS {}", inner_sql, self.dialect.quote(name))),
                    _ => Ok(inner_sql),
                }
            }
            Operator::Desc => Ok(format!("{} DESC", self.operand(&expr.first, None, inner(mode))?)),
        }
    }
}

pub(crate) const TRUE: &str = "(1=1)";
pub(crate) const FALSE: &str = "(1=0)";

/// Labels only apply at the top of a select-list entry
fn inner(mode: ColumnMode) -> ColumnMode {
    match mode {
        ColumnMode::Labeled => ColumnMode::Addressable,
        other => other,
    }
}

fn join_terms(terms: Vec<String>, keyword: &str) -> String {
    match terms.len() {
        0 => FALSE.to_string(),
        1 => terms.into_iter().next().unwrap_or_default(),
        _ => format!("({})", terms.join(&format!(" {} ", keyword))),
    }
}

fn combine(terms: Vec<String>, all: bool) -> String {
    if all && terms.is_empty() {
        return TRUE.to_string();
    }
    join_terms(terms, if all { "AND" } else { "OR" })
}

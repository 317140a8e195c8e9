//! Result parsing and row reconstruction.
//!
//! Raw rows come back from a driver as flat tuples, one value per output
//! column. The parser decodes every column with the backend codec, groups
//! field columns by owning table, keeps expression columns in the extra
//! bucket, and then evaluates virtual fields against the built row. Lazy
//! fields are attached to the row and only run when asked for.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::codec::{Codec, RawRow};
use crate::dialect::document::flatten_document;
use crate::error::{DalError, DalResult};
use crate::expr::Operand;
use crate::schema::{Field, LazyField, Table};
use crate::value::Value;

/// Values of one table within a row
#[derive(Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Value>,
    #[serde(skip)]
    lazy: Vec<LazyField>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn lazy_names(&self) -> impl Iterator<Item = &str> {
        self.lazy.iter().map(|l| l.name.as_str())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("values", &self.values)
            .field("lazy", &self.lazy_names().collect::<Vec<_>>())
            .finish()
    }
}

/// A reconstructed row: table name -> record, plus expression columns
#[derive(Debug, Clone, Default, Serialize)]
pub struct Row {
    #[serde(flatten)]
    tables: BTreeMap<String, Record>,
    #[serde(rename = "_extra")]
    extra: BTreeMap<String, Value>,
}

impl Row {
    /// Value of `table.field`, failing with `MissingField` when the row does
    /// not carry it.
    pub fn get(&self, table: &str, field: &str) -> DalResult<&Value> {
        self.tables
            .get(table)
            .and_then(|r| r.get(field))
            .ok_or_else(|| DalError::MissingField {
                table: table.to_string(),
                field: field.to_string(),
            })
    }

    pub fn value(&self, field: &Field) -> DalResult<&Value> {
        self.get(field.table_name(), field.name())
    }

    pub fn record(&self, table: &str) -> Option<&Record> {
        self.tables.get(table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Expression column by its output label
    pub fn extra(&self, colname: &str) -> Option<&Value> {
        self.extra.get(colname)
    }

    pub fn extras(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    /// Run the lazy field `name` of `table` against this row.
    pub fn call_lazy(&self, table: &str, name: &str) -> DalResult<Value> {
        let lazy = self
            .tables
            .get(table)
            .and_then(|r| r.lazy.iter().find(|l| l.name == name))
            .ok_or_else(|| DalError::MissingField {
                table: table.to_string(),
                field: name.to_string(),
            })?;
        (lazy.compute)(self)
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    fn set(&mut self, table: &str, field: &str, value: Value) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .values
            .insert(field.to_string(), value);
    }
}

/// A row dropped because one of its columns failed to decode
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub index: usize,
    pub error: DalError,
}

/// Parsed result set
#[derive(Debug, Clone, Default)]
pub struct Rows {
    pub colnames: Vec<String>,
    rows: Vec<Row>,
    skipped: Vec<SkippedRow>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Rows dropped by non-strict decoding, with the reason
    pub fn skipped(&self) -> &[SkippedRow] {
        &self.skipped
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.rows.iter().map(Row::to_json).collect())
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Turns raw driver rows into [`Row`]s for one compiled select.
pub struct RowParser<'a> {
    codec: &'a dyn Codec,
    fields: &'a [Operand],
    colnames: &'a [String],
    tables: Vec<Table>,
    strict: bool,
}

impl<'a> RowParser<'a> {
    pub fn new(codec: &'a dyn Codec, fields: &'a [Operand], colnames: &'a [String]) -> Self {
        Self {
            codec,
            fields,
            colnames,
            tables: Vec::new(),
            strict: false,
        }
    }

    /// Table definitions whose virtual and lazy fields should be attached.
    pub fn with_tables(mut self, tables: &[Table]) -> Self {
        self.tables = tables.to_vec();
        self
    }

    /// Fail the whole result on the first decode error instead of skipping
    /// the row.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn parse(&self, raw_rows: Vec<RawRow>) -> DalResult<Rows> {
        if self.fields.len() != self.colnames.len() {
            return Err(DalError::InvalidQuery(format!(
                "{} output fields but {} column names",
                self.fields.len(),
                self.colnames.len()
            )));
        }
        let mut rows = Rows {
            colnames: self.colnames.to_vec(),
            rows: Vec::with_capacity(raw_rows.len()),
            skipped: Vec::new(),
        };
        for (index, raw) in raw_rows.into_iter().enumerate() {
            match self.build(raw) {
                Ok(row) => rows.rows.push(self.attach_computed(row)?),
                Err(error @ DalError::Decode { .. }) if !self.strict => {
                    rows.skipped.push(SkippedRow { index, error });
                }
                Err(error) => return Err(error),
            }
        }
        Ok(rows)
    }

    /// Parse documents returned by the document dialect, reading `keys`.
    pub fn parse_documents(&self, docs: &[JsonValue], keys: &[String]) -> DalResult<Rows> {
        self.parse(docs.iter().map(|doc| flatten_document(doc, keys)).collect())
    }

    fn build(&self, raw: RawRow) -> DalResult<Row> {
        if raw.len() != self.fields.len() {
            return Err(DalError::InvalidQuery(format!(
                "expected {} columns, driver returned {}",
                self.fields.len(),
                raw.len()
            )));
        }
        let mut row = Row::default();
        for ((operand, colname), value) in self.fields.iter().zip(self.colnames).zip(raw) {
            let decoded = self
                .codec
                .decode(value, &operand.field_type())
                .map_err(|e| e.in_column(colname))?;
            match operand {
                Operand::Field(f) => row.set(f.table_name(), f.name(), decoded),
                _ => {
                    row.extra.insert(colname.clone(), decoded);
                }
            }
        }
        Ok(row)
    }

    fn attach_computed(&self, mut row: Row) -> DalResult<Row> {
        for table in &self.tables {
            if !row.tables.contains_key(table.name()) {
                continue;
            }
            for virtual_field in table.virtual_fields() {
                match (virtual_field.compute)(&row) {
                    Ok(value) => row.set(table.name(), &virtual_field.name, value),
                    Err(DalError::MissingField { .. }) => {}
                    Err(other) => return Err(other),
                }
            }
            if let Some(record) = row.tables.get_mut(table.name()) {
                record.lazy = table.lazy_fields().to_vec();
            }
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DocumentCodec, RawValue, SqlTextCodec};
    use crate::expr::{Composable, IntoOperand};
    use crate::types::FieldType;
    use chrono::NaiveDate;
    use serde_json::json;

    fn person() -> Table {
        Table::builder("person")
            .field(("name", FieldType::string()))
            .field(("birth", FieldType::Date))
            .field(("score", FieldType::Double))
            .virtual_field("initial", |row| {
                let name = row.get("person", "name")?;
                Ok(Value::Str(name.as_str().unwrap_or_default().chars().take(1).collect()))
            })
            .lazy_field("shout", |row| {
                let name = row.get("person", "name")?;
                Ok(Value::Str(name.as_str().unwrap_or_default().to_uppercase()))
            })
            .build()
            .unwrap()
    }

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn test_rows_group_by_table_with_extras() {
        let t = person();
        let fields = vec![
            t.field("name").unwrap().into_operand(),
            t.field("birth").unwrap().into_operand(),
            t.field("score").unwrap().max().into_operand(),
        ];
        let colnames = vec!["person.name".to_string(), "person.birth".to_string(), "MAX(person.score)".to_string()];
        let codec = SqlTextCodec::default();
        let rows = RowParser::new(&codec, &fields, &colnames)
            .parse(vec![vec![text("Ann"), text("1990-04-01"), RawValue::Float(9.5)]])
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = rows.first().unwrap();
        assert_eq!(row.get("person", "name").unwrap(), &Value::Str("Ann".into()));
        assert_eq!(
            row.get("person", "birth").unwrap(),
            &Value::Date(NaiveDate::from_ymd_opt(1990, 4, 1).unwrap())
        );
        assert_eq!(row.extra("MAX(person.score)"), Some(&Value::Float(9.5)));
        assert!(matches!(row.get("person", "score"), Err(DalError::MissingField { .. })));
    }

    #[test]
    fn test_virtual_and_lazy_fields() {
        let t = person();
        let fields = vec![t.field("name").unwrap().into_operand()];
        let colnames = vec!["person.name".to_string()];
        let codec = SqlTextCodec::default();
        let rows = RowParser::new(&codec, &fields, &colnames)
            .with_tables(&[t])
            .parse(vec![vec![text("bob")]])
            .unwrap();
        let row = rows.first().unwrap();
        assert_eq!(row.get("person", "initial").unwrap(), &Value::Str("b".into()));
        assert_eq!(row.record("person").unwrap().lazy_names().collect::<Vec<_>>(), vec!["shout"]);
        assert!(row.record("person").unwrap().get("shout").is_none());
        assert_eq!(row.call_lazy("person", "shout").unwrap(), Value::Str("BOB".into()));
    }

    #[test]
    fn test_virtual_field_skipped_on_partial_selection() {
        let t = person();
        let fields = vec![t.field("score").unwrap().into_operand()];
        let colnames = vec!["person.score".to_string()];
        let codec = SqlTextCodec::default();
        let rows = RowParser::new(&codec, &fields, &colnames)
            .with_tables(&[t])
            .parse(vec![vec![RawValue::Int(3)]])
            .unwrap();
        let row = rows.first().unwrap();
        assert_eq!(row.get("person", "score").unwrap(), &Value::Float(3.0));
        assert!(row.get("person", "initial").is_err());
    }

    #[test]
    fn test_virtual_field_errors_propagate() {
        let t = Table::builder("person")
            .field(("name", FieldType::string()))
            .virtual_field("broken", |_| Err(DalError::Computation("division by zero".into())))
            .build()
            .unwrap();
        let fields = vec![t.field("name").unwrap().into_operand()];
        let colnames = vec!["person.name".to_string()];
        let codec = SqlTextCodec::default();
        let err = RowParser::new(&codec, &fields, &colnames)
            .with_tables(&[t])
            .parse(vec![vec![text("x")]])
            .unwrap_err();
        assert_eq!(err, DalError::Computation("division by zero".into()));
    }

    #[test]
    fn test_decode_failure_drops_row_unless_strict() {
        let t = person();
        let fields = vec![t.field("birth").unwrap().into_operand()];
        let colnames = vec!["person.birth".to_string()];
        let codec = SqlTextCodec::default();
        let raw = || vec![vec![text("2001-02-03")], vec![text("not a date")], vec![RawValue::Null]];

        let rows = RowParser::new(&codec, &fields, &colnames).parse(raw()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.skipped().len(), 1);
        assert_eq!(rows.skipped()[0].index, 1);
        assert!(rows.skipped()[0].error.to_string().contains("person.birth"));

        let err = RowParser::new(&codec, &fields, &colnames).strict(true).parse(raw()).unwrap_err();
        assert!(matches!(err, DalError::Decode { ref column, .. } if column == "person.birth"));
    }

    #[test]
    fn test_arity_mismatch_is_fatal() {
        let t = person();
        let fields = vec![t.field("name").unwrap().into_operand()];
        let colnames = vec!["person.name".to_string()];
        let codec = SqlTextCodec::default();
        let err = RowParser::new(&codec, &fields, &colnames)
            .parse(vec![vec![text("a"), text("b")]])
            .unwrap_err();
        assert!(matches!(err, DalError::InvalidQuery(_)));
    }

    #[test]
    fn test_documents_are_flattened_by_key() {
        let t = person();
        let fields = vec![t.id().unwrap().into_operand(), t.field("birth").unwrap().into_operand()];
        let colnames = vec!["person.id".to_string(), "person.birth".to_string()];
        let docs = vec![json!({"_id": {"$oid": "5f8d0d55b54764421b7156c5"}, "birth": {"$date": "2020-01-02T00:00:00Z"}})];
        let rows = RowParser::new(&DocumentCodec, &fields, &colnames)
            .parse_documents(&docs, &["_id".to_string(), "birth".to_string()])
            .unwrap();
        let row = rows.first().unwrap();
        assert_eq!(row.get("person", "id").unwrap(), &Value::Key("5f8d0d55b54764421b7156c5".into()));
        assert_eq!(
            row.get("person", "birth").unwrap(),
            &Value::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap())
        );
        assert_eq!(row.to_json()["_extra"], json!({}));
    }
}

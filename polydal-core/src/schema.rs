//! Table and field metadata.
//!
//! Tables are defined by the caller (the schema collaborator) and consumed
//! read-only by the compilers. Every table object carries a process-unique
//! identity so that two distinct tables claiming the same name can be told
//! apart, which is what aliasing (self-joins) relies on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DalError, DalResult};
use crate::expr::Expression;
use crate::rows::Row;
use crate::types::FieldType;
use crate::value::Value;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Table and field names are rendered unquoted by some dialects
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

fn check_identifier(kind: &str, name: &str) -> DalResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DalError::InvalidQuery(format!("Invalid {} name '{}'", kind, name)))
    }
}

/// Identity of a table object: name used in queries plus physical name
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TableInfo {
    pub id: u64,
    /// Alias if aliased, physical name otherwise
    pub name: String,
    pub sql_name: String,
    pub primary_key: String,
}

impl TableInfo {
    fn new(name: &str, sql_name: &str, primary_key: &str) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            sql_name: sql_name.to_string(),
            primary_key: primary_key.to_string(),
        })
    }

    pub fn is_alias(&self) -> bool {
        self.name != self.sql_name
    }
}

/// Referential action for `reference` fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    #[default]
    Cascade,
    SetNull,
    NoAction,
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnDelete::Cascade => write!(f, "CASCADE"),
            OnDelete::SetNull => write!(f, "SET NULL"),
            OnDelete::NoAction => write!(f, "NO ACTION"),
        }
    }
}

/// A named, typed column owned by exactly one table
#[derive(Clone)]
pub struct Field {
    name: String,
    table: Arc<TableInfo>,
    field_type: FieldType,
    notnull: bool,
    unique: bool,
    default: Option<Value>,
    ondelete: OnDelete,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Arc<TableInfo> {
        &self.table
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn notnull(&self) -> bool {
        self.notnull
    }

    pub fn unique(&self) -> bool {
        self.unique
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn ondelete(&self) -> OnDelete {
        self.ondelete
    }

    pub fn is_primary_key(&self) -> bool {
        self.name == self.table.primary_key
    }

    /// Primary key field of a table known only by its identity
    pub fn primary_key_of(table: &Arc<TableInfo>) -> Field {
        Field {
            name: table.primary_key.clone(),
            table: Arc::clone(table),
            field_type: FieldType::Id,
            notnull: true,
            unique: true,
            default: None,
            ondelete: OnDelete::default(),
        }
    }

    /// `table.field`
    pub fn longname(&self) -> String {
        format!("{}.{}", self.table.name, self.name)
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.table.id == other.table.id && self.name == other.name
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({} {})", self.longname(), self.field_type)
    }
}

/// Builder-side description of a field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    field_type: FieldType,
    notnull: bool,
    unique: bool,
    default: Option<Value>,
    ondelete: OnDelete,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            notnull: false,
            unique: false,
            default: None,
            ondelete: OnDelete::default(),
        }
    }

    pub fn notnull(mut self) -> Self {
        self.notnull = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn ondelete(mut self, action: OnDelete) -> Self {
        self.ondelete = action;
        self
    }

    fn bind(&self, table: &Arc<TableInfo>) -> Field {
        Field {
            name: self.name.clone(),
            table: Arc::clone(table),
            field_type: self.field_type.clone(),
            notnull: self.notnull,
            unique: self.unique,
            default: self.default.clone(),
            ondelete: self.ondelete,
        }
    }
}

impl From<(&str, FieldType)> for FieldSpec {
    fn from((name, ty): (&str, FieldType)) -> Self {
        FieldSpec::new(name, ty)
    }
}

/// Produces the common filter for a (possibly aliased) table
pub type CommonFilter = Arc<dyn Fn(&Table) -> Expression + Send + Sync>;

/// Computes a value from an already reconstructed row
pub type RowFunction = Arc<dyn Fn(&Row) -> DalResult<Value> + Send + Sync>;

/// Field computed from the row, not stored physically
#[derive(Clone)]
pub struct VirtualField {
    pub name: String,
    pub compute: RowFunction,
}

/// Virtual field evaluated only when asked for
#[derive(Clone)]
pub struct LazyField {
    pub name: String,
    pub compute: RowFunction,
}

/// A table definition bound to one identity
#[derive(Clone)]
pub struct Table {
    info: Arc<TableInfo>,
    specs: Arc<Vec<FieldSpec>>,
    fields: Vec<Field>,
    common_filter: Option<CommonFilter>,
    virtual_fields: Vec<VirtualField>,
    lazy_fields: Vec<LazyField>,
}

impl Table {
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder::new(name)
    }

    pub fn info(&self) -> &Arc<TableInfo> {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn sql_name(&self) -> &str {
        &self.info.sql_name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> DalResult<Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| DalError::UnknownField {
                table: self.info.name.clone(),
                field: name.to_string(),
            })
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Primary key field
    pub fn id(&self) -> DalResult<Field> {
        self.field(&self.info.primary_key)
    }

    pub fn virtual_fields(&self) -> &[VirtualField] {
        &self.virtual_fields
    }

    pub fn lazy_fields(&self) -> &[LazyField] {
        &self.lazy_fields
    }

    pub fn has_common_filter(&self) -> bool {
        self.common_filter.is_some()
    }

    /// The table's common filter rendered against this identity
    pub fn common_filter(&self) -> Option<Expression> {
        self.common_filter.as_ref().map(|f| f(self))
    }

    /// Same physical table under a new identity and name.
    pub fn with_alias(&self, alias: &str) -> Table {
        let info = TableInfo::new(alias, &self.info.sql_name, &self.info.primary_key);
        self.rebind(info)
    }

    /// This definition bound to an existing identity, used to recover the
    /// full table (filters, virtual fields) from a field's table info.
    pub fn rebind(&self, info: Arc<TableInfo>) -> Table {
        let fields = self.specs.iter().map(|spec| spec.bind(&info)).collect();
        Table {
            info,
            specs: Arc::clone(&self.specs),
            fields,
            common_filter: self.common_filter.clone(),
            virtual_fields: self.virtual_fields.clone(),
            lazy_fields: self.lazy_fields.clone(),
        }
    }

    /// Fields that reference `table` (`reference` or `list:reference`)
    pub fn references_to(&self, table: &str) -> Vec<Field> {
        self.fields
            .iter()
            .filter(|f| f.field_type.referenced_table() == Some(table))
            .cloned()
            .collect()
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.info.id == other.info.id
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.info.name)
            .field("sql_name", &self.info.sql_name)
            .field("fields", &self.fields)
            .finish()
    }
}

pub struct TableBuilder {
    name: String,
    primary_key: String,
    specs: Vec<FieldSpec>,
    common_filter: Option<CommonFilter>,
    virtual_fields: Vec<VirtualField>,
    lazy_fields: Vec<LazyField>,
}

impl TableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: "id".to_string(),
            specs: Vec::new(),
            common_filter: None,
            virtual_fields: Vec::new(),
            lazy_fields: Vec::new(),
        }
    }

    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = name.into();
        self
    }

    pub fn field(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.specs.push(spec.into());
        self
    }

    pub fn common_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Table) -> Expression + Send + Sync + 'static,
    {
        self.common_filter = Some(Arc::new(filter));
        self
    }

    pub fn virtual_field<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Row) -> DalResult<Value> + Send + Sync + 'static,
    {
        self.virtual_fields.push(VirtualField {
            name: name.into(),
            compute: Arc::new(compute),
        });
        self
    }

    pub fn lazy_field<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Row) -> DalResult<Value> + Send + Sync + 'static,
    {
        self.lazy_fields.push(LazyField {
            name: name.into(),
            compute: Arc::new(compute),
        });
        self
    }

    pub fn build(self) -> DalResult<Table> {
        check_identifier("table", &self.name)?;
        check_identifier("field", &self.primary_key)?;
        let mut specs = Vec::with_capacity(self.specs.len() + 1);
        if !self.specs.iter().any(|s| s.name == self.primary_key) {
            specs.push(FieldSpec::new(self.primary_key.clone(), FieldType::Id));
        }
        for spec in self.specs {
            check_identifier("field", &spec.name)?;
            if specs.iter().any(|s: &FieldSpec| s.name == spec.name) {
                return Err(DalError::InvalidQuery(format!(
                    "Duplicate field '{}' in table '{}'",
                    spec.name, self.name
                )));
            }
            specs.push(spec);
        }

        let info = TableInfo::new(&self.name, &self.name, &self.primary_key);
        let fields = specs.iter().map(|spec| spec.bind(&info)).collect();
        Ok(Table {
            info,
            specs: Arc::new(specs),
            fields,
            common_filter: self.common_filter,
            virtual_fields: self.virtual_fields,
            lazy_fields: self.lazy_fields,
        })
    }
}

//! Semantic field types.
//!
//! The tag set is fixed. Every dialect maps these tags to its own storage
//! types and every codec knows how to encode/decode each of them.

use std::fmt;
use std::str::FromStr;

use crate::error::DalError;

/// Default length for `string` fields
pub const DEFAULT_STRING_LENGTH: u32 = 512;

/// Semantic type of a field or expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    String(u32),
    Text,
    Boolean,
    Integer,
    BigInt,
    Double,
    Decimal { precision: u8, scale: u8 },
    Date,
    Time,
    DateTime,
    Blob,
    Json,
    Upload,
    /// `reference <table>`
    Reference(String),
    ListString,
    ListInteger,
    /// `list:reference <table>`
    ListReference(String),
    Id,
}

impl FieldType {
    pub fn string() -> Self {
        FieldType::String(DEFAULT_STRING_LENGTH)
    }

    /// string, text and upload
    pub fn is_textual(&self) -> bool {
        matches!(self, FieldType::String(_) | FieldType::Text | FieldType::Upload)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Integer
                | FieldType::BigInt
                | FieldType::Double
                | FieldType::Decimal { .. }
                | FieldType::Id
                | FieldType::Reference(_)
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::BigInt | FieldType::Id | FieldType::Reference(_)
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::Time | FieldType::DateTime)
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            FieldType::ListString | FieldType::ListInteger | FieldType::ListReference(_)
        )
    }

    /// Table named by a `reference` or `list:reference` type
    pub fn referenced_table(&self) -> Option<&str> {
        match self {
            FieldType::Reference(t) | FieldType::ListReference(t) => Some(t),
            _ => None,
        }
    }

    /// Element type of a list type
    pub fn element_type(&self) -> Option<FieldType> {
        match self {
            FieldType::ListString => Some(FieldType::string()),
            FieldType::ListInteger => Some(FieldType::BigInt),
            FieldType::ListReference(t) => Some(FieldType::Reference(t.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String(n) if *n == DEFAULT_STRING_LENGTH => write!(f, "string"),
            FieldType::String(n) => write!(f, "string({})", n),
            FieldType::Text => write!(f, "text"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::BigInt => write!(f, "bigint"),
            FieldType::Double => write!(f, "double"),
            FieldType::Decimal { precision, scale } => write!(f, "decimal({},{})", precision, scale),
            FieldType::Date => write!(f, "date"),
            FieldType::Time => write!(f, "time"),
            FieldType::DateTime => write!(f, "datetime"),
            FieldType::Blob => write!(f, "blob"),
            FieldType::Json => write!(f, "json"),
            FieldType::Upload => write!(f, "upload"),
            FieldType::Reference(t) => write!(f, "reference {}", t),
            FieldType::ListString => write!(f, "list:string"),
            FieldType::ListInteger => write!(f, "list:integer"),
            FieldType::ListReference(t) => write!(f, "list:reference {}", t),
            FieldType::Id => write!(f, "id"),
        }
    }
}

impl FromStr for FieldType {
    type Err = DalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        let invalid = || DalError::InvalidQuery(format!("Unknown field type '{}'", tag));

        if let Some(table) = tag.strip_prefix("list:reference ") {
            return Ok(FieldType::ListReference(table.trim().to_string()));
        }
        if let Some(table) = tag.strip_prefix("reference ") {
            return Ok(FieldType::Reference(table.trim().to_string()));
        }
        if let Some(args) = tag.strip_prefix("decimal(").and_then(|r| r.strip_suffix(')')) {
            let (p, s) = args.split_once(',').ok_or_else(invalid)?;
            let precision = p.trim().parse().map_err(|_| invalid())?;
            let scale = s.trim().parse().map_err(|_| invalid())?;
            return Ok(FieldType::Decimal { precision, scale });
        }
        if let Some(len) = tag.strip_prefix("string(").and_then(|r| r.strip_suffix(')')) {
            return Ok(FieldType::String(len.trim().parse().map_err(|_| invalid())?));
        }

        match tag {
            "string" => Ok(FieldType::string()),
            "text" => Ok(FieldType::Text),
            "boolean" => Ok(FieldType::Boolean),
            "integer" => Ok(FieldType::Integer),
            "bigint" => Ok(FieldType::BigInt),
            "double" | "float" => Ok(FieldType::Double),
            "decimal" => Ok(FieldType::Decimal {
                precision: 10,
                scale: 2,
            }),
            "date" => Ok(FieldType::Date),
            "time" => Ok(FieldType::Time),
            "datetime" => Ok(FieldType::DateTime),
            "blob" => Ok(FieldType::Blob),
            "json" => Ok(FieldType::Json),
            "upload" => Ok(FieldType::Upload),
            "list:string" => Ok(FieldType::ListString),
            "list:integer" => Ok(FieldType::ListInteger),
            "id" => Ok(FieldType::Id),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        assert_eq!("string".parse::<FieldType>().unwrap(), FieldType::string());
        assert_eq!("string(32)".parse::<FieldType>().unwrap(), FieldType::String(32));
        assert_eq!("float".parse::<FieldType>().unwrap(), FieldType::Double);
        assert_eq!(
            "decimal(10, 3)".parse::<FieldType>().unwrap(),
            FieldType::Decimal {
                precision: 10,
                scale: 3
            }
        );
        assert_eq!(
            "reference person".parse::<FieldType>().unwrap(),
            FieldType::Reference("person".to_string())
        );
        assert_eq!(
            "list:reference tag".parse::<FieldType>().unwrap(),
            FieldType::ListReference("tag".to_string())
        );
        assert!("varchar".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for tag in [
            "string",
            "string(64)",
            "decimal(8,2)",
            "reference person",
            "list:integer",
            "list:reference tag",
            "datetime",
        ] {
            let ty: FieldType = tag.parse().unwrap();
            assert_eq!(ty.to_string(), tag);
        }
    }

    #[test]
    fn test_classification() {
        assert!(FieldType::Upload.is_textual());
        assert!(FieldType::Reference("a".into()).is_integral());
        assert!(FieldType::ListInteger.is_list());
        assert_eq!(
            FieldType::ListReference("tag".into()).element_type(),
            Some(FieldType::Reference("tag".into()))
        );
        assert_eq!(FieldType::Double.referenced_table(), None);
    }
}

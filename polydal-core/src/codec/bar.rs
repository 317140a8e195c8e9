//! Bar encoding for list fields on backends without array columns.
//!
//! `["a", "b|c"]` is stored as `|a|b||c|`: items are wrapped in single bars
//! and a bar inside an item is doubled. Blank items are dropped. An item
//! starting or ending with a bar would merge with its separators, so such
//! items are refused.

use crate::error::{DalError, DalResult};
use crate::types::FieldType;

pub fn bar_escape(item: &str) -> String {
    item.replace('|', "||")
}

pub fn bar_encode<S: AsRef<str>>(items: &[S], element: &FieldType) -> DalResult<String> {
    let mut escaped = Vec::with_capacity(items.len());
    for item in items {
        let item: &str = item.as_ref();
        if item.starts_with('|') || item.ends_with('|') {
            return Err(DalError::TypeCoercion {
                value: format!("{:?}", item),
                field_type: format!("list:{}", element),
                field: None,
            });
        }
        if !item.trim().is_empty() {
            escaped.push(bar_escape(item));
        }
    }
    Ok(format!("|{}|", escaped.join("|")))
}

pub fn bar_decode(encoded: &str) -> Vec<String> {
    let inner = encoded
        .strip_prefix('|')
        .and_then(|s| s.strip_suffix('|'))
        .unwrap_or(encoded);

    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '|' {
            if chars.peek() == Some(&'|') {
                chars.next();
                current.push('|');
            } else {
                items.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    items.push(current);

    items.into_iter().filter(|i| !i.trim().is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(items: &[&str]) -> DalResult<String> {
        bar_encode(items, &FieldType::string())
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode(&["a", "b"]).unwrap(), "|a|b|");
        assert_eq!(encode(&["x|y"]).unwrap(), "|x||y|");
        assert_eq!(encode(&[]).unwrap(), "||");
        assert_eq!(encode(&["a", " ", "b"]).unwrap(), "|a|b|");
    }

    #[test]
    fn test_bar_at_item_edge_is_refused() {
        // |a|||b| would read back as ["a|", "b"]
        let err = encode(&["a", "|b"]).unwrap_err();
        assert!(matches!(err, DalError::TypeCoercion { .. }));
        assert!(err.to_string().contains("\"|b\""));
        assert!(encode(&["a|"]).is_err());
        assert!(encode(&["|"]).is_err());
    }

    #[test]
    fn test_decode() {
        assert_eq!(bar_decode("|a|b|"), vec!["a", "b"]);
        assert_eq!(bar_decode("|1|22|333|"), vec!["1", "22", "333"]);
        assert_eq!(bar_decode("|x||y|z|"), vec!["x|y", "z"]);
        assert!(bar_decode("||").is_empty());
        assert!(bar_decode("").is_empty());
    }

    #[test]
    fn test_embedded_bar_survives() {
        let items = vec!["red", "black|white", "blue", "a||b"];
        assert_eq!(bar_decode(&encode(&items).unwrap()), items);
    }
}

//! Stored row representation
//!
//! Rows are column maps whose values are `NULL`, integers or text. This is
//! the shape the relational engine persists; typed records convert to and
//! from it in `model::record`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    Null,
    Int(i64),
    Text(String),
}

impl Column {
    pub fn is_null(&self) -> bool {
        matches!(self, Column::Null)
    }
}

impl From<Option<String>> for Column {
    fn from(value: Option<String>) -> Self {
        value.map_or(Column::Null, Column::Text)
    }
}

impl From<Option<i32>> for Column {
    fn from(value: Option<i32>) -> Self {
        value.map_or(Column::Null, |v| Column::Int(v as i64))
    }
}

impl From<bool> for Column {
    fn from(value: bool) -> Self {
        Column::Int(if value { 1 } else { 0 })
    }
}

/// Column name to value. Ordered so rows compare and print deterministically.
pub type Row = BTreeMap<String, Column>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_stored_as_int() {
        assert_eq!(Column::from(true), Column::Int(1));
        assert_eq!(Column::from(false), Column::Int(0));
    }

    #[test]
    fn test_absent_optionals_are_null() {
        assert!(Column::from(None::<String>).is_null());
        assert!(Column::from(None::<i32>).is_null());
        assert_eq!(Column::from(Some(1994)), Column::Int(1994));
    }

    #[test]
    fn test_untagged_json_shape() {
        let mut row = Row::new();
        row.insert("a".into(), Column::Null);
        row.insert("b".into(), Column::Int(3));
        row.insert("c".into(), Column::Text("x".into()));
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"a":null,"b":3,"c":"x"}"#);
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}

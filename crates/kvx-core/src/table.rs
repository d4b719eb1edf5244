//! Relational model types: tables, columns, keys.

use indexmap::{IndexMap, IndexSet};
use std::fmt;

/// SQL column types assignable by the type-voting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Decimal,
    Boolean,
    Date,
    Time,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Decimal => "DECIMAL",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Text => "TEXT",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table column. `values` holds the observed textual values until type
/// inference runs, then is cleared.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
    pub values: Vec<String>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: ColumnType::Text,
            nullable: false,
            values: Vec::new(),
        }
    }
}

/// Primary key of a table. Aggregate-array tables in an N:N relationship
/// receive a composite key (parent id, partner id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    Single(String),
    Composite(String, String),
}

/// A registered foreign key: column on this table, referenced table, and
/// the referenced column (the target's primary key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// An inferred table. `count` tracks how many instances contributed, which
/// determines column nullability at finalization.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub name: String,
    pub columns: IndexMap<String, Column>,
    pub primary_key: Option<PrimaryKey>,
    pub foreign_keys: IndexSet<ForeignKey>,
    pub count: u64,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Record a value observation for a column, creating the column on
    /// first sight.
    pub fn add_column(&mut self, column_name: &str, value: impl fmt::Display) {
        self.columns
            .entry(column_name.to_string())
            .or_insert_with(|| Column::new(column_name))
            .values
            .push(value.to_string());
    }

    pub fn set_primary_key(&mut self, column_name: &str) {
        self.primary_key = Some(PrimaryKey::Single(column_name.to_string()));
    }

    pub fn set_composite_key(&mut self, first: &str, second: &str) {
        self.primary_key = Some(PrimaryKey::Composite(first.to_string(), second.to_string()));
    }

    pub fn add_foreign_key(&mut self, column: &str, ref_table: &str, ref_column: &str) {
        self.foreign_keys.insert(ForeignKey {
            column: column.to_string(),
            ref_table: ref_table.to_string(),
            ref_column: ref_column.to_string(),
        });
    }

    /// True when `name` is already declared as a foreign-key column here.
    pub fn has_foreign_key_column(&self, name: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.column == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_column_accumulates_observations() {
        let mut t = Table::new("User");
        t.add_column("name", "Alice");
        t.add_column("name", "Bob");
        assert_eq!(t.columns["name"].values, vec!["Alice", "Bob"]);
        assert_eq!(t.columns.len(), 1);
    }

    #[test]
    fn foreign_keys_deduplicate() {
        let mut t = Table::new("watched");
        t.add_foreign_key("User_id", "User", "User_id");
        t.add_foreign_key("User_id", "User", "User_id");
        assert_eq!(t.foreign_keys.len(), 1);
        assert!(t.has_foreign_key_column("User_id"));
    }
}

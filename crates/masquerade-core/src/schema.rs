use serde::{Deserialize, Serialize};

/// Coarse SQL type category used for generator compatibility checks and
/// dialect casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFamily {
    Integer,
    Decimal,
    Float,
    Boolean,
    Text,
    Binary,
    Date,
    DateTime,
    Time,
    Uuid,
    Json,
    Other,
}

impl ColumnFamily {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnFamily::Integer | ColumnFamily::Decimal | ColumnFamily::Float
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ColumnFamily::Date | ColumnFamily::DateTime | ColumnFamily::Time
        )
    }
}

/// Column metadata reported by the schema introspector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine-native type as declared (e.g. `character varying(255)`).
    pub sql_type: String,
    pub family: ColumnFamily,
    /// Maximum character length for text columns.
    pub max_length: Option<u32>,
    pub unsigned: bool,
    pub nullable: bool,
}

/// Schema of one table, fetched fresh for every entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub primary_key: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn primary_key_column(&self) -> Option<&ColumnInfo> {
        self.column(&self.primary_key)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}

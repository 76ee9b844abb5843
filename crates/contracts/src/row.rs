//! Export row model - input of the decoder
//!
//! Typed row data handed over by the host export framework, and the
//! endpoint-keyed record multi-map the decoder produces.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::EndpointId;

/// Number of metadata columns the host prepends to every export row
/// (transaction id, timestamp, sequence, partition id, site id, operation).
pub const INTERNAL_FIELD_COUNT: usize = 6;

/// Serialized records grouped by destination endpoint.
///
/// Record order within one endpoint is decode order.
pub type RecordGroups = HashMap<EndpointId, Vec<Bytes>>;

/// Column kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Decimal,
    #[serde(alias = "varchar")]
    String,
    Timestamp,
    VarBinary,
}

/// Column value
///
/// Timestamps travel as microseconds since the Unix epoch, decimals as their
/// canonical text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One exported row
///
/// `columns` and `values` are parallel and include the internal metadata
/// columns when the host sends them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRow {
    /// Catalog generation the row schema belongs to
    pub generation: u64,

    /// Source partition
    #[serde(default)]
    pub partition_id: i32,

    /// Source table name
    pub table_name: String,

    /// Column metadata
    pub columns: Vec<ColumnMeta>,

    /// Column values
    pub values: Vec<ColumnValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_json_shape() {
        let json = r#"{
            "generation": 3,
            "table_name": "EVENTS",
            "columns": [
                { "name": "REGION", "kind": "varchar" },
                { "name": "COUNT", "kind": "big_int" },
                { "name": "PAYLOAD", "kind": "var_binary" }
            ],
            "values": ["eu", 12, [1, 2, 3]]
        }"#;
        let row: ExportRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.generation, 3);
        assert_eq!(row.partition_id, 0);
        assert_eq!(row.columns[0].kind, ColumnKind::String);
        assert_eq!(row.values[0], ColumnValue::Text("eu".into()));
        assert_eq!(row.values[1], ColumnValue::Integer(12));
        assert_eq!(row.values[2], ColumnValue::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_null_value() {
        let value: ColumnValue = serde_json::from_str("null").unwrap();
        assert_eq!(value, ColumnValue::Null);
    }
}

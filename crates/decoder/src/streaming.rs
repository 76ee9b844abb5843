//! StreamingDecoder - accumulates decoded rows for one block

use contracts::{ContractError, ExportRow, RecordGroups};

use crate::json::PartitionedJsonDecoder;

/// Block accumulator over a [`PartitionedJsonDecoder`]
#[derive(Debug)]
pub struct StreamingDecoder {
    decoder: PartitionedJsonDecoder,
    pending: RecordGroups,
    pending_records: usize,
}

impl StreamingDecoder {
    pub fn new(decoder: PartitionedJsonDecoder) -> Self {
        Self {
            decoder,
            pending: RecordGroups::new(),
            pending_records: 0,
        }
    }

    pub fn decoder(&self) -> &PartitionedJsonDecoder {
        &self.decoder
    }

    /// Decode `row` and append it to its endpoint's group
    ///
    /// A row that fails to decode leaves the accumulation untouched.
    pub fn add(&mut self, row: &ExportRow) -> Result<(), ContractError> {
        let (endpoint, record) = self.decoder.decode(row)?;
        self.pending.entry(endpoint).or_default().push(record);
        self.pending_records += 1;
        Ok(())
    }

    /// Take everything accumulated so far
    ///
    /// Cached plans of generations other than `generation` are dropped.
    pub fn harvest(&mut self, generation: u64) -> RecordGroups {
        self.decoder.retain_generation(generation);
        self.pending_records = 0;
        std::mem::take(&mut self.pending)
    }

    /// Drop everything accumulated so far
    pub fn discard(&mut self) {
        self.pending.clear();
        self.pending_records = 0;
    }

    /// Records accumulated since the last harvest or discard
    pub fn pending_records(&self) -> usize {
        self.pending_records
    }

    pub fn is_empty(&self) -> bool {
        self.pending_records == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{ColumnKind, ColumnMeta, ColumnValue, EndpointFactory};

    fn streaming() -> StreamingDecoder {
        let decoder = PartitionedJsonDecoder::builder()
            .partition_column_names(vec!["REGION".into()])
            .endpoint_factory(EndpointFactory::new("thrift://meta:9083", "db", "events").unwrap())
            .skip_internal_fields(false)
            .build()
            .unwrap();
        StreamingDecoder::new(decoder)
    }

    fn row(generation: u64, region: &str, id: i64) -> ExportRow {
        ExportRow {
            generation,
            partition_id: 0,
            table_name: "EVENTS".into(),
            columns: vec![
                ColumnMeta::new("REGION", ColumnKind::String),
                ColumnMeta::new("ID", ColumnKind::BigInt),
            ],
            values: vec![ColumnValue::Text(region.into()), ColumnValue::Integer(id)],
        }
    }

    #[test]
    fn test_groups_by_endpoint_in_decode_order() {
        let mut s = streaming();
        s.add(&row(1, "eu", 1)).unwrap();
        s.add(&row(1, "us", 2)).unwrap();
        s.add(&row(1, "eu", 3)).unwrap();
        assert_eq!(s.pending_records(), 3);

        let groups = s.harvest(1);
        assert_eq!(groups.len(), 2);
        let eu = groups
            .iter()
            .find(|(ep, _)| ep.partition_values() == ["eu"])
            .map(|(_, records)| records.clone())
            .unwrap();
        assert_eq!(
            eu,
            vec![Bytes::from_static(br#"{"ID":1}"#), Bytes::from_static(br#"{"ID":3}"#)]
        );
        assert!(s.is_empty());
        assert!(s.harvest(1).is_empty());
    }

    #[test]
    fn test_harvest_drops_stale_generations() {
        let mut s = streaming();
        s.add(&row(1, "eu", 1)).unwrap();
        s.add(&row(2, "eu", 2)).unwrap();
        assert_eq!(s.decoder().cached_generations(), 2);

        s.harvest(2);
        assert_eq!(s.decoder().cached_generations(), 1);
    }

    #[test]
    fn test_discard_and_failed_rows() {
        let mut s = streaming();
        s.add(&row(1, "eu", 1)).unwrap();

        let mut bad = row(1, "eu", 2);
        bad.values[1] = ColumnValue::Text("not a number".into());
        assert!(s.add(&bad).is_err());
        assert_eq!(s.pending_records(), 1);

        s.discard();
        assert!(s.is_empty());
        assert!(s.harvest(1).is_empty());
    }
}

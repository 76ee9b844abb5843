//! PartitionedJsonDecoder - one row to one (endpoint, JSON record) pair
//!
//! Partition columns are lifted out of the record body; their values, in
//! configured order, pick the destination endpoint. Blank or NULL partition
//! values are replaced by the unspecified token.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono_tz::Tz;
use contracts::{
    ColumnKind, ColumnValue, ContractError, EndpointFactory, EndpointId, ExportRow,
    DEFAULT_UNSPECIFIED_TOKEN, INTERNAL_FIELD_COUNT,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::field::encode_value;

/// How one column is decoded
#[derive(Debug, Clone)]
enum FieldPlan {
    /// Partition value at `slot` of the endpoint's partition values
    Partition { slot: usize },
    /// Emitted into the JSON body
    Emit { name: String, kind: ColumnKind },
}

/// Per-generation decoding plan
#[derive(Debug)]
struct DecodePlan {
    fields: Vec<FieldPlan>,
}

/// Row decoder
#[derive(Debug)]
pub struct PartitionedJsonDecoder {
    partition_columns: Vec<String>,
    first_field_offset: usize,
    time_zone: Tz,
    unspecified_token: String,
    endpoint_factory: EndpointFactory,
    plans: HashMap<u64, Arc<DecodePlan>>,
}

impl PartitionedJsonDecoder {
    pub fn builder() -> PartitionedJsonDecoderBuilder {
        PartitionedJsonDecoderBuilder::default()
    }

    pub fn partition_columns(&self) -> &[String] {
        &self.partition_columns
    }

    pub fn endpoint_factory(&self) -> &EndpointFactory {
        &self.endpoint_factory
    }

    /// Decode one row
    ///
    /// # Errors
    /// `ContractError::Decode` when the row does not match its schema, a
    /// partition column is missing or not VARCHAR, or a value does not fit.
    pub fn decode(&mut self, row: &ExportRow) -> Result<(EndpointId, Bytes), ContractError> {
        let plan = self.plan_for(row)?;

        let values = row.values.get(self.first_field_offset..).unwrap_or(&[]);
        if values.len() != plan.fields.len() {
            return Err(ContractError::decode(
                &row.table_name,
                format!(
                    "row carries {} values for {} columns",
                    values.len(),
                    plan.fields.len()
                ),
            ));
        }

        let mut partition_values = vec![self.unspecified_token.clone(); self.partition_columns.len()];
        let mut body = Map::with_capacity(plan.fields.len());

        for (field, value) in plan.fields.iter().zip(values) {
            match field {
                FieldPlan::Partition { slot } => {
                    partition_values[*slot] = match value {
                        ColumnValue::Text(text) if EndpointFactory::is_valid_partition_value(text) => {
                            text.clone()
                        }
                        ColumnValue::Text(_) | ColumnValue::Null => self.unspecified_token.clone(),
                        _ => {
                            return Err(ContractError::decode(
                                &row.table_name,
                                format!(
                                    "partition column \"{}\" carries a non-text value",
                                    self.partition_columns[*slot]
                                ),
                            ))
                        }
                    };
                }
                FieldPlan::Emit { name, kind } => {
                    let encoded = encode_value(*kind, value, &self.time_zone).map_err(|message| {
                        ContractError::decode(&row.table_name, format!("column {name}: {message}"))
                    })?;
                    body.insert(name.clone(), encoded);
                }
            }
        }

        let endpoint = self.endpoint_factory.endpoint_for(partition_values)?;
        let record = serde_json::to_vec(&Value::Object(body))
            .map_err(|e| ContractError::decode(&row.table_name, e.to_string()))?;
        Ok((endpoint, Bytes::from(record)))
    }

    /// Drop cached plans of every generation but `generation`
    pub fn retain_generation(&mut self, generation: u64) {
        self.plans.retain(|g, _| *g == generation);
    }

    /// Generations with a cached plan
    pub fn cached_generations(&self) -> usize {
        self.plans.len()
    }

    fn plan_for(&mut self, row: &ExportRow) -> Result<Arc<DecodePlan>, ContractError> {
        if let Some(plan) = self.plans.get(&row.generation) {
            return Ok(Arc::clone(plan));
        }
        let plan = Arc::new(self.build_plan(row)?);
        debug!(
            table = %row.table_name,
            generation = row.generation,
            fields = plan.fields.len(),
            "decode plan built"
        );
        self.plans.insert(row.generation, Arc::clone(&plan));
        Ok(plan)
    }

    fn build_plan(&self, row: &ExportRow) -> Result<DecodePlan, ContractError> {
        let columns = row.columns.get(self.first_field_offset..).ok_or_else(|| {
            ContractError::decode(
                &row.table_name,
                format!(
                    "row has {} columns, fewer than the {} internal ones",
                    row.columns.len(),
                    self.first_field_offset
                ),
            )
        })?;

        let mut seen = vec![false; self.partition_columns.len()];
        let mut fields = Vec::with_capacity(columns.len());

        for column in columns {
            let slot = self
                .partition_columns
                .iter()
                .position(|p| p.eq_ignore_ascii_case(&column.name));
            match slot {
                Some(slot) => {
                    if column.kind != ColumnKind::String {
                        return Err(ContractError::decode(
                            &row.table_name,
                            format!(
                                "partition column \"{}\" must be of VARCHAR type, but it is of type {:?}",
                                column.name, column.kind
                            ),
                        ));
                    }
                    seen[slot] = true;
                    fields.push(FieldPlan::Partition { slot });
                }
                None => fields.push(FieldPlan::Emit {
                    name: column.name.clone(),
                    kind: column.kind,
                }),
            }
        }

        if seen.contains(&false) {
            let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            return Err(ContractError::decode(
                &row.table_name,
                format!(
                    "partition columns {:?} are not in table columns {:?}",
                    self.partition_columns, names
                ),
            ));
        }

        Ok(DecodePlan { fields })
    }
}

/// Builder for [`PartitionedJsonDecoder`]
#[derive(Debug, Clone)]
pub struct PartitionedJsonDecoderBuilder {
    partition_columns: Vec<String>,
    first_field_offset: usize,
    time_zone: Tz,
    unspecified_token: String,
    endpoint_factory: Option<EndpointFactory>,
}

impl Default for PartitionedJsonDecoderBuilder {
    fn default() -> Self {
        Self {
            partition_columns: Vec::new(),
            first_field_offset: INTERNAL_FIELD_COUNT,
            time_zone: Tz::UTC,
            unspecified_token: DEFAULT_UNSPECIFIED_TOKEN.to_string(),
            endpoint_factory: None,
        }
    }
}

impl PartitionedJsonDecoderBuilder {
    /// Partition column names in endpoint order
    pub fn partition_column_names(mut self, names: Vec<String>) -> Self {
        self.partition_columns = names;
        self
    }

    pub fn endpoint_factory(mut self, factory: EndpointFactory) -> Self {
        self.endpoint_factory = Some(factory);
        self
    }

    pub fn time_zone(mut self, zone: Tz) -> Self {
        self.time_zone = zone;
        self
    }

    /// Ignored when blank
    pub fn unspecified_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        if EndpointFactory::is_valid_partition_value(&token) {
            self.unspecified_token = token;
        }
        self
    }

    /// Index of the first user column
    pub fn first_field_offset(mut self, offset: usize) -> Self {
        self.first_field_offset = offset;
        self
    }

    /// Shorthand for an offset of [`INTERNAL_FIELD_COUNT`] or zero
    pub fn skip_internal_fields(self, skip: bool) -> Self {
        self.first_field_offset(if skip { INTERNAL_FIELD_COUNT } else { 0 })
    }

    /// Build the decoder
    ///
    /// # Errors
    /// `ContractError::ConfigValidation` without an endpoint factory or with a
    /// blank partition column name.
    pub fn build(self) -> Result<PartitionedJsonDecoder, ContractError> {
        let endpoint_factory = self.endpoint_factory.ok_or_else(|| {
            ContractError::config_validation("endpoint_factory", "endpoint factory is required")
        })?;
        let partition_columns = EndpointFactory::check_partition_values(&self.partition_columns)
            .map_err(|e| ContractError::config_validation("partition_columns", e.to_string()))?;

        Ok(PartitionedJsonDecoder {
            partition_columns,
            first_field_offset: self.first_field_offset,
            time_zone: self.time_zone,
            unspecified_token: self.unspecified_token,
            endpoint_factory,
            plans: HashMap::new(),
        })
    }
}

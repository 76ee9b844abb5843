//! ExportClient / ExportDecoder - row-group lifecycle on top of the sink

use std::sync::Arc;

use chrono_tz::Tz;
use contracts::{BlockSink, ContractError, EndpointFactory, ExportConfig, ExportRow, HiveConfig};
use decoder::{PartitionedJsonDecoder, StreamingDecoder};
use tracing::{debug, error, info, instrument};

use crate::error::RestartBlock;

/// A data source advertised by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedSource {
    pub table_name: String,
    pub partition_id: i32,
}

impl AdvertisedSource {
    pub fn new(table_name: impl Into<String>, partition_id: i32) -> Self {
        Self {
            table_name: table_name.into(),
            partition_id,
        }
    }
}

impl std::fmt::Display for AdvertisedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.table_name, self.partition_id)
    }
}

/// Configured export client
///
/// Shared, read-only state for every decoder it constructs.
#[derive(Debug, Clone)]
pub struct ExportClient {
    hive: Arc<HiveConfig>,
    endpoint_factory: EndpointFactory,
    time_zone: Tz,
}

impl ExportClient {
    /// Build the client from a loaded configuration
    ///
    /// # Errors
    /// `ContractError::InvalidEndpoint` for a bad destination,
    /// `ContractError::ConfigValidation` for an unknown time zone.
    pub fn configure(config: &ExportConfig) -> Result<Self, ContractError> {
        let hive = &config.hive;
        let endpoint_factory = EndpointFactory::new(&hive.uri, &hive.db, &hive.table)?;
        let time_zone = hive.timezone.trim().parse::<Tz>().map_err(|_| {
            ContractError::config_validation(
                "hive.timezone",
                format!("unknown time zone '{}'", hive.timezone),
            )
        })?;

        info!(
            factory = %endpoint_factory,
            time_zone = %time_zone,
            partitioned_tables = hive.partition_columns.len(),
            "export client configured"
        );

        Ok(Self {
            hive: Arc::new(hive.clone()),
            endpoint_factory,
            time_zone,
        })
    }

    pub fn endpoint_factory(&self) -> &EndpointFactory {
        &self.endpoint_factory
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// Decoder for a newly advertised source
    ///
    /// Nudges the sink so idle connections are reaped promptly.
    pub async fn construct_decoder<S: BlockSink>(
        &self,
        source: AdvertisedSource,
        sink: Arc<S>,
    ) -> ExportDecoder<S> {
        sink.maintenance().await;
        debug!(source = %source, "export decoder constructed");
        ExportDecoder {
            source,
            client: self.clone(),
            sink,
            decoder: None,
        }
    }
}

/// Per-source decoder driven by the host
///
/// The inner row decoder is built lazily from the first row seen.
pub struct ExportDecoder<S> {
    source: AdvertisedSource,
    client: ExportClient,
    sink: Arc<S>,
    decoder: Option<StreamingDecoder>,
}

impl<S: BlockSink> ExportDecoder<S> {
    pub fn source(&self) -> &AdvertisedSource {
        &self.source
    }

    /// Whether the inner decoder has been built
    pub fn is_primed(&self) -> bool {
        self.decoder.is_some()
    }

    /// Records decoded since the last completed block
    pub fn pending_records(&self) -> usize {
        self.decoder.as_ref().map_or(0, StreamingDecoder::pending_records)
    }

    /// Start of a block
    ///
    /// # Errors
    /// `RestartBlock` if the decoder cannot be initialized for the row's table.
    pub fn on_block_start(&mut self, row: &ExportRow) -> Result<(), RestartBlock> {
        self.prime(row).map(|_| ())
    }

    /// Decode one row into the current block
    ///
    /// Returns `Ok(false)` when the row cannot be decoded; that failure is
    /// structural and replaying the block will not fix it.
    pub fn process_row(&mut self, row: &ExportRow) -> Result<bool, RestartBlock> {
        let source = self.source.to_string();
        let decoder = self.prime(row)?;
        match decoder.add(row) {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(source = %source, error = %e, "unable to decode row");
                Ok(false)
            }
        }
    }

    /// End of a block: write everything decoded for the row's generation
    ///
    /// # Errors
    /// Retryable `RestartBlock` carrying the endpoint and cause when the sink
    /// fails.
    #[instrument(
        name = "export_decoder_block_completion",
        skip(self, row),
        fields(source = %self.source, generation = row.generation)
    )]
    pub async fn on_block_completion(&mut self, row: &ExportRow) -> Result<(), RestartBlock> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };
        let records = decoder.harvest(row.generation);
        if records.is_empty() {
            return Ok(());
        }

        let count: usize = records.values().map(Vec::len).sum();
        match self.sink.write(records).await {
            Ok(()) => {
                debug!(records = count, "block written");
                Ok(())
            }
            Err(e) => {
                observability::record_block_failure(&self.source.to_string());
                error!(source = %self.source, error = %e, "block write failed");
                Err(RestartBlock::new("hive write fault", e, true))
            }
        }
    }

    /// The host stopped advertising this source
    pub async fn source_no_longer_advertised(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.discard();
        }
        self.sink.maintenance().await;
        info!(source = %self.source, "source no longer advertised");
    }

    fn prime(&mut self, row: &ExportRow) -> Result<&mut StreamingDecoder, RestartBlock> {
        if self.decoder.is_none() {
            let decoder = self.build_decoder(row).map_err(|e| {
                error!(
                    factory = %self.client.endpoint_factory,
                    table = %row.table_name,
                    error = %e,
                    "unable to initialize decoder"
                );
                RestartBlock::new("unable to initialize decoder", e, true)
            })?;
            debug!(
                source = %self.source,
                table = %row.table_name,
                generation = row.generation,
                "decoder primed"
            );
            self.decoder = Some(decoder);
        }
        self.decoder
            .as_mut()
            .ok_or_else(|| RestartBlock::new("unable to initialize decoder", "decoder missing", true))
    }

    fn build_decoder(&self, row: &ExportRow) -> Result<StreamingDecoder, ContractError> {
        let hive = &self.client.hive;
        let partition_columns = hive.partition_columns_for(&row.table_name).to_vec();
        if !hive.partition_columns.is_empty() && partition_columns.is_empty() {
            return Err(ContractError::config_validation(
                "hive.partition_columns",
                format!(
                    "table {} is not listed in the \"hive.partition.columns\" configuration property",
                    row.table_name
                ),
            ));
        }

        let decoder = PartitionedJsonDecoder::builder()
            .endpoint_factory(self.client.endpoint_factory.clone())
            .partition_column_names(partition_columns)
            .time_zone(self.client.time_zone)
            .unspecified_token(hive.unspecified_token.clone())
            .skip_internal_fields(hive.skip_internal_fields)
            .build()?;
        Ok(StreamingDecoder::new(decoder))
    }
}

//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约测试（配置 -> 客户端 -> 解码器）
//! - 端到端测试：ExportDecoder -> Dispatcher -> ConnectionPool -> MemoryStore

#[cfg(test)]
mod fixtures {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ColumnKind, ColumnMeta, ColumnValue, EndpointId, ExportConfig, ExportRow};

    pub const URI: &str = "thrift://metastore:9083";

    pub const PROPERTIES: &str = "\
hive.uri=thrift://metastore:9083
hive.db=analytics
hive.table=events
hive.partition.columns=events:region
timezone=Asia/Shanghai
skipinternals=false
";

    pub fn config() -> ExportConfig {
        ConfigLoader::load_from_str_with(PROPERTIES, ConfigFormat::Properties, |_| None).unwrap()
    }

    pub fn row(region: &str, id: i64, ts_micros: i64) -> ExportRow {
        ExportRow {
            generation: 1,
            partition_id: 0,
            table_name: "EVENTS".into(),
            columns: vec![
                ColumnMeta::new("ID", ColumnKind::BigInt),
                ColumnMeta::new("REGION", ColumnKind::String),
                ColumnMeta::new("SEEN_AT", ColumnKind::Timestamp),
            ],
            values: vec![
                ColumnValue::Integer(id),
                ColumnValue::Text(region.into()),
                ColumnValue::Integer(ts_micros),
            ],
        }
    }

    pub fn endpoint(region: &str) -> EndpointId {
        EndpointId::new(URI, "analytics", "events", vec![region.into()]).unwrap()
    }
}

#[cfg(test)]
mod contract_tests {
    use super::fixtures::*;
    use bytes::Bytes;
    use decoder::{PartitionedJsonDecoder, StreamingDecoder};
    use export_client::ExportClient;

    #[test]
    fn test_properties_config_builds_client() {
        let client = ExportClient::configure(&config()).unwrap();
        assert_eq!(client.endpoint_factory().table(), "events");
        assert_eq!(client.time_zone().to_string(), "Asia/Shanghai");
    }

    #[test]
    fn test_decoder_from_loaded_config() {
        let config = config();
        let client = ExportClient::configure(&config).unwrap();
        let decoder = PartitionedJsonDecoder::builder()
            .endpoint_factory(client.endpoint_factory().clone())
            .partition_column_names(config.hive.partition_columns_for("events").to_vec())
            .time_zone(client.time_zone())
            .skip_internal_fields(config.hive.skip_internal_fields)
            .build()
            .unwrap();
        let mut streaming = StreamingDecoder::new(decoder);

        streaming.add(&row("eu", 7, 0)).unwrap();
        let groups = streaming.harvest(1);

        assert_eq!(
            groups[&endpoint("eu")],
            vec![Bytes::from_static(
                br#"{"ID":7,"SEEN_AT":"1970-01-01 08:00:00.000"}"#
            )]
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;

    use super::fixtures::*;
    use bytes::Bytes;
    use connection_pool::{ConnectionPool, MemoryStore};
    use contracts::{SinkError, SinkSettings};
    use dispatcher::Dispatcher;
    use export_client::{AdvertisedSource, ExportClient, ExportDecoder};

    fn dispatcher(store: &MemoryStore, settings: &SinkSettings) -> Arc<Dispatcher<MemoryStore>> {
        Arc::new(Dispatcher::from_settings(Arc::new(store.clone()), settings))
    }

    async fn decoder_for(sink: &Arc<Dispatcher<MemoryStore>>) -> ExportDecoder<Dispatcher<MemoryStore>> {
        let client = ExportClient::configure(&config()).unwrap();
        client
            .construct_decoder(AdvertisedSource::new("EVENTS", 0), Arc::clone(sink))
            .await
    }

    /// 一个 block 的完整生命周期
    async fn run_block(
        decoder: &mut ExportDecoder<Dispatcher<MemoryStore>>,
        rows: &[contracts::ExportRow],
    ) -> Result<(), export_client::RestartBlock> {
        decoder.on_block_start(&rows[0])?;
        for row in rows {
            assert!(decoder.process_row(row)?);
        }
        decoder.on_block_completion(&rows[rows.len() - 1]).await
    }

    /// End-to-end: rows -> ExportDecoder -> Dispatcher -> pool -> store
    #[tokio::test]
    async fn test_e2e_block_commits_per_partition_in_order() {
        let store = MemoryStore::new();
        let sink = dispatcher(&store, &SinkSettings::default());
        let mut decoder = decoder_for(&sink).await;

        let rows = vec![
            row("eu", 1, 0),
            row("us", 2, 0),
            row("eu", 3, 1_000),
            row(" ", 4, 0),
        ];
        run_block(&mut decoder, &rows).await.unwrap();

        assert_eq!(
            store.committed_records(&endpoint("eu")),
            vec![
                Bytes::from_static(br#"{"ID":1,"SEEN_AT":"1970-01-01 08:00:00.000"}"#),
                Bytes::from_static(br#"{"ID":3,"SEEN_AT":"1970-01-01 08:00:00.001"}"#),
            ]
        );
        assert_eq!(store.committed_records(&endpoint("us")).len(), 1);
        assert_eq!(
            store
                .committed_records(&endpoint(contracts::DEFAULT_UNSPECIFIED_TOKEN))
                .len(),
            1
        );
        // one transaction per endpoint per block
        assert_eq!(store.committed().len(), 3);

        sink.shutdown().await;
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_e2e_pool_bound_holds_under_many_partitions() {
        let store = MemoryStore::new();
        let settings = SinkSettings {
            pool_size: 2,
            concurrent_writers: 1,
            ..SinkSettings::default()
        };
        let sink = dispatcher(&store, &settings);
        let mut decoder = decoder_for(&sink).await;

        let regions = ["a", "b", "c", "d", "e"];
        for round in 0..3 {
            let rows: Vec<_> = regions
                .iter()
                .enumerate()
                .map(|(i, r)| row(r, (round * 10 + i) as i64, 0))
                .collect();
            run_block(&mut decoder, &rows).await.unwrap();
            assert!(sink.pool().len() <= 2);
        }

        for region in regions {
            assert_eq!(store.committed_records(&endpoint(region)).len(), 3);
        }
        assert!(sink.pool().stats().evicted_size > 0);

        sink.shutdown().await;
        assert_eq!(store.open_connections(), 0);
        assert_eq!(store.connections_opened(), store.connections_closed());
    }

    #[tokio::test]
    async fn test_e2e_batches_renew_after_transaction_budget() {
        let store = MemoryStore::new();
        let settings = SinkSettings {
            transaction_batch_size: 2,
            ..SinkSettings::default()
        };
        let sink = dispatcher(&store, &settings);
        let mut decoder = decoder_for(&sink).await;

        for id in 0..5 {
            run_block(&mut decoder, &[row("eu", id, 0)]).await.unwrap();
        }

        assert_eq!(store.committed_records(&endpoint("eu")).len(), 5);
        assert_eq!(store.batches_fetched(), 3);
        assert_eq!(store.connections_opened(), 1);
        sink.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_failed_partition_restarts_block() {
        let store = MemoryStore::new();
        store.poison_endpoint(&endpoint("us"));
        let sink = dispatcher(&store, &SinkSettings::default());
        let mut decoder = decoder_for(&sink).await;

        let rows = vec![row("eu", 1, 0), row("us", 2, 0)];
        let restart = run_block(&mut decoder, &rows).await.unwrap_err();
        assert!(restart.is_retryable());
        assert!(restart.message().contains("hive write fault"));
        assert!(restart.message().contains("[us]"));

        // 其它分区不受影响
        assert_eq!(store.committed_records(&endpoint("eu")).len(), 1);
        assert!(store.committed_records(&endpoint("us")).is_empty());

        // 宿主重放 block: at-least-once
        store.heal_endpoint(&endpoint("us"));
        run_block(&mut decoder, &rows).await.unwrap();
        assert_eq!(store.committed_records(&endpoint("eu")).len(), 2);
        assert_eq!(store.committed_records(&endpoint("us")).len(), 1);
        sink.shutdown().await;
    }

    #[tokio::test]
    async fn test_e2e_shared_pool_across_dispatchers() {
        let store = MemoryStore::new();
        let pool = Arc::new(ConnectionPool::from_sink_settings(
            Arc::new(store.clone()),
            &SinkSettings::default(),
        ));
        let sink = Arc::new(Dispatcher::new(Arc::clone(&pool), 3));
        let mut decoder = decoder_for(&sink).await;

        run_block(&mut decoder, &[row("eu", 1, 0), row("us", 2, 0)])
            .await
            .unwrap();
        assert_eq!(pool.len(), 2);

        sink.shutdown().await;
        assert!(pool.is_empty());

        let err = sink
            .submit(endpoint("eu"), vec![Bytes::from_static(b"{}")])
            .unwrap_err();
        assert!(matches!(err, SinkError::Dispatch { .. }));
    }
}

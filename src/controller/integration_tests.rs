#[cfg(test)]
mod integration_tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use chrono::Utc;
    use etherparse::{IpNumber, PacketBuilder};
    use pcap::{BpfProgram, Linktype};
    use tempfile::TempDir;
    use tokio::runtime::Runtime;

    use crate::capture::{CaptureFilter, Packet, PacketSource, SkipReason};
    use crate::controller::{CapturePipeline, PacketOutcome, ShutdownSignal};
    use crate::error_handling::types::CaptureError;
    use crate::fingerprint::client_hello::parse;
    use crate::fingerprint::test_utils::{client_hello_record, HelloShape};
    use crate::fingerprint::{FingerprintDb, FingerprintDispatcher};
    use crate::storage::DatabaseStorage;

    const TEREDO_SRC: [u8; 16] = [
        0x20, 0x01, 0, 0, 0x41, 0x36, 0xe3, 0x78, 0x80, 0, 0x63, 0xbf, 0x3f, 0xff, 0xfd, 0xd2,
    ];
    const V6_DST: [u8; 16] = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];

    /// Replays frames through the compiled capture filter, the way the
    /// kernel would before handing them to us.
    struct FilteredSource {
        program: BpfProgram,
        frames: VecDeque<Vec<u8>>,
    }

    impl FilteredSource {
        fn new(frames: Vec<Vec<u8>>) -> Self {
            Self {
                program: CaptureFilter::default().compile(Linktype::ETHERNET).unwrap(),
                frames: frames.into(),
            }
        }
    }

    impl PacketSource for FilteredSource {
        fn next_packet(&mut self) -> Result<Option<Packet>, CaptureError> {
            while let Some(frame) = self.frames.pop_front() {
                if self.program.filter(&frame) {
                    return Ok(Some(Packet::new(frame, Utc::now(), Linktype::ETHERNET)));
                }
            }
            Err(CaptureError::SourceExhausted)
        }
    }

    struct Harness {
        storage: Arc<DatabaseStorage>,
        rt: Runtime,
        _dir: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let _ = env_logger::builder().is_test(true).try_init();
            let dir = TempDir::new().unwrap();
            let rt = Runtime::new().unwrap();
            let storage = rt.block_on(async {
                let storage = DatabaseStorage::connect(dir.path().join("pipeline.sqlite3"))
                    .await
                    .unwrap();
                storage.init_schema().await.unwrap();
                storage
            });
            Self {
                storage: Arc::new(storage),
                rt,
                _dir: dir,
            }
        }

        fn pipeline(&self, identities: FingerprintDb) -> CapturePipeline {
            CapturePipeline::new(
                FingerprintDispatcher::with_client_hello(Arc::new(identities)),
                Arc::clone(&self.storage),
                self.rt.handle().clone(),
            )
        }

        fn fingerprint_count(&self) -> usize {
            self.rt
                .block_on(self.storage.fingerprint_rows())
                .unwrap()
                .len()
        }
    }

    fn tcp_v4_frame(dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([192, 0, 2, 10], [198, 51, 100, 7], 64)
            .tcp(51234, dst_port, 1, 65535);
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    fn inner_ipv6_tcp(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ipv6(TEREDO_SRC, V6_DST, 64).tcp(50000, 443, 1, 65535);
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    fn teredo_frame(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(3544, 40000);
        let inner = inner_ipv6_tcp(payload);
        let mut frame = Vec::new();
        builder.write(&mut frame, &inner).unwrap();
        frame
    }

    fn six_in_four_frame(payload: &[u8]) -> Vec<u8> {
        let builder =
            PacketBuilder::ethernet2([1; 6], [2; 6]).ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64);
        let inner = inner_ipv6_tcp(payload);
        let mut frame = Vec::new();
        builder.write(&mut frame, IpNumber(41), &inner).unwrap();
        frame
    }

    #[test]
    fn test_known_client_hello_is_logged_and_stored() {
        let harness = Harness::new();
        let record = client_hello_record(&HelloShape::default());
        let mut identities = FingerprintDb::new();
        identities.insert(parse(&record).unwrap().detail.hash(), "known-client");
        let pipeline = harness.pipeline(identities);

        let mut source = FilteredSource::new(vec![tcp_v4_frame(443, &record)]);
        let packet = source.next_packet().unwrap().unwrap();

        match pipeline.process_packet(&packet) {
            PacketOutcome::Recorded {
                event,
                fingerprint_name,
                rows_written,
            } => {
                assert_eq!(fingerprint_name, "known-client");
                assert_eq!(event.server_name, "example.com");
                assert_eq!(event.event, "log");
                assert_eq!(event.ip_src.to_string(), "192.0.2.10");
                assert_eq!(event.dst_port, 443);
                assert_eq!(rows_written, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let rows = harness.rt.block_on(harness.storage.fingerprint_rows()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(hex::encode(&rows[0].detail.ciphersuite), "13011302c02bc02f");
        assert_eq!(rows[0].packet, packet.data);
    }

    #[test]
    fn test_non_tls_traffic_is_filtered_out() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(FingerprintDb::new());
        let mut source = FilteredSource::new(vec![
            tcp_v4_frame(80, b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"),
            tcp_v4_frame(443, b"\x17\x03\x03\x00\x10application-data"),
        ]);

        let stats = pipeline.run(&mut source, &ShutdownSignal::new()).unwrap();

        assert_eq!(stats.packets, 0);
        assert_eq!(harness.fingerprint_count(), 0);
    }

    #[test]
    fn test_unknown_client_hello_still_recorded() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(FingerprintDb::new());
        let shape = HelloShape {
            ciphers: vec![0x0035, 0x002f],
            grease: false,
            ..HelloShape::default()
        };
        let mut source = FilteredSource::new(vec![tcp_v4_frame(8443, &client_hello_record(&shape))]);
        let packet = source.next_packet().unwrap().unwrap();

        match pipeline.process_packet(&packet) {
            PacketOutcome::Recorded {
                fingerprint_name,
                rows_written,
                ..
            } => {
                assert_eq!(fingerprint_name, "");
                assert_eq!(rows_written, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(harness.fingerprint_count(), 1);
    }

    #[test]
    fn test_tunneled_hellos_do_not_stop_the_pipeline() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(FingerprintDb::new());
        let record = client_hello_record(&HelloShape::default());

        let mut source = FilteredSource::new(vec![
            teredo_frame(&record),
            // passes the filter, too short to be a hello
            teredo_frame(&record[..12]),
            six_in_four_frame(&record),
            tcp_v4_frame(443, &record),
        ]);

        let stats = pipeline.run(&mut source, &ShutdownSignal::new()).unwrap();

        assert_eq!(stats.packets, 4);
        assert_eq!(stats.recorded, 3);
        assert_eq!(stats.unparseable, 1);
        assert_eq!(harness.fingerprint_count(), 3);
    }

    #[test]
    fn test_undecodable_frame_is_skipped() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(FingerprintDb::new());
        let packet = Packet::new(vec![0xde, 0xad], Utc::now(), Linktype::ETHERNET);

        assert!(matches!(
            pipeline.process_packet(&packet),
            PacketOutcome::Skipped(SkipReason::Malformed(_))
        ));
    }

    #[test]
    fn test_storage_failure_does_not_stop_the_pipeline() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(FingerprintDb::new());
        let frame = tcp_v4_frame(443, &client_hello_record(&HelloShape::default()));

        harness.rt.block_on(async {
            sqlx::query("DROP TABLE fingerprints")
                .execute(harness.storage.pool())
                .await
                .unwrap();
        });
        let mut source = FilteredSource::new(vec![frame.clone()]);
        let stats = pipeline.run(&mut source, &ShutdownSignal::new()).unwrap();
        assert_eq!(stats.recorded, 1);
        assert_eq!(stats.store_failures, 1);

        harness.rt.block_on(harness.storage.init_schema()).unwrap();
        let mut source = FilteredSource::new(vec![frame]);
        let stats = pipeline.run(&mut source, &ShutdownSignal::new()).unwrap();
        assert_eq!(stats.store_failures, 0);
        assert_eq!(harness.fingerprint_count(), 1);
    }

    #[test]
    fn test_shutdown_stops_before_next_read() {
        let harness = Harness::new();
        let pipeline = harness.pipeline(FingerprintDb::new());
        let record = client_hello_record(&HelloShape::default());
        let mut source = FilteredSource::new(vec![tcp_v4_frame(443, &record); 3]);

        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let stats = pipeline.run(&mut source, &shutdown).unwrap();

        assert_eq!(stats.packets, 0);
        assert_eq!(source.frames.len(), 3);
    }

    #[test]
    fn test_capture_and_listener_write_concurrently() {
        let harness = Harness::new();
        let record = client_hello_record(&HelloShape::default());
        let frames = vec![tcp_v4_frame(443, &record); 20];
        let pipeline = harness.pipeline(FingerprintDb::new());

        let listener_storage = Arc::clone(&harness.storage);
        let writer = harness.rt.spawn(async move {
            for i in 0..20 {
                listener_storage
                    .insert_connection(&crate::storage::ConnectionRecord {
                        ip: "203.0.113.9".parse().unwrap(),
                        user_agent: format!("agent/{}", i),
                    })
                    .await
                    .unwrap();
            }
        });

        let stats = std::thread::spawn(move || {
            let mut source = FilteredSource::new(frames);
            pipeline.run(&mut source, &ShutdownSignal::new())
        })
        .join()
        .unwrap()
        .unwrap();
        harness.rt.block_on(writer).unwrap();

        assert_eq!(stats.recorded, 20);
        assert_eq!(stats.store_failures, 0);
        assert_eq!(harness.fingerprint_count(), 20);
        let connections = harness.rt.block_on(harness.storage.connection_rows()).unwrap();
        assert_eq!(connections.len(), 20);
    }
}

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use uuid::Uuid;

use super::shutdown::ShutdownSignal;
use crate::capture::engine::{Packet, PacketSource};
use crate::capture::flow::{FlowExtractor, SkipReason, Tunnel};
use crate::error_handling::types::{CaptureError, FingerprintError};
use crate::events::Event;
use crate::fingerprint::FingerprintDispatcher;
use crate::storage::{DatabaseStorage, FingerprintRecord};

/// What became of a single captured packet.
#[derive(Debug)]
pub enum PacketOutcome {
    /// A ClientHello was fingerprinted and logged. `rows_written` is 0 when
    /// the insert failed.
    Recorded {
        event: Event,
        fingerprint_name: String,
        rows_written: u64,
    },
    /// No usable flow could be extracted.
    Skipped(SkipReason),
    /// The payload passed the filter but is not a parseable ClientHello.
    Unparseable(FingerprintError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub packets: u64,
    pub recorded: u64,
    pub skipped: u64,
    pub unparseable: u64,
    pub store_failures: u64,
}

impl PipelineStats {
    fn count(&mut self, outcome: &PacketOutcome) {
        self.packets += 1;
        match outcome {
            PacketOutcome::Recorded { rows_written, .. } => {
                self.recorded += 1;
                if *rows_written == 0 {
                    self.store_failures += 1;
                }
            }
            PacketOutcome::Skipped(_) => self.skipped += 1,
            PacketOutcome::Unparseable(_) => self.unparseable += 1,
        }
    }
}

/// Sequential capture -> extract -> fingerprint -> log -> persist loop.
///
/// Runs on a blocking thread; inserts are driven to completion on `runtime`
/// before the next packet is read.
pub struct CapturePipeline {
    extractor: FlowExtractor,
    dispatcher: FingerprintDispatcher,
    storage: Arc<DatabaseStorage>,
    runtime: Handle,
}

impl CapturePipeline {
    pub fn new(
        dispatcher: FingerprintDispatcher,
        storage: Arc<DatabaseStorage>,
        runtime: Handle,
    ) -> Self {
        Self {
            extractor: FlowExtractor::new(),
            dispatcher,
            storage,
            runtime,
        }
    }

    /// Handles one packet. Never fails: every problem is logged and reported
    /// in the outcome so the loop can carry on.
    pub fn process_packet(&self, packet: &Packet) -> PacketOutcome {
        let extracted = match self.extractor.extract(packet) {
            Ok(extracted) => extracted,
            Err(reason) => {
                warn!("Skipping packet captured at {}: {}", packet.timestamp, reason);
                return PacketOutcome::Skipped(reason);
            }
        };
        let flow = &extracted.flow;
        let src = SocketAddr::new(flow.src_ip, flow.src_port);
        let dst = SocketAddr::new(flow.dst_ip, flow.dst_port);
        if flow.tunnel != Tunnel::None {
            debug!("{} -> {} decapsulated from {}", src, dst, flow.tunnel);
        }

        let matched = match self.dispatcher.dispatch(extracted.payload) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Skipping {} -> {}: {}", src, dst, e);
                return PacketOutcome::Unparseable(e);
            }
        };

        let event = Event::build(flow, &matched.descriptor, matched.hash, packet.timestamp);
        let fingerprint_name = matched.descriptor.name.clone().unwrap_or_default();
        info!("{} -> {} : {} : {}", src, dst, fingerprint_name, event.to_json());
        info!(
            "{} {} {}",
            hex::encode(&matched.detail.ciphersuite),
            hex::encode(&matched.detail.extensions),
            hex::encode(&matched.detail.record_tls_version)
        );

        let record = FingerprintRecord {
            connection_id: Uuid::new_v4(),
            detail: &matched.detail,
            packet: &packet.data,
        };
        let rows_written = match self
            .runtime
            .block_on(self.storage.insert_fingerprint(&record))
        {
            Ok(rows) => {
                debug!("Added {} rows", rows);
                rows
            }
            Err(e) => {
                error!("Failed to store fingerprint for {}: {}", src, e);
                0
            }
        };

        PacketOutcome::Recorded {
            event,
            fingerprint_name,
            rows_written,
        }
    }

    /// Drains `source` until it is exhausted or `shutdown` fires. Read
    /// timeouts are the points where shutdown is noticed.
    pub fn run<S: PacketSource>(
        &self,
        source: &mut S,
        shutdown: &ShutdownSignal,
    ) -> Result<PipelineStats, CaptureError> {
        let mut stats = PipelineStats::default();
        while !shutdown.is_triggered() {
            let packet = match source.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => continue,
                Err(CaptureError::SourceExhausted) => {
                    info!("Capture source exhausted");
                    break;
                }
                Err(e) => return Err(e),
            };
            let outcome = self.process_packet(&packet);
            stats.count(&outcome);
        }
        info!(
            "Capture finished: {} packets, {} fingerprints, {} skipped, {} unparseable",
            stats.packets, stats.recorded, stats.skipped, stats.unparseable
        );
        Ok(stats)
    }
}

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info};
use pcap::{Activated, Capture, Linktype};
use std::path::Path;

use super::filter::CaptureFilter;
use crate::error_handling::types::CaptureError;

/// libpcap treats this as "capture whole packets".
pub const MAX_SNAPLEN: i32 = 262_144;

/// One captured frame. Owned copy of the bytes handed out by libpcap, never
/// modified after capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub link_type: Linktype,
}

impl Packet {
    pub fn new(data: Vec<u8>, timestamp: DateTime<Utc>, link_type: Linktype) -> Self {
        Self {
            data,
            timestamp,
            link_type,
        }
    }
}

/// Something that yields captured packets one at a time.
///
/// `Ok(None)` means nothing arrived within the read timeout; the caller is
/// expected to poll again. `Err(CaptureError::SourceExhausted)` ends the
/// sequence (only offline sources ever do). Any other error is fatal.
pub trait PacketSource {
    fn next_packet(&mut self) -> Result<Option<Packet>, CaptureError>;
}

/// A live device or a capture file with the ClientHello filter installed.
pub struct CaptureEngine {
    cap: Capture<dyn Activated>,
    link_type: Linktype,
}

impl CaptureEngine {
    /// Opens `device` for full-length, promiscuous capture and installs `filter`.
    ///
    /// `timeout_ms` bounds a single blocking read; `0` blocks until a packet
    /// arrives. Failing to open the device or compile the filter is fatal.
    pub fn open_device(
        device: &str,
        filter: &CaptureFilter,
        timeout_ms: i32,
    ) -> Result<Self, CaptureError> {
        let cap = Capture::from_device(device)
            .map_err(|e| CaptureError::DeviceOpen(format!("{}: {}", device, e)))?
            .snaplen(MAX_SNAPLEN)
            .promisc(true)
            .timeout(timeout_ms)
            .open()
            .map_err(|e| CaptureError::DeviceOpen(format!("{}: {}", device, e)))?;

        Self::install(cap.into(), filter, device)
    }

    /// Replays a capture file through the same filter.
    pub fn open_file(path: &Path, filter: &CaptureFilter) -> Result<Self, CaptureError> {
        let cap = Capture::from_file(path)
            .map_err(|e| CaptureError::DeviceOpen(format!("{}: {}", path.display(), e)))?;

        Self::install(cap.into(), filter, &path.display().to_string())
    }

    fn install(
        mut cap: Capture<dyn Activated>,
        filter: &CaptureFilter,
        source: &str,
    ) -> Result<Self, CaptureError> {
        let expression = filter.expression();
        debug!("Installing capture filter: {}", expression);
        cap.filter(&expression, true)
            .map_err(|e| CaptureError::FilterCompile(e.to_string()))?;

        let link_type = cap.get_datalink();
        info!(
            "Capturing on {} (link type {})",
            source,
            link_type.get_name().unwrap_or_else(|_| link_type.0.to_string())
        );

        Ok(Self { cap, link_type })
    }
}

impl PacketSource for CaptureEngine {
    fn next_packet(&mut self) -> Result<Option<Packet>, CaptureError> {
        match self.cap.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts;
                let timestamp = Utc
                    .timestamp_opt(ts.tv_sec as i64, (ts.tv_usec as u32).saturating_mul(1000))
                    .single()
                    .unwrap_or_else(Utc::now);
                Ok(Some(Packet::new(
                    packet.data.to_vec(),
                    timestamp,
                    self.link_type,
                )))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(pcap::Error::NoMorePackets) => Err(CaptureError::SourceExhausted),
            Err(e) => Err(CaptureError::ReadFailed(e.to_string())),
        }
    }
}

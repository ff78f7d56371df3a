use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;

use crate::capture::flow::{Flow, IpVersion};
use crate::fingerprint::types::FingerprintDescriptor;

pub const EVENT_TAG: &str = "log";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub event: String,
    pub fp_hash: String,
    pub ip_version: IpVersion,
    pub ip_dst: IpAddr,
    pub ip_src: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Capture time; serialized as RFC 3339 in UTC.
    pub timestamp: DateTime<Utc>,
    pub server_name: String,
}

impl Event {
    /// Composes the event for one handshake. `timestamp` is the capture time of
    /// the packet, not the time of processing.
    pub fn build(
        flow: &Flow,
        descriptor: &FingerprintDescriptor,
        hash: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event: EVENT_TAG.to_string(),
            fp_hash: format!("{:x}", hash),
            ip_version: flow.ip_version,
            ip_dst: flow.dst_ip,
            ip_src: flow.src_ip,
            src_port: flow.src_port,
            dst_port: flow.dst_port,
            timestamp,
            server_name: descriptor.hostname.clone(),
        }
    }

    pub fn to_json(&self) -> String {
        // Strings, numbers and a timestamp, serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use uuid::Uuid;

use crate::fingerprint::types::FingerprintDetail;

/// One request seen by the TLS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub ip: IpAddr,
    pub user_agent: String,
}

/// One observed handshake, borrowed from the pipeline for the duration of
/// the insert.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintRecord<'a> {
    pub connection_id: Uuid,
    pub detail: &'a FingerprintDetail,
    pub packet: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRow {
    pub id: i64,
    pub injesttime: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRow {
    pub id: i64,
    pub injesttime: DateTime<Utc>,
    pub connection_id: Uuid,
    pub detail: FingerprintDetail,
    pub packet: Vec<u8>,
}

//! Data carried across the fingerprint boundary.

use sha2::{Digest, Sha256};

/// Structural fields of one ClientHello.
///
/// Every field is the raw byte sequence as it appears on the wire, with GREASE
/// values removed from the list fields (their presence is kept in `grease`).
/// A detail is always produced whole from a single payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FingerprintDetail {
    pub record_tls_version: Vec<u8>,
    pub tls_version: Vec<u8>,
    pub ciphersuite: Vec<u8>,
    pub compression_length: Vec<u8>,
    pub compression: Vec<u8>,
    pub extensions: Vec<u8>,
    pub e_curves: Vec<u8>,
    pub sig_alg: Vec<u8>,
    pub ec_point_fmt: Vec<u8>,
    pub grease: bool,
    pub supported_versions: Vec<u8>,
}

impl FingerprintDetail {
    /// 64-bit identity of the detail: the first eight bytes of a SHA-256 over
    /// the length-prefixed fields. `compression_length` is implied by
    /// `compression` and left out.
    pub fn hash(&self) -> u64 {
        let mut hasher = Sha256::new();
        for field in [
            &self.record_tls_version,
            &self.tls_version,
            &self.ciphersuite,
            &self.compression,
            &self.extensions,
            &self.e_curves,
            &self.sig_alg,
            &self.ec_point_fmt,
            &self.supported_versions,
        ] {
            hasher.update((field.len() as u16).to_be_bytes());
            hasher.update(field);
        }
        hasher.update([self.grease as u8]);
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }
}

/// What the matcher says about the client. `name` is `None` for a
/// fingerprint missing from the identity database, which is a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FingerprintDescriptor {
    pub hostname: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintMatch {
    pub descriptor: FingerprintDescriptor,
    pub detail: FingerprintDetail,
    pub hash: u64,
}

/// GREASE code points (RFC 8701) have the form 0x?A?A with equal bytes.
pub fn is_grease(value: u16) -> bool {
    value & 0x0f0f == 0x0a0a && value >> 8 == value & 0xff
}

/// Serializes `values` big-endian, dropping GREASE entries. Returns whether
/// any were dropped.
pub fn strip_grease(values: &[u16]) -> (Vec<u8>, bool) {
    let mut out = Vec::with_capacity(values.len() * 2);
    let mut found = false;
    for value in values {
        if is_grease(*value) {
            found = true;
        } else {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
    (out, found)
}

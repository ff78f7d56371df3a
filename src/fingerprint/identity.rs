//! Fingerprint identity database: hash -> human readable client name.

use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::types::{strip_grease, FingerprintDetail};
use crate::error_handling::types::FingerprintError;

/// One record of the fingerprint definition file.
///
/// List fields are whitespace (or comma) separated hex tokens, e.g.
/// `"0xC02B 0xC02F"`; versions are single tokens such as `"0x0303"`.
/// Unknown keys (`id`, `ciphersuite_length`, ...) are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FingerprintDefinition {
    pub desc: String,
    pub record_tls_version: String,
    pub tls_version: String,
    pub ciphersuite: String,
    #[serde(default)]
    pub compression: String,
    #[serde(default)]
    pub extensions: String,
    #[serde(default)]
    pub e_curves: String,
    #[serde(default)]
    pub sig_alg: String,
    #[serde(default)]
    pub ec_point_fmt: String,
    #[serde(default)]
    pub grease: bool,
    #[serde(default)]
    pub supported_versions: String,
}

fn tokens(field: &str) -> impl Iterator<Item = &str> {
    field
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| t.trim_start_matches("0x").trim_start_matches("0X"))
}

fn u16_tokens(field: &str) -> Result<Vec<u16>, String> {
    tokens(field)
        .map(|t| u16::from_str_radix(t, 16).map_err(|e| format!("'{}': {}", t, e)))
        .collect()
}

fn u8_tokens(field: &str) -> Result<Vec<u8>, String> {
    tokens(field)
        .map(|t| u8::from_str_radix(t, 16).map_err(|e| format!("'{}': {}", t, e)))
        .collect()
}

impl FingerprintDefinition {
    /// Converts the textual record into the same canonical detail the
    /// ClientHello parser produces, so both hash identically.
    pub fn to_detail(&self) -> Result<FingerprintDetail, FingerprintError> {
        let bad = |reason: String| FingerprintError::BadDefinition {
            desc: self.desc.clone(),
            reason,
        };

        let record_tls_version = u16_tokens(&self.record_tls_version).map_err(&bad)?;
        let tls_version = u16_tokens(&self.tls_version).map_err(&bad)?;
        if record_tls_version.len() != 1 || tls_version.len() != 1 {
            return Err(bad("versions must be a single 16-bit value".to_string()));
        }

        let (ciphersuite, g1) = strip_grease(&u16_tokens(&self.ciphersuite).map_err(&bad)?);
        let (extensions, g2) = strip_grease(&u16_tokens(&self.extensions).map_err(&bad)?);
        let (e_curves, g3) = strip_grease(&u16_tokens(&self.e_curves).map_err(&bad)?);
        let (supported_versions, g4) =
            strip_grease(&u16_tokens(&self.supported_versions).map_err(&bad)?);
        let sig_alg: Vec<u8> = u16_tokens(&self.sig_alg)
            .map_err(&bad)?
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let compression = u8_tokens(&self.compression).map_err(&bad)?;
        let ec_point_fmt = u8_tokens(&self.ec_point_fmt).map_err(&bad)?;

        Ok(FingerprintDetail {
            record_tls_version: record_tls_version[0].to_be_bytes().to_vec(),
            tls_version: tls_version[0].to_be_bytes().to_vec(),
            ciphersuite,
            compression_length: vec![compression.len() as u8],
            compression,
            extensions,
            e_curves,
            sig_alg,
            ec_point_fmt,
            grease: self.grease || g1 || g2 || g3 || g4,
            supported_versions,
        })
    }
}

/// Read-only after startup; shared by reference with the capture pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintDb {
    names: HashMap<u64, String>,
}

impl FingerprintDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON array of [`FingerprintDefinition`]s. Any unreadable file,
    /// malformed JSON or malformed definition fails the whole load.
    pub fn from_file(path: &Path) -> Result<Self, FingerprintError> {
        let content = std::fs::read_to_string(path)?;
        let definitions: Vec<FingerprintDefinition> =
            serde_json::from_str(&content).map_err(|e| FingerprintError::JsonError(e.to_string()))?;
        let db = Self::from_definitions(&definitions)?;
        info!(
            "Loaded {} fingerprints ({} distinct) from {}",
            definitions.len(),
            db.len(),
            path.display()
        );
        Ok(db)
    }

    pub fn from_definitions(definitions: &[FingerprintDefinition]) -> Result<Self, FingerprintError> {
        let mut db = Self::new();
        for definition in definitions {
            db.add(definition)?;
        }
        Ok(db)
    }

    /// Adds one definition; a later definition with the same hash replaces
    /// the earlier name.
    pub fn add(&mut self, definition: &FingerprintDefinition) -> Result<u64, FingerprintError> {
        let hash = definition.to_detail()?.hash();
        if let Some(previous) = self.names.insert(hash, definition.desc.clone()) {
            debug!(
                "Fingerprint {:x} '{}' replaced by '{}'",
                hash, previous, definition.desc
            );
        }
        Ok(hash)
    }

    pub fn insert<S: Into<String>>(&mut self, hash: u64, name: S) {
        self.names.insert(hash, name.into());
    }

    pub fn lookup(&self, hash: u64) -> Option<&str> {
        self.names.get(&hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

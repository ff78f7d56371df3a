//! Default matcher: decodes a TLS ClientHello record into a
//! [`FingerprintDetail`] and looks its hash up in the identity database.

use log::trace;
use tls_parser::{
    parse_tls_extension, parse_tls_plaintext, TlsClientHelloContents, TlsExtension, TlsMessage,
    TlsMessageHandshake,
};

use super::dispatcher::FingerprintMatcher;
use super::identity::FingerprintDb;
use super::types::{strip_grease, FingerprintDescriptor, FingerprintDetail, FingerprintMatch};
use crate::capture::filter::{TLS_CONTENT_TYPE_HANDSHAKE, TLS_HANDSHAKE_CLIENT_HELLO};
use crate::error_handling::types::FingerprintError;

const RECORD_HEADER_LEN: usize = 5;
const HANDSHAKE_HEADER_LEN: usize = 4;
const RANDOM_LEN: usize = 32;
const EXTENSION_HEADER_LEN: usize = 4;
const SNI_HOST_NAME: u8 = 0;

/// Decoded ClientHello: the requested host name plus the structural detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub hostname: String,
    pub detail: FingerprintDetail,
}

fn be_u16(bytes: &[u8], at: usize) -> usize {
    u16::from_be_bytes([bytes[at], bytes[at + 1]]) as usize
}

/// Copies the first record with its record and handshake lengths lowered to
/// what was actually captured. Returns whether anything had to be lowered.
fn clamp_lengths(payload: &[u8]) -> (Vec<u8>, bool) {
    let mut record = payload.to_vec();
    let body = payload.len() - RECORD_HEADER_LEN;
    let record_len = be_u16(payload, 3);
    let clamped_record = record_len.min(body);
    record[3..5].copy_from_slice(&(clamped_record as u16).to_be_bytes());

    let handshake_len = u32::from_be_bytes([0, payload[6], payload[7], payload[8]]) as usize;
    let clamped_handshake = handshake_len.min(clamped_record.saturating_sub(HANDSHAKE_HEADER_LEN));
    record[6..9].copy_from_slice(&(clamped_handshake as u32).to_be_bytes()[1..]);

    let cut = clamped_record < record_len || clamped_handshake < handshake_len;
    (record, cut)
}

/// Extension bytes of a hello whose extensions block was cut short, located
/// from the fields the parser already decoded.
fn partial_extensions<'a>(record: &'a [u8], hello: &TlsClientHelloContents) -> &'a [u8] {
    let start = RECORD_HEADER_LEN
        + HANDSHAKE_HEADER_LEN
        + 2
        + RANDOM_LEN
        + 1
        + hello.session_id.map_or(0, <[u8]>::len)
        + 2
        + 2 * hello.ciphers.len()
        + 1
        + hello.comp.len();
    if record.len() < start + 2 {
        return &[];
    }
    let end = (start + 2 + be_u16(record, start)).min(record.len());
    &record[start + 2..end]
}

/// Parses the first TLS record of `payload` as a ClientHello.
///
/// The hello may be cut short when it spans several TCP segments; extensions
/// are then decoded up to the last complete one. Everything before the
/// extensions block must be present.
pub fn parse(payload: &[u8]) -> Result<ClientHello, FingerprintError> {
    match payload.first() {
        Some(&TLS_CONTENT_TYPE_HANDSHAKE) => {}
        Some(other) => {
            return Err(FingerprintError::NotClientHello(format!(
                "record content type {}",
                other
            )))
        }
        None => return Err(FingerprintError::Truncated("record header")),
    }
    if payload.len() < RECORD_HEADER_LEN + HANDSHAKE_HEADER_LEN {
        return Err(FingerprintError::Truncated("handshake header"));
    }
    if payload[RECORD_HEADER_LEN] != TLS_HANDSHAKE_CLIENT_HELLO {
        return Err(FingerprintError::NotClientHello(format!(
            "handshake type {}",
            payload[RECORD_HEADER_LEN]
        )));
    }

    let (record, cut) = clamp_lengths(payload);
    let plaintext = match parse_tls_plaintext(&record) {
        Ok((_, plaintext)) => plaintext,
        Err(_) if cut => return Err(FingerprintError::Truncated("client hello")),
        Err(e) => return Err(FingerprintError::NotClientHello(format!("{:?}", e))),
    };
    let contents = plaintext
        .msg
        .iter()
        .find_map(|msg| match msg {
            TlsMessage::Handshake(TlsMessageHandshake::ClientHello(contents)) => Some(contents),
            _ => None,
        })
        .ok_or_else(|| FingerprintError::NotClientHello("no hello in record".to_string()))?;

    let ciphers: Vec<u16> = contents.ciphers.iter().map(|c| c.0).collect();
    let (ciphersuite, mut grease) = strip_grease(&ciphers);
    let compression: Vec<u8> = contents.comp.iter().map(|c| c.0).collect();

    let mut hello = ClientHello {
        hostname: String::new(),
        detail: FingerprintDetail {
            record_tls_version: plaintext.hdr.version.0.to_be_bytes().to_vec(),
            tls_version: contents.version.0.to_be_bytes().to_vec(),
            ciphersuite,
            compression_length: vec![compression.len() as u8],
            compression,
            ..Default::default()
        },
    };

    let ext_block = match contents.ext {
        Some(ext) => ext,
        None => partial_extensions(&record, contents),
    };
    let ext_types = walk_extensions(ext_block, &mut hello, &mut grease);

    let (extensions, ext_grease) = strip_grease(&ext_types);
    hello.detail.extensions = extensions;
    hello.detail.grease = grease || ext_grease;
    Ok(hello)
}

/// Decodes extensions one at a time, stopping at the first one that is not
/// complete. Returns the extension types in wire order.
fn walk_extensions(mut rest: &[u8], hello: &mut ClientHello, grease: &mut bool) -> Vec<u16> {
    let mut ext_types = Vec::new();
    while rest.len() >= EXTENSION_HEADER_LEN {
        let ext_type = be_u16(rest, 0) as u16;
        let end = EXTENSION_HEADER_LEN + be_u16(rest, 2);
        let Some(raw) = rest.get(..end) else {
            trace!("ClientHello extension 0x{:04x} cut short", ext_type);
            break;
        };
        ext_types.push(ext_type);
        match parse_tls_extension(raw) {
            Ok((_, ext)) => decode_extension(ext, hello, grease),
            Err(e) => trace!("Undecodable extension 0x{:04x}: {:?}", ext_type, e),
        }
        rest = &rest[end..];
    }
    ext_types
}

fn decode_extension(ext: TlsExtension<'_>, hello: &mut ClientHello, grease: &mut bool) {
    match ext {
        TlsExtension::SNI(names) => {
            if let Some((_, name)) = names.iter().find(|(kind, _)| kind.0 == SNI_HOST_NAME) {
                hello.hostname = String::from_utf8_lossy(name).into_owned();
            }
        }
        TlsExtension::EllipticCurves(groups) => {
            let groups: Vec<u16> = groups.iter().map(|g| g.0).collect();
            let (bytes, found) = strip_grease(&groups);
            hello.detail.e_curves = bytes;
            *grease |= found;
        }
        TlsExtension::EcPointFormats(formats) => {
            hello.detail.ec_point_fmt = formats.to_vec();
        }
        TlsExtension::SignatureAlgorithms(algs) => {
            hello.detail.sig_alg = algs.iter().flat_map(|a| a.to_be_bytes()).collect();
        }
        TlsExtension::SupportedVersions(versions) => {
            let versions: Vec<u16> = versions.iter().map(|v| v.0).collect();
            let (bytes, found) = strip_grease(&versions);
            hello.detail.supported_versions = bytes;
            *grease |= found;
        }
        _ => {}
    }
}

/// [`FingerprintMatcher`] backed by [`parse`] and [`FingerprintDetail::hash`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientHelloMatcher;

impl FingerprintMatcher for ClientHelloMatcher {
    fn fingerprint(
        &self,
        payload: &[u8],
        identities: &FingerprintDb,
    ) -> Result<FingerprintMatch, FingerprintError> {
        let hello = parse(payload)?;
        let hash = hello.detail.hash();
        Ok(FingerprintMatch {
            descriptor: FingerprintDescriptor {
                hostname: hello.hostname,
                name: identities.lookup(hash).map(str::to_string),
            },
            detail: hello.detail,
            hash,
        })
    }
}

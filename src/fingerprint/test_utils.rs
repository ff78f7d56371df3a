//! Synthetic ClientHello records for tests.

const GREASE_CIPHER: u16 = 0x1a1a;
const GREASE_EXTENSION: u16 = 0x0a0a;
const GREASE_GROUP: u16 = 0x2a2a;
const GREASE_VERSION: u16 = 0x3a3a;

/// Shape of the hello to build. The default looks like a modern browser:
/// GREASE everywhere, SNI `example.com`, TLS 1.3 + 1.2.
#[derive(Debug, Clone)]
pub struct HelloShape {
    pub sni: Option<String>,
    pub ciphers: Vec<u16>,
    pub groups: Vec<u16>,
    pub sig_algs: Vec<u16>,
    pub point_formats: Vec<u8>,
    pub versions: Vec<u16>,
    pub grease: bool,
}

impl Default for HelloShape {
    fn default() -> Self {
        Self {
            sni: Some("example.com".to_string()),
            ciphers: vec![0x1301, 0x1302, 0xc02b, 0xc02f],
            groups: vec![0x001d, 0x0017],
            sig_algs: vec![0x0403, 0x0804],
            point_formats: vec![0x00],
            versions: vec![0x0304, 0x0303],
            grease: true,
        }
    }
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn u16s(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn extension(out: &mut Vec<u8>, ext_type: u16, body: &[u8]) {
    push_u16(out, ext_type);
    push_u16(out, body.len() as u16);
    out.extend_from_slice(body);
}

fn with_grease(grease: bool, g: u16, values: &[u16]) -> Vec<u16> {
    let mut out = Vec::new();
    if grease {
        out.push(g);
    }
    out.extend_from_slice(values);
    out
}

/// Encodes a complete TLS record (record version 3.1) holding the hello.
pub fn client_hello_record(shape: &HelloShape) -> Vec<u8> {
    let mut exts = Vec::new();
    if shape.grease {
        extension(&mut exts, GREASE_EXTENSION, &[]);
    }
    if let Some(sni) = &shape.sni {
        let mut body = Vec::new();
        push_u16(&mut body, (sni.len() + 3) as u16);
        body.push(0);
        push_u16(&mut body, sni.len() as u16);
        body.extend_from_slice(sni.as_bytes());
        extension(&mut exts, 0x0000, &body);
    }

    let mut points = vec![shape.point_formats.len() as u8];
    points.extend_from_slice(&shape.point_formats);
    extension(&mut exts, 0x000b, &points);

    let groups = u16s(&with_grease(shape.grease, GREASE_GROUP, &shape.groups));
    let mut body = Vec::new();
    push_u16(&mut body, groups.len() as u16);
    body.extend_from_slice(&groups);
    extension(&mut exts, 0x000a, &body);

    let sigs = u16s(&shape.sig_algs);
    let mut body = Vec::new();
    push_u16(&mut body, sigs.len() as u16);
    body.extend_from_slice(&sigs);
    extension(&mut exts, 0x000d, &body);

    let versions = u16s(&with_grease(shape.grease, GREASE_VERSION, &shape.versions));
    let mut body = vec![versions.len() as u8];
    body.extend_from_slice(&versions);
    extension(&mut exts, 0x002b, &body);

    let ciphers = u16s(&with_grease(shape.grease, GREASE_CIPHER, &shape.ciphers));
    let mut hello = Vec::new();
    push_u16(&mut hello, 0x0303);
    hello.extend_from_slice(&[0x42; 32]);
    hello.push(0);
    push_u16(&mut hello, ciphers.len() as u16);
    hello.extend_from_slice(&ciphers);
    hello.extend_from_slice(&[1, 0]);
    push_u16(&mut hello, exts.len() as u16);
    hello.extend_from_slice(&exts);

    let mut handshake = vec![1];
    handshake.extend_from_slice(&(hello.len() as u32).to_be_bytes()[1..]);
    handshake.extend_from_slice(&hello);

    let mut record = vec![0x16, 0x03, 0x01];
    push_u16(&mut record, handshake.len() as u16);
    record.extend_from_slice(&handshake);
    record
}

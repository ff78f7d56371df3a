//! Kernel-level capture predicate selecting TLS ClientHello records.
//!
//! The predicate only reads fixed byte offsets: the record content type
//! (handshake, 22), the record major version (3), the handshake type
//! (ClientHello, 1) and the ClientHello major version (3). It is replicated
//! for every encapsulation the sensor has to see through, each clause locating
//! the start of the TCP payload from the TCP data offset nibble.

use crate::error_handling::types::CaptureError;
use pcap::{BpfProgram, Capture, Linktype};

pub const TLS_CONTENT_TYPE_HANDSHAKE: u8 = 22;
pub const TLS_HANDSHAKE_CLIENT_HELLO: u8 = 1;
pub const TLS_MAJOR_VERSION: u8 = 3;

/// One encapsulation shape accepted by the capture predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encapsulation {
    /// TCP directly over IPv4.
    TcpIpv4,
    /// TCP directly over IPv6.
    TcpIpv6,
    /// IPv6/TCP carried in UDP with a 2001::/32 source (Teredo).
    Teredo,
    /// IPv6/TCP carried as IPv4 protocol 41 (6in4).
    SixInFour,
}

impl Encapsulation {
    pub const ALL: [Encapsulation; 4] = [
        Encapsulation::TcpIpv4,
        Encapsulation::TcpIpv6,
        Encapsulation::Teredo,
        Encapsulation::SixInFour,
    ];

    /// The BPF clause matching a ClientHello in this encapsulation.
    pub fn clause(&self) -> String {
        match self {
            Encapsulation::TcpIpv4 => handshake_clause("tcp", "tcp[12]/16*4", 0),
            Encapsulation::TcpIpv6 => handshake_clause("ip6", "ip6[52]/16*4", 40),
            Encapsulation::Teredo => format!(
                "((udp[14] = 6 and udp[16] = 32 and udp[17] = 1) and {})",
                handshake_clause("udp", "udp[60]/16*4", 48)
            ),
            Encapsulation::SixInFour => format!(
                "(proto 41 and ip[26] = 6 and {})",
                handshake_clause("ip", "ip[72]/16*4", 60)
            ),
        }
    }
}

/// Builds `proto[offset + n] = value` tests for the four record bytes.
fn handshake_clause(proto: &str, data_offset: &str, base: usize) -> String {
    let at = |n: usize| -> String {
        match (base, n) {
            (0, 0) => format!("{}[{}]", proto, data_offset),
            (0, n) => format!("{}[{}+{}]", proto, data_offset, n),
            (b, n) => format!("{}[({}+{})+{}]", proto, data_offset, n, b),
        }
    };
    format!(
        "({} = {} and {} = {} and {} = {} and {} = {})",
        at(0),
        TLS_CONTENT_TYPE_HANDSHAKE,
        at(5),
        TLS_HANDSHAKE_CLIENT_HELLO,
        at(9),
        TLS_MAJOR_VERSION,
        at(1),
        TLS_MAJOR_VERSION
    )
}

/// The full capture predicate: an OR over the enabled encapsulations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFilter {
    encapsulations: Vec<Encapsulation>,
}

impl Default for CaptureFilter {
    fn default() -> Self {
        Self {
            encapsulations: Encapsulation::ALL.to_vec(),
        }
    }
}

impl CaptureFilter {
    pub fn new(encapsulations: &[Encapsulation]) -> Self {
        Self {
            encapsulations: encapsulations.to_vec(),
        }
    }

    pub fn expression(&self) -> String {
        self.encapsulations
            .iter()
            .map(Encapsulation::clause)
            .collect::<Vec<_>>()
            .join(" or ")
    }

    /// Compiles the expression for `linktype` without opening a device.
    ///
    /// The returned program can be evaluated in user space with
    /// [`BpfProgram::filter`], which runs the same code the kernel would.
    pub fn compile(&self, linktype: Linktype) -> Result<BpfProgram, CaptureError> {
        let dead = Capture::dead(linktype).map_err(|e| CaptureError::FilterCompile(e.to_string()))?;
        dead.compile(&self.expression(), true)
            .map_err(|e| CaptureError::FilterCompile(e.to_string()))
    }
}

//! Packet capture subsystem
//!
//! - `filter`: the kernel-evaluated ClientHello predicate over four encapsulations.
//! - `engine`: device/file handle with the predicate installed, yielding [`Packet`]s.
//! - `flow`: endpoint and payload extraction with explicit skip results.

pub mod engine;
pub mod filter;
pub mod flow;

pub use engine::{CaptureEngine, Packet, PacketSource};
pub use filter::{CaptureFilter, Encapsulation};
pub use flow::{Extracted, Flow, FlowExtractor, IpVersion, SkipReason, Tunnel};

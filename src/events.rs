//! Per-handshake events
//!
//! An [`Event`] is the operator-facing record of one observed ClientHello. It
//! is only ever serialized into the log; storage keeps its own columns.

pub mod event;

pub use event::Event;

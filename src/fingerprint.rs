//! Fingerprint boundary
//!
//! The capture pipeline only talks to [`FingerprintDispatcher`]. Matching itself
//! sits behind the [`FingerprintMatcher`] trait; [`ClientHelloMatcher`] is the
//! implementation the binary ships with.

pub mod client_hello;
pub mod dispatcher;
pub mod identity;
#[cfg(test)]
pub mod test_utils;
pub mod types;

pub use client_hello::ClientHelloMatcher;
pub use dispatcher::{FingerprintDispatcher, FingerprintMatcher};
pub use identity::{FingerprintDb, FingerprintDefinition};
pub use types::{FingerprintDescriptor, FingerprintDetail, FingerprintMatch};

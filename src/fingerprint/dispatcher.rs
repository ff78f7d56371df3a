use log::debug;
use std::sync::Arc;

use super::client_hello::ClientHelloMatcher;
use super::identity::FingerprintDb;
use super::types::FingerprintMatch;
use crate::error_handling::types::FingerprintError;

/// Turns an application payload into a fingerprint.
///
/// Implementations own all parsing and hashing. A hash absent from
/// `identities` is not an error: the match comes back with
/// `descriptor.name == None`.
pub trait FingerprintMatcher: Send + Sync {
    fn fingerprint(
        &self,
        payload: &[u8],
        identities: &FingerprintDb,
    ) -> Result<FingerprintMatch, FingerprintError>;
}

/// Boundary between the capture pipeline and the matcher. Holds the matcher
/// and the identity database loaded at startup.
#[derive(Clone)]
pub struct FingerprintDispatcher {
    matcher: Arc<dyn FingerprintMatcher>,
    identities: Arc<FingerprintDb>,
}

impl FingerprintDispatcher {
    pub fn new(matcher: Arc<dyn FingerprintMatcher>, identities: Arc<FingerprintDb>) -> Self {
        Self {
            matcher,
            identities,
        }
    }

    pub fn with_client_hello(identities: Arc<FingerprintDb>) -> Self {
        Self::new(Arc::new(ClientHelloMatcher), identities)
    }

    pub fn dispatch(&self, payload: &[u8]) -> Result<FingerprintMatch, FingerprintError> {
        let result = self.matcher.fingerprint(payload, &self.identities)?;
        if result.descriptor.name.is_none() {
            debug!("Fingerprint {:x} not in identity database", result.hash);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::types::{FingerprintDescriptor, FingerprintDetail};

    struct FixedMatcher;

    impl FingerprintMatcher for FixedMatcher {
        fn fingerprint(
            &self,
            payload: &[u8],
            identities: &FingerprintDb,
        ) -> Result<FingerprintMatch, FingerprintError> {
            let hash = payload.len() as u64;
            Ok(FingerprintMatch {
                descriptor: FingerprintDescriptor {
                    hostname: "fixed.test".to_string(),
                    name: identities.lookup(hash).map(str::to_string),
                },
                detail: FingerprintDetail::default(),
                hash,
            })
        }
    }

    #[test]
    fn test_dispatch_passes_payload_and_identities() {
        let mut db = FingerprintDb::new();
        db.insert(3, "three-byte-client");
        let dispatcher = FingerprintDispatcher::new(Arc::new(FixedMatcher), Arc::new(db));

        let known = dispatcher.dispatch(b"abc").unwrap();
        assert_eq!(known.descriptor.name.as_deref(), Some("three-byte-client"));

        let unknown = dispatcher.dispatch(b"abcd").unwrap();
        assert_eq!(unknown.descriptor.name, None);
        assert_eq!(unknown.hash, 4);
    }

    #[test]
    fn test_parse_failure_is_reported() {
        let dispatcher = FingerprintDispatcher::with_client_hello(Arc::new(FingerprintDb::new()));
        assert!(dispatcher.dispatch(b"\x17\x03\x03\x00\x01").is_err());
    }
}

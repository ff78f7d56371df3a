use std::collections::HashSet;
use std::net::IpAddr;

/// Set of peer addresses the auxiliary listener refuses to serve.
///
/// Built once from the configuration, owned by the controller and handed to
/// readers behind an `Arc`. Nothing mutates it after startup.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Blocklist {
    blocked: HashSet<IpAddr>,
}

impl Blocklist {
    pub fn new<I: IntoIterator<Item = IpAddr>>(addrs: I) -> Self {
        Self {
            blocked: addrs.into_iter().collect(),
        }
    }

    pub fn is_blocked(&self, addr: &IpAddr) -> bool {
        self.blocked.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_blocklist_lookup() {
        let blocked = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 45));
        let list = Blocklist::new(vec![blocked, blocked]);

        assert_eq!(list.len(), 1);
        assert!(list.is_blocked(&blocked));
        assert!(!list.is_blocked(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(Blocklist::default().is_empty());
    }
}

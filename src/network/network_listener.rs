//! # Network Listener Module
//!
//! Accepts TCP connections on the configured address, terminates TLS and
//! answers every request with a fixed page. Each request's `User-Agent` is
//! logged and appended to the `www` table.
//!
//! ```text
//! ┌─────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │ Incoming    │───▶│ NetworkListener │───▶│ DatabaseStorage │
//! │ Connections │    │ - Blocklist     │    │ (www table)     │
//! └─────────────┘    │ - TLS accept    │    └─────────────────┘
//!                    │ - UA extraction │
//!                    └─────────────────┘
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use regex::bytes::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::configuration::types::Blocklist;
use crate::controller::shutdown::ShutdownSignal;
use crate::error_handling::types::NetworkError;
use crate::storage::{ConnectionRecord, DatabaseStorage};

/// Upper bound on the request head we are willing to buffer.
const MAX_REQUEST_HEAD: usize = 8 * 1024;
const RESPONSE_BODY: &str = "Hello Custom World!";
const USER_AGENT_PATTERN: &str = r"(?im)^user-agent:[ \t]*([^\r\n]*)";
/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub fn user_agent_pattern() -> Result<Regex, NetworkError> {
    Regex::new(USER_AGENT_PATTERN).map_err(NetworkError::PatternError)
}

pub struct NetworkListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    user_agent: Arc<Regex>,
    storage: Arc<DatabaseStorage>,
    blocklist: Arc<Blocklist>,
}

impl NetworkListener {
    /// Binds `addr`. Failing to bind is fatal for the caller.
    pub async fn bind(
        addr: SocketAddr,
        acceptor: TlsAcceptor,
        storage: Arc<DatabaseStorage>,
        blocklist: Blocklist,
    ) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(NetworkError::BindError)?;
        Ok(Self {
            listener,
            acceptor,
            user_agent: Arc::new(user_agent_pattern()?),
            storage,
            blocklist: Arc::new(blocklist),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(NetworkError::SockError)
    }

    /// Accept loop. Every connection is served in its own task; the loop
    /// itself only ends when `shutdown` fires.
    pub async fn run(&self, shutdown: ShutdownSignal) -> Result<(), NetworkError> {
        info!("Listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.wait() => {
                    info!("Listener stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        accept_backoff(&e).await;
                        continue;
                    }
                },
            };

            if !admit(&self.blocklist, &peer) {
                continue;
            }

            let acceptor = self.acceptor.clone();
            let user_agent = Arc::clone(&self.user_agent);
            let storage = Arc::clone(&self.storage);
            tokio::spawn(async move {
                let served = match acceptor.accept(stream).await {
                    Ok(tls) => handle_request(tls, peer, &user_agent, &storage).await,
                    Err(e) => Err(NetworkError::HandshakeFailed(e)),
                };
                if let Err(e) = served {
                    debug!("{}: {}", peer, e);
                }
            });
        }
    }
}

/// Blocked peers are dropped before any TLS work is done.
fn admit(blocklist: &Blocklist, peer: &SocketAddr) -> bool {
    if blocklist.is_blocked(&peer.ip().to_canonical()) {
        info!("Dropping blocked peer {}", peer);
        return false;
    }
    true
}

async fn accept_backoff(e: &io::Error) {
    warn!("Accept failed: {}", e);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

pub fn extract_user_agent(pattern: &Regex, head: &[u8]) -> Option<String> {
    pattern
        .captures(head)
        .and_then(|c| c.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).trim_end().to_string())
}

async fn read_request_head<S>(stream: &mut S) -> Result<Vec<u8>, NetworkError>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while head.len() < MAX_REQUEST_HEAD {
        let n = stream.read(&mut chunk).await.map_err(NetworkError::SockError)?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    Ok(head)
}

/// Serves one request on an established (already decrypted) stream and
/// returns the `User-Agent` it carried, empty when absent.
pub async fn handle_request<S>(
    mut stream: S,
    peer: SocketAddr,
    user_agent: &Regex,
    storage: &DatabaseStorage,
) -> Result<String, NetworkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let head = read_request_head(&mut stream).await?;
    let user_agent = extract_user_agent(user_agent, &head).unwrap_or_default();
    info!("{} {}", peer, user_agent);

    let record = ConnectionRecord {
        ip: peer.ip().to_canonical(),
        user_agent: user_agent.clone(),
    };
    if let Err(e) = storage.insert_connection(&record).await {
        error!("Failed to store connection from {}: {}", peer, e);
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        RESPONSE_BODY.len(),
        RESPONSE_BODY
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(NetworkError::SockError)?;
    stream.shutdown().await.map_err(NetworkError::SockError)?;
    Ok(user_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::io::Builder;

    const REQUEST: &[u8] =
        b"GET / HTTP/1.1\r\nHost: localhost\r\nUser-Agent: Mozilla/5.0 (X11)\r\nAccept: */*\r\n\r\n";

    fn expected_response() -> Vec<u8> {
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 19\r\nConnection: close\r\n\r\nHello Custom World!"
            .to_vec()
    }

    async fn temp_storage() -> (TempDir, DatabaseStorage) {
        let dir = TempDir::new().unwrap();
        let storage = DatabaseStorage::connect(dir.path().join("www.sqlite3"))
            .await
            .unwrap();
        storage.init_schema().await.unwrap();
        (dir, storage)
    }

    #[test]
    fn test_extract_user_agent() {
        let pattern = user_agent_pattern().unwrap();
        assert_eq!(
            extract_user_agent(&pattern, REQUEST).as_deref(),
            Some("Mozilla/5.0 (X11)")
        );
        assert_eq!(
            extract_user_agent(&pattern, b"GET / HTTP/1.1\r\nuser-agent:curl/8.1\r\n\r\n")
                .as_deref(),
            Some("curl/8.1")
        );
        assert_eq!(
            extract_user_agent(&pattern, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
            None
        );
    }

    #[tokio::test]
    async fn test_handle_request_logs_and_replies() {
        let (_dir, storage) = temp_storage().await;
        let stream = Builder::new()
            .read(REQUEST)
            .write(&expected_response())
            .build();
        let peer: SocketAddr = "198.51.100.20:40000".parse().unwrap();

        let pattern = user_agent_pattern().unwrap();
        let ua = handle_request(stream, peer, &pattern, &storage).await.unwrap();
        assert_eq!(ua, "Mozilla/5.0 (X11)");

        let rows = storage.connection_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ip, "198.51.100.20");
        assert_eq!(rows[0].user_agent, "Mozilla/5.0 (X11)");
    }

    #[tokio::test]
    async fn test_request_head_split_across_reads() {
        let (_dir, storage) = temp_storage().await;
        let stream = Builder::new()
            .read(&REQUEST[..20])
            .read(&REQUEST[20..])
            .write(&expected_response())
            .build();
        let peer: SocketAddr = "[2001:db8::1]:443".parse().unwrap();

        let pattern = user_agent_pattern().unwrap();
        let ua = handle_request(stream, peer, &pattern, &storage).await.unwrap();
        assert_eq!(ua, "Mozilla/5.0 (X11)");
    }

    #[tokio::test]
    async fn test_storage_failure_still_replies() {
        let dir = TempDir::new().unwrap();
        // no schema: the insert fails
        let storage = DatabaseStorage::connect(dir.path().join("bare.sqlite3"))
            .await
            .unwrap();
        let stream = Builder::new()
            .read(REQUEST)
            .write(&expected_response())
            .build();

        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let pattern = user_agent_pattern().unwrap();
        assert!(handle_request(stream, peer, &pattern, &storage).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_accept_backs_off() {
        let started = tokio::time::Instant::now();
        accept_backoff(&io::Error::from_raw_os_error(24)).await;
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[test]
    fn test_blocklist_admission() {
        let blocklist = Blocklist::new(["192.0.2.1".parse().unwrap()]);
        assert!(!admit(&blocklist, &"192.0.2.1:5555".parse().unwrap()));
        assert!(admit(&blocklist, &"192.0.2.2:5555".parse().unwrap()));
        // IPv4 peers accepted on the dual-stack wildcard
        assert!(!admit(&blocklist, &"[::ffff:192.0.2.1]:5555".parse().unwrap()));
    }
}

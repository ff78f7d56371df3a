//! Auxiliary TLS listener
//!
//! A minimal HTTPS responder that gives fingerprinted clients somewhere to
//! connect, logging and storing each request's `User-Agent`.

pub mod network_listener;
pub mod tls;

pub use network_listener::NetworkListener;
pub use tls::load_tls_acceptor;

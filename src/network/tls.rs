use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::error_handling::types::NetworkError;

fn open(path: &Path) -> Result<BufReader<File>, NetworkError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| NetworkError::CertificateLoad(format!("{}: {}", path.display(), e)))
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, NetworkError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, std::io::Error>>()
        .map_err(|e| NetworkError::CertificateLoad(format!("{}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(NetworkError::CertificateLoad(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, NetworkError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| NetworkError::CertificateLoad(format!("{}: {}", path.display(), e)))?
        .ok_or_else(|| {
            NetworkError::CertificateLoad(format!("{}: no private key found", path.display()))
        })
}

/// Builds the server side TLS acceptor from a PEM certificate chain and key.
pub fn load_tls_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor, NetworkError> {
    let cert_chain = load_cert_chain(cert)?;
    let key = load_private_key(key)?;

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| NetworkError::TlsConfig(e.to_string()))?
    .with_no_client_auth()
    .with_single_cert(cert_chain, key)
    .map_err(|e| NetworkError::TlsConfig(e.to_string()))?;

    debug!("Loaded TLS certificate {}", cert.display());
    Ok(TlsAcceptor::from(Arc::new(config)))
}

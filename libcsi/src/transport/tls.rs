//! TLS 1.3 configuration for the QUIC endpoints, built from PEM material.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::CsiError;

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, CsiError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CsiError::TransportError(format!("invalid certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(CsiError::TransportError("no certificate found in PEM".into()));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, CsiError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| CsiError::TransportError(format!("invalid private key PEM: {e}")))?
        .ok_or_else(|| CsiError::TransportError("no private key found in PEM".into()))
}

async fn read(path: &Path) -> Result<Vec<u8>, CsiError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| CsiError::TransportError(format!("read {}: {e}", path.display())))
}

/// Server configuration presenting `cert_pem` (leaf first) with `key_pem`.
pub fn server_config_from_pem(
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<rustls::ServerConfig, CsiError> {
    rustls::ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(CsiError::transport)?
        .with_no_client_auth()
        .with_single_cert(parse_certs(cert_pem)?, parse_key(key_pem)?)
        .map_err(CsiError::transport)
}

/// Client configuration trusting only the CAs in `ca_pem`.
pub fn client_config_from_pem(ca_pem: &[u8]) -> Result<rustls::ClientConfig, CsiError> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in parse_certs(ca_pem)? {
        roots.add(cert).map_err(CsiError::transport)?;
    }
    Ok(rustls::ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(CsiError::transport)?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

pub async fn server_config(cert: &Path, key: &Path) -> Result<rustls::ServerConfig, CsiError> {
    server_config_from_pem(&read(cert).await?, &read(key).await?)
}

pub async fn client_config(ca: &Path) -> Result<rustls::ClientConfig, CsiError> {
    client_config_from_pem(&read(ca).await?)
}

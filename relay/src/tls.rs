//! Server-side TLS from PEM files.

use crate::error::{RelayError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

fn tls_err(path: &Path, message: impl std::fmt::Display) -> RelayError {
    RelayError::TlsMaterial {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| tls_err(path, e))
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| tls_err(path, e))?;
    if certs.is_empty() {
        return Err(tls_err(path, "no certificates found"));
    }
    Ok(certs)
}

pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| tls_err(path, e))?
        .ok_or_else(|| tls_err(path, "no private key found"))
}

/// Any failure here is fatal: the relay never serves without TLS.
pub fn load_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor> {
    let certs = load_certs(cert)?;
    let key = load_key(key)?;
    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_reported_with_path() {
        let err = load_acceptor(Path::new("/nonexistent/cert.pem"), Path::new("key.pem"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("/nonexistent/cert.pem"), "{err}");
    }

    #[test]
    fn pem_without_certificates_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let cert = tmp.path().join("cert.pem");
        std::fs::write(&cert, "not a certificate\n").unwrap();
        let err = load_certs(&cert).unwrap_err();
        assert!(err.to_string().contains("no certificates found"), "{err}");
    }

    #[test]
    fn pem_without_key_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let key = tmp.path().join("key.pem");
        std::fs::write(&key, "").unwrap();
        let err = load_key(&key).unwrap_err();
        assert!(err.to_string().contains("no private key found"), "{err}");
    }
}

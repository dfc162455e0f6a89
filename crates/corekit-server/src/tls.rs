//! TLS acceptor loading.
//!
//! The certificate chain and private key are read once at startup from PEM
//! files. Connections are served over HTTP/1.1 only, which is what the
//! acceptor advertises through ALPN.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::crypto::ring::default_provider;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::error::ServerError;

/// Builds a TLS acceptor from a PEM certificate chain and private key.
///
/// # Errors
///
/// Returns [`ServerError::Tls`] if either file cannot be read, holds no
/// usable PEM item, or the key does not match the certificate.
pub fn load_acceptor(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor, ServerError> {
    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::tls(format!("unsupported protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::tls(format!("invalid certificate or key: {e}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path) -> Result<BufReader<File>, ServerError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ServerError::tls(format!("failed to open {}: {e}", path.display())))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::tls(format!("failed to parse {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(ServerError::tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ServerError::tls(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| ServerError::tls(format!("no private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pem_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn message(err: ServerError) -> String {
        match err {
            ServerError::Tls { message } => message,
            other => panic!("expected a TLS error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_files() {
        let err = load_acceptor(Path::new("/missing/cert.pem"), Path::new("/missing/key.pem"))
            .err().unwrap();
        assert!(message(err).contains("failed to open /missing/cert.pem"));
    }

    #[test]
    fn test_file_without_certificates() {
        let cert = pem_file("not a pem file\n");
        let key = pem_file("");
        let err = load_acceptor(cert.path(), key.path()).err().unwrap();
        assert!(message(err).contains("no certificates found"));
    }

    #[test]
    fn test_file_without_key() {
        let key = pem_file("# nothing here\n");
        let err = load_key(key.path()).unwrap_err();
        assert!(message(err).contains("no private key found"));
    }
}

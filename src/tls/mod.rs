//! TLS support for `wss://` connections, built on rustls.
//!
//! The connector is constructed synchronously at connect time so that TLS
//! configuration errors (bad CA file, unreadable client certificate) surface
//! from `connect()` rather than asynchronously.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::warn;

use crate::error::{Error, Result};

pub use tokio_rustls::client::TlsStream;
pub use tokio_rustls::TlsConnector;

/// Where to find the trust anchors for server certificate verification.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub enum CaSource {
    /// The bundled Mozilla root set (`webpki-roots`).
    #[default]
    System,
    /// A PEM file with one or more CA certificates.
    File(PathBuf),
    /// Skip verification entirely. Only for test endpoints.
    NoVerify,
}

/// TLS options for secure connections.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Trust anchor source.
    pub ca: CaSource,
    /// OpenSSL-style cipher list. rustls keeps its own vetted suites; a
    /// value here is accepted for API compatibility and logged.
    pub cipher_list: Option<String>,
    /// Client certificate chain and private key PEM files.
    pub client_cert: Option<(PathBuf, PathBuf)>,
}

/// Load all certificates from a PEM file.
///
/// # Errors
///
/// Returns [`Error::Tls`] if the file cannot be read or contains no
/// certificates.
pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file =
        File::open(path).map_err(|e| Error::Tls(format!("{}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("{}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file (PKCS#1, PKCS#8, or SEC1).
///
/// # Errors
///
/// Returns [`Error::Tls`] if the file cannot be read or contains no key.
pub fn load_private_key_from_file(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file =
        File::open(path).map_err(|e| Error::Tls(format!("{}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    for item in rustls_pemfile::read_all(&mut reader) {
        let item = item.map_err(|e| Error::Tls(format!("{}: {e}", path.display())))?;
        match item {
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => continue,
        }
    }

    Err(Error::Tls(format!(
        "no private key found in {}",
        path.display()
    )))
}

/// Build a connector from the configured options.
///
/// # Errors
///
/// Returns [`Error::Tls`] on any configuration problem.
pub fn build_connector(options: &TlsOptions) -> Result<TlsConnector> {
    if let Some(ciphers) = &options.cipher_list {
        warn!(%ciphers, "cipher_list is ignored; rustls selects its own suites");
    }

    let builder = match &options.ca {
        CaSource::System => {
            let roots =
                RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            ClientConfig::builder().with_root_certificates(roots)
        }
        CaSource::File(path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs_from_file(path)? {
                roots
                    .add(cert)
                    .map_err(|e| Error::Tls(format!("bad CA certificate: {e}")))?;
            }
            ClientConfig::builder().with_root_certificates(roots)
        }
        CaSource::NoVerify => ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification)),
    };

    let config = match &options.client_cert {
        Some((cert_path, key_path)) => {
            let certs = load_certs_from_file(cert_path)?;
            let key = load_private_key_from_file(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| Error::Tls(format!("client certificate rejected: {e}")))?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Certificate verifier that accepts everything (`CaSource::NoVerify`).
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_connector_system_roots() {
        assert!(build_connector(&TlsOptions::default()).is_ok());
    }

    #[test]
    fn test_build_connector_no_verify() {
        let options = TlsOptions {
            ca: CaSource::NoVerify,
            ..TlsOptions::default()
        };
        assert!(build_connector(&options).is_ok());
    }

    #[test]
    fn test_build_connector_cipher_list_accepted() {
        let options = TlsOptions {
            cipher_list: Some("HIGH:!aNULL".to_string()),
            ..TlsOptions::default()
        };
        assert!(build_connector(&options).is_ok());
    }

    #[test]
    fn test_build_connector_missing_ca_file() {
        let options = TlsOptions {
            ca: CaSource::File(PathBuf::from("/nonexistent/ca.pem")),
            ..TlsOptions::default()
        };
        assert!(matches!(build_connector(&options), Err(Error::Tls(_))));
    }

    #[test]
    fn test_load_certs_file_not_found() {
        let result = load_certs_from_file(Path::new("/nonexistent/path/cert.pem"));
        assert!(matches!(result, Err(Error::Tls(_))));
    }

    #[test]
    fn test_load_certs_empty_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"").unwrap();
        temp.flush().unwrap();

        let result = load_certs_from_file(temp.path());
        assert!(matches!(result, Err(Error::Tls(_))));
    }

    #[test]
    fn test_load_certs_garbage_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"not a certificate\njust some text\n").unwrap();
        temp.flush().unwrap();

        let result = load_certs_from_file(temp.path());
        assert!(matches!(result, Err(Error::Tls(_))));
    }

    #[test]
    fn test_load_private_key_not_found() {
        let result = load_private_key_from_file(Path::new("/nonexistent/key.pem"));
        assert!(matches!(result, Err(Error::Tls(_))));
    }

    #[test]
    fn test_load_private_key_no_key_in_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"nothing resembling a key\n").unwrap();
        temp.flush().unwrap();

        let result = load_private_key_from_file(temp.path());
        assert!(matches!(result, Err(Error::Tls(_))));
    }

    #[test]
    fn test_build_connector_missing_client_cert() {
        let options = TlsOptions {
            client_cert: Some((
                PathBuf::from("/nonexistent/cert.pem"),
                PathBuf::from("/nonexistent/key.pem"),
            )),
            ..TlsOptions::default()
        };
        assert!(matches!(build_connector(&options), Err(Error::Tls(_))));
    }
}

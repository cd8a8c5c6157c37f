//! rustls client configuration for `grpcs` endpoints.

use crate::config::TlsOptions;
use crate::error::{Result, YdbError};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::RootCertStore;
use std::sync::Arc;

/// Builds the shared TLS client config from the driver options: trusted
/// roots come from the configured PEM bundle, falling back to the bundled
/// webpki roots; `insecure_skip_verify` swaps in a verifier that accepts
/// anything.
pub fn client_config(opts: &TlsOptions) -> Result<Arc<rustls::ClientConfig>> {
    if opts.insecure_skip_verify {
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
            .with_no_client_auth();
        return Ok(Arc::new(config));
    }

    let mut roots = RootCertStore::empty();
    match &opts.root_ca_file {
        Some(path) => {
            let pem = std::fs::read(path).map_err(|e| YdbError::Config {
                message: format!("cannot read CA bundle {}: {e}", path.display()),
            })?;
            let certs: std::result::Result<Vec<CertificateDer<'static>>, _> =
                rustls_pemfile::certs(&mut pem.as_slice()).collect();
            let certs = certs.map_err(|e| YdbError::Config {
                message: format!("cannot parse CA bundle {}: {e}", path.display()),
            })?;
            for cert in certs {
                roots.add(cert).map_err(|e| YdbError::Config {
                    message: format!("cannot add CA certificate: {e}"),
                })?;
            }
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Accept-anything verifier backing `insecure_skip_verify`.
#[derive(Debug)]
struct NoVerification;

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

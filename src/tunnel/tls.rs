//! TLS upgrade over an established tunnel
//!
//! Provides the secure-channel handshake using rustls (pure Rust, easy
//! static linking). Unlike a TLS transport that dials its own TCP
//! connection, the upgrader wraps a tunnel that already reaches the target
//! through the proxy, and verifies the remote identity against the target
//! domain.

use super::TunnelStream;
use crate::config::TlsConfig;
use anyhow::{Context, Result};
use std::io::{self, BufReader};
use std::sync::Arc;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// TLS stream type produced by an upgrade
pub type TlsStream = tokio_rustls::client::TlsStream<Box<dyn TunnelStream>>;

/// Secure-channel upgrader for established tunnels
#[derive(Clone)]
pub struct TlsUpgrader {
    connector: TlsConnector,
}

impl std::fmt::Debug for TlsUpgrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsUpgrader").finish()
    }
}

impl TlsUpgrader {
    /// Build an upgrader from configuration
    ///
    /// Trusts the system root store, plus an optional extra PEM root from
    /// `trusted_root`. With `skip_verify` set, certificate verification is
    /// disabled entirely; that switch exists for tests only.
    pub fn from_config(config: &TlsConfig) -> Result<Self> {
        let mut root_store = RootCertStore::empty();

        // Add system root certificates
        let native_certs = rustls_native_certs::load_native_certs();
        for cert in native_certs.certs {
            root_store.add(cert).ok();
        }

        // Add custom trusted root if specified
        if let Some(ref root_path) = config.trusted_root {
            let file = std::fs::File::open(root_path)
                .with_context(|| format!("Failed to open certificate file: {}", root_path))?;
            let mut reader = BufReader::new(file);
            let certs = rustls_pemfile::certs(&mut reader)
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to parse certificates from: {}", root_path))?;
            for cert in certs {
                root_store
                    .add(cert)
                    .with_context(|| "Failed to add certificate to store")?;
            }
        }

        let mut tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if config.skip_verify {
            // This is dangerous and should only be used for testing
            tls_config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth();
        }

        Ok(TlsUpgrader {
            connector: TlsConnector::from(Arc::new(tls_config)),
        })
    }

    /// Perform the TLS handshake over `stream`, verifying `domain`
    pub async fn upgrade(
        &self,
        stream: Box<dyn TunnelStream>,
        domain: &str,
    ) -> io::Result<TlsStream> {
        let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(domain.to_string())
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid hostname: {}", domain),
                )
            })?;

        self.connector.connect(server_name, stream).await
    }
}

/// Certificate verifier that accepts all certificates (dangerous!)
#[derive(Debug)]
struct NoVerifier;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &tokio_rustls::rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> Result<tokio_rustls::rustls::client::danger::ServerCertVerified, tokio_rustls::rustls::Error>
    {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA384,
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA512,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA256,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA384,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA512,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use crate::error::CheckError;
use crate::models::{Expiration, Metadata};

const HTTPS_PORT: u16 = 443;

/// Retrieve the peer certificate's notAfter timestamp over a live handshake.
pub async fn check_certificate(domain: &str, timeout: Duration) -> Result<Expiration, CheckError> {
    match time::timeout(timeout, certificate_lookup(domain)).await {
        Ok(result) => result,
        Err(_) => Err(CheckError::Timeout(timeout)),
    }
}

async fn certificate_lookup(domain: &str) -> Result<Expiration, CheckError> {
    let addr = format!("{domain}:{HTTPS_PORT}");
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| CheckError::Connection(format!("{addr}: {e}")))?;

    // Permissive verifier: an expired or otherwise invalid chain must still
    // be readable.
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(domain.to_string())
        .map_err(|_| CheckError::Certificate(format!("invalid server name: {domain}")))?;

    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| CheckError::Certificate(format!("TLS handshake with {addr} failed: {e}")))?;

    let (_, session) = tls.get_ref();
    let leaf = session
        .peer_certificates()
        .and_then(|chain| chain.first())
        .ok_or_else(|| CheckError::Certificate(format!("{addr} presented no certificate")))?;

    let (_, certificate) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| CheckError::Certificate(format!("unparsable certificate from {addr}: {e}")))?;

    let not_after = certificate.validity().not_after.timestamp();
    let expiration_date = DateTime::<Utc>::from_timestamp(not_after, 0).ok_or_else(|| {
        CheckError::Certificate(format!("certificate from {addr} has an out-of-range notAfter"))
    })?;

    Ok(Expiration {
        expiration_date,
        metadata: Metadata {
            issuer: Some(certificate.issuer().to_string()),
            subject: Some(certificate.subject().to_string()),
            ..Metadata::default()
        },
    })
}

#[derive(Debug)]
struct AcceptAnyCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

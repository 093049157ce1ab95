//! TLS client configuration for HTTPS probes.

use std::sync::Arc;

use tracing::warn;

use kubecheck_core::{ProbeError, ProbeResult};

/// Configuration for TLS connections.
#[derive(Clone)]
pub struct TlsConfig {
    /// Pre-built `rustls` client configuration.
    pub client_config: Arc<rustls::ClientConfig>,
}

impl TlsConfig {
    /// Verify server certificates against the Mozilla root store.
    pub fn with_webpki_roots() -> ProbeResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = builder()?.with_root_certificates(root_store).with_no_client_auth();
        Ok(Self {
            client_config: Arc::new(config),
        })
    }

    /// Accept any server certificate.
    ///
    /// Cluster routes are frequently served with the router's self-signed
    /// wildcard certificate; this is what `--insecure` (or `[http] insecure`)
    /// selects, and nothing else does. Connections built from it present no
    /// client certificate and the checker sends no credentials, so an
    /// impostor endpoint can only fake the check result. Verification is
    /// still on by default.
    pub fn insecure() -> ProbeResult<Self> {
        let config = builder()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerifier))
            .with_no_client_auth();
        Ok(Self {
            client_config: Arc::new(config),
        })
    }

    pub fn new(insecure: bool) -> ProbeResult<Self> {
        if insecure {
            warn!("server certificate verification disabled");
            Self::insecure()
        } else {
            Self::with_webpki_roots()
        }
    }
}

fn builder() -> ProbeResult<rustls::ConfigBuilder<rustls::ClientConfig, rustls::WantsVerifier>> {
    rustls::ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::config(format!("tls protocol version error: {e}")))
}

impl From<Arc<rustls::ClientConfig>> for TlsConfig {
    fn from(client_config: Arc<rustls::ClientConfig>) -> Self {
        Self { client_config }
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig").finish_non_exhaustive()
    }
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub struct NoVerifier;

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

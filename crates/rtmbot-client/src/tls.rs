//! Client TLS configuration for dialing by numeric address.
//!
//! The connection is opened against an IP address, so no hostname reaches the
//! TLS layer and no SNI extension is sent. The peer certificate is instead
//! checked against the hostname taken from the session URL.

use rtmbot_core::{RtmError, RtmResult};
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::client::WebPkiServerVerifier;
use tokio_rustls::rustls::crypto::{ring, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
};
use tracing::{debug, warn};

/// Verifies the server certificate against a fixed hostname, ignoring the
/// name the connection was dialed with.
///
/// The leaf must be signed directly by a trusted root; intermediates sent by
/// the server are not used to build a chain.
#[derive(Debug)]
pub struct HostnameVerifier {
    host: ServerName<'static>,
    inner: Arc<WebPkiServerVerifier>,
}

impl HostnameVerifier {
    /// Build a verifier that accepts only certificates valid for `host` and
    /// chaining to `roots`.
    pub fn new(
        host: &str,
        roots: Arc<RootCertStore>,
        provider: Arc<CryptoProvider>,
    ) -> RtmResult<Self> {
        let host = ServerName::try_from(host)
            .map_err(|e| RtmError::Transport(format!("Invalid TLS hostname '{host}': {e}")))?
            .to_owned();
        let inner = WebPkiServerVerifier::builder_with_provider(roots, provider)
            .build()
            .map_err(|e| RtmError::Transport(format!("Failed to build TLS verifier: {e}")))?;
        Ok(Self { host, inner })
    }
}

impl ServerCertVerifier for HostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        self.inner
            .verify_server_cert(end_entity, &[], &self.host, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Root store with the bundled web PKI roots plus any extra PEM bundle.
pub fn root_store(extra_roots: Option<&Path>) -> RtmResult<RootCertStore> {
    let mut roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    if let Some(path) = extra_roots {
        let certs = load_certs(path)?;
        let (added, ignored) = roots.add_parsable_certificates(certs);
        if added == 0 {
            return Err(RtmError::Config(format!(
                "No usable root certificates in '{}'",
                path.display()
            )));
        }
        debug!(added, ignored, path = %path.display(), "Extra TLS roots loaded");
    }

    Ok(roots)
}

/// Client config whose certificate check is bound to `host`.
///
/// The dialed address never carries `host`, so SNI is omitted.
pub fn client_config(host: &str, roots: Arc<RootCertStore>) -> RtmResult<ClientConfig> {
    let provider = Arc::new(ring::default_provider());
    let verifier = HostnameVerifier::new(host, roots, provider.clone())?;

    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| RtmError::Transport(format!("TLS config error: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    config.enable_sni = false;

    Ok(config)
}

fn load_certs(path: &Path) -> RtmResult<Vec<CertificateDer<'static>>> {
    let data = std::fs::read(path).map_err(|e| {
        RtmError::Config(format!("Failed to read certificates '{}': {e}", path.display()))
    })?;

    let mut reader = std::io::BufReader::new(data.as_slice());
    let (parsed, malformed): (Vec<_>, Vec<_>) =
        rustls_pemfile::certs(&mut reader).partition(Result::is_ok);
    if !malformed.is_empty() {
        warn!(
            skipped = malformed.len(),
            path = %path.display(),
            "Skipped malformed PEM certificate entries"
        );
    }
    let certs: Vec<CertificateDer<'static>> = parsed.into_iter().filter_map(Result::ok).collect();

    if certs.is_empty() {
        return Err(RtmError::Config(format!(
            "No certificates found in '{}'",
            path.display()
        )));
    }

    Ok(certs)
}

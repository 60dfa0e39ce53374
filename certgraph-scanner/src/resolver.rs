// Certificate fetching: one TLS handshake per host, no trust checks.

use crate::error::ResolveError;
use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

/// The names a single certificate claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateObservation {
    pub common_name: String,
    pub san_dns_names: Vec<String>,
}

impl CertificateObservation {
    pub fn new(common_name: impl Into<String>, san_dns_names: Vec<String>) -> Self {
        Self {
            common_name: common_name.into(),
            san_dns_names,
        }
    }

    /// Read the subject CN and SAN DNS names out of a DER certificate.
    /// Fields that are missing or undecodable come back empty.
    pub fn from_der(der: &[u8]) -> Option<Self> {
        let (_, cert) = parse_x509_certificate(der).ok()?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or_default()
            .to_string();

        let san_dns_names = match cert.subject_alternative_name() {
            Ok(Some(san)) => san
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Some(Self {
            common_name,
            san_dns_names,
        })
    }
}

/// Turn a presented chain (leaf first) into the sorted, lowercased,
/// deduplicated list of hostnames it names. Only the leaf contributes its
/// CN; every certificate contributes its SAN DNS names.
pub fn derive_neighbors(chain: &[CertificateObservation]) -> Vec<String> {
    let mut names = BTreeSet::new();

    if let Some(leaf) = chain.first()
        && !leaf.common_name.is_empty()
    {
        names.insert(leaf.common_name.to_lowercase());
    }

    for cert in chain {
        for name in &cert.san_dns_names {
            if !name.is_empty() {
                names.insert(name.to_lowercase());
            }
        }
    }

    names.into_iter().collect()
}

/// Fetches the certificate chain a host presents.
#[async_trait]
pub trait CertResolver: Send + Sync + 'static {
    async fn resolve(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Vec<CertificateObservation>, ResolveError>;
}

/// Resolver backed by a real TCP connection and a rustls handshake.
pub struct TlsResolver {
    connector: TlsConnector,
}

impl TlsResolver {
    pub fn new() -> Self {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .expect("ring provider supports the default protocol versions")
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth();

        Self {
            connector: TlsConnector::from(Arc::new(config)),
        }
    }

    async fn fetch(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Vec<CertificateObservation>, ResolveError> {
        let server_name = ServerName::try_from(host)
            .map_err(|_| ResolveError::UnknownHost(host.to_string()))?
            .to_owned();

        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|e| {
                trace!("lookup of {} failed: {}", host, e);
                ResolveError::UnknownHost(host.to_string())
            })?
            .collect();

        let stream = connect_any(host, &addrs, timeout, TcpStream::connect).await?;

        let tls = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| classify_handshake_error(e, timeout))?;

        let (_, session) = tls.get_ref();
        let chain = session
            .peer_certificates()
            .map(|certs| {
                certs
                    .iter()
                    .map(|der| CertificateObservation::from_der(der.as_ref()).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        Ok(chain)
    }
}

impl Default for TlsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertResolver for TlsResolver {
    async fn resolve(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Vec<CertificateObservation>, ResolveError> {
        debug!("Fetching certificate from {}:{}", host, port);
        match tokio::time::timeout(timeout, self.fetch(host, port, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Timeout(timeout)),
        }
    }
}

/// Try each resolved address in turn. The remaining budget is split evenly
/// across the addresses not yet tried, so a stalled first address cannot
/// starve a working second one.
async fn connect_any<F, Fut, T>(
    host: &str,
    addrs: &[SocketAddr],
    timeout: Duration,
    connect: F,
) -> Result<T, ResolveError>
where
    F: Fn(SocketAddr) -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let deadline = Instant::now() + timeout;
    let mut last_error = None;

    for (index, addr) in addrs.iter().enumerate() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let attempt_budget = remaining / (addrs.len() - index) as u32;

        let outcome = match tokio::time::timeout(attempt_budget, connect(*addr)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(io::Error::from(io::ErrorKind::TimedOut)),
        };

        match outcome {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                trace!("connect to {} ({}) failed: {}", host, addr, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(classify_connect_error(e, timeout)),
        None => Err(ResolveError::UnknownHost(host.to_string())),
    }
}

fn classify_connect_error(error: io::Error, timeout: Duration) -> ResolveError {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => ResolveError::ConnectionRefused,
        io::ErrorKind::TimedOut => ResolveError::Timeout(timeout),
        _ => ResolveError::Transport(error),
    }
}

fn classify_handshake_error(error: io::Error, timeout: Duration) -> ResolveError {
    match error.kind() {
        io::ErrorKind::TimedOut => ResolveError::Timeout(timeout),
        io::ErrorKind::ConnectionRefused => ResolveError::ConnectionRefused,
        io::ErrorKind::InvalidData
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => ResolveError::Handshake(error.to_string()),
        _ => ResolveError::Transport(error),
    }
}

/// Accepts whatever certificate the peer presents. We only read the names
/// a certificate claims; whether anyone should trust it is irrelevant here.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

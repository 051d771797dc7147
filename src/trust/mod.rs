//! Certificate trust configuration.
//!
//! The TLS layer itself lives behind the [`Connector`](crate::transport::Connector).
//! This module holds what that layer needs to decide whether to trust a peer:
//!
//! * [`TrustStore`] the ordered trust anchors, built once at startup.
//! * [`CertificatePolicy`] the pluggable accept/reject decision.
//! * [`TlsSettings`] the bundle registered with a client, which also enforces
//!   the hostname check and the `require_trusted_chain` rule in
//!   [`TlsSettings::check_peer`].
//!
//! A [`TrustStore`] is moved into an `Arc` when the settings are created and
//! is read-only from then on.

use std::fmt;
use std::sync::Arc;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;

use crate::Error;

mod policy;
pub use policy::{
    cert_matches_hostname, hostname_matches, CertificatePolicy, ChainStatus, Decision,
    HostnamePolicy, TrustRecord,
};

/// The fields of an X.509 distinguished name. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DistinguishedName {
    pub country: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub email: Option<String>,
    pub common_name: Option<String>,
}

impl DistinguishedName {
    /// A name with only the common name set.
    pub fn with_common_name(cn: impl Into<String>) -> Self {
        DistinguishedName {
            common_name: Some(cn.into()),
            ..Default::default()
        }
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("C", &self.country),
            ("L", &self.locality),
            ("ST", &self.state),
            ("O", &self.organization),
            ("OU", &self.organizational_unit),
            ("emailAddress", &self.email),
            ("CN", &self.common_name),
        ];

        let mut first = true;
        for (key, value) in fields {
            let Some(value) = value else {
                continue;
            };
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }

        Ok(())
    }
}

/// The decoded peer (leaf) certificate as presented to the policy.
///
/// Decoding X.509 is the job of the TLS layer, which builds this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    issuer: DistinguishedName,
    subject: DistinguishedName,
    dns_names: Vec<String>,
}

impl Certificate {
    /// Create a certificate from its issuer and subject.
    pub fn new(issuer: DistinguishedName, subject: DistinguishedName) -> Self {
        Certificate {
            issuer,
            subject,
            dns_names: vec![],
        }
    }

    /// Add the DNS subject alternative names.
    ///
    /// When present these are matched against the hostname instead of the
    /// subject common name.
    pub fn with_dns_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// The issuer name.
    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    /// The subject name.
    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    /// DNS subject alternative names.
    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }
}

/// One DER encoded trust anchor.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    der: Vec<u8>,
}

impl TrustAnchor {
    /// The DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

impl fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrustAnchor({} bytes)", self.der.len())
    }
}

/// Ordered trust anchors.
///
/// An empty store means no chain verification is possible, which is not the
/// same as a chain that failed verification. See [`ChainStatus`].
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    anchors: Vec<TrustAnchor>,
}

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

impl TrustStore {
    /// Create an empty store.
    pub fn new() -> Self {
        TrustStore::default()
    }

    /// Append certificates.
    ///
    /// `data` is either PEM text with one or more `CERTIFICATE` blocks, or a
    /// single DER encoded certificate. Other PEM blocks are ignored. Either
    /// all certificates in `data` are appended, or none are.
    ///
    /// Returns the number of appended certificates.
    pub fn append(&mut self, data: &[u8]) -> Result<usize, Error> {
        // Text with armor is PEM even when it starts with `0` (0x30).
        let is_pem = std::str::from_utf8(data).is_ok_and(|t| t.contains("-----BEGIN"));

        let parsed = if !is_pem && data.first() == Some(&0x30) {
            check_der(data)?;
            vec![data.to_vec()]
        } else {
            parse_pem(data)?
        };

        let n = parsed.len();
        self.anchors
            .extend(parsed.into_iter().map(|der| TrustAnchor { der }));

        debug!("Trust store appended {} certificate(s), total {}", n, self.len());

        Ok(n)
    }

    /// Number of anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Tell if there are no anchors.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// The anchors in the order they were appended.
    pub fn anchors(&self) -> impl Iterator<Item = &TrustAnchor> {
        self.anchors.iter()
    }
}

fn parse_pem(data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::BadCertificate("neither PEM nor DER".into()))?;

    let mut out = vec![];
    let mut rest = text;

    while let Some(start) = rest.find(PEM_BEGIN) {
        let body = &rest[start + PEM_BEGIN.len()..];
        let Some(end) = body.find(PEM_END) else {
            return Err(Error::BadCertificate("unterminated PEM block".into()));
        };

        let b64: String = body[..end]
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        let der = BASE64_STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| Error::BadCertificate(format!("PEM base64: {}", e)))?;

        check_der(&der)?;
        out.push(der);

        rest = &body[end + PEM_END.len()..];
    }

    if out.is_empty() {
        return Err(Error::BadCertificate("no CERTIFICATE block found".into()));
    }

    Ok(out)
}

/// Check the outer DER SEQUENCE header and that its length covers the input exactly.
fn check_der(der: &[u8]) -> Result<(), Error> {
    let bad = |m: &str| Err(Error::BadCertificate(format!("DER: {}", m)));

    let [0x30, len, rest @ ..] = der else {
        return bad("not a SEQUENCE");
    };

    let (content_len, header_rest) = if *len < 0x80 {
        (*len as usize, rest)
    } else {
        let n = (*len & 0x7f) as usize;
        if n == 0 || n > 4 || rest.len() < n {
            return bad("length");
        }
        let v = rest[..n].iter().fold(0_usize, |acc, b| (acc << 8) | *b as usize);
        (v, &rest[n..])
    };

    if header_rest.len() != content_len {
        return bad("length mismatch");
    }

    Ok(())
}

/// Client certificate offered to the server during the handshake.
///
/// Opaque to this crate, passed on to the TLS layer.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    certificate_der: Vec<u8>,
    private_key_der: Vec<u8>,
}

impl ClientIdentity {
    /// Create a client identity from a DER certificate and DER private key.
    pub fn new(certificate_der: Vec<u8>, private_key_der: Vec<u8>) -> Self {
        ClientIdentity {
            certificate_der,
            private_key_der,
        }
    }

    /// The DER certificate.
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    /// The DER private key.
    pub fn private_key_der(&self) -> &[u8] {
        &self.private_key_der
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("certificate", &self.certificate_der.len())
            .finish_non_exhaustive()
    }
}

/// Trust configuration registered with a client.
///
/// Built once before any session starts. Cloning is cheap, the store and the
/// policy are shared.
#[derive(Clone)]
pub struct TlsSettings {
    store: Arc<TrustStore>,
    require_trusted_chain: bool,
    client_identity: Option<ClientIdentity>,
    policy: Arc<dyn CertificatePolicy>,
    max_rsa_key_bits: u16,
}

impl TlsSettings {
    /// Settings that trust `store`.
    ///
    /// Defaults to requiring a trusted chain, no client identity,
    /// [`HostnamePolicy`] and 2048 bit RSA keys.
    pub fn new(store: Arc<TrustStore>) -> Self {
        TlsSettings {
            store,
            require_trusted_chain: true,
            client_identity: None,
            policy: Arc::new(HostnamePolicy),
            max_rsa_key_bits: 2048,
        }
    }

    /// Whether a peer whose chain does not lead to an anchor is rejected.
    ///
    /// Setting this to false is an explicit opt-in to leniency. The policy is
    /// then asked about untrusted peers too.
    pub fn require_trusted_chain(mut self, v: bool) -> Self {
        self.require_trusted_chain = v;
        self
    }

    /// Client certificate to offer.
    pub fn client_identity(mut self, v: Option<ClientIdentity>) -> Self {
        self.client_identity = v;
        self
    }

    /// Replace the default [`HostnamePolicy`].
    pub fn policy(mut self, v: Arc<dyn CertificatePolicy>) -> Self {
        self.policy = v;
        self
    }

    /// Largest RSA key the crypto layer must accommodate: 1024, 2048 or 4096.
    pub fn max_rsa_key_bits(mut self, v: u16) -> Self {
        self.max_rsa_key_bits = v;
        self
    }

    /// The trust anchors.
    pub fn store(&self) -> &TrustStore {
        &self.store
    }

    /// Whether untrusted chains are rejected.
    pub fn requires_trusted_chain(&self) -> bool {
        self.require_trusted_chain
    }

    /// The offered client certificate.
    pub fn identity(&self) -> Option<&ClientIdentity> {
        self.client_identity.as_ref()
    }

    /// Configured RSA key size.
    pub fn rsa_key_bits(&self) -> u16 {
        self.max_rsa_key_bits
    }

    /// Size of a multi precision integer, in bytes, big enough for the RSA key.
    pub fn rsa_mp_size(&self) -> usize {
        self.max_rsa_key_bits as usize / 8 + 2
    }

    /// Check the settings for inconsistencies.
    pub fn validate(&self) -> Result<(), Error> {
        if self.require_trusted_chain && self.store.is_empty() {
            return Err(Error::InvalidConfig(
                "require_trusted_chain with an empty trust store",
            ));
        }

        if !matches!(self.max_rsa_key_bits, 1024 | 2048 | 4096) {
            return Err(Error::InvalidConfig(
                "max_rsa_key_bits must be 1024, 2048 or 4096",
            ));
        }

        if let Some(id) = &self.client_identity {
            if id.certificate_der.is_empty() || id.private_key_der.is_empty() {
                return Err(Error::InvalidConfig("client identity without certificate or key"));
            }
        }

        Ok(())
    }

    /// Decide about a peer during the handshake.
    ///
    /// `chain_trusted` is whether the TLS layer found a path from the peer
    /// chain to an anchor in [`TlsSettings::store`]. The TLS layer must abort
    /// the handshake unless the returned record is accepted.
    ///
    /// A hostname mismatch is always a rejection. An untrusted chain is a
    /// rejection when a trusted chain is required. Only after those checks
    /// is the configured policy consulted.
    pub fn check_peer(
        &self,
        chain_trusted: bool,
        certificate: &Certificate,
        expected_hostname: &str,
    ) -> TrustRecord {
        let chain = if self.store.is_empty() {
            ChainStatus::NoAnchors
        } else if chain_trusted {
            ChainStatus::Trusted
        } else {
            ChainStatus::Untrusted
        };

        let hostname_match = cert_matches_hostname(certificate, expected_hostname);
        let trusted = chain == ChainStatus::Trusted;

        let decision = if !hostname_match || (!trusted && self.require_trusted_chain) {
            Decision::Reject
        } else {
            self.policy.decide(trusted, certificate, expected_hostname)
        };

        let record = TrustRecord {
            issuer: certificate.issuer().clone(),
            subject: certificate.subject().clone(),
            hostname: expected_hostname.to_string(),
            chain,
            hostname_match,
            decision,
        };

        record.log();
        record
    }
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("anchors", &self.store.len())
            .field("require_trusted_chain", &self.require_trusted_chain)
            .field("client_identity", &self.client_identity.is_some())
            .field("max_rsa_key_bits", &self.max_rsa_key_bits)
            .finish()
    }
}

use std::fmt;

use super::{Certificate, DistinguishedName};

/// Outcome of a certificate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Continue the handshake.
    Accept,
    /// Abort the handshake.
    Reject,
}

/// Result of the TLS layer's chain validation against the trust store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    /// The chain leads to an anchor in the store.
    Trusted,
    /// The store has anchors, but the chain leads to none of them.
    Untrusted,
    /// The store is empty, no verification was possible.
    NoAnchors,
}

/// Pluggable certificate decision.
///
/// Invoked once per handshake by [`TlsSettings::check_peer`][super::TlsSettings::check_peer],
/// after the hostname check and the trusted chain rule already passed. A
/// policy can therefore add rejections but never accept a peer those checks
/// refused.
///
/// Implementations must not block.
pub trait CertificatePolicy: Send + Sync {
    /// Decide about the peer `certificate`.
    fn decide(
        &self,
        trusted_by_store: bool,
        certificate: &Certificate,
        expected_hostname: &str,
    ) -> Decision;
}

/// The default policy. Accepts peers whose certificate matches the hostname.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnamePolicy;

impl CertificatePolicy for HostnamePolicy {
    fn decide(&self, _: bool, certificate: &Certificate, expected_hostname: &str) -> Decision {
        if cert_matches_hostname(certificate, expected_hostname) {
            Decision::Accept
        } else {
            Decision::Reject
        }
    }
}

/// One trust decision, as logged and handed back to the TLS layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct TrustRecord {
    pub issuer: DistinguishedName,
    pub subject: DistinguishedName,
    pub hostname: String,
    pub chain: ChainStatus,
    pub hostname_match: bool,
    pub decision: Decision,
}

impl TrustRecord {
    /// Tell if the handshake may continue.
    pub fn is_accepted(&self) -> bool {
        self.decision == Decision::Accept
    }

    pub(crate) fn log(&self) {
        if self.is_accepted() {
            info!("{}", self);
        } else {
            warn!("{}", self);
        }
    }
}

impl fmt::Display for TrustRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Certificate {:?} for {}: issuer [{}] subject [{}] chain {:?} hostname match {}",
            self.decision, self.hostname, self.issuer, self.subject, self.chain, self.hostname_match
        )
    }
}

/// Match `hostname` against the names of `certificate`.
///
/// DNS subject alternative names take precedence. Only a certificate without
/// any is matched on its subject common name.
pub fn cert_matches_hostname(certificate: &Certificate, hostname: &str) -> bool {
    if !certificate.dns_names().is_empty() {
        return certificate
            .dns_names()
            .iter()
            .any(|n| hostname_matches(n, hostname));
    }

    certificate
        .subject()
        .common_name
        .as_deref()
        .map(|cn| hostname_matches(cn, hostname))
        .unwrap_or(false)
}

/// Match a certificate name `pattern` against `hostname`.
///
/// Comparison is ASCII case-insensitive and ignores one trailing dot. The
/// pattern may start with a `*.` wildcard label, which matches exactly one
/// non-empty label. A wildcard never covers a single-label suffix, so `*.test`
/// matches nothing.
pub fn hostname_matches(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.strip_suffix('.').unwrap_or(pattern);
    let hostname = hostname.strip_suffix('.').unwrap_or(hostname);

    if pattern.is_empty() || hostname.is_empty() {
        return false;
    }

    let Some(suffix) = pattern.strip_prefix("*.") else {
        return pattern.eq_ignore_ascii_case(hostname);
    };

    if !suffix.contains('.') || suffix.contains('*') {
        return false;
    }

    let Some((label, rest)) = hostname.split_once('.') else {
        return false;
    };

    !label.is_empty() && rest.eq_ignore_ascii_case(suffix)
}

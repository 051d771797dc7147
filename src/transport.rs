//! The byte stream the state machines run on.
//!
//! Opening sockets, resolving names and running the TLS handshake are out of
//! scope for this crate. A [`Connector`] does that work, and hands back a
//! [`Transport`] that is polled without blocking.
//!
//! For TLS endpoints the connector receives the [`TlsSettings`] and must call
//! [`TlsSettings::check_peer`] with the decoded leaf certificate during the
//! handshake. A rejected peer is reported as
//! [`ConnectError::CertificateRejected`] (or, if detected later, as
//! [`TransportError::CertificateRejected`]).

use std::fmt;

use crate::trust::TlsSettings;
use crate::Error;

/// Host, port and whether to use TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    tls: bool,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Endpoint {
            host: host.into(),
            port,
            tls,
        }
    }

    /// The host name to resolve, also the hostname certificates are matched against.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the connection must be wrapped in TLS.
    pub fn use_tls(&self) -> bool {
        self.tls
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "tls" } else { "tcp" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Outcome of a non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were placed in the buffer. Never 0.
    Data(usize),
    /// No bytes available right now.
    WouldBlock,
    /// The peer closed the stream.
    Closed,
}

/// Failure of an established transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The TLS layer rejected the peer certificate.
    CertificateRejected(String),
    /// Any other socket or TLS failure.
    Io(String),
    /// Operation on a transport that is already closed.
    Closed,
}

/// A readable, writable, pollable byte stream.
///
/// None of the methods may block.
pub trait Transport {
    /// Read available bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError>;

    /// Write as much of `buf` as is possible right now.
    ///
    /// Returns 0 when the transport cannot accept anything at the moment.
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Close the stream. Further reads report [`ReadOutcome::Closed`].
    fn close(&mut self);
}

/// Failure to establish a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The host name could not be resolved.
    Resolve(String),
    /// The TLS handshake was aborted by [`TlsSettings::check_peer`].
    CertificateRejected(String),
    /// The connection could not be opened.
    Io(String),
}

/// Opens transports.
pub trait Connector {
    /// The transport produced by this connector.
    type Transport: Transport;

    /// Start a connection to `endpoint`.
    ///
    /// Called from inside `advance()` and `tick()`, so it must return without
    /// blocking. Name resolution may fail here. The TCP connect and any TLS
    /// handshake complete inside the returned [`Transport`], which reports
    /// [`ReadOutcome::WouldBlock`] and writes 0 bytes until the stream is up.
    /// A certificate rejected during that handshake surfaces as
    /// [`TransportError::CertificateRejected`] from `read` or `write`.
    ///
    /// `tls` is `Some` exactly when `endpoint.use_tls()` is true.
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        tls: Option<&TlsSettings>,
    ) -> Result<Self::Transport, ConnectError>;
}

impl From<ConnectError> for Error {
    fn from(value: ConnectError) -> Self {
        match value {
            ConnectError::Resolve(v) => Error::ResolutionFailure(v),
            ConnectError::CertificateRejected(v) => Error::CertificateRejected(v),
            ConnectError::Io(v) => Error::ConnectFailure(v),
        }
    }
}

impl From<TransportError> for Error {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::CertificateRejected(v) => Error::CertificateRejected(v),
            TransportError::Io(v) => Error::ConnectFailure(v),
            TransportError::Closed => Error::TransportClosed,
        }
    }
}

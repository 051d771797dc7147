use std::fmt;

/// Error type for tick-proto
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
#[non_exhaustive]
pub enum Error {
    BadUrl(String),
    UnsupportedScheme(String),
    BadHeader(String),
    OutputOverflow,
    ChunkLenNotAscii,
    ChunkLenNotANumber,
    ChunkExpectedCrLf,
    HttpParseFail(String),
    BadStatusLine(String),
    HeaderLineTooLong,
    TooManyResponseHeaders,
    TooManyContentLengthHeaders,
    BadContentLengthHeader,
    UnexpectedEof,
    NoLocationHeader,
    BadLocationHeader(String),
    TooManyRedirects(u32),
    ConnectFailure(String),
    ResolutionFailure(String),
    CertificateRejected(String),
    BadCertificate(String),
    TransportClosed,
    Timeout,
    ServerRejected(String),
    BadServerResponse(String),
    InvalidConfig(&'static str),
    NotStarted,
    AlreadyStarted,
}

/// Coarse classification of an [`Error`].
///
/// The engine never retries on its own. The kind tells the caller what
/// kind of retry (if any) makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad URL or target. A caller error, retrying will not help.
    MalformedRequest,
    /// Transport level failure, including a broken or closed connection.
    ConnectFailure,
    /// The server name could not be resolved.
    ResolutionError,
    /// The certificate policy refused the peer. Never downgraded.
    CertificateRejected,
    /// The peer violated the protocol framing.
    ProtocolFraming,
    /// The redirect limit was reached.
    TooManyRedirects,
    /// No forward progress within the configured budget.
    Timeout,
    /// The configuration is inconsistent.
    InvalidConfig,
    /// An operation was called in a state where it makes no sense.
    Usage,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            BadUrl(_) | UnsupportedScheme(_) | BadHeader(_) => ErrorKind::MalformedRequest,

            ChunkLenNotAscii
            | ChunkLenNotANumber
            | ChunkExpectedCrLf
            | HttpParseFail(_)
            | BadStatusLine(_)
            | HeaderLineTooLong
            | TooManyResponseHeaders
            | TooManyContentLengthHeaders
            | BadContentLengthHeader
            | UnexpectedEof
            | NoLocationHeader
            | BadLocationHeader(_)
            | ServerRejected(_)
            | BadServerResponse(_) => ErrorKind::ProtocolFraming,

            TooManyRedirects(_) => ErrorKind::TooManyRedirects,
            ConnectFailure(_) | TransportClosed => ErrorKind::ConnectFailure,
            ResolutionFailure(_) => ErrorKind::ResolutionError,
            CertificateRejected(_) => ErrorKind::CertificateRejected,
            Timeout => ErrorKind::Timeout,
            BadCertificate(_) | InvalidConfig(_) => ErrorKind::InvalidConfig,
            OutputOverflow | NotStarted | AlreadyStarted => ErrorKind::Usage,
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(value: httparse::Error) -> Self {
        Error::HttpParseFail(value.to_string())
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadUrl(v) => write!(f, "malformed url: {}", v),
            Error::UnsupportedScheme(v) => write!(f, "unsupported url scheme: {}", v),
            Error::BadHeader(v) => write!(f, "bad header: {}", v),
            Error::OutputOverflow => write!(f, "output buffer too small"),
            Error::ChunkLenNotAscii => write!(f, "non-ascii chunk size"),
            Error::ChunkLenNotANumber => write!(f, "chunk size is not hex"),
            Error::ChunkExpectedCrLf => write!(f, "missing crlf after chunk"),
            Error::HttpParseFail(v) => write!(f, "unparsable response head: {}", v),
            Error::BadStatusLine(v) => write!(f, "malformed status line: {}", v),
            Error::HeaderLineTooLong => write!(f, "response header line too long"),
            Error::TooManyResponseHeaders => write!(f, "too many response headers"),
            Error::TooManyContentLengthHeaders => write!(f, "duplicate content-length"),
            Error::BadContentLengthHeader => write!(f, "invalid content-length"),
            Error::UnexpectedEof => write!(f, "connection closed unexpectedly"),
            Error::NoLocationHeader => write!(f, "redirect without location"),
            Error::BadLocationHeader(v) => write!(f, "invalid location: {}", v),
            Error::TooManyRedirects(n) => write!(f, "more than {} redirects", n),
            Error::ConnectFailure(v) => write!(f, "connect failed: {}", v),
            Error::ResolutionFailure(v) => write!(f, "failed to resolve: {}", v),
            Error::CertificateRejected(v) => write!(f, "certificate rejected: {}", v),
            Error::BadCertificate(v) => write!(f, "bad certificate: {}", v),
            Error::TransportClosed => write!(f, "transport closed"),
            Error::Timeout => write!(f, "no progress within timeout"),
            Error::ServerRejected(v) => write!(f, "server responded with error: {}", v),
            Error::BadServerResponse(v) => write!(f, "unexpected server response: {}", v),
            Error::InvalidConfig(v) => write!(f, "invalid configuration: {}", v),
            Error::NotStarted => write!(f, "no request in progress"),
            Error::AlreadyStarted => write!(f, "a request is already in progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            Error::BadUrl("x".into()).kind(),
            ErrorKind::MalformedRequest
        );
        assert_eq!(Error::ChunkExpectedCrLf.kind(), ErrorKind::ProtocolFraming);
        assert_eq!(Error::TooManyRedirects(5).kind(), ErrorKind::TooManyRedirects);
        assert_eq!(
            Error::CertificateRejected("cn".into()).kind(),
            ErrorKind::CertificateRejected
        );
        assert_eq!(
            Error::ResolutionFailure("q.test".into()).kind(),
            ErrorKind::ResolutionError
        );
        assert_eq!(Error::TransportClosed.kind(), ErrorKind::ConnectFailure);
        assert_eq!(Error::Timeout.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn httparse_error_is_framing() {
        let error: Error = httparse::Error::Status.into();
        let Error::HttpParseFail(_) = error else {
            panic!("Not Error::HttpParseFail");
        };
        assert_eq!(error.kind(), ErrorKind::ProtocolFraming);
    }

    #[test]
    fn display_redirects() {
        assert_eq!(Error::TooManyRedirects(5).to_string(), "more than 5 redirects");
    }
}

//! Per client configuration.
//!
//! Each client takes its configuration by value when it is created and
//! validates it right away. There is no way to change it mid-session.

use std::time::Duration;

use http::HeaderValue;

use crate::Error;

/// Strategy for keeping `authorization` headers during redirects.
///
/// `Never` is the default, and the safest choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectAuthHeaders {
    /// Drop the `authorization` header on every redirect.
    #[default]
    Never,
    /// Keep the header when the redirect is to the same host. Both must use the
    /// same scheme, or switch to a more secure one (`http` to `https`, but not
    /// the reverse).
    SameHost,
}

/// Configuration of an [`HttpClient`](crate::agent::HttpClient).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Maximum redirect hops. 0 means redirects are an error.
    pub max_redirects: u32,
    /// Skew beyond which a clock resync is suggested.
    pub skew_threshold: Duration,
    /// See [`RedirectAuthHeaders`].
    pub redirect_auth_headers: RedirectAuthHeaders,
    /// The `user-agent` header. `None` sends no header.
    pub user_agent: Option<String>,
    /// Budget without forward progress. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Bytes read from the transport per `advance()`.
    pub read_chunk_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            max_redirects: 5,
            skew_threshold: Duration::from_secs(10),
            redirect_auth_headers: RedirectAuthHeaders::Never,
            user_agent: Some(concat!("tick-proto/", env!("CARGO_PKG_VERSION")).to_string()),
            timeout: Some(Duration::from_secs(30)),
            read_chunk_size: 1024,
        }
    }
}

/// Longest line accepted in a response head.
pub(crate) const MAX_HEADER_LINE: usize = 8192;

impl HttpConfig {
    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(ua) = &self.user_agent {
            if HeaderValue::from_str(ua).is_err() {
                return Err(Error::InvalidConfig("user_agent is not a valid header value"));
            }
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig("timeout must be positive"));
        }

        if self.read_chunk_size == 0 {
            return Err(Error::InvalidConfig("read_chunk_size must be positive"));
        }

        if self.read_chunk_size > MAX_HEADER_LINE {
            return Err(Error::InvalidConfig("read_chunk_size larger than 8192"));
        }

        Ok(())
    }
}

/// Configuration of a [`MailRetrievalClient`](crate::pop3::MailRetrievalClient).
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Split messages into `To`, `From`, `Subject` and body fragments.
    pub extended_parse: bool,
    /// Budget without forward progress.
    pub timeout: Duration,
    /// Longest accepted line, excluding the line ending.
    pub max_line_len: usize,
    /// Bytes read from the transport per `tick()`.
    pub read_chunk_size: usize,
}

impl Default for MailConfig {
    fn default() -> Self {
        MailConfig {
            extended_parse: true,
            timeout: Duration::from_secs(30),
            max_line_len: 4096,
            read_chunk_size: 512,
        }
    }
}

impl MailConfig {
    /// Check the configuration for inconsistencies.
    pub fn validate(&self) -> Result<(), Error> {
        if self.timeout == Duration::ZERO {
            return Err(Error::InvalidConfig("timeout must be positive"));
        }

        // RFC 1939 allows 512 octet responses, RFC 5322 998 octet message lines.
        if self.max_line_len < 998 {
            return Err(Error::InvalidConfig("max_line_len must be at least 998"));
        }

        if self.read_chunk_size == 0 {
            return Err(Error::InvalidConfig("read_chunk_size must be positive"));
        }

        Ok(())
    }
}

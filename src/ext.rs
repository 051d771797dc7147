use http::header;
use http::uri::Scheme;
use http::{HeaderName, HeaderValue, StatusCode};

pub(crate) trait SchemeExt {
    fn default_port(&self) -> Option<u16>;
    fn is_secure(&self) -> bool;
}

impl SchemeExt for Scheme {
    fn default_port(&self) -> Option<u16> {
        if *self == Scheme::HTTPS {
            Some(443)
        } else if *self == Scheme::HTTP {
            Some(80)
        } else {
            debug!("Unknown scheme: {}", self);
            None
        }
    }

    fn is_secure(&self) -> bool {
        *self == Scheme::HTTPS
    }
}

pub(crate) trait StatusExt {
    /// Detect 307/308 redirect
    fn is_redirect_retaining_status(&self) -> bool;

    /// 1xx responses that are followed by the real response.
    ///
    /// 101 is not interim, it ends the HTTP/1.1 exchange.
    fn is_interim(&self) -> bool;

    /// Statuses that never carry a body, regardless of headers.
    fn never_has_body(&self) -> bool;
}

impl StatusExt for StatusCode {
    fn is_redirect_retaining_status(&self) -> bool {
        *self == StatusCode::TEMPORARY_REDIRECT || *self == StatusCode::PERMANENT_REDIRECT
    }

    fn is_interim(&self) -> bool {
        self.is_informational() && *self != StatusCode::SWITCHING_PROTOCOLS
    }

    fn never_has_body(&self) -> bool {
        self.is_informational()
            || *self == StatusCode::NO_CONTENT
            || *self == StatusCode::NOT_MODIFIED
    }
}

pub(crate) trait HeaderIterExt {
    fn has(self, key: HeaderName, value: &str) -> bool;
    fn has_chunked(self) -> bool;
}

impl<'a, I: Iterator<Item = (&'a HeaderName, &'a HeaderValue)>> HeaderIterExt for I {
    fn has(self, key: HeaderName, value: &str) -> bool {
        self.filter(|i| i.0 == key).any(|i| {
            i.1.to_str()
                .map(|v| v.eq_ignore_ascii_case(value))
                .unwrap_or(false)
        })
    }

    fn has_chunked(self) -> bool {
        self.filter(|i| i.0 == header::TRANSFER_ENCODING)
            .filter_map(|i| i.1.to_str().ok())
            .any(|v| {
                v.split(',')
                    .any(|c| c.trim().eq_ignore_ascii_case("chunked"))
            })
    }
}

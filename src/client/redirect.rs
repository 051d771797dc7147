use http::uri::Scheme;
use http::{header, HeaderValue, StatusCode};

use crate::url::Target;
use crate::Error;

use super::state::{Cleanup, Prepare, Redirect};
use super::{Flow, RedirectAuthHeaders};

impl Flow<Redirect> {
    /// Start the follow-up exchange for this redirect.
    ///
    /// The `location` header is resolved against the previous target. The new
    /// request is always a GET. The `authorization` header is only carried over
    /// as allowed by `redirect_auth_headers`.
    pub fn as_new_flow(
        &mut self,
        redirect_auth_headers: RedirectAuthHeaders,
    ) -> Result<Flow<Prepare>, Error> {
        let raw = self.inner.location.as_ref().ok_or(Error::NoLocationHeader)?;
        let location = raw.to_str().map_err(|_| {
            Error::BadLocationHeader(String::from_utf8_lossy(raw.as_bytes()).into_owned())
        })?;

        let previous = &self.inner.request;
        let target = previous.new_target_from_location(location)?;

        let carry_auth = match redirect_auth_headers {
            RedirectAuthHeaders::Never => false,
            RedirectAuthHeaders::SameHost => same_origin_or_upgrade(previous.target(), &target),
        };
        let auth = carry_auth
            .then(|| previous.header(&header::AUTHORIZATION).cloned())
            .flatten();

        let mut next = Flow::new(target)?;
        if let Some(v) = auth {
            next.inner.request.set_header(header::AUTHORIZATION, v)?;
        }

        Ok(next)
    }

    /// The redirect status code.
    pub fn status(&self) -> StatusCode {
        // Redirect is only entered after a status line.
        self.inner.head.status.unwrap_or(StatusCode::FOUND)
    }

    /// The raw `location` header, if any.
    pub fn location(&self) -> Option<&HeaderValue> {
        self.inner.location.as_ref()
    }

    /// Abandon the redirect.
    pub fn proceed(self) -> Flow<Cleanup> {
        Flow::wrap(self.inner)
    }
}

// Same host, and the scheme is unchanged or becomes https.
fn same_origin_or_upgrade(prev: &Target, next: &Target) -> bool {
    if !prev.host().eq_ignore_ascii_case(next.host()) {
        return false;
    }
    let to = next.uri().scheme();
    to == prev.uri().scheme() || to == Some(&Scheme::HTTPS)
}

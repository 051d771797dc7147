use http::{HeaderName, HeaderValue, Method, Uri};

use crate::url::Target;
use crate::Error;

use super::amended::AmendedRequest;
use super::state::{Prepare, SendRequest};
use super::{Flow, Inner, ResponseHead};

impl Flow<Prepare> {
    /// A GET of `target`, headers still open for changes.
    pub fn new(target: Target) -> Result<Self, Error> {
        let inner = Inner {
            request: AmendedRequest::new(target),
            analyzed: false,
            phase: Default::default(),
            head: ResponseHead::default(),
            reader: None,
            stop_on_chunk_boundary: false,
            location: None,
        };

        Ok(Flow::wrap(inner))
    }

    /// Always `GET`.
    pub fn method(&self) -> &Method {
        self.inner.request.method()
    }

    /// The request target.
    pub fn target(&self) -> &Target {
        self.inner.request.target()
    }

    /// The request target URI.
    pub fn uri(&self) -> &Uri {
        self.inner.request.target().uri()
    }

    /// Set a request header, replacing an earlier value.
    ///
    /// `host` and `authorization` (from the target userinfo) are only derived
    /// when not set here.
    pub fn header<K, V>(&mut self, key: K, value: V) -> Result<(), Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.inner.request.set_header(key, value)
    }

    /// Freeze the headers and start sending.
    pub fn proceed(self) -> Flow<SendRequest> {
        Flow::wrap(self.inner)
    }
}

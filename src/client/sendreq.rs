use std::io::{self, Write};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri, Version};

use crate::url::Target;
use crate::util::{log_data, Cursor, Writer};
use crate::Error;

use super::amended::AmendedRequest;
use super::state::{RecvResponse, SendRequest};
use super::{Flow, RequestPhase};

impl Flow<SendRequest> {
    /// Write the request prelude to `output`.
    ///
    /// Whole lines only. Call again with a fresh buffer until
    /// [`can_proceed()`](Self::can_proceed) is true. This is the request line,
    /// `GET /path HTTP/1.1`, followed by the headers and a blank line:
    ///
    /// ```text
    /// GET /bar HTTP/1.1\r\n
    /// host: my.server.test\r\n
    /// user-agent: myspecialthing\r\n
    /// connection: close\r\n
    /// \r\n
    /// ```
    ///
    /// A buffer smaller than the next line is an `OutputOverflow`.
    ///
    /// Returns the number of bytes used in `output`.
    pub fn write(&mut self, output: &mut [u8]) -> Result<usize, Error> {
        self.maybe_analyze_request()?;

        let mut w = Writer::new(output);
        write_prelude(&self.inner.request, &mut self.inner.phase, &mut w)?;

        let used = w.len();
        log_data(&output[..used]);

        Ok(used)
    }

    /// Always `GET`.
    pub fn method(&self) -> &Method {
        self.inner.request.method()
    }

    /// Target of the request line.
    pub fn uri(&self) -> &Uri {
        self.inner.request.target().uri()
    }

    /// Requests are always HTTP/1.1.
    pub fn version(&self) -> Version {
        Version::HTTP_11
    }

    /// The headers that are sent, including the derived ones.
    pub fn headers_map(&mut self) -> Result<HeaderMap, Error> {
        self.maybe_analyze_request()?;
        let mut map = HeaderMap::new();
        for (k, v) in self.inner.request.headers() {
            map.append(k, v.clone());
        }
        Ok(map)
    }

    /// Whether the blank line ending the prelude has been written.
    pub fn can_proceed(&self) -> bool {
        self.inner.phase == RequestPhase::Sent
    }

    /// Start receiving the response, or `None` while prelude lines remain.
    pub fn proceed(self) -> Option<Flow<RecvResponse>> {
        if !self.can_proceed() {
            return None;
        }

        Some(Flow::wrap(self.inner))
    }

    pub(crate) fn maybe_analyze_request(&mut self) -> Result<(), Error> {
        if self.inner.analyzed {
            return Ok(());
        }

        let request = &mut self.inner.request;
        let mut first = HeaderMap::new();

        if !request.has_header(&header::HOST) {
            // Port only when it is not the scheme default.
            let value = maybe_with_port(request.target())?;
            first.insert(header::HOST, value);
        }

        if !request.has_header(&header::AUTHORIZATION) {
            if let Some(auth) = basic_auth(request.target())? {
                first.insert(header::AUTHORIZATION, auth);
            }
        }

        request.prepend_headers(first);

        if !request.has_header(&header::CONNECTION) {
            // One exchange per connection.
            request.set_header(header::CONNECTION, "close")?;
        }

        self.inner.analyzed = true;
        Ok(())
    }
}

fn from_str(src: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(src).map_err(|e| Error::BadHeader(e.to_string()))
}

fn maybe_with_port(target: &Target) -> Result<HeaderValue, Error> {
    if target.has_non_default_port() {
        let host_port = format!("{}:{}", target.host(), target.port());
        return from_str(&host_port);
    }

    from_str(target.host())
}

fn basic_auth(target: &Target) -> Result<Option<HeaderValue>, Error> {
    if target.username().is_none() && target.password().is_none() {
        return Ok(None);
    }

    let user = target.username().unwrap_or_default();
    let pass = target.password().unwrap_or_default();
    let creds = BASE64_STANDARD.encode(format!("{}:{}", user, pass));

    let mut value = from_str(&format!("Basic {}", creds))?;
    value.set_sensitive(true);

    Ok(Some(value))
}

enum PreludeLine<'a> {
    Request(&'a Method, &'a str, Version),
    Header(&'a HeaderName, &'a HeaderValue),
    End,
}

impl PreludeLine<'_> {
    fn write_to(&self, w: &mut Cursor<'_>) -> io::Result<()> {
        match self {
            PreludeLine::Request(method, path, version) => {
                write!(w, "{} {} {:?}\r\n", method, path, version)
            }
            PreludeLine::Header(name, value) => {
                write!(w, "{}: ", name)?;
                w.write_all(value.as_bytes())?;
                w.write_all(b"\r\n")
            }
            PreludeLine::End => w.write_all(b"\r\n"),
        }
    }
}

/// The next line to send, and the phase after it is sent.
fn next_line(
    request: &AmendedRequest,
    phase: RequestPhase,
) -> Option<(PreludeLine<'_>, RequestPhase)> {
    match phase {
        RequestPhase::SendLine => {
            let (method, path, version) = request.prelude();
            Some((
                PreludeLine::Request(method, path, version),
                RequestPhase::SendHeaders(0),
            ))
        }
        RequestPhase::SendHeaders(index) => match request.headers().nth(index) {
            Some((name, value)) => Some((
                PreludeLine::Header(name, value),
                RequestPhase::SendHeaders(index + 1),
            )),
            None => Some((PreludeLine::End, RequestPhase::Sent)),
        },
        RequestPhase::Sent => None,
    }
}

fn write_prelude(
    request: &AmendedRequest,
    phase: &mut RequestPhase,
    w: &mut Writer,
) -> Result<(), Error> {
    let mut lines = 0;

    while let Some((line, next)) = next_line(request, *phase) {
        if !w.try_write(|c| line.write_to(c)) {
            break;
        }
        *phase = next;
        lines += 1;
    }

    if lines == 0 && *phase != RequestPhase::Sent {
        return Err(Error::OutputOverflow);
    }

    Ok(())
}

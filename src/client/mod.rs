//! One HTTP/1.1 GET exchange, without I/O.
//!
//! Bytes go in and out through caller supplied slices. Nothing here touches a
//! socket; the [`HttpClient`](crate::agent::HttpClient) moves the bytes over a
//! [`Transport`](crate::transport::Transport).
//!
//! A [`Flow`] is parameterized by its stage, `Flow<RecvBody>` only offers what makes
//! sense while a body is arriving. Each `proceed()` consumes the flow and hands back
//! the next stage.
//!
//! * **Prepare** - extra request headers can be added
//! * **SendRequest** - the request line and headers are serialized
//! * **RecvResponse** - the head is parsed, one line per call
//! * **RecvBody** - the body is decoded
//! * **Redirect** - any `3xx` but 304. Its `location` turns into a fresh `Prepare`
//! * **Cleanup** - done, the connection is to be closed
//!
//! Requests always carry `connection: close`. A connection serves one exchange.
//!
//! ```text
//! ┌ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─▶┌──────────────────┐
//!                          │     Prepare      │
//! │                        └──────────────────┘
//!                                    │
//! │                                  ▼
//!                          ┌──────────────────┐
//! │                        │   SendRequest    │
//!                          └──────────────────┘
//! │                                  │
//!                                    ▼
//! │                        ┌──────────────────┐
//!               ┌──────────│   RecvResponse   │──┐
//! │             │          └──────────────────┘  │
//!               │                    │           │
//! │             ▼                    ▼           │
//!    ┌──────────────────┐  ┌──────────────────┐  │
//! └ ─│     Redirect     │  │     RecvBody     │  │
//!    └──────────────────┘  └──────────────────┘  │
//!               │                    │           │
//!               │                    ▼           │
//!               │          ┌──────────────────┐  │
//!               └─────────▶│     Cleanup      │◀─┘
//!                          └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tick_proto::client::*;
//! use tick_proto::url::Target;
//!
//! let target = Target::parse("https://example.test/my-path").unwrap();
//!
//! // ********************************** Prepare
//!
//! let mut flow = Flow::new(target).unwrap();
//! flow.header("x-foo", "bar").unwrap();
//!
//! // The request is serialized into this.
//! let mut output = vec![0_u8; 1024];
//!
//! // ********************************** SendRequest
//!
//! let mut flow = flow.proceed();
//!
//! let output_used = flow.write(&mut output).unwrap();
//!
//! assert_eq!(&output[..output_used], b"\
//!     GET /my-path HTTP/1.1\r\n\
//!     host: example.test\r\n\
//!     x-foo: bar\r\n\
//!     connection: close\r\n\
//!     \r\n");
//!
//! // ********************************** RecvResponse
//!
//! let mut flow = flow.proceed().unwrap();
//!
//! let input = b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\n\r\nhi there!";
//! let mut pos = 0;
//!
//! // One line per call.
//! while !flow.can_proceed() {
//!     let (used, _line) = flow.try_line(&input[pos..]).unwrap();
//!     pos += used;
//! }
//! assert_eq!(pos, 38);
//!
//! // ********************************** RecvBody
//!
//! let mut flow = match flow.proceed() {
//!     Some(RecvResponseResult::RecvBody(v)) => v,
//!     _ => panic!(),
//! };
//!
//! let (input_used, output_used) =
//!     flow.read(&input[pos..], &mut output).unwrap();
//!
//! assert_eq!(input_used, 9);
//! assert_eq!(&output[..output_used], b"hi there!");
//!
//! // ********************************** Cleanup
//!
//! let flow = flow.proceed().unwrap();
//! assert_eq!(flow.status(), Some(tick_proto::http::StatusCode::OK));
//! ```

use std::fmt;
use std::marker::PhantomData;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Version};

use crate::body::BodyReader;

use amended::AmendedRequest;

mod amended;

pub use crate::config::RedirectAuthHeaders;

#[cfg(test)]
mod test;

/// Headers after which a response head is rejected.
pub const MAX_RESPONSE_HEADERS: usize = 128;

/// Marker types for the stages of a [`Flow`].
pub mod state {
    pub(crate) trait Named {
        fn name() -> &'static str;
    }

    macro_rules! flow_state {
        ($n:tt) => {
            #[doc(hidden)]
            pub struct $n(());
            impl Named for $n {
                fn name() -> &'static str {
                    stringify!($n)
                }
            }
        };
    }

    flow_state!(Prepare);
    flow_state!(SendRequest);
    flow_state!(RecvResponse);
    flow_state!(RecvBody);
    flow_state!(Redirect);
    flow_state!(Cleanup);
}
use self::state::*;

/// A single request/response exchange, at stage `State`.
///
/// The stages are drawn in the [module docs][crate::client].
pub struct Flow<State> {
    inner: Inner,
    _ph: PhantomData<State>,
}

// Shared by all stages.
#[derive(Debug)]
pub(crate) struct Inner {
    pub request: AmendedRequest,
    pub analyzed: bool,
    pub phase: RequestPhase,
    pub head: ResponseHead,
    pub reader: Option<BodyReader>,
    pub stop_on_chunk_boundary: bool,
    pub location: Option<HeaderValue>,
}

impl Inner {
    fn is_redirect(&self) -> bool {
        match self.head.status {
            // 304 Not Modified carries no location.
            Some(v) => v.is_redirection() && v != StatusCode::NOT_MODIFIED,
            None => false,
        }
    }

    fn need_response_body(&self) -> bool {
        !matches!(
            self.reader,
            None | Some(BodyReader::NoBody) | Some(BodyReader::LengthDelimited(0))
        )
    }
}

/// Phases of sending the request prelude.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum RequestPhase {
    #[default]
    SendLine,
    SendHeaders(usize),
    Sent,
}

/// The response head as it is received.
#[derive(Debug, Default)]
pub(crate) struct ResponseHead {
    pub version: Option<Version>,
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    /// Currently skipping the head of an interim 1xx response.
    pub interim: bool,
    /// The blank line ending the final head was received.
    pub complete: bool,
}

/// One parsed line of the response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseLine {
    /// The status line of the final response.
    Status(Version, StatusCode),
    /// A header of the final response.
    Header(HeaderName, HeaderValue),
    /// An interim 1xx response was skipped entirely.
    Interim(StatusCode),
    /// The blank line ending the head. The flow can proceed.
    End,
}

impl<S> Flow<S> {
    fn wrap(inner: Inner) -> Flow<S>
    where
        S: Named,
    {
        let wrapped = Flow {
            inner,
            _ph: PhantomData,
        };

        debug!("{:?}", wrapped);

        wrapped
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// PREPARE

mod prepare;

// //////////////////////////////////////////////////////////////////////////////////////////// SEND REQUEST

mod sendreq;

// //////////////////////////////////////////////////////////////////////////////////////////// RECV RESPONSE

mod recvresp;

/// Where a flow goes once the response head is in.
///
/// A redirect never reads its body.
pub enum RecvResponseResult {
    /// The response has a body.
    RecvBody(Flow<RecvBody>),
    /// Any `3xx` except 304. Following it fails with
    /// [`NoLocationHeader`](crate::Error::NoLocationHeader) if `location` is missing.
    Redirect(Flow<Redirect>),
    /// Neither, nothing more to receive.
    Cleanup(Flow<Cleanup>),
}

// //////////////////////////////////////////////////////////////////////////////////////////// RECV BODY

mod recvbody;

// //////////////////////////////////////////////////////////////////////////////////////////// REDIRECT

mod redirect;

// //////////////////////////////////////////////////////////////////////////////////////////// CLEANUP

impl Flow<Cleanup> {
    /// Status of the finished response.
    ///
    /// `None` if the flow never received a status line.
    pub fn status(&self) -> Option<StatusCode> {
        self.inner.head.status
    }
}

// ////////////////////////////////////////////////////////////////////////////////////////////

impl<State: Named> fmt::Debug for Flow<State> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flow<{}>", State::name())
    }
}

impl fmt::Debug for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendLine => write!(f, "SendLine"),
            Self::SendHeaders(_) => write!(f, "SendHeaders"),
            Self::Sent => write!(f, "Sent"),
        }
    }
}

impl fmt::Debug for RecvResponseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecvBody(v) => v.fmt(f),
            Self::Redirect(v) => v.fmt(f),
            Self::Cleanup(v) => v.fmt(f),
        }
    }
}

//! Poll-driven HTTP(S) client.
//!
//! [`HttpClient`] drives the Sans-IO [`Flow`](crate::client::Flow) over a
//! [`Transport`] opened by a [`Connector`]. The caller owns the loop:
//!
//! ```text
//! client.begin("https://example.test/")?;
//! loop {
//!     match client.advance()? {
//!         StateEvent::Closed => break,
//!         StateEvent::Pending => { /* service other work */ }
//!         ev => println!("{:?}", ev),
//!     }
//! }
//! ```
//!
//! Every call does one bounded piece of work and reports it as a
//! [`StateEvent`]. Decoded body bytes go to the [`BodySink`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use http::{header, HeaderName, HeaderValue, StatusCode, Version};

use crate::body::BodyMode;
use crate::client::state::{Cleanup, Prepare, RecvBody, RecvResponse, Redirect, SendRequest};
use crate::client::{Flow, RecvResponseResult, ResponseLine};
use crate::config::{HttpConfig, MAX_HEADER_LINE};
use crate::skew::{ClockSync, LocalClock, Skew, SkewEstimator, SystemClock};
use crate::transport::{Connector, ReadOutcome, Transport};
use crate::trust::TlsSettings;
use crate::url::Target;
use crate::Error;

/// Receives the decoded response body.
pub trait BodySink {
    /// Body bytes, with any transfer framing removed.
    fn on_body(&mut self, data: &[u8]);
}

impl BodySink for Vec<u8> {
    fn on_body(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }
}

/// Observable state of an [`HttpClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpState {
    /// No request started.
    Idle,
    /// Connected, sending the request.
    Connecting,
    /// Receiving the response head.
    ReadingHeaders,
    /// Receiving the response body.
    ReadingBody,
    /// A redirect will be followed on the next `advance()`.
    Redirecting,
    /// The exchange is over, successfully or not.
    Closed,
}

/// Display hint from the `content-type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentHint {
    /// `text/*`
    Text,
    /// Anything else, or no `content-type`.
    Binary,
}

/// What one `advance()` did.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateEvent {
    /// No progress, the transport had nothing to offer.
    Pending,
    /// The complete request is written to the transport.
    RequestSent,
    /// The status line of the final response.
    Status {
        /// HTTP version of the response.
        version: Version,
        /// The status.
        status: StatusCode,
    },
    /// An interim 1xx response was skipped.
    Interim(StatusCode),
    /// One response header.
    Header {
        /// Header name.
        name: HeaderName,
        /// Header value.
        value: HeaderValue,
    },
    /// The end of the response head.
    HeadersDone {
        /// How the body is framed.
        body_mode: BodyMode,
        /// From `content-type`.
        content: ContentHint,
        /// From `date`, `server - local`.
        skew: Option<Skew>,
    },
    /// A redirect is followed, a new connection is opened.
    Redirect {
        /// The resolved new target.
        location: String,
        /// 1 for the first redirect.
        hop: u32,
    },
    /// This many decoded body bytes were given to the sink.
    Body(usize),
    /// The exchange is over.
    Closed,
}

/// The data of the current exchange.
#[derive(Debug, Clone)]
pub struct ClientSession {
    state: HttpState,
    target: Option<Target>,
    version: Option<Version>,
    status: Option<StatusCode>,
    body_mode: Option<BodyMode>,
    content: ContentHint,
    skew: Option<Skew>,
    redirects: u32,
    connects: u32,
}

impl ClientSession {
    fn new() -> Self {
        ClientSession {
            state: HttpState::Idle,
            target: None,
            version: None,
            status: None,
            body_mode: None,
            content: ContentHint::Binary,
            skew: None,
            redirects: 0,
            connects: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> HttpState {
        self.state
    }

    /// The target currently requested. Changes on redirects.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Response version.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// True if the response is HTTP/1.0.
    pub fn is_http10(&self) -> bool {
        self.version == Some(Version::HTTP_10)
    }

    /// Response status.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Body framing of the response.
    pub fn body_mode(&self) -> Option<BodyMode> {
        self.body_mode
    }

    /// Display hint.
    pub fn content(&self) -> ContentHint {
        self.content
    }

    /// Last reported clock skew.
    pub fn skew(&self) -> Option<Skew> {
        self.skew
    }

    /// Redirects followed so far.
    pub fn redirects(&self) -> u32 {
        self.redirects
    }

    /// Connections opened so far.
    pub fn connects(&self) -> u32 {
        self.connects
    }

    fn reset_response(&mut self) {
        self.version = None;
        self.status = None;
        self.body_mode = None;
        self.content = ContentHint::Binary;
    }
}

#[derive(Debug)]
enum FlowHolder {
    SendRequest(Flow<SendRequest>),
    RecvResponse(Flow<RecvResponse>),
    RecvBody(Flow<RecvBody>),
    Redirect(Flow<Redirect>),
    Cleanup(Flow<Cleanup>),
    Empty,
}

/// HTTP(S) GET client, one connection at a time.
pub struct HttpClient<C: Connector, S> {
    connector: C,
    sink: S,
    config: HttpConfig,
    tls: Option<TlsSettings>,
    clock: Arc<dyn LocalClock>,
    estimator: SkewEstimator,
    session: ClientSession,
    flow: FlowHolder,
    transport: Option<C::Transport>,
    /// Request bytes not yet accepted by the transport.
    output: Vec<u8>,
    output_pos: usize,
    /// Received bytes not yet consumed by the flow.
    input: Vec<u8>,
    scratch: Vec<u8>,
    last_progress: Option<Instant>,
}

impl<C: Connector, S: BodySink> HttpClient<C, S> {
    /// Create a client.
    ///
    /// `tls` is needed for `https` targets. Both the config and the TLS
    /// settings are validated right away.
    pub fn new(
        connector: C,
        sink: S,
        config: HttpConfig,
        tls: Option<TlsSettings>,
    ) -> Result<Self, Error> {
        config.validate()?;
        if let Some(tls) = &tls {
            tls.validate()?;
        }

        let estimator = SkewEstimator::new(config.skew_threshold);
        let scratch = vec![0; config.read_chunk_size];

        Ok(HttpClient {
            connector,
            sink,
            config,
            tls,
            clock: Arc::new(SystemClock),
            estimator,
            session: ClientSession::new(),
            flow: FlowHolder::Empty,
            transport: None,
            output: vec![],
            output_pos: 0,
            input: vec![],
            scratch,
            last_progress: None,
        })
    }

    /// Use another local clock for skew estimation.
    pub fn with_clock(mut self, clock: Arc<dyn LocalClock>) -> Self {
        self.clock = clock;
        self
    }

    /// The current exchange.
    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Current state.
    pub fn state(&self) -> HttpState {
        self.session.state
    }

    /// The body sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The body sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Start a GET of `url` and open the first connection.
    pub fn begin(&mut self, url: &str) -> Result<(), Error> {
        if !matches!(self.session.state, HttpState::Idle | HttpState::Closed) {
            return Err(Error::AlreadyStarted);
        }

        let target = Target::parse(url)?;

        self.session = ClientSession::new();
        self.last_progress = None;

        if let Err(e) = self.open(target) {
            warn!("Begin failed: {}", e);
            self.teardown();
            return Err(e);
        }

        Ok(())
    }

    /// Advance the exchange, using the current time for the timeout.
    pub fn advance(&mut self) -> Result<StateEvent, Error> {
        self.advance_at(Instant::now())
    }

    /// Advance the exchange by one bounded step.
    ///
    /// Never blocks. An error is terminal for the exchange, the state is
    /// `Closed` afterwards.
    pub fn advance_at(&mut self, now: Instant) -> Result<StateEvent, Error> {
        match self.session.state {
            HttpState::Idle => return Err(Error::NotStarted),
            HttpState::Closed => return Ok(StateEvent::Closed),
            _ => {}
        }

        let last = *self.last_progress.get_or_insert(now);

        if let Some(timeout) = self.config.timeout {
            if now.saturating_duration_since(last) > timeout {
                return Err(self.fail(Error::Timeout));
            }
        }

        match self.step() {
            Ok((event, progress)) => {
                if progress {
                    self.last_progress = Some(now);
                }
                Ok(event)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Tell the caller's clock to resync if the last skew is beyond the threshold.
    ///
    /// Returns whether it did.
    pub fn resync_clock(&mut self, sync: &mut dyn ClockSync) -> bool {
        let Some(skew) = self.session.skew else {
            return false;
        };
        self.estimator.maybe_resync(skew, sync)
    }

    /// Sum of clock corrections made through [`HttpClient::resync_clock`].
    pub fn applied_skew(&self) -> Skew {
        self.estimator.applied()
    }

    /// Close the transport and end the exchange.
    pub fn close(&mut self) {
        if self.session.state != HttpState::Idle {
            debug!("Close requested");
        }
        self.teardown();
    }

    fn fail(&mut self, e: Error) -> Error {
        warn!("Exchange failed: {}", e);
        self.teardown();
        e
    }

    fn teardown(&mut self) {
        if let Some(mut t) = self.transport.take() {
            t.close();
        }
        self.flow = FlowHolder::Empty;
        self.output.clear();
        self.output_pos = 0;
        self.input.clear();
        if self.session.state != HttpState::Idle || self.session.connects > 0 {
            self.session.state = HttpState::Closed;
        }
    }

    fn open(&mut self, target: Target) -> Result<(), Error> {
        let mut flow = Flow::new(target.clone())?;
        if let Some(ua) = &self.config.user_agent {
            flow.header(header::USER_AGENT, ua.as_str())?;
        }
        self.open_flow(flow)
    }

    fn open_flow(&mut self, flow: Flow<Prepare>) -> Result<(), Error> {
        let target = flow.target().clone();
        let endpoint = target.endpoint();

        let tls = if endpoint.use_tls() {
            match &self.tls {
                Some(v) => Some(v),
                None => return Err(Error::InvalidConfig("https target without TlsSettings")),
            }
        } else {
            None
        };

        self.session.connects += 1;
        self.session.state = HttpState::Connecting;
        self.session.target = Some(target);

        debug!("Connect {} (attempt {})", endpoint, self.session.connects);
        let transport = self.connector.connect(&endpoint, tls)?;

        self.transport = Some(transport);
        self.flow = FlowHolder::SendRequest(flow.proceed());
        self.output.clear();
        self.output_pos = 0;
        self.input.clear();

        Ok(())
    }

    fn transport(&mut self) -> Result<&mut C::Transport, Error> {
        self.transport.as_mut().ok_or(Error::TransportClosed)
    }

    /// One step. The bool tells whether anything moved.
    fn step(&mut self) -> Result<(StateEvent, bool), Error> {
        match self.session.state {
            HttpState::Connecting => self.step_send(),
            HttpState::ReadingHeaders => self.step_headers(),
            HttpState::ReadingBody => self.step_body(),
            HttpState::Redirecting => self.step_redirect(),
            HttpState::Idle | HttpState::Closed => Ok((StateEvent::Closed, false)),
        }
    }

    fn step_send(&mut self) -> Result<(StateEvent, bool), Error> {
        let FlowHolder::SendRequest(flow) = &mut self.flow else {
            return Err(Error::NotStarted);
        };

        if self.output_pos == self.output.len() && !flow.can_proceed() {
            let mut buf = vec![0; MAX_HEADER_LINE];
            let n = flow.write(&mut buf)?;
            buf.truncate(n);
            self.output = buf;
            self.output_pos = 0;
        }

        let mut progress = false;

        if self.output_pos < self.output.len() {
            let pos = self.output_pos;
            let chunk = self.output[pos..].to_vec();
            let n = self.transport()?.write(&chunk)?;
            if n == 0 {
                return Ok((StateEvent::Pending, false));
            }
            self.output_pos += n;
            progress = true;
        }

        let FlowHolder::SendRequest(flow) = &self.flow else {
            return Err(Error::NotStarted);
        };

        if self.output_pos == self.output.len() && flow.can_proceed() {
            let FlowHolder::SendRequest(flow) = std::mem::replace(&mut self.flow, FlowHolder::Empty)
            else {
                return Err(Error::NotStarted);
            };

            // can_proceed() was true.
            let Some(flow) = flow.proceed() else {
                return Err(Error::NotStarted);
            };

            self.flow = FlowHolder::RecvResponse(flow);
            self.session.state = HttpState::ReadingHeaders;
            return Ok((StateEvent::RequestSent, true));
        }

        Ok((StateEvent::Pending, progress))
    }

    /// Read once from the transport into the input buffer.
    ///
    /// `Ok(None)` when the peer closed.
    fn fill_input(&mut self) -> Result<Option<usize>, Error> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::TransportClosed);
        };

        match transport.read(&mut self.scratch)? {
            ReadOutcome::Data(n) => {
                self.input.extend_from_slice(&self.scratch[..n]);
                Ok(Some(n))
            }
            ReadOutcome::WouldBlock => Ok(Some(0)),
            ReadOutcome::Closed => Ok(None),
        }
    }

    fn step_headers(&mut self) -> Result<(StateEvent, bool), Error> {
        let mut progress = false;

        let (used, line) = self.try_line()?;
        let (used, line) = if used == 0 {
            match self.fill_input()? {
                None => return Err(Error::UnexpectedEof),
                Some(0) => return Ok((StateEvent::Pending, false)),
                Some(_) => {
                    progress = true;
                    self.try_line()?
                }
            }
        } else {
            (used, line)
        };

        if used > 0 {
            progress = true;
            self.input.drain(..used);
        }

        let event = match line {
            None => StateEvent::Pending,
            Some(ResponseLine::Status(version, status)) => {
                self.session.version = Some(version);
                self.session.status = Some(status);
                StateEvent::Status { version, status }
            }
            Some(ResponseLine::Interim(status)) => StateEvent::Interim(status),
            Some(ResponseLine::Header(name, value)) => {
                self.on_header(&name, &value);
                StateEvent::Header { name, value }
            }
            Some(ResponseLine::End) => self.on_head_end()?,
        };

        Ok((event, progress))
    }

    fn try_line(&mut self) -> Result<(usize, Option<ResponseLine>), Error> {
        let FlowHolder::RecvResponse(flow) = &mut self.flow else {
            return Err(Error::NotStarted);
        };
        flow.try_line(&self.input)
    }

    fn on_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        if *name == header::CONTENT_TYPE {
            let is_text = value
                .to_str()
                .map(|v| v.trim_start().to_ascii_lowercase().starts_with("text/"))
                .unwrap_or(false);
            self.session.content = if is_text {
                ContentHint::Text
            } else {
                ContentHint::Binary
            };
        } else if *name == header::DATE {
            if let Ok(v) = value.to_str() {
                if let Some(skew) = self.estimator.observe(v, self.clock.now()) {
                    self.session.skew = Some(skew);
                    if self.estimator.needs_resync(skew) {
                        info!("Clock skew {} beyond threshold", skew);
                    }
                }
            }
        }
    }

    fn on_head_end(&mut self) -> Result<StateEvent, Error> {
        let FlowHolder::RecvResponse(flow) = std::mem::replace(&mut self.flow, FlowHolder::Empty)
        else {
            return Err(Error::NotStarted);
        };

        let Some(next) = flow.proceed() else {
            return Err(Error::NotStarted);
        };

        let body_mode = match next {
            RecvResponseResult::Redirect(flow) => {
                if self.session.redirects >= self.config.max_redirects {
                    return Err(Error::TooManyRedirects(self.config.max_redirects));
                }
                self.flow = FlowHolder::Redirect(flow);
                self.session.state = HttpState::Redirecting;
                // The body of a redirect is never read.
                BodyMode::NoBody
            }
            RecvResponseResult::RecvBody(mut flow) => {
                flow.stop_on_chunk_boundary(true);
                let mode = flow.body_mode();
                self.flow = FlowHolder::RecvBody(flow);
                self.session.state = HttpState::ReadingBody;
                mode
            }
            RecvResponseResult::Cleanup(flow) => {
                self.flow = FlowHolder::Cleanup(flow);
                self.finish();
                BodyMode::NoBody
            }
        };

        self.session.body_mode = Some(body_mode);

        Ok(StateEvent::HeadersDone {
            body_mode,
            content: self.session.content,
            skew: self.session.skew,
        })
    }

    fn step_body(&mut self) -> Result<(StateEvent, bool), Error> {
        let mut progress = false;
        let mut need_input = self.input.is_empty();

        loop {
            if need_input {
                match self.fill_input()? {
                    None => {
                        let FlowHolder::RecvBody(flow) = &self.flow else {
                            return Err(Error::NotStarted);
                        };
                        flow.end_of_input()?;
                        self.finish();
                        return Ok((StateEvent::Closed, true));
                    }
                    Some(0) => return Ok((StateEvent::Pending, progress)),
                    Some(_) => progress = true,
                }
            }

            let (input_used, output_used, ended) = self.read_body()?;

            // A partial chunk size or trailer line stays buffered until
            // the rest of it arrives.
            if input_used == 0 && output_used == 0 && !ended && !need_input {
                need_input = true;
                continue;
            }

            if input_used > 0 {
                progress = true;
            }

            if ended {
                self.finish();
            }

            return if output_used > 0 {
                Ok((StateEvent::Body(output_used), true))
            } else if ended {
                Ok((StateEvent::Closed, true))
            } else {
                Ok((StateEvent::Pending, progress))
            };
        }
    }

    /// Decode buffered input into the sink. `(consumed, produced, ended)`.
    fn read_body(&mut self) -> Result<(usize, usize, bool), Error> {
        let FlowHolder::RecvBody(flow) = &mut self.flow else {
            return Err(Error::NotStarted);
        };

        let mut scratch = std::mem::take(&mut self.scratch);
        let read = flow.read(&self.input, &mut scratch);
        let ended = flow.is_ended();

        let (input_used, output_used) = match read {
            Ok(v) => v,
            Err(e) => {
                self.scratch = scratch;
                return Err(e);
            }
        };

        self.input.drain(..input_used);
        if output_used > 0 {
            self.sink.on_body(&scratch[..output_used]);
        }
        self.scratch = scratch;

        Ok((input_used, output_used, ended))
    }

    fn step_redirect(&mut self) -> Result<(StateEvent, bool), Error> {
        let FlowHolder::Redirect(mut flow) = std::mem::replace(&mut self.flow, FlowHolder::Empty)
        else {
            return Err(Error::NotStarted);
        };

        let mut next = flow.as_new_flow(self.config.redirect_auth_headers)?;
        if let Some(ua) = &self.config.user_agent {
            next.header(header::USER_AGENT, ua.as_str())?;
        }

        let location = next.target().to_string();
        debug!("Redirect {} -> {}", flow.status(), location);

        // The cleanup state of the previous exchange.
        let _ = flow.proceed();
        if let Some(mut t) = self.transport.take() {
            t.close();
        }

        self.session.redirects += 1;
        self.session.reset_response();

        self.open_flow(next)?;

        Ok((
            StateEvent::Redirect {
                location,
                hop: self.session.redirects,
            },
            true,
        ))
    }

    fn finish(&mut self) {
        let status = match std::mem::replace(&mut self.flow, FlowHolder::Empty) {
            FlowHolder::RecvBody(flow) => flow.proceed().and_then(|f| f.status()),
            FlowHolder::Cleanup(flow) => flow.status(),
            _ => None,
        };
        debug!("Exchange done: {:?}", status);

        if let Some(mut t) = self.transport.take() {
            t.close();
        }
        self.input.clear();
        self.session.state = HttpState::Closed;
    }
}

impl<C: Connector, S> fmt::Debug for HttpClient<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("state", &self.session.state)
            .field("flow", &self.flow)
            .finish_non_exhaustive()
    }
}

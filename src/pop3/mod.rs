//! Poll-driven POP3 mail retrieval.
//!
//! [`MailRetrievalClient`] logs in, downloads every message in the mailbox
//! in ascending order, optionally deletes each one after it is read, and
//! quits.
//!
//! ```text
//! Connect -> Greeting -> Authenticate (USER, PASS) -> ListMessages (STAT)
//!   -> RetrieveMessage(n) -> [Delete(n)] -> ... -> Quit -> Done
//! ```
//!
//! Retrieved messages are handed to a [`MailSink`] as [`Fragment`]s. With
//! [`MailConfig::extended_parse`] the header is reduced to `To`, `From` and
//! `Subject`, otherwise every line is passed on as is.
//!
//! Every [`tick()`](MailRetrievalClient::tick) does at most one unit of
//! work: open the connection, write one command, parse one response line or
//! deliver one fragment.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use crate::config::MailConfig;
use crate::transport::{Connector, Endpoint, ReadOutcome, Transport};
use crate::trust::TlsSettings;
use crate::{Error, ErrorKind};

mod line;
use line::{parse_reply, parse_stat, unstuff, LineBuffer, Reply};

mod message;
pub use message::Fragment;
use message::MessageParser;

/// Receives retrieved messages.
pub trait MailSink {
    /// A fragment of message `index`, 1-based as on the wire.
    fn deliver(&mut self, index: u32, fragment: Fragment);
}

impl MailSink for Vec<(u32, Fragment)> {
    fn deliver(&mut self, index: u32, fragment: Fragment) {
        self.push((index, fragment));
    }
}

/// Result of a [`MailRetrievalClient::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailStatus {
    /// Not done yet.
    Pending,
    /// All messages processed, clean QUIT.
    Success,
    /// No forward progress within the budget.
    Timeout,
    /// Socket failure, certificate rejection, `-ERR` response or framing
    /// error. See [`MailRetrievalClient::last_error`].
    TransportError,
    /// The server name could not be resolved.
    ResolutionError,
}

/// Protocol state of a [`MailRetrievalClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailState {
    /// Not started.
    Idle,
    /// About to open the connection.
    Connect,
    /// Waiting for the server greeting.
    Greeting,
    /// USER and PASS.
    Authenticate,
    /// STAT.
    ListMessages,
    /// RETR of this message.
    RetrieveMessage(u32),
    /// DELE of this message.
    Delete(u32),
    /// QUIT.
    Quit,
    /// Terminal.
    Done(MailStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    User,
    Pass,
    Stat,
    Retr(u32),
    Dele(u32),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connect,
    Greeting,
    Send(Command),
    Await(Command),
    /// Lines of a RETR response.
    Message(u32),
    Done(MailStatus),
}

struct Credentials {
    user: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// The data of the current retrieval.
#[derive(Debug, Default, Clone)]
pub struct MailSession {
    endpoint: Option<Endpoint>,
    message_count: u32,
    retrieved: u32,
    deleted: u32,
    delete_after_read: bool,
}

impl MailSession {
    /// Configured server.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Messages in the mailbox, per STAT.
    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    /// Messages completely retrieved.
    pub fn retrieved(&self) -> u32 {
        self.retrieved
    }

    /// Messages marked deleted. They are removed when QUIT succeeds.
    pub fn deleted(&self) -> u32 {
        self.deleted
    }
}

/// POP3 client, one mailbox per retrieval.
pub struct MailRetrievalClient<C: Connector, S> {
    connector: C,
    sink: S,
    config: MailConfig,
    tls: Option<TlsSettings>,
    session: MailSession,
    credentials: Option<Credentials>,
    phase: Phase,
    transport: Option<C::Transport>,
    lines: LineBuffer,
    parser: MessageParser,
    outbox: VecDeque<(u32, Fragment)>,
    output: Vec<u8>,
    output_pos: usize,
    scratch: Vec<u8>,
    last_progress: Option<Instant>,
    last_error: Option<Error>,
}

impl<C: Connector, S: MailSink> MailRetrievalClient<C, S> {
    /// Create a client.
    ///
    /// `tls` is needed if the server is configured with `use_tls`.
    pub fn new(
        connector: C,
        sink: S,
        config: MailConfig,
        tls: Option<TlsSettings>,
    ) -> Result<Self, Error> {
        config.validate()?;
        if let Some(tls) = &tls {
            tls.validate()?;
        }

        let lines = LineBuffer::new(config.max_line_len);
        let parser = MessageParser::new(config.extended_parse);
        let scratch = vec![0; config.read_chunk_size];

        Ok(MailRetrievalClient {
            connector,
            sink,
            config,
            tls,
            session: MailSession::default(),
            credentials: None,
            phase: Phase::Idle,
            transport: None,
            lines,
            parser,
            outbox: VecDeque::new(),
            output: vec![],
            output_pos: 0,
            scratch,
            last_progress: None,
            last_error: None,
        })
    }

    /// Set the server to retrieve from.
    pub fn configure(&mut self, server: &str, port: u16, use_tls: bool) -> Result<(), Error> {
        if self.is_running() {
            return Err(Error::AlreadyStarted);
        }
        if server.is_empty() {
            return Err(Error::InvalidConfig("empty server name"));
        }
        self.session.endpoint = Some(Endpoint::new(server, port, use_tls));
        Ok(())
    }

    /// Start a retrieval from the configured server.
    ///
    /// Nothing happens until the first [`tick()`](Self::tick).
    pub fn start_retrieval(
        &mut self,
        user: &str,
        password: &str,
        delete_after_read: bool,
    ) -> Result<(), Error> {
        if self.is_running() {
            return Err(Error::AlreadyStarted);
        }

        let Some(endpoint) = self.session.endpoint.take() else {
            return Err(Error::InvalidConfig("configure() the server first"));
        };

        if endpoint.use_tls() && self.tls.is_none() {
            self.session.endpoint = Some(endpoint);
            return Err(Error::InvalidConfig("use_tls without TlsSettings"));
        }

        self.session = MailSession {
            endpoint: Some(endpoint),
            delete_after_read,
            ..Default::default()
        };
        self.credentials = Some(Credentials {
            user: user.to_string(),
            password: password.to_string(),
        });
        self.phase = Phase::Connect;
        self.lines.clear();
        self.outbox.clear();
        self.output.clear();
        self.output_pos = 0;
        self.last_progress = None;
        self.last_error = None;

        Ok(())
    }

    /// Do one unit of work, using the current time for the timeout.
    pub fn tick(&mut self) -> MailStatus {
        self.tick_at(Instant::now())
    }

    /// Do one unit of work.
    ///
    /// Once a terminal status is returned, every further call returns the
    /// same status. Before [`start_retrieval`](Self::start_retrieval) this
    /// reports `TransportError` with [`Error::NotStarted`].
    pub fn tick_at(&mut self, now: Instant) -> MailStatus {
        match self.phase {
            Phase::Done(status) => return status,
            Phase::Idle => {
                self.last_error = Some(Error::NotStarted);
                return MailStatus::TransportError;
            }
            _ => {}
        }

        let last = *self.last_progress.get_or_insert(now);
        if now.saturating_duration_since(last) > self.config.timeout {
            return self.fail(Error::Timeout);
        }

        match self.step() {
            Ok(progress) => {
                if progress {
                    self.last_progress = Some(now);
                }
                match self.phase {
                    Phase::Done(status) => status,
                    _ => MailStatus::Pending,
                }
            }
            Err(e) => self.fail(e),
        }
    }

    /// Close the connection. A running retrieval ends with `TransportError`.
    pub fn close(&mut self) {
        if self.is_running() {
            self.fail(Error::TransportClosed);
        }
        self.close_transport();
    }

    /// The current protocol state.
    pub fn state(&self) -> MailState {
        match self.phase {
            Phase::Idle => MailState::Idle,
            Phase::Connect => MailState::Connect,
            Phase::Greeting => MailState::Greeting,
            Phase::Send(c) | Phase::Await(c) => match c {
                Command::User | Command::Pass => MailState::Authenticate,
                Command::Stat => MailState::ListMessages,
                Command::Retr(n) => MailState::RetrieveMessage(n),
                Command::Dele(n) => MailState::Delete(n),
                Command::Quit => MailState::Quit,
            },
            Phase::Message(n) => MailState::RetrieveMessage(n),
            Phase::Done(s) => MailState::Done(s),
        }
    }

    /// The current retrieval.
    pub fn session(&self) -> &MailSession {
        &self.session
    }

    /// Why the last retrieval failed.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// The mail sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The mail sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn is_running(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::Done(_))
    }

    fn fail(&mut self, e: Error) -> MailStatus {
        warn!("Mail retrieval failed: {}", e);

        let status = match e.kind() {
            ErrorKind::ResolutionError => MailStatus::ResolutionError,
            ErrorKind::Timeout => MailStatus::Timeout,
            _ => MailStatus::TransportError,
        };

        self.close_transport();
        self.outbox.clear();
        self.last_error = Some(e);
        self.phase = Phase::Done(status);
        status
    }

    fn close_transport(&mut self) {
        if let Some(mut t) = self.transport.take() {
            t.close();
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// One unit of work. The bool tells whether anything moved.
    fn step(&mut self) -> Result<bool, Error> {
        if let Some((index, fragment)) = self.outbox.pop_front() {
            self.sink.deliver(index, fragment);
            return Ok(true);
        }

        match self.phase {
            Phase::Connect => {
                self.connect()?;
                self.set_phase(Phase::Greeting);
                Ok(true)
            }
            Phase::Send(command) => self.send(command),
            Phase::Greeting | Phase::Await(_) | Phase::Message(_) => {
                let (line, progress) = self.read_line()?;
                match line {
                    Some(line) => {
                        self.on_line(&line)?;
                        Ok(true)
                    }
                    None => Ok(progress),
                }
            }
            Phase::Idle | Phase::Done(_) => Ok(false),
        }
    }

    fn connect(&mut self) -> Result<(), Error> {
        let Some(endpoint) = self.session.endpoint.clone() else {
            return Err(Error::InvalidConfig("configure() the server first"));
        };

        let tls = if endpoint.use_tls() {
            self.tls.as_ref()
        } else {
            None
        };

        debug!("Connect {}", endpoint);
        let transport = self.connector.connect(&endpoint, tls)?;
        self.transport = Some(transport);
        Ok(())
    }

    fn send(&mut self, command: Command) -> Result<bool, Error> {
        if self.output.is_empty() {
            self.output = self.command_line(command).into_bytes();
            self.output_pos = 0;
        }

        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::TransportClosed);
        };

        let n = transport.write(&self.output[self.output_pos..])?;
        if n == 0 {
            return Ok(false);
        }
        self.output_pos += n;

        if self.output_pos == self.output.len() {
            self.output.clear();
            self.output_pos = 0;
            self.set_phase(Phase::Await(command));
        }

        Ok(true)
    }

    fn command_line(&self, command: Command) -> String {
        let (user, password) = match &self.credentials {
            Some(c) => (c.user.as_str(), c.password.as_str()),
            None => ("", ""),
        };

        match command {
            Command::User => format!("USER {}\r\n", user),
            Command::Pass => format!("PASS {}\r\n", password),
            Command::Stat => "STAT\r\n".to_string(),
            Command::Retr(n) => format!("RETR {}\r\n", n),
            Command::Dele(n) => format!("DELE {}\r\n", n),
            Command::Quit => "QUIT\r\n".to_string(),
        }
    }

    /// A buffered line, or read once and try again.
    fn read_line(&mut self) -> Result<(Option<Vec<u8>>, bool), Error> {
        if let Some(line) = self.lines.next_line()? {
            return Ok((Some(line), false));
        }

        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::TransportClosed);
        };

        match transport.read(&mut self.scratch)? {
            ReadOutcome::Data(n) => {
                self.lines.push(&self.scratch[..n]);
                Ok((self.lines.next_line()?, true))
            }
            ReadOutcome::WouldBlock => Ok((None, false)),
            ReadOutcome::Closed => Err(Error::TransportClosed),
        }
    }

    fn on_line(&mut self, line: &[u8]) -> Result<(), Error> {
        if let Phase::Message(n) = self.phase {
            match unstuff(line) {
                Some(l) => self.parser.line(l, &mut self.outbox),
                None => {
                    self.parser.finish(&mut self.outbox);
                    self.session.retrieved += 1;
                    let next = if self.session.delete_after_read {
                        Phase::Send(Command::Dele(n))
                    } else {
                        self.after_message(n)
                    };
                    self.set_phase(next);
                }
            }
            return Ok(());
        }

        let text = match parse_reply(line)? {
            Reply::Ok(text) => text,
            Reply::Err(text) => {
                let what = match self.phase {
                    Phase::Greeting => "greeting".to_string(),
                    Phase::Await(Command::Pass) => "login".to_string(),
                    Phase::Await(c) => format!("{:?}", c),
                    _ => String::new(),
                };
                return Err(Error::ServerRejected(format!("{}: {}", what, text)));
            }
        };

        let next = match self.phase {
            Phase::Greeting => Phase::Send(Command::User),
            Phase::Await(Command::User) => Phase::Send(Command::Pass),
            Phase::Await(Command::Pass) => Phase::Send(Command::Stat),
            Phase::Await(Command::Stat) => {
                let (count, size) = parse_stat(&text)?;
                info!("Mailbox has {} messages ({} octets)", count, size);
                self.session.message_count = count;
                if count == 0 {
                    Phase::Send(Command::Quit)
                } else {
                    Phase::Send(Command::Retr(1))
                }
            }
            Phase::Await(Command::Retr(n)) => {
                self.parser.begin(n, &mut self.outbox);
                Phase::Message(n)
            }
            Phase::Await(Command::Dele(n)) => {
                self.session.deleted += 1;
                self.after_message(n)
            }
            Phase::Await(Command::Quit) => {
                self.close_transport();
                Phase::Done(MailStatus::Success)
            }
            p => p,
        };

        self.set_phase(next);
        Ok(())
    }

    fn after_message(&self, n: u32) -> Phase {
        if n < self.session.message_count {
            Phase::Send(Command::Retr(n + 1))
        } else {
            Phase::Send(Command::Quit)
        }
    }
}

impl<C: Connector, S> fmt::Debug for MailRetrievalClient<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailRetrievalClient")
            .field("phase", &self.phase)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeConnector, HttpResponse, Pop3Server};
    use crate::trust::{Certificate, DistinguishedName, TrustStore};
    use std::sync::Arc;
    use std::time::Duration;

    type Client = MailRetrievalClient<FakeConnector, Vec<(u32, Fragment)>>;

    fn client(net: &FakeConnector, config: MailConfig) -> Client {
        let mut c = MailRetrievalClient::new(net.clone(), vec![], config, None).unwrap();
        c.configure("pop.test", 110, false).unwrap();
        c
    }

    fn run(client: &mut Client) -> MailStatus {
        for _ in 0..10_000 {
            let s = client.tick();
            if s != MailStatus::Pending {
                return s;
            }
        }
        panic!("retrieval did not finish");
    }

    fn mailbox() -> Pop3Server {
        Pop3Server::new("martin", "secret")
            .message("To: a@x.test\nFrom: b@y.test\nSubject: First\n\nHello\n")
            .message("From: c@z.test\nSubject: Second\nTo: a@x.test\n\n.dotted\nbye\n")
    }

    #[test]
    fn two_messages_kept_on_server() {
        let net = FakeConnector::new();
        let server = mailbox();
        net.serve_pop3("pop.test", 110, server.clone());

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("martin", "secret", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::Success);
        assert_eq!(c.state(), MailState::Done(MailStatus::Success));
        assert!(c.last_error().is_none());
        assert_eq!(c.session().message_count(), 2);
        assert_eq!(c.session().retrieved(), 2);

        assert_eq!(
            c.sink(),
            &vec![
                (1, Fragment::Start),
                (1, Fragment::To("a@x.test".into())),
                (1, Fragment::From("b@y.test".into())),
                (1, Fragment::Subject("First".into())),
                (1, Fragment::Body(b"Hello\r\n".to_vec())),
                (1, Fragment::End),
                (2, Fragment::Start),
                (2, Fragment::To("a@x.test".into())),
                (2, Fragment::From("c@z.test".into())),
                (2, Fragment::Subject("Second".into())),
                (2, Fragment::Body(b".dotted\r\n".to_vec())),
                (2, Fragment::Body(b"bye\r\n".to_vec())),
                (2, Fragment::End),
            ]
        );

        assert_eq!(server.remaining(), 2);
        assert_eq!(
            server.commands(),
            vec!["USER martin", "PASS secret", "STAT", "RETR 1", "RETR 2", "QUIT"]
        );
        assert!(net.all_closed());

        // Terminal status is sticky.
        assert_eq!(c.tick(), MailStatus::Success);
    }

    #[test]
    fn connection_still_coming_up() {
        let net = FakeConnector::new();
        net.set_handshake_polls(4);
        net.serve_pop3("pop.test", 110, mailbox());

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("martin", "secret", false).unwrap();

        assert_eq!(c.tick(), MailStatus::Pending);
        for _ in 0..4 {
            assert_eq!(c.tick(), MailStatus::Pending);
            assert_eq!(c.state(), MailState::Greeting);
        }

        assert_eq!(run(&mut c), MailStatus::Success);
        assert_eq!(c.session().retrieved(), 2);
    }

    #[test]
    fn delete_after_read() {
        let net = FakeConnector::new();
        let server = mailbox();
        net.serve_pop3("pop.test", 110, server.clone());

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("martin", "secret", true).unwrap();

        assert_eq!(run(&mut c), MailStatus::Success);
        assert_eq!(c.session().deleted(), 2);
        assert_eq!(server.remaining(), 0);
        assert_eq!(
            server.commands(),
            vec!["USER martin", "PASS secret", "STAT", "RETR 1", "DELE 1", "RETR 2", "DELE 2", "QUIT"]
        );
    }

    #[test]
    fn raw_fragments_without_extended_parse() {
        let net = FakeConnector::new();
        net.serve_pop3(
            "pop.test",
            110,
            Pop3Server::new("u", "p").message("Subject: x\n\n.line\n"),
        );

        let config = MailConfig {
            extended_parse: false,
            ..Default::default()
        };
        let mut c = client(&net, config);
        c.start_retrieval("u", "p", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::Success);
        assert_eq!(
            c.sink(),
            &vec![
                (1, Fragment::Start),
                (1, Fragment::Raw(b"Subject: x\r\n".to_vec())),
                (1, Fragment::Raw(b"\r\n".to_vec())),
                (1, Fragment::Raw(b".line\r\n".to_vec())),
                (1, Fragment::End),
            ]
        );
    }

    #[test]
    fn empty_mailbox() {
        let net = FakeConnector::new();
        let server = Pop3Server::new("u", "p");
        net.serve_pop3("pop.test", 110, server.clone());

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("u", "p", true).unwrap();

        assert_eq!(run(&mut c), MailStatus::Success);
        assert!(c.sink().is_empty());
        assert_eq!(server.commands(), vec!["USER u", "PASS p", "STAT", "QUIT"]);
    }

    #[test]
    fn one_byte_reads() {
        let net = FakeConnector::new();
        net.serve_pop3("pop.test", 110, mailbox().read_limit(1));
        net.set_write_limit(2);

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("martin", "secret", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::Success);
        assert_eq!(c.sink().len(), 13);
    }

    #[test]
    fn folded_subject() {
        let net = FakeConnector::new();
        net.serve_pop3(
            "pop.test",
            110,
            Pop3Server::new("u", "p").message("Subject: very\n long\nTo: me\n\nx\n"),
        );

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("u", "p", false).unwrap();
        run(&mut c);

        assert!(c
            .sink()
            .contains(&(1, Fragment::Subject("very long".into()))));
    }

    #[test]
    fn wrong_password() {
        let net = FakeConnector::new();
        let server = mailbox();
        net.serve_pop3("pop.test", 110, server.clone());

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("martin", "wrong", true).unwrap();

        assert_eq!(run(&mut c), MailStatus::TransportError);
        assert_eq!(
            c.last_error(),
            Some(&Error::ServerRejected("login: invalid login".into()))
        );
        assert_eq!(server.remaining(), 2);
        assert!(net.all_closed());
    }

    #[test]
    fn bad_greeting() {
        let net = FakeConnector::new();
        net.serve("pop.test", 110, HttpResponse::raw(b"-ERR busy\r\n"));

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("u", "p", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::TransportError);
        assert_eq!(
            c.last_error(),
            Some(&Error::ServerRejected("greeting: busy".into()))
        );
    }

    #[test]
    fn peer_closes_mid_session() {
        let net = FakeConnector::new();
        net.serve("pop.test", 110, HttpResponse::raw(b"+OK ready\r\n"));

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("u", "p", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::TransportError);
        assert_eq!(c.last_error(), Some(&Error::TransportClosed));
    }

    #[test]
    fn silent_server_pending_then_timeout() {
        let net = FakeConnector::new();
        net.serve("pop.test", 110, HttpResponse::silent());

        let config = MailConfig {
            timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let mut c = client(&net, config);
        c.start_retrieval("u", "p", false).unwrap();

        let start = Instant::now();
        // Connect
        assert_eq!(c.tick_at(start), MailStatus::Pending);
        assert_eq!(c.state(), MailState::Greeting);

        for s in 1..10 {
            assert_eq!(
                c.tick_at(start + Duration::from_secs(s)),
                MailStatus::Pending
            );
            assert_eq!(c.state(), MailState::Greeting);
        }
        assert!(c.sink().is_empty());
        assert_eq!(net.connects().len(), 1);

        assert_eq!(
            c.tick_at(start + Duration::from_secs(11)),
            MailStatus::Timeout
        );
        assert_eq!(c.last_error(), Some(&Error::Timeout));
        assert!(net.all_closed());
    }

    #[test]
    fn resolution_error() {
        let net = FakeConnector::new();
        net.unresolvable("pop.test");

        let mut c = client(&net, MailConfig::default());
        c.start_retrieval("u", "p", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::ResolutionError);
        assert_eq!(
            c.last_error().map(|e| e.kind()),
            Some(ErrorKind::ResolutionError)
        );
    }

    #[test]
    fn usage_errors() {
        let net = FakeConnector::new();
        net.serve("pop.test", 110, HttpResponse::silent());

        let mut c = MailRetrievalClient::new(net.clone(), vec![], MailConfig::default(), None)
            .unwrap();

        assert_eq!(c.tick(), MailStatus::TransportError);
        assert_eq!(c.last_error(), Some(&Error::NotStarted));

        assert!(c.start_retrieval("u", "p", false).is_err());

        c.configure("pop.test", 995, true).unwrap();
        assert_eq!(
            c.start_retrieval("u", "p", false),
            Err(Error::InvalidConfig("use_tls without TlsSettings"))
        );

        c.configure("pop.test", 110, false).unwrap();
        c.start_retrieval("u", "p", false).unwrap();
        assert_eq!(c.configure("other.test", 110, false), Err(Error::AlreadyStarted));
        assert_eq!(c.start_retrieval("u", "p", false), Err(Error::AlreadyStarted));

        c.close();
        assert_eq!(c.tick(), MailStatus::TransportError);
        assert_eq!(c.last_error(), Some(&Error::TransportClosed));
    }

    fn tls_settings() -> TlsSettings {
        let mut store = TrustStore::new();
        store.append(&[0x30, 0x03, 0x02, 0x01, 0x05]).unwrap();
        TlsSettings::new(Arc::new(store))
    }

    #[test]
    fn pop3s() {
        let net = FakeConnector::new();
        net.serve_pop3("pop.test", 995, mailbox());

        let mut c = MailRetrievalClient::new(
            net.clone(),
            vec![],
            MailConfig::default(),
            Some(tls_settings()),
        )
        .unwrap();
        c.configure("pop.test", 995, true).unwrap();
        c.start_retrieval("martin", "secret", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::Success);
        assert!(net.connects()[0].use_tls());
    }

    #[test]
    fn pop3s_rejected_certificate() {
        let net = FakeConnector::new();
        net.serve_pop3("pop.test", 995, mailbox());
        net.present_certificate(Certificate::new(
            DistinguishedName::with_common_name("Test CA"),
            DistinguishedName::with_common_name("mail.other.test"),
        ));

        let mut c = MailRetrievalClient::new(
            net.clone(),
            vec![],
            MailConfig::default(),
            Some(tls_settings()),
        )
        .unwrap();
        c.configure("pop.test", 995, true).unwrap();
        c.start_retrieval("martin", "secret", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::TransportError);
        assert_eq!(
            c.last_error().map(|e| e.kind()),
            Some(ErrorKind::CertificateRejected)
        );
        assert!(c.sink().is_empty());
    }

    #[test]
    fn untrusted_chain_rejected_by_default() {
        let net = FakeConnector::new();
        net.serve_pop3("pop.test", 995, mailbox());
        net.chain_trusted(false);

        let mut c = MailRetrievalClient::new(
            net.clone(),
            vec![],
            MailConfig::default(),
            Some(tls_settings()),
        )
        .unwrap();
        c.configure("pop.test", 995, true).unwrap();
        c.start_retrieval("martin", "secret", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::TransportError);

        let lenient = tls_settings().require_trusted_chain(false);
        let mut c =
            MailRetrievalClient::new(net.clone(), vec![], MailConfig::default(), Some(lenient))
                .unwrap();
        c.configure("pop.test", 995, true).unwrap();
        c.start_retrieval("martin", "secret", false).unwrap();

        assert_eq!(run(&mut c), MailStatus::Success);
    }
}

//! Scripted in-memory network for tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::transport::{ConnectError, Connector, Endpoint, ReadOutcome, Transport, TransportError};
use crate::trust::{Certificate, DistinguishedName, TlsSettings};

/// A canned HTTP response, served to one connection.
#[derive(Debug, Clone)]
pub(crate) struct HttpResponse {
    data: Option<Vec<u8>>,
    read_limit: usize,
    stall: bool,
}

impl HttpResponse {
    pub fn raw(data: &[u8]) -> Self {
        HttpResponse {
            data: Some(data.to_vec()),
            read_limit: usize::MAX,
            stall: false,
        }
    }

    /// The peer never sends anything, and never closes.
    pub fn silent() -> Self {
        HttpResponse {
            data: None,
            read_limit: usize::MAX,
            stall: false,
        }
    }

    pub fn read_limit(mut self, n: usize) -> Self {
        self.read_limit = n;
        self
    }

    /// Every other read is a `WouldBlock`.
    pub fn stall_between_reads(mut self) -> Self {
        self.stall = true;
        self
    }
}

#[derive(Debug)]
enum Service {
    Http(VecDeque<HttpResponse>),
    Pop3(Pop3Server),
}

#[derive(Debug, Default)]
struct NetState {
    services: HashMap<(String, u16), Service>,
    unresolvable: Vec<String>,
    certificate: Option<Certificate>,
    chain_trusted: bool,
    write_limit: Option<usize>,
    handshake_polls: usize,
    connects: Vec<Endpoint>,
    written: Vec<Vec<u8>>,
    open: Vec<bool>,
}

/// Connector over scripted peers. Clones share state.
#[derive(Debug, Clone)]
pub(crate) struct FakeConnector {
    state: Rc<RefCell<NetState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        let state = NetState {
            chain_trusted: true,
            ..Default::default()
        };
        FakeConnector {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Queue a response for the next connection to host:port.
    pub fn serve(&self, host: &str, port: u16, response: HttpResponse) {
        let mut state = self.state.borrow_mut();
        let service = state
            .services
            .entry((host.to_string(), port))
            .or_insert_with(|| Service::Http(VecDeque::new()));
        if let Service::Http(q) = service {
            q.push_back(response);
        }
    }

    pub fn serve_pop3(&self, host: &str, port: u16, server: Pop3Server) {
        self.state
            .borrow_mut()
            .services
            .insert((host.to_string(), port), Service::Pop3(server));
    }

    pub fn unresolvable(&self, host: &str) {
        self.state.borrow_mut().unresolvable.push(host.to_string());
    }

    /// Certificate shown in TLS handshakes, instead of one matching the host.
    pub fn present_certificate(&self, certificate: Certificate) {
        self.state.borrow_mut().certificate = Some(certificate);
    }

    pub fn chain_trusted(&self, v: bool) {
        self.state.borrow_mut().chain_trusted = v;
    }

    /// Reads and writes that find the stream still being set up, per connection.
    pub fn set_handshake_polls(&self, n: usize) {
        self.state.borrow_mut().handshake_polls = n;
    }

    /// Max bytes accepted per write.
    pub fn set_write_limit(&self, n: usize) {
        self.state.borrow_mut().write_limit = Some(n);
    }

    pub fn connects(&self) -> Vec<Endpoint> {
        self.state.borrow().connects.clone()
    }

    /// Bytes written per connection, as text.
    pub fn requests(&self) -> Vec<String> {
        self.state
            .borrow()
            .written
            .iter()
            .map(|w| String::from_utf8_lossy(w).to_string())
            .collect()
    }

    pub fn all_closed(&self) -> bool {
        self.state.borrow().open.iter().all(|o| !o)
    }
}

impl Connector for FakeConnector {
    type Transport = FakeTransport;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        tls: Option<&TlsSettings>,
    ) -> Result<FakeTransport, ConnectError> {
        let mut state = self.state.borrow_mut();
        state.connects.push(endpoint.clone());

        if state.unresolvable.iter().any(|h| h == endpoint.host()) {
            return Err(ConnectError::Resolve(endpoint.host().to_string()));
        }

        let key = (endpoint.host().to_string(), endpoint.port());
        let peer = match state.services.get_mut(&key) {
            Some(Service::Http(q)) => match q.pop_front() {
                Some(r) => Peer::Http {
                    data: r.data.map(VecDeque::from),
                    read_limit: r.read_limit,
                    stall: r.stall,
                    stalled: false,
                },
                None => return Err(ConnectError::Io("connection refused".into())),
            },
            Some(Service::Pop3(server)) => Peer::Pop3(server.session()),
            None => return Err(ConnectError::Io("connection refused".into())),
        };

        if let Some(tls) = tls {
            let certificate = state.certificate.clone().unwrap_or_else(|| {
                Certificate::new(
                    DistinguishedName::with_common_name("Test CA"),
                    DistinguishedName::with_common_name(endpoint.host()),
                )
            });
            let record = tls.check_peer(state.chain_trusted, &certificate, endpoint.host());
            if !record.is_accepted() {
                return Err(ConnectError::CertificateRejected(record.to_string()));
            }
        }

        let id = state.written.len();
        state.written.push(vec![]);
        state.open.push(true);

        Ok(FakeTransport {
            net: self.state.clone(),
            id,
            peer,
            handshake: state.handshake_polls,
            closed: false,
        })
    }
}

#[derive(Debug)]
enum Peer {
    Http {
        data: Option<VecDeque<u8>>,
        read_limit: usize,
        stall: bool,
        stalled: bool,
    },
    Pop3(Pop3Session),
}

#[derive(Debug)]
pub(crate) struct FakeTransport {
    net: Rc<RefCell<NetState>>,
    id: usize,
    peer: Peer,
    handshake: usize,
    closed: bool,
}

impl Transport for FakeTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.handshake > 0 {
            self.handshake -= 1;
            return Ok(ReadOutcome::WouldBlock);
        }

        let (data, limit) = match &mut self.peer {
            Peer::Http {
                data,
                read_limit,
                stall,
                stalled,
            } => {
                let Some(data) = data else {
                    return Ok(ReadOutcome::WouldBlock);
                };
                if *stall {
                    *stalled = !*stalled;
                    if *stalled {
                        return Ok(ReadOutcome::WouldBlock);
                    }
                }
                if data.is_empty() {
                    return Ok(ReadOutcome::Closed);
                }
                (data, *read_limit)
            }
            Peer::Pop3(session) => {
                if session.output.is_empty() {
                    return Ok(if session.quit {
                        ReadOutcome::Closed
                    } else {
                        ReadOutcome::WouldBlock
                    });
                }
                let limit = session.server.0.borrow().read_limit;
                (&mut session.output, limit)
            }
        };

        let n = buf.len().min(limit).min(data.len());
        for (i, b) in data.drain(..n).enumerate() {
            buf[i] = b;
        }
        Ok(ReadOutcome::Data(n))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.handshake > 0 {
            self.handshake -= 1;
            return Ok(0);
        }

        let mut net = self.net.borrow_mut();
        let n = buf.len().min(net.write_limit.unwrap_or(usize::MAX));
        net.written[self.id].extend_from_slice(&buf[..n]);
        drop(net);

        if let Peer::Pop3(session) = &mut self.peer {
            session.receive(&buf[..n]);
        }

        Ok(n)
    }

    fn close(&mut self) {
        self.closed = true;
        self.net.borrow_mut().open[self.id] = false;
    }
}

#[derive(Debug)]
struct Maildrop {
    user: String,
    password: String,
    messages: Vec<Vec<u8>>,
    commands: Vec<String>,
    read_limit: usize,
}

/// A POP3 server with a single mailbox. Clones share the mailbox.
#[derive(Debug, Clone)]
pub(crate) struct Pop3Server(Rc<RefCell<Maildrop>>);

impl Pop3Server {
    pub fn new(user: &str, password: &str) -> Self {
        Pop3Server(Rc::new(RefCell::new(Maildrop {
            user: user.to_string(),
            password: password.to_string(),
            messages: vec![],
            commands: vec![],
            read_limit: usize::MAX,
        })))
    }

    /// Add a message, `\n` line endings are turned into CRLF.
    pub fn message(self, text: &str) -> Self {
        let mut m = text.replace("\r\n", "\n").replace('\n', "\r\n");
        if !m.ends_with("\r\n") {
            m.push_str("\r\n");
        }
        self.0.borrow_mut().messages.push(m.into_bytes());
        self
    }

    pub fn read_limit(self, n: usize) -> Self {
        self.0.borrow_mut().read_limit = n;
        self
    }

    /// Messages still in the mailbox.
    pub fn remaining(&self) -> usize {
        self.0.borrow().messages.len()
    }

    /// Command lines received, passwords included.
    pub fn commands(&self) -> Vec<String> {
        self.0.borrow().commands.clone()
    }

    fn session(&self) -> Pop3Session {
        Pop3Session {
            server: self.clone(),
            input: vec![],
            output: b"+OK POP3 server ready\r\n".iter().copied().collect(),
            user: None,
            authorized: false,
            deleted: vec![],
            quit: false,
        }
    }
}

#[derive(Debug)]
struct Pop3Session {
    server: Pop3Server,
    input: Vec<u8>,
    output: VecDeque<u8>,
    user: Option<String>,
    authorized: bool,
    deleted: Vec<usize>,
    quit: bool,
}

impl Pop3Session {
    fn receive(&mut self, data: &[u8]) {
        self.input.extend_from_slice(data);
        while let Some(pos) = self.input.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.input.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim_end().to_string();
            self.server.0.borrow_mut().commands.push(line.clone());
            let reply = self.command(&line);
            self.output.extend(reply);
        }
    }

    fn command(&mut self, line: &str) -> Vec<u8> {
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let mut mbox = self.server.0.borrow_mut();

        let reply = match (cmd.to_ascii_uppercase().as_str(), self.authorized) {
            ("USER", false) => {
                self.user = Some(arg.to_string());
                "+OK".to_string()
            }
            ("PASS", false) => {
                if self.user.as_deref() == Some(mbox.user.as_str()) && arg == mbox.password {
                    self.authorized = true;
                    "+OK maildrop locked".to_string()
                } else {
                    "-ERR invalid login".to_string()
                }
            }
            ("STAT", true) => {
                let live: Vec<_> = (0..mbox.messages.len())
                    .filter(|i| !self.deleted.contains(i))
                    .collect();
                let size: usize = live.iter().map(|i| mbox.messages[*i].len()).sum();
                format!("+OK {} {}", live.len(), size)
            }
            ("RETR", true) => match self.index(arg, mbox.messages.len()) {
                Some(i) => {
                    let msg = &mbox.messages[i];
                    let mut out = format!("+OK {} octets\r\n", msg.len()).into_bytes();
                    for line in msg.split_inclusive(|b| *b == b'\n') {
                        if line.starts_with(b".") {
                            out.push(b'.');
                        }
                        out.extend_from_slice(line);
                    }
                    out.extend_from_slice(b".\r\n");
                    return out;
                }
                None => "-ERR no such message".to_string(),
            },
            ("DELE", true) => match self.index(arg, mbox.messages.len()) {
                Some(i) => {
                    self.deleted.push(i);
                    format!("+OK message {} deleted", i + 1)
                }
                None => "-ERR no such message".to_string(),
            },
            ("QUIT", _) => {
                self.quit = true;
                let mut i = 0;
                mbox.messages.retain(|_| {
                    let keep = !self.deleted.contains(&i);
                    i += 1;
                    keep
                });
                "+OK bye".to_string()
            }
            _ => "-ERR unknown command".to_string(),
        };

        format!("{}\r\n", reply).into_bytes()
    }

    fn index(&self, arg: &str, len: usize) -> Option<usize> {
        let n: usize = arg.trim().parse().ok()?;
        (n >= 1 && n <= len && !self.deleted.contains(&(n - 1))).then(|| n - 1)
    }
}

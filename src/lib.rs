//! Poll-driven application protocol clients over a pluggable, TLS-capable transport.
//!
//! tick-proto provides two client state machines that never block:
//!
//! * [`agent::HttpClient`] fetches a URL over HTTP or HTTPS, following redirects,
//!   decoding `transfer-encoding: chunked` and reporting server clock skew.
//!   It is a thin driver on top of the Sans-IO [`client::Flow`] typestate machine.
//! * [`pop3::MailRetrievalClient`] downloads (and optionally deletes) all messages
//!   in a POP3 mailbox, optionally splitting each message into `To`, `From`,
//!   `Subject` and body fragments.
//!
//! Both are driven by the caller with repeated calls to `advance()` / `tick()`.
//! Each call does one bounded unit of protocol work and returns immediately when
//! the transport has nothing to offer.
//!
//! Opening sockets, name resolution and the TLS handshake itself are delegated to a
//! [`Connector`](transport::Connector). The engine hands the connector the
//! [`TlsSettings`](trust::TlsSettings) that the TLS layer must consult when it
//! receives the peer certificate, see [`trust`].
//!
//! ```
//! use std::sync::Arc;
//! use tick_proto::trust::{TlsSettings, TrustStore};
//!
//! // Trust anchors are parsed once at startup...
//! let store = TrustStore::new();
//!
//! // ...then frozen inside the settings shared by all sessions.
//! let settings = TlsSettings::new(Arc::new(store)).require_trusted_chain(false);
//! assert!(settings.validate().is_ok());
//! ```
//!
//! # In scope:
//!
//! * HTTP/1.1 GET with redirects, chunked, length and close delimited bodies
//! * POP3 USER/PASS, STAT, RETR, DELE, QUIT
//! * Certificate trust decisions and hostname matching
//! * Clock skew estimation from the `Date` header
//!
//! # Out of scope:
//!
//! * Opening/closing sockets, DNS
//! * TLS cryptography and X.509 decoding
//! * Servers
//! * More than one connection per state machine

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::uninlined_format_args)]
#![deny(missing_docs)]

#[macro_use]
extern crate log;

mod error;
pub use error::{Error, ErrorKind};

mod body;
pub use body::BodyMode;

mod ext;
mod parser;
mod util;

pub mod config;
pub mod skew;
pub mod transport;
pub mod trust;
pub mod url;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "client")]
pub mod agent;

#[cfg(feature = "pop3")]
pub mod pop3;

#[cfg(test)]
mod fake;

pub use http;

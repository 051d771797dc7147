#![no_main]

use libfuzzer_sys::fuzz_target;
use tick_proto::config::MailConfig;
use tick_proto::pop3::{Fragment, MailRetrievalClient, MailStatus};
use tick_proto::transport::{
    ConnectError, Connector, Endpoint, ReadOutcome, Transport, TransportError,
};
use tick_proto::trust::TlsSettings;

/// Replays the fuzz input as everything the server says.
struct Replay<'a>(&'a [u8]);

struct ReplayTransport<'a>(&'a [u8]);

impl<'a> Connector for Replay<'a> {
    type Transport = ReplayTransport<'a>;

    fn connect(
        &mut self,
        _: &Endpoint,
        _: Option<&TlsSettings>,
    ) -> Result<Self::Transport, ConnectError> {
        Ok(ReplayTransport(self.0))
    }
}

impl<'a> Transport for ReplayTransport<'a> {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        if self.0.is_empty() {
            return Ok(ReadOutcome::Closed);
        }
        let n = buf.len().min(self.0.len());
        buf[..n].copy_from_slice(&self.0[..n]);
        self.0 = &self.0[n..];
        Ok(ReadOutcome::Data(n))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        Ok(buf.len())
    }

    fn close(&mut self) {}
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let config = MailConfig {
        extended_parse: data[0] % 2 == 0,
        read_chunk_size: (data[0] as usize % 32) + 1,
        ..Default::default()
    };

    let sink: Vec<(u32, Fragment)> = Vec::new();
    let Ok(mut client) = MailRetrievalClient::new(Replay(&data[1..]), sink, config, None) else {
        return;
    };

    if client.configure("pop.test", 110, false).is_err() {
        return;
    }
    if client.start_retrieval("user", "pass", data[0] % 3 == 0).is_err() {
        return;
    }

    for _ in 0..(data.len() * 4 + 64) * 8 {
        if client.tick() != MailStatus::Pending {
            return;
        }
    }
});

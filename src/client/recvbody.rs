use http::StatusCode;

use crate::body::{BodyMode, BodyReader};
use crate::Error;

use super::state::{Cleanup, RecvBody};
use super::Flow;

static NO_BODY: BodyReader = BodyReader::NoBody;

impl Flow<RecvBody> {
    /// Decode body bytes from `input` into `output`.
    ///
    /// Returns `(consumed, produced)`. Chunk framing is stripped, so a chunked
    /// body produces fewer bytes than it consumes.
    pub fn read(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize), Error> {
        let stop = self.inner.stop_on_chunk_boundary;
        let rbm = self.reader_mut();

        if rbm.is_ended() {
            return Ok((0, 0));
        }

        rbm.read(input, output, stop)
    }

    /// Make each `read()` return at most one chunk's payload.
    ///
    /// Off by default, in which case `output` is filled as far as the input allows.
    /// Ignored for bodies that are not chunked.
    pub fn stop_on_chunk_boundary(&mut self, enabled: bool) {
        self.inner.stop_on_chunk_boundary = enabled;
    }

    /// Whether the last read ended exactly between two chunks.
    pub fn is_on_chunk_boundary(&self) -> bool {
        self.reader().is_on_chunk_boundary()
    }

    /// How the body is delimited.
    pub fn body_mode(&self) -> BodyMode {
        self.reader().body_mode()
    }

    /// The response status.
    pub fn status(&self) -> Option<StatusCode> {
        self.inner.head.status
    }

    /// Whether `proceed()` would succeed.
    ///
    /// True once the framing says the body is complete, and always for a body that
    /// runs to connection close.
    pub fn can_proceed(&self) -> bool {
        self.reader().is_ended() || self.is_close_delimited()
    }

    /// Tell if the body framing says the body is complete.
    ///
    /// Never true for a close delimited body.
    pub fn is_ended(&self) -> bool {
        self.reader().is_ended()
    }

    /// The peer closed the connection.
    ///
    /// `Ok` if that is a valid end of the body. For a chunked or length
    /// delimited body that is not yet complete, this is an `UnexpectedEof`.
    pub fn end_of_input(&self) -> Result<(), Error> {
        self.reader().check_end_of_stream()
    }

    // No length and no chunking: the body runs until the peer closes.
    fn is_close_delimited(&self) -> bool {
        matches!(self.reader(), BodyReader::CloseDelimited)
    }

    fn reader(&self) -> &BodyReader {
        // RecvBody is only entered with a reader set.
        self.inner.reader.as_ref().unwrap_or(&NO_BODY)
    }

    fn reader_mut(&mut self) -> &mut BodyReader {
        self.inner.reader.get_or_insert(BodyReader::NoBody)
    }

    /// Move on to `Cleanup`, or `None` while body bytes are still outstanding.
    pub fn proceed(self) -> Option<Flow<Cleanup>> {
        if !self.can_proceed() {
            return None;
        }

        Some(Flow::wrap(self.inner))
    }
}

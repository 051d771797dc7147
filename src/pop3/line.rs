use crate::util::{find_line_end, log_data, trim_eol};
use crate::Error;

/// Received bytes, handed out one line at a time.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
    max_line_len: usize,
}

impl LineBuffer {
    pub fn new(max_line_len: usize) -> Self {
        LineBuffer {
            buf: Vec::new(),
            max_line_len,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// The next complete line, without its line ending.
    pub fn next_line(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let Some(end) = find_line_end(&self.buf) else {
            if self.buf.len() > self.max_line_len + 2 {
                return Err(Error::BadServerResponse(format!(
                    "line longer than {} bytes",
                    self.max_line_len
                )));
            }
            return Ok(None);
        };

        let line: Vec<u8> = self.buf.drain(..=end).collect();
        log_data(&line);

        let line = trim_eol(&line);
        if line.len() > self.max_line_len {
            return Err(Error::BadServerResponse(format!(
                "line longer than {} bytes",
                self.max_line_len
            )));
        }

        Ok(Some(line.to_vec()))
    }
}

/// A status response, `+OK` or `-ERR` with the rest of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    Ok(String),
    Err(String),
}

pub(crate) fn parse_reply(line: &[u8]) -> Result<Reply, Error> {
    let text = String::from_utf8_lossy(line);

    // The indicator is a whole word, `+OKAY` is not `+OK`.
    let rest = |indicator: &str| {
        let rest = text.strip_prefix(indicator)?;
        match rest.chars().next() {
            None => Some(String::new()),
            Some(' ' | '\t') => Some(rest.trim_start().to_string()),
            Some(_) => None,
        }
    };

    if let Some(v) = rest("+OK") {
        Ok(Reply::Ok(v))
    } else if let Some(v) = rest("-ERR") {
        Ok(Reply::Err(v))
    } else {
        Err(Error::BadServerResponse(text.to_string()))
    }
}

/// Message count and mailbox size from the text of a STAT reply.
pub(crate) fn parse_stat(text: &str) -> Result<(u32, u64), Error> {
    let mut parts = text.split_ascii_whitespace();

    let count = parts.next().and_then(|v| v.parse().ok());
    let size = parts.next().and_then(|v| v.parse().ok());

    match (count, size) {
        (Some(c), Some(s)) => Ok((c, s)),
        _ => Err(Error::BadServerResponse(format!("STAT: {}", text))),
    }
}

/// Undo dot-stuffing of one line of a multi-line response.
///
/// `None` for the terminating `.` line.
pub(crate) fn unstuff(line: &[u8]) -> Option<&[u8]> {
    if line == b"." {
        return None;
    }
    Some(line.strip_prefix(b".").unwrap_or(line))
}

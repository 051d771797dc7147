use http::{header, HeaderMap, StatusCode};

use crate::ext::{HeaderIterExt, StatusExt};
use crate::util::find_line_end;
use crate::Error;

/// Longest chunk size line (including extensions) we accept.
const MAX_CHUNK_LINE: usize = 4096;

/// Kind of body framing of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// The response has no body (HEAD-like statuses, `content-length: 0`).
    NoBody,
    /// The body is exactly this many bytes.
    LengthDelimited(u64),
    /// `transfer-encoding: chunked`
    Chunked,
    /// The body ends when the server closes the connection.
    CloseDelimited,
}

impl BodyMode {
    /// Declared body length, if known upfront.
    pub fn declared_len(&self) -> Option<u64> {
        match self {
            BodyMode::NoBody => Some(0),
            BodyMode::LengthDelimited(n) => Some(*n),
            BodyMode::Chunked | BodyMode::CloseDelimited => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum BodyReader {
    NoBody,
    LengthDelimited(u64),
    Chunked(Dechunker),
    CloseDelimited,
}

impl BodyReader {
    /// Figure out the body framing from the status and headers of a response.
    pub fn for_response(
        http10: bool,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<BodyReader, Error> {
        if status.never_has_body() {
            return Ok(BodyReader::NoBody);
        }

        // transfer-encoding takes precedence over content-length. It is
        // not defined for HTTP/1.0.
        if !http10 && headers.iter().has_chunked() {
            return Ok(BodyReader::Chunked(Dechunker::new()));
        }

        if let Some(len) = content_length(headers)? {
            return Ok(if len == 0 {
                BodyReader::NoBody
            } else {
                BodyReader::LengthDelimited(len)
            });
        }

        Ok(BodyReader::CloseDelimited)
    }

    pub fn body_mode(&self) -> BodyMode {
        match self {
            BodyReader::NoBody => BodyMode::NoBody,
            BodyReader::LengthDelimited(n) => BodyMode::LengthDelimited(*n),
            BodyReader::Chunked(_) => BodyMode::Chunked,
            BodyReader::CloseDelimited => BodyMode::CloseDelimited,
        }
    }

    pub fn is_ended(&self) -> bool {
        match self {
            BodyReader::NoBody => true,
            BodyReader::LengthDelimited(left) => *left == 0,
            BodyReader::Chunked(v) => v.is_ended(),
            BodyReader::CloseDelimited => false,
        }
    }

    pub fn is_on_chunk_boundary(&self) -> bool {
        match self {
            BodyReader::Chunked(v) => v.is_on_chunk_boundary(),
            _ => false,
        }
    }

    /// Read body data from `input` into `output`.
    ///
    /// Returns `(input consumed, output used)`.
    pub fn read(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        stop_on_chunk_boundary: bool,
    ) -> Result<(usize, usize), Error> {
        match self {
            BodyReader::NoBody => Ok((0, 0)),
            BodyReader::LengthDelimited(left) => {
                let n = (*left).min(input.len() as u64).min(output.len() as u64) as usize;
                output[..n].copy_from_slice(&input[..n]);
                *left -= n as u64;
                Ok((n, n))
            }
            BodyReader::Chunked(v) => v.read(input, output, stop_on_chunk_boundary),
            BodyReader::CloseDelimited => {
                let n = input.len().min(output.len());
                output[..n].copy_from_slice(&input[..n]);
                Ok((n, n))
            }
        }
    }

    /// Check whether running out of input (the peer closed) is a valid end of body.
    pub fn check_end_of_stream(&self) -> Result<(), Error> {
        if self.is_ended() || matches!(self, BodyReader::CloseDelimited) {
            Ok(())
        } else {
            Err(Error::UnexpectedEof)
        }
    }
}

fn content_length(headers: &HeaderMap) -> Result<Option<u64>, Error> {
    let mut found: Option<u64> = None;

    for v in headers.get_all(header::CONTENT_LENGTH) {
        let len = v
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or(Error::BadContentLengthHeader)?;

        // Repeated identical values are tolerated.
        match found {
            Some(prev) if prev != len => return Err(Error::TooManyContentLengthHeaders),
            _ => found = Some(len),
        }
    }

    Ok(found)
}

/// Decoder for `transfer-encoding: chunked`.
#[derive(Debug)]
pub(crate) struct Dechunker {
    state: DechunkerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DechunkerState {
    Size,
    Data(u64),
    DataEnd,
    Trailer,
    Ended,
}

impl Dechunker {
    fn new() -> Self {
        Dechunker {
            state: DechunkerState::Size,
        }
    }

    fn is_ended(&self) -> bool {
        self.state == DechunkerState::Ended
    }

    fn is_on_chunk_boundary(&self) -> bool {
        matches!(self.state, DechunkerState::Size | DechunkerState::Ended)
    }

    fn read(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        stop_on_chunk_boundary: bool,
    ) -> Result<(usize, usize), Error> {
        let mut input_used = 0;
        let mut output_used = 0;

        loop {
            let rest = &input[input_used..];

            match self.state {
                DechunkerState::Size => {
                    let Some(end) = find_line_end(rest) else {
                        if rest.len() > MAX_CHUNK_LINE {
                            return Err(Error::ChunkExpectedCrLf);
                        }
                        break;
                    };

                    let len = parse_chunk_size(&rest[..end])?;
                    input_used += end + 1;

                    self.state = if len == 0 {
                        DechunkerState::Trailer
                    } else {
                        DechunkerState::Data(len)
                    };
                }

                DechunkerState::Data(left) => {
                    let free = output.len() - output_used;
                    let n = left.min(rest.len() as u64).min(free as u64) as usize;
                    if n == 0 {
                        break;
                    }

                    output[output_used..output_used + n].copy_from_slice(&rest[..n]);
                    input_used += n;
                    output_used += n;

                    self.state = if left == n as u64 {
                        DechunkerState::DataEnd
                    } else {
                        DechunkerState::Data(left - n as u64)
                    };
                }

                DechunkerState::DataEnd => {
                    let used = match rest {
                        [] | [b'\r'] => break,
                        [b'\r', b'\n', ..] => 2,
                        [b'\n', ..] => 1,
                        _ => return Err(Error::ChunkExpectedCrLf),
                    };
                    input_used += used;
                    self.state = DechunkerState::Size;

                    if stop_on_chunk_boundary {
                        break;
                    }
                }

                DechunkerState::Trailer => {
                    let Some(end) = find_line_end(rest) else {
                        if rest.len() > MAX_CHUNK_LINE {
                            return Err(Error::ChunkExpectedCrLf);
                        }
                        break;
                    };
                    let is_empty = matches!(&rest[..end], [] | [b'\r']);
                    input_used += end + 1;

                    if is_empty {
                        self.state = DechunkerState::Ended;
                    } else {
                        trace!("Skip chunked trailer");
                    }
                }

                DechunkerState::Ended => break,
            }
        }

        Ok((input_used, output_used))
    }
}

/// Parse a chunk size line (without the `\n`), e.g. `1a;ext=1\r`.
fn parse_chunk_size(line: &[u8]) -> Result<u64, Error> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    if !line.is_ascii() {
        return Err(Error::ChunkLenNotAscii);
    }

    let digits = line.iter().take_while(|b| b.is_ascii_hexdigit()).count();
    if digits == 0 || digits > 16 {
        return Err(Error::ChunkLenNotANumber);
    }

    // After the size, only whitespace or a chunk extension may follow.
    let after = &line[digits..];
    let after = match after.iter().position(|b| *b != b' ' && *b != b'\t') {
        Some(i) => &after[i..],
        None => &[][..],
    };
    if !after.is_empty() && after[0] != b';' {
        return Err(Error::ChunkExpectedCrLf);
    }

    // Ascii hex digits are valid utf-8.
    let hex = std::str::from_utf8(&line[..digits]).map_err(|_| Error::ChunkLenNotAscii)?;
    u64::from_str_radix(hex, 16).map_err(|_| Error::ChunkLenNotANumber)
}

/// Encode `data` as chunked transfer, splitting at `chunk_size`.
#[cfg(test)]
pub(crate) fn encode_chunked(data: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for c in data.chunks(chunk_size.max(1)) {
        out.extend_from_slice(format!("{:x}\r\n", c.len()).as_bytes());
        out.extend_from_slice(c);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

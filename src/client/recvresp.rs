use http::{header, HeaderMap, StatusCode, Version};

use crate::body::BodyReader;
use crate::config::MAX_HEADER_LINE;
use crate::ext::StatusExt;
use crate::parser::{parse_header_line, parse_status_line};
use crate::util::{find_line_end, log_data, trim_eol};
use crate::Error;

use super::state::RecvResponse;
use super::{Flow, RecvResponseResult, ResponseLine, MAX_RESPONSE_HEADERS};

impl Flow<RecvResponse> {
    /// Try reading one line of the response head from `input`.
    ///
    /// At most one line is consumed per call. If `input` does not hold a
    /// complete line, nothing is consumed and `(0, None)` is returned. The
    /// caller must then append more input and try again.
    ///
    /// Leading blank lines are skipped (also `(n, None)`). Interim 1xx
    /// responses, except 101, are consumed in full and reported as
    /// [`ResponseLine::Interim`] when their blank line arrives.
    ///
    /// The result `(usize, Option<ResponseLine>)` is `(input consumed, line)`.
    pub fn try_line(&mut self, input: &[u8]) -> Result<(usize, Option<ResponseLine>), Error> {
        let head = &mut self.inner.head;

        if head.complete {
            return Ok((0, None));
        }

        let Some(end) = find_line_end(input) else {
            if input.len() > MAX_HEADER_LINE {
                return Err(Error::HeaderLineTooLong);
            }
            return Ok((0, None));
        };

        let input_used = end + 1;
        if input_used > MAX_HEADER_LINE + 2 {
            return Err(Error::HeaderLineTooLong);
        }

        let line = &input[..input_used];
        log_data(line);

        let is_blank = trim_eol(line).is_empty();

        let Some(status) = head.status else {
            if is_blank {
                // Robustness, RFC 9112 2.2
                trace!("Skip blank line before status line");
                return Ok((input_used, None));
            }

            let (version, status) = parse_status_line(line)?;
            head.version = Some(version);
            head.status = Some(status);
            head.interim = status.is_interim();

            if head.interim {
                trace!("Skip interim response: {}", status);
                return Ok((input_used, None));
            }

            return Ok((input_used, Some(ResponseLine::Status(version, status))));
        };

        if head.interim {
            if is_blank {
                head.version = None;
                head.status = None;
                head.interim = false;
                return Ok((input_used, Some(ResponseLine::Interim(status))));
            }

            // Headers of an interim response are discarded.
            return Ok((input_used, None));
        }

        if is_blank {
            let http10 = head.version == Some(Version::HTTP_10);
            let reader = BodyReader::for_response(http10, status, &head.headers)?;

            head.complete = true;
            self.inner.location = head.headers.get(header::LOCATION).cloned();
            self.inner.reader = Some(reader);

            return Ok((input_used, Some(ResponseLine::End)));
        }

        if head.headers.len() >= MAX_RESPONSE_HEADERS {
            return Err(Error::TooManyResponseHeaders);
        }

        let (name, value) = parse_header_line(line)?;
        head.headers.append(name.clone(), value.clone());

        Ok((input_used, Some(ResponseLine::Header(name, value))))
    }

    /// The status of the final response, once its status line is read.
    pub fn status(&self) -> Option<StatusCode> {
        if self.inner.head.interim {
            return None;
        }
        self.inner.head.status
    }

    /// The version of the final response, once its status line is read.
    pub fn version(&self) -> Option<Version> {
        if self.inner.head.interim {
            return None;
        }
        self.inner.head.version
    }

    /// The headers received so far.
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.head.headers
    }

    /// Tell if the entire response head is read.
    pub fn can_proceed(&self) -> bool {
        self.inner.head.complete
    }

    /// Proceed to the next state.
    ///
    /// This returns `None` if we have not finished receiving the response head. It is guaranteed
    /// that if `can_proceed()` returns true, this will return `Some`.
    pub fn proceed(self) -> Option<RecvResponseResult> {
        if !self.can_proceed() {
            return None;
        }

        Some(if self.inner.is_redirect() {
            RecvResponseResult::Redirect(Flow::wrap(self.inner))
        } else if self.inner.need_response_body() {
            RecvResponseResult::RecvBody(Flow::wrap(self.inner))
        } else {
            RecvResponseResult::Cleanup(Flow::wrap(self.inner))
        })
    }
}

use http::{HeaderName, HeaderValue, StatusCode, Version};

use crate::util::trim_eol;
use crate::Error;

/// Parse a response status line such as `HTTP/1.1 200 OK\r\n`.
///
/// The line must be complete, including its line ending.
pub(crate) fn parse_status_line(line: &[u8]) -> Result<(Version, StatusCode), Error> {
    // No header slots. The line ends after the status line, which makes
    // httparse stop with Partial once it reaches the (absent) headers. At
    // that point version and code are already filled in.
    let mut headers = [httparse::EMPTY_HEADER; 0];
    let mut res = httparse::Response::new(&mut headers);

    match res.parse(line) {
        Ok(_) => {}
        // There is nothing after the line, so this should not happen.
        Err(httparse::Error::TooManyHeaders) => {}
        Err(e) => return Err(e.into()),
    }

    let (Some(version), Some(code)) = (res.version, res.code) else {
        return Err(Error::BadStatusLine(lossy(line)));
    };

    let version = match version {
        0 => Version::HTTP_10,
        1 => Version::HTTP_11,
        _ => return Err(Error::BadStatusLine(lossy(line))),
    };

    let status = StatusCode::from_u16(code).map_err(|_| Error::BadStatusLine(lossy(line)))?;

    Ok((version, status))
}

/// Parse a single `name: value` header line.
pub(crate) fn parse_header_line(line: &[u8]) -> Result<(HeaderName, HeaderValue), Error> {
    let line = trim_eol(line);

    if matches!(line.first(), Some(b' ') | Some(b'\t')) {
        return Err(Error::HttpParseFail(format!(
            "obsolete line folding: {}",
            lossy(line)
        )));
    }

    let Some(colon) = line.iter().position(|b| *b == b':') else {
        return Err(Error::HttpParseFail(format!(
            "header without colon: {}",
            lossy(line)
        )));
    };

    let name = HeaderName::from_bytes(&line[..colon])
        .map_err(|_| Error::HttpParseFail(format!("bad header name: {}", lossy(line))))?;

    let value = trim_ows(&line[colon + 1..]);
    let value = HeaderValue::from_bytes(value)
        .map_err(|_| Error::HttpParseFail(format!("bad header value: {}", lossy(line))))?;

    Ok((name, value))
}

fn trim_ows(mut v: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = v {
        v = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = v {
        v = rest;
    }
    v
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(trim_eol(line)).to_string()
}

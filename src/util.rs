use std::fmt;
use std::io::{self, Write};

use http::uri::Authority;

/// Writes into a fixed output buffer, one all-or-nothing piece at a time.
pub(crate) struct Writer<'a> {
    output: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(output: &'a mut [u8]) -> Writer<'a> {
        Writer { output, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    /// Run `f` against the free part of the buffer.
    ///
    /// If `f` fails, typically because the output is full, nothing is
    /// considered written and `false` is returned.
    pub fn try_write(&mut self, f: impl FnOnce(&mut Cursor<'_>) -> io::Result<()>) -> bool {
        let mut cursor = Cursor {
            buf: &mut self.output[self.pos..],
            pos: 0,
        };

        if f(&mut cursor).is_ok() {
            self.pos += cursor.pos;
            true
        } else {
            false
        }
    }
}

pub(crate) struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Write for Cursor<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let free = self.buf.len() - self.pos;
        if data.len() > free {
            return Err(io::ErrorKind::WriteZero.into());
        }
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Position of the first `\n` such that the line is `input[..=pos]`.
///
/// Bare `\n` line endings are accepted, callers trim a preceding `\r`.
pub(crate) fn find_line_end(input: &[u8]) -> Option<usize> {
    input.iter().position(|b| *b == b'\n')
}

/// Strip the trailing `\r\n` (or `\n`) of a line.
pub(crate) fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

pub(crate) trait AuthorityExt {
    fn userinfo(&self) -> Option<&str>;
    fn username(&self) -> Option<&str>;
    fn password(&self) -> Option<&str>;
}

// NB: Authority::as_str() retains the userinfo that host() strips.
impl AuthorityExt for Authority {
    fn userinfo(&self) -> Option<&str> {
        let s = self.as_str();
        s.rfind('@').map(|i| &s[..i])
    }

    fn username(&self) -> Option<&str> {
        self.userinfo()
            .map(|a| a.find(':').map(|i| &a[..i]).unwrap_or(a))
    }

    fn password(&self) -> Option<&str> {
        self.userinfo()
            .and_then(|a| a.find(':').map(|i| &a[i + 1..]))
    }
}

pub(crate) fn log_data(data: &[u8]) {
    for l in data.chunks(16) {
        trace!("{:?}", Row(l));
    }
}

struct Row<'a>(&'a [u8]);

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x} ", b)?;
        }
        for _ in self.0.len()..16 {
            write!(f, "   ")?;
        }
        for b in self.0 {
            let c = if b.is_ascii_graphic() || *b == b' ' {
                *b as char
            } else {
                '.'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_all_or_nothing() {
        let mut buf = [0_u8; 8];
        let mut w = Writer::new(&mut buf);

        assert!(w.try_write(|w| write!(w, "abcd")));
        assert!(!w.try_write(|w| write!(w, "efghij")));
        assert_eq!(w.len(), 4);

        assert!(w.try_write(|w| write!(w, "efgh")));
        assert_eq!(&buf, b"abcdefgh");
    }

    #[test]
    fn line_helpers() {
        assert_eq!(find_line_end(b"abc\r\ndef"), Some(4));
        assert_eq!(find_line_end(b"abc"), None);
        assert_eq!(trim_eol(b"abc\r\n"), b"abc");
        assert_eq!(trim_eol(b"abc\n"), b"abc");
        assert_eq!(trim_eol(b"abc"), b"abc");
    }

    #[test]
    fn authority_userinfo() {
        let a: Authority = "martin:secret@q.test:81".parse().unwrap();
        assert_eq!(a.username(), Some("martin"));
        assert_eq!(a.password(), Some("secret"));

        let a: Authority = "martin@q.test".parse().unwrap();
        assert_eq!(a.username(), Some("martin"));
        assert_eq!(a.password(), None);

        let a: Authority = "q.test".parse().unwrap();
        assert_eq!(a.userinfo(), None);
    }
}

use std::collections::VecDeque;

/// Unfolded `To`, `From` and `Subject` values are truncated to this.
const MAX_FIELD_LEN: usize = 8192;

/// A piece of a retrieved message, as delivered to a [`MailSink`](super::MailSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A new message begins.
    Start,
    /// The `To` header. Empty if the message has none.
    To(String),
    /// The `From` header. Empty if the message has none.
    From(String),
    /// The `Subject` header. Empty if the message has none.
    Subject(String),
    /// One body line, with CRLF.
    Body(Vec<u8>),
    /// One line of the unparsed message, with CRLF.
    Raw(Vec<u8>),
    /// The message is complete.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    To,
    From,
    Subject,
}

/// Splits a message, line by line, into fragments.
#[derive(Debug)]
pub(crate) struct MessageParser {
    extended: bool,
    index: u32,
    in_header: bool,
    /// Wanted header being unfolded. Other headers are never buffered.
    pending: Option<(Field, String)>,
    to: Option<String>,
    from: Option<String>,
    subject: Option<String>,
}

impl MessageParser {
    pub fn new(extended: bool) -> Self {
        MessageParser {
            extended,
            index: 0,
            in_header: false,
            pending: None,
            to: None,
            from: None,
            subject: None,
        }
    }

    pub fn begin(&mut self, index: u32, out: &mut VecDeque<(u32, Fragment)>) {
        self.index = index;
        self.in_header = self.extended;
        self.pending = None;
        self.to = None;
        self.from = None;
        self.subject = None;
        out.push_back((index, Fragment::Start));
    }

    /// One unstuffed line, without line ending.
    pub fn line(&mut self, line: &[u8], out: &mut VecDeque<(u32, Fragment)>) {
        if !self.extended {
            out.push_back((self.index, Fragment::Raw(with_crlf(line))));
            return;
        }

        if !self.in_header {
            out.push_back((self.index, Fragment::Body(with_crlf(line))));
            return;
        }

        if line.is_empty() {
            self.end_header(out);
            return;
        }

        let text = String::from_utf8_lossy(line);

        // RFC 5322 2.2.3 folding
        if line[0] == b' ' || line[0] == b'\t' {
            if let Some((_, value)) = &mut self.pending {
                push_capped(value, " ");
                push_capped(value, text.trim());
            }
            return;
        }

        self.take_pending();

        let Some((name, value)) = text.split_once(':') else {
            trace!("Skip malformed header line: {}", text);
            return;
        };

        let field = match name.trim().to_ascii_lowercase().as_str() {
            "to" => Field::To,
            "from" => Field::From,
            "subject" => Field::Subject,
            _ => return,
        };

        // First occurrence wins.
        if self.slot(field).is_some() {
            return;
        }

        let mut v = String::new();
        push_capped(&mut v, value.trim());
        self.pending = Some((field, v));
    }

    pub fn finish(&mut self, out: &mut VecDeque<(u32, Fragment)>) {
        if self.in_header {
            self.end_header(out);
        }
        out.push_back((self.index, Fragment::End));
    }

    fn end_header(&mut self, out: &mut VecDeque<(u32, Fragment)>) {
        self.take_pending();
        self.in_header = false;

        let i = self.index;
        out.push_back((i, Fragment::To(self.to.take().unwrap_or_default())));
        out.push_back((i, Fragment::From(self.from.take().unwrap_or_default())));
        out.push_back((i, Fragment::Subject(self.subject.take().unwrap_or_default())));
    }

    fn take_pending(&mut self) {
        if let Some((field, value)) = self.pending.take() {
            *self.slot(field) = Some(value.trim().to_string());
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::To => &mut self.to,
            Field::From => &mut self.from,
            Field::Subject => &mut self.subject,
        }
    }
}

fn push_capped(value: &mut String, part: &str) {
    let room = MAX_FIELD_LEN.saturating_sub(value.len());
    let mut end = part.len().min(room);
    while !part.is_char_boundary(end) {
        end -= 1;
    }
    value.push_str(&part[..end]);
}

fn with_crlf(line: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(line.len() + 2);
    v.extend_from_slice(line);
    v.extend_from_slice(b"\r\n");
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extended: bool, lines: &[&str]) -> Vec<Fragment> {
        let mut p = MessageParser::new(extended);
        let mut out = VecDeque::new();
        p.begin(3, &mut out);
        for l in lines {
            p.line(l.as_bytes(), &mut out);
        }
        p.finish(&mut out);
        assert!(out.iter().all(|(i, _)| *i == 3));
        out.into_iter().map(|(_, f)| f).collect()
    }

    #[test]
    fn header_fields_in_order() {
        let f = parse(
            true,
            &[
                "Subject: Hi",
                "From: b@y.test",
                "Received: somewhere",
                "To: a@x.test",
                "",
                "Hello",
                "",
            ],
        );
        assert_eq!(
            f,
            vec![
                Fragment::Start,
                Fragment::To("a@x.test".into()),
                Fragment::From("b@y.test".into()),
                Fragment::Subject("Hi".into()),
                Fragment::Body(b"Hello\r\n".to_vec()),
                Fragment::Body(b"\r\n".to_vec()),
                Fragment::End,
            ]
        );
    }

    #[test]
    fn folded_header() {
        let f = parse(true, &["subject: a long", "\tsubject line", " indeed", ""]);
        assert_eq!(f[3], Fragment::Subject("a long subject line indeed".into()));
    }

    #[test]
    fn missing_fields_and_no_body() {
        let f = parse(true, &["X-Other: 1"]);
        assert_eq!(
            f,
            vec![
                Fragment::Start,
                Fragment::To("".into()),
                Fragment::From("".into()),
                Fragment::Subject("".into()),
                Fragment::End,
            ]
        );
    }

    #[test]
    fn first_header_wins() {
        let f = parse(true, &["To: one", "To: two", ""]);
        assert_eq!(f[1], Fragment::To("one".into()));
    }

    #[test]
    fn endless_folding_is_bounded() {
        let filler = "x".repeat(900);
        let mut p = MessageParser::new(true);
        let mut out = VecDeque::new();
        p.begin(1, &mut out);

        p.line(b"X-Junk: a", &mut out);
        for _ in 0..10_000 {
            p.line(format!(" {}", filler).as_bytes(), &mut out);
            assert!(p.pending.is_none());
        }

        p.line(b"Subject: start", &mut out);
        for _ in 0..10_000 {
            p.line(format!("\t{}", filler).as_bytes(), &mut out);
        }
        let buffered = p.pending.as_ref().map(|(_, v)| v.len()).unwrap_or(0);
        assert_eq!(buffered, MAX_FIELD_LEN);

        p.line(b"", &mut out);
        p.finish(&mut out);

        let subject = out.iter().find_map(|(_, f)| match f {
            Fragment::Subject(v) => Some(v.clone()),
            _ => None,
        });
        let subject = subject.unwrap();
        assert_eq!(subject.len(), MAX_FIELD_LEN);
        assert!(subject.starts_with("start xxx"));
    }

    #[test]
    fn fold_after_empty_value() {
        let f = parse(true, &["Subject:", " later", ""]);
        assert_eq!(f[3], Fragment::Subject("later".into()));
    }

    #[test]
    fn raw_mode() {
        let f = parse(false, &["To: a", "", "body"]);
        assert_eq!(
            f,
            vec![
                Fragment::Start,
                Fragment::Raw(b"To: a\r\n".to_vec()),
                Fragment::Raw(b"\r\n".to_vec()),
                Fragment::Raw(b"body\r\n".to_vec()),
                Fragment::End,
            ]
        );
    }
}

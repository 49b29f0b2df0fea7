//! PII redaction for log output.
//!
//! Messages follow a `key=value<sep>key=value<sep>` convention. Values of the
//! configured keys are replaced with a fixed mask before a line leaves the
//! process. [`RedactingMakeWriter`] plugs this into `tracing_subscriber::fmt`.

use std::io::{self, Write};

use regex::Regex;
use tracing_subscriber::fmt::MakeWriter;

pub const REDACTION: &str = "***";
pub const SEPARATOR: char = ';';

// SGR colour sequence as written by `fmt` when ANSI output is on
const SGR: &str = r"\x1b\[[0-9;]*m";

// `stops` is character-class content: the characters that end a value.
fn build_pattern(fields: &[String], stops: &str) -> Option<Regex> {
    let names: Vec<String> = fields.iter().filter(|f| !f.is_empty()).map(|f| regex::escape(f)).collect();
    if names.is_empty() { return None; }
    // field must start the message or follow a separator/whitespace, so `username` never hits `name`
    let pat = format!(
        r"(?P<lead>^|[{stops}\s])(?P<pre>(?:{sgr})*)(?P<key>{keys})(?:{sgr})*=[^{stops}]+",
        stops = stops,
        sgr = SGR,
        keys = names.join("|")
    );
    Regex::new(&pat).ok()
}

/// Replace the value of every `field=value` in `message` with `redaction`.
/// A value runs up to the next `separator`.
pub fn filter_datum(fields: &[String], redaction: &str, message: &str, separator: char) -> String {
    let stops = format!(r"{}\r\n", regex::escape(&separator.to_string()));
    match build_pattern(fields, &stops) {
        Some(re) => re.replace_all(message, format!("${{lead}}${{pre}}${{key}}={}", redaction.replace('$', "$$"))).into_owned(),
        None => message.to_string(),
    }
}

/// Compiled redactor for a fixed set of fields. Values end at `;` or
/// whitespace, which covers both `k=v;` messages and `tracing` field output.
#[derive(Debug, Clone)]
pub struct Redactor {
    pattern: Option<Regex>,
    replacement: String,
}

impl Redactor {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::<String>::into).collect();
        Self {
            pattern: build_pattern(&fields, &format!(r"{}\s", regex::escape(&SEPARATOR.to_string()))),
            replacement: format!("${{lead}}${{pre}}${{key}}={}", REDACTION),
        }
    }

    pub fn redact<'a>(&self, message: &'a str) -> std::borrow::Cow<'a, str> {
        match &self.pattern {
            Some(re) => re.replace_all(message, self.replacement.as_str()),
            None => std::borrow::Cow::Borrowed(message),
        }
    }
}

/// `MakeWriter` that redacts each formatted event before handing it on.
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    redactor: Redactor,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, redactor: Redactor) -> Self { Self { inner, redactor } }
}

/// Buffers one event and writes the redacted text when dropped.
pub struct RedactingWriter<'r, W: Write> {
    inner: W,
    redactor: &'r Redactor,
    buf: Vec<u8>,
}

impl<W: Write> RedactingWriter<'_, W> {
    fn flush_redacted(&mut self) -> io::Result<()> {
        if self.buf.is_empty() { return Ok(()); }
        let out = {
            let text = String::from_utf8_lossy(&self.buf);
            self.redactor.redact(&text).into_owned()
        };
        self.buf.clear();
        self.inner.write_all(out.as_bytes())?;
        self.inner.flush()
    }
}

impl<W: Write> Write for RedactingWriter<'_, W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> { self.flush_redacted() }
}

impl<W: Write> Drop for RedactingWriter<'_, W> {
    fn drop(&mut self) {
        let _ = self.flush_redacted();
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<'a, M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter { inner: self.inner.make_writer(), redactor: &self.redactor, buf: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn fields(names: &[&str]) -> Vec<String> { names.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn filter_datum_masks_listed_fields() {
        let msg = "name=egg;email=eggmin@eggsample.com;password=eggcellent;date_of_birth=12/12/1986;";
        let out = filter_datum(&fields(&["password", "date_of_birth"]), "xxx", msg, ';');
        assert_eq!(out, "name=egg;email=eggmin@eggsample.com;password=xxx;date_of_birth=xxx;");
    }

    #[test]
    fn filter_datum_other_separator() {
        let msg = "name=bob|email=bob@dylan.com|ip=1.2.3.4";
        let out = filter_datum(&fields(&["email"]), "***", msg, '|');
        assert_eq!(out, "name=bob|email=***|ip=1.2.3.4");
    }

    #[test]
    fn no_fields_leaves_message() {
        assert_eq!(filter_datum(&[], "***", "password=x;", ';'), "password=x;");
    }

    #[test]
    fn does_not_touch_suffix_matches() {
        let r = Redactor::new(["name"]);
        assert_eq!(r.redact("username=bob;name=Bob;"), "username=bob;name=***;");
        assert_eq!(r.redact("login ok name=Bob"), "login ok name=***");
        assert_eq!(r.redact("user_id=1 name=\"Bob\" status=ok\n"), "user_id=1 name=*** status=ok\n");
    }

    #[test]
    fn filter_datum_keeps_line_breaks() {
        let out = filter_datum(&fields(&["ssn"]), "***", "ssn=123-45-6789\nnext", ';');
        assert_eq!(out, "ssn=***\nnext");
    }

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    impl<'a> MakeWriter<'a> for Sink {
        type Writer = Sink;
        fn make_writer(&'a self) -> Self::Writer { self.clone() }
    }

    #[test]
    fn writer_redacts_per_event() {
        let sink = Sink::default();
        let mk = RedactingMakeWriter::new(sink.clone(), Redactor::new(["email", "password"]));
        {
            let mut w = mk.make_writer();
            w.write_all(b"login email=bob@dylan.com;").unwrap();
            w.write_all(b"password=hunter2;status=ok\n").unwrap();
        }
        let out = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out, "login email=***;password=***;status=ok\n");
    }

    fn log_through_fmt(ansi: bool) -> String {
        let sink = Sink::default();
        let mk = RedactingMakeWriter::new(sink.clone(), Redactor::new(["email"]));
        let subscriber = tracing_subscriber::fmt().with_writer(mk).with_ansi(ansi).finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(email = "bob@dylan.com", user_id = 7, "login");
        });
        let out = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        out
    }

    #[test]
    fn fmt_output_is_redacted_with_and_without_colour() {
        for ansi in [false, true] {
            let out = log_through_fmt(ansi);
            assert!(out.contains("login"), "{:?}", out);
            assert!(!out.contains("bob@dylan.com"), "{:?}", out);
            assert!(out.contains("email=***"), "{:?}", out);
            assert!(out.contains("user_id"), "{:?}", out);
        }
    }

    #[test]
    fn colour_codes_around_key_are_tolerated() {
        let r = Redactor::new(["email"]);
        let line = "INFO login \x1b[3memail\x1b[0m\x1b[2m=\x1b[0m\"bob@dylan.com\" done\n";
        assert_eq!(r.redact(line), "INFO login \x1b[3memail=*** done\n");
    }
}

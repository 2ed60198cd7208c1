use std::ops::Range;

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::http::buffer::ReadBuffer;
use crate::http::request::{Method, Request};

/// Page served when the request path is exactly `/`.
pub const DEFAULT_LANDING_PAGE: &str = "judge.html";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed line framing")]
    MalformedLine,

    #[error("request contains non UTF-8 bytes")]
    NotUtf8,

    #[error("invalid request line")]
    InvalidRequest,

    #[error("unsupported method {0:?}")]
    InvalidMethod(String),

    #[error("unsupported HTTP version {0:?}")]
    InvalidVersion(String),

    #[error("invalid request target {0:?}")]
    InvalidTarget(String),

    #[error("invalid Content-Length {0:?}")]
    InvalidContentLength(String),

    #[error("body of {length} bytes cannot fit in {available} remaining bytes")]
    BodyTooLarge { length: usize, available: usize },

    /// The state machine was asked to handle a line in a state that takes
    /// no lines. This is a server fault, not a client one.
    #[error("parser reached an unexpected state")]
    InvalidState,
}

/// Outcome of the secondary (line) state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineStatus {
    /// A full line; the span excludes the CRLF.
    Complete(Range<usize>),
    /// No CRLF yet.
    Incomplete,
    /// Bare LF, or CR followed by something other than LF.
    Malformed,
}

/// Primary state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    #[default]
    RequestLine,
    Headers,
    Body,
}

#[derive(Debug)]
pub enum ParseStatus {
    /// More bytes are needed before anything can be said.
    Incomplete,
    Complete(Request),
}

/// Scans forward from `checked_pos` for the next CRLF.
///
/// A trailing CR with nothing after it is left unconsumed so the next call
/// sees it again once more bytes arrive.
pub fn scan_line(buf: &mut ReadBuffer) -> LineStatus {
    let end = buf.read_pos();
    let mut pos = buf.checked_pos();
    while pos < end {
        match buf.byte_at(pos) {
            b'\r' => {
                if pos + 1 == end {
                    buf.set_checked(pos);
                    return LineStatus::Incomplete;
                }
                if buf.byte_at(pos + 1) == b'\n' {
                    let line = buf.line_start()..pos;
                    buf.set_checked(pos + 2);
                    return LineStatus::Complete(line);
                }
                buf.set_checked(pos);
                return LineStatus::Malformed;
            }
            b'\n' => {
                buf.set_checked(pos);
                return LineStatus::Malformed;
            }
            _ => pos += 1,
        }
    }
    buf.set_checked(pos);
    LineStatus::Incomplete
}

/// Incremental HTTP/1.1 request parser.
///
/// State survives between calls, so a request may be fed in any number of
/// pieces. Call [`RequestParser::reset`] before reusing it for the next
/// request on a keep-alive connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParser {
    state: ParseState,
    method: Method,
    path: Option<String>,
    version: Option<String>,
    host: Option<String>,
    content_length: usize,
    keep_alive: bool,
}

enum HeaderStep {
    Continue,
    Body,
    Done,
}

impl RequestParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consumes whatever `buf` holds and advances the state machine.
    ///
    /// `landing` replaces a bare `/` path.
    pub fn parse(&mut self, buf: &mut ReadBuffer, landing: &str) -> Result<ParseStatus, ParseError> {
        loop {
            if self.state == ParseState::Body {
                let start = buf.checked_pos();
                let end = start + self.content_length;
                if buf.read_pos() < end {
                    return Ok(ParseStatus::Incomplete);
                }
                buf.set_checked(end);
                buf.mark_line();
                let body = Bytes::copy_from_slice(buf.slice(start..end));
                return Ok(ParseStatus::Complete(self.finish(body)));
            }

            let line = match scan_line(buf) {
                LineStatus::Complete(line) => line,
                LineStatus::Incomplete => return Ok(ParseStatus::Incomplete),
                LineStatus::Malformed => return Err(ParseError::MalformedLine),
            };
            buf.mark_line();
            let available = buf.capacity() - buf.checked_pos();
            let text = std::str::from_utf8(buf.slice(line)).map_err(|_| ParseError::NotUtf8)?;
            tracing::trace!(line = text, "Parsed line");

            match self.state {
                ParseState::RequestLine => {
                    self.parse_request_line(text, landing)?;
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => match self.parse_header(text, available)? {
                    HeaderStep::Continue => {}
                    HeaderStep::Body => self.state = ParseState::Body,
                    HeaderStep::Done => return Ok(ParseStatus::Complete(self.finish(Bytes::new()))),
                },
                ParseState::Body => return Err(ParseError::InvalidState),
            }
        }
    }

    fn parse_request_line(&mut self, text: &str, landing: &str) -> Result<(), ParseError> {
        let mut parts = text.split([' ', '\t']).filter(|p| !p.is_empty());
        let method = parts.next().ok_or(ParseError::InvalidRequest)?;
        let target = parts.next().ok_or(ParseError::InvalidRequest)?;
        let version = parts.next().ok_or(ParseError::InvalidRequest)?;
        if parts.next().is_some() {
            return Err(ParseError::InvalidRequest);
        }

        self.method =
            Method::from_str(method).ok_or_else(|| ParseError::InvalidMethod(method.to_string()))?;

        if !version.eq_ignore_ascii_case("HTTP/1.1") {
            return Err(ParseError::InvalidVersion(version.to_string()));
        }

        let mut path = origin_form(target)?;
        if path == "/" {
            path.push_str(landing);
        }

        tracing::debug!(method = method, path = %path, "Request line");
        self.path = Some(path);
        self.version = Some(version.to_string());
        Ok(())
    }

    fn parse_header(&mut self, text: &str, available: usize) -> Result<HeaderStep, ParseError> {
        if text.is_empty() {
            if self.content_length == 0 {
                return Ok(HeaderStep::Done);
            }
            if self.content_length > available {
                return Err(ParseError::BodyTooLarge {
                    length: self.content_length,
                    available,
                });
            }
            return Ok(HeaderStep::Body);
        }

        if let Some(value) = header_value(text, "Connection:") {
            if value.eq_ignore_ascii_case("keep-alive") {
                self.keep_alive = true;
            }
        } else if let Some(value) = header_value(text, "Content-Length:") {
            self.content_length = value
                .parse()
                .map_err(|_| ParseError::InvalidContentLength(value.to_string()))?;
        } else if let Some(value) = header_value(text, "Host:") {
            self.host = Some(value.to_string());
        } else {
            tracing::debug!(header = text, "Ignoring unknown header");
        }
        Ok(HeaderStep::Continue)
    }

    fn finish(&mut self, body: Bytes) -> Request {
        Request {
            method: self.method,
            path: self.path.take().unwrap_or_default(),
            version: self.version.take().unwrap_or_default(),
            host: self.host.take(),
            content_length: self.content_length,
            keep_alive: self.keep_alive,
            body,
        }
    }
}

/// Reduces a request target to a path, trimming an absolute-form
/// `http://host` or `https://host` prefix.
fn origin_form(target: &str) -> Result<String, ParseError> {
    let invalid = || ParseError::InvalidTarget(target.to_string());

    let absolute = ["http://", "https://"].iter().any(|scheme| {
        target
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    });

    if absolute {
        let url = Url::parse(target).map_err(|_| invalid())?;
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        return Ok(path);
    }

    if !target.starts_with('/') {
        return Err(invalid());
    }
    Ok(target.to_string())
}

/// Case-insensitive header name match; returns the value with surrounding
/// spaces and tabs removed.
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let prefix = line.get(..name.len())?;
    if !prefix.eq_ignore_ascii_case(name) {
        return None;
    }
    Some(line[name.len()..].trim_matches([' ', '\t']))
}

use std::fmt::Write as _;
use std::io::{self, IoSlice, Write};

use bytes::BytesMut;
use thiserror::Error;

use crate::http::mapped::MappedFile;
use crate::http::response::{Body, Response};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Default header block capacity per connection.
pub const WRITE_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response header block exceeds {capacity} bytes")]
pub struct HeaderOverflow {
    pub capacity: usize,
}

/// How far a flush got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Everything was sent.
    Done { written: usize },
    /// The socket would block; call again on write readiness.
    Blocked { written: usize },
}

impl Flush {
    pub fn written(&self) -> usize {
        match *self {
            Flush::Done { written } | Flush::Blocked { written } => written,
        }
    }
}

/// Builds the status line and headers for `resp` into `buf`, plus the
/// body when it is inline text.
fn serialize_head(buf: &mut BytesMut, resp: &Response) {
    // fmt::Write on BytesMut only fails on allocation failure.
    let _ = write!(
        buf,
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    let _ = write!(buf, "Content-Length: {}\r\n", resp.content_length());
    let connection = if resp.keep_alive { "keep-alive" } else { "close" };
    let _ = write!(buf, "Connection: {connection}\r\n");
    buf.extend_from_slice(b"\r\n");
    if let Body::Inline(text) = &resp.body {
        buf.extend_from_slice(text.as_bytes());
    }
}

/// Two-segment scatter writer: segment 0 is the header block, segment 1 the
/// mapped file. Partial writes are resumed where they stopped.
#[derive(Debug)]
pub struct ResponseWriter {
    header: BytesMut,
    capacity: usize,
    header_sent: usize,
    file: Option<MappedFile>,
    file_sent: usize,
    bytes_to_send: usize,
    bytes_sent: usize,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::with_capacity(WRITE_BUFFER_SIZE)
    }
}

impl ResponseWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            header: BytesMut::with_capacity(capacity),
            capacity,
            header_sent: 0,
            file: None,
            file_sent: 0,
            bytes_to_send: 0,
            bytes_sent: 0,
        }
    }

    /// Prepares `resp` for sending, replacing anything previously staged.
    pub fn compose(&mut self, resp: Response) -> Result<(), HeaderOverflow> {
        self.clear();
        serialize_head(&mut self.header, &resp);
        if self.header.len() > self.capacity {
            self.clear();
            return Err(HeaderOverflow {
                capacity: self.capacity,
            });
        }

        if let Body::File(file) = resp.body {
            self.file = Some(file);
        }
        self.bytes_to_send = self.header.len() + self.file.as_ref().map_or(0, MappedFile::len);
        Ok(())
    }

    /// Header bytes staged so far (`write_pos`).
    pub fn head(&self) -> &[u8] {
        &self.header
    }

    pub fn bytes_to_send(&self) -> usize {
        self.bytes_to_send
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.bytes_to_send == 0
    }

    /// Writes as much as the sink accepts.
    ///
    /// Any error other than `WouldBlock` or `Interrupted` is final. The file
    /// mapping is released then and on completion.
    pub fn write_to<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<Flush> {
        let mut written = 0;
        while self.bytes_to_send > 0 {
            let file = self.file.as_ref().map_or(&[][..], MappedFile::as_bytes);
            let segments = [
                IoSlice::new(&self.header[self.header_sent..]),
                IoSlice::new(&file[self.file_sent..]),
            ];
            match out.write_vectored(&segments) {
                Ok(0) => {
                    self.file = None;
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => {
                    self.advance(n);
                    written += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Flush::Blocked { written });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.file = None;
                    return Err(e);
                }
            }
        }
        self.file = None;
        Ok(Flush::Done { written })
    }

    fn advance(&mut self, mut n: usize) {
        self.bytes_sent += n;
        self.bytes_to_send -= n;

        let header_left = self.header.len() - self.header_sent;
        let from_header = n.min(header_left);
        self.header_sent += from_header;
        n -= from_header;
        self.file_sent += n;
    }

    /// Drops any staged response and zeroes the counters.
    pub fn clear(&mut self) {
        self.header.clear();
        self.header_sent = 0;
        self.file = None;
        self.file_sent = 0;
        self.bytes_to_send = 0;
        self.bytes_sent = 0;
    }
}

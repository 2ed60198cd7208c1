use std::io::{self, Read, Write};
use std::net::SocketAddr;

use crate::http::buffer::{Fill, ReadBuffer};
use crate::http::parser::{ParseStatus, RequestParser};
use crate::http::response::Response;
use crate::http::router::Site;
use crate::http::writer::{Flush, ResponseWriter};
use crate::store::CredentialStore;

/// What the connection needs next after a worker has handled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Request incomplete; wait for more bytes.
    Read,
    /// A response is staged; wait for write readiness.
    Write,
    /// Nothing can be sent; drop the connection.
    Close,
}

/// Result of draining the socket into the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes arrived; zero means a spurious wake-up.
    Data(usize),
    /// Peer closed the connection.
    Closed,
    /// The buffer is full and the request still is not complete.
    Full,
}

/// One accepted client socket plus everything needed to serve it.
pub struct Connection<S> {
    id: u64,
    stream: S,
    peer: SocketAddr,
    read_buf: ReadBuffer,
    parser: RequestParser,
    writer: ResponseWriter,
    keep_alive: bool,
}

impl<S> Connection<S> {
    pub fn new(id: u64, stream: S, peer: SocketAddr, read_capacity: usize, write_capacity: usize) -> Self {
        Self {
            id,
            stream,
            peer,
            read_buf: ReadBuffer::with_capacity(read_capacity),
            parser: RequestParser::new(),
            writer: ResponseWriter::with_capacity(write_capacity),
            keep_alive: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn read_buffer(&self) -> &ReadBuffer {
        &self.read_buf
    }

    pub fn parser(&self) -> &RequestParser {
        &self.parser
    }

    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    /// Whether the staged response keeps the connection open.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Parses what has arrived and, once a request is complete, stages its
    /// response.
    pub fn process(&mut self, site: &Site, store: &mut dyn CredentialStore) -> Next {
        match self.parser.parse(&mut self.read_buf, &site.landing) {
            Ok(ParseStatus::Incomplete) => Next::Read,
            Ok(ParseStatus::Complete(req)) => {
                let resp = site.respond(&req, store);
                tracing::debug!(
                    peer = %self.peer,
                    method = req.method.as_str(),
                    path = %req.path,
                    status = resp.status.as_u16(),
                    "Request handled"
                );
                self.stage(resp)
            }
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "Rejecting malformed request");
                self.stage(Response::for_parse_error(&e))
            }
        }
    }

    fn stage(&mut self, resp: Response) -> Next {
        self.keep_alive = resp.keep_alive;
        match self.writer.compose(resp) {
            Ok(()) => Next::Write,
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "Failed to compose response");
                Next::Close
            }
        }
    }

    /// Back to the state of a freshly accepted connection.
    pub fn reset(&mut self) {
        self.read_buf.clear();
        self.parser.reset();
        self.writer.clear();
        self.keep_alive = false;
    }
}

impl<S: Read> Connection<S> {
    /// Reads until the socket would block, the peer closes or the buffer
    /// fills up.
    pub fn read(&mut self) -> io::Result<ReadOutcome> {
        let mut total = 0;
        loop {
            match self.read_buf.fill_from(&mut self.stream) {
                Ok(Fill::Read(n)) => total += n,
                Ok(Fill::Closed) => return Ok(ReadOutcome::Closed),
                Ok(Fill::Full) if total > 0 => return Ok(ReadOutcome::Data(total)),
                Ok(Fill::Full) => return Ok(ReadOutcome::Full),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::Data(total));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: Write> Connection<S> {
    /// Sends as much of the staged response as the socket takes.
    pub fn write(&mut self) -> io::Result<Flush> {
        self.writer.write_to(&mut self.stream)
    }
}

//! HTTP protocol implementation.
//!
//! This module implements the HTTP/1.1 subset the server speaks: GET and
//! POST, `Content-Length` bodies and keep-alive connections.
//!
//! # Architecture
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`buffer`**: Bounded read buffer with the parse cursors
//! - **`parser`**: Line scanner and request state machine
//! - **`request`**: HTTP request representation
//! - **`router`**: Maps a request onto a file, running form actions
//! - **`response`**: Status codes and response bodies
//! - **`writer`**: Serializes the header block and scatter-writes it with the file
//! - **`mapped`**: Read-only memory maps of served files
//! - **`connection`**: Per-socket state tying the pieces together
//!
//! # Connection State Machine
//!
//! Each client connection goes through a state machine:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Reactor drains the socket
//!        └──────┬──────┘
//!               │ Bytes received
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Worker parses; incomplete → Reading
//!        └──────┬───────────┘
//!               │ Response staged
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Reactor flushes, resuming on write readiness
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → reset → Reading (same connection)
//!               └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```
//! use webserv::http::buffer::ReadBuffer;
//! use webserv::http::parser::{ParseStatus, RequestParser};
//!
//! let mut buf = ReadBuffer::default();
//! buf.extend(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
//!
//! let mut parser = RequestParser::new();
//! match parser.parse(&mut buf, "judge.html").unwrap() {
//!     ParseStatus::Complete(req) => assert_eq!(req.path, "/judge.html"),
//!     ParseStatus::Incomplete => unreachable!(),
//! }
//! ```

pub mod buffer;
pub mod connection;
pub mod mapped;
pub mod parser;
pub mod request;
pub mod response;
pub mod router;
pub mod writer;

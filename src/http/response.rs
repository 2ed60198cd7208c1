use crate::http::mapped::MappedFile;
use crate::http::parser::ParseError;

/// HTTP status codes emitted by the server.
///
/// - `Ok` (200): File served
/// - `BadRequest` (400): Malformed request, or a directory was requested
/// - `Forbidden` (403): File exists but is not world-readable
/// - `NotFound` (404): No such file
/// - `InternalError` (500): The file could not be opened or mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Error
    InternalError,
}

/// Body sent for a zero-length file, so the client still sees a document.
pub const EMPTY_PAGE: &str = "<html><body></body></html>";

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use webserv::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalError => 500,
        }
    }

    /// Returns the reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use webserv::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::InternalError.reason_phrase(), "Internal Error");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalError => "Internal Error",
        }
    }

    /// The canned page sent with an error status. Empty for `Ok`.
    pub fn error_page(&self) -> &'static str {
        match self {
            StatusCode::Ok => "",
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy.\n"
            }
            StatusCode::Forbidden => "You do not have permission to get file from this server.\n",
            StatusCode::NotFound => "The requested file was not found on this server.\n",
            StatusCode::InternalError => "There was an unusual problem serving the request file.\n",
        }
    }
}

/// Where the response body comes from.
#[derive(Debug)]
pub enum Body {
    /// Short text copied into the header block.
    Inline(&'static str),
    /// Memory-mapped file sent as the second scatter segment.
    File(MappedFile),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Body::Inline(text) => text.len(),
            Body::File(file) => file.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A response ready to be handed to the
/// [`ResponseWriter`](crate::http::writer::ResponseWriter).
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// Sent as `Connection: keep-alive` when true, `close` otherwise
    pub keep_alive: bool,
    pub body: Body,
}

impl Response {
    /// Serves a mapped file with 200 OK. Empty files get a placeholder page.
    pub fn file(file: MappedFile, keep_alive: bool) -> Self {
        let body = if file.is_empty() {
            Body::Inline(EMPTY_PAGE)
        } else {
            Body::File(file)
        };
        Self {
            status: StatusCode::Ok,
            keep_alive,
            body,
        }
    }

    /// An error status with its canned page.
    ///
    /// 400 and 500 always close the connection; the parser state that led
    /// to them cannot be trusted for another request.
    pub fn error(status: StatusCode, keep_alive: bool) -> Self {
        let keep_alive = keep_alive
            && !matches!(status, StatusCode::BadRequest | StatusCode::InternalError);
        Self {
            status,
            keep_alive,
            body: Body::Inline(status.error_page()),
        }
    }

    pub fn bad_request() -> Self {
        Self::error(StatusCode::BadRequest, false)
    }

    pub fn not_found(keep_alive: bool) -> Self {
        Self::error(StatusCode::NotFound, keep_alive)
    }

    pub fn forbidden(keep_alive: bool) -> Self {
        Self::error(StatusCode::Forbidden, keep_alive)
    }

    pub fn internal_error() -> Self {
        Self::error(StatusCode::InternalError, false)
    }

    /// The reply to a request that failed to parse. Client mistakes get a
    /// 400 and parser faults a 500; both close the connection.
    pub fn for_parse_error(err: &ParseError) -> Self {
        match err {
            ParseError::InvalidState => Self::internal_error(),
            _ => Self::bad_request(),
        }
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }
}

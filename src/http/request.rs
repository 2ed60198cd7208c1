use bytes::Bytes;

/// HTTP request methods.
///
/// Only GET and POST are served; every other verb is rejected while parsing
/// the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// GET - Retrieve a resource
    #[default]
    GET,
    /// POST - Submit a form (login and registration actions)
    POST,
}

/// A fully parsed HTTP request.
///
/// Produced by [`RequestParser`](crate::http::parser::RequestParser) once the
/// headers, and the body if one was announced, have arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The HTTP method (GET or POST)
    pub method: Method,
    /// The request path, with any absolute-form prefix trimmed and `/`
    /// replaced by the landing page
    pub path: String,
    /// HTTP version as sent (always `HTTP/1.1` modulo case)
    pub version: String,
    /// Value of the `Host` header, if sent
    pub host: Option<String>,
    /// Declared `Content-Length`, zero when absent
    pub content_length: usize,
    /// Whether the client sent `Connection: keep-alive`
    pub keep_alive: bool,
    /// Request body for POST requests
    pub body: Bytes,
}

/// Builds a [`Request`] without going through the parser.
///
/// The server itself only produces requests from
/// [`RequestParser`](crate::http::parser::RequestParser). This builder is
/// for code that embeds the router and for tests that need a request
/// fixture.
///
/// ```
/// use webserv::http::request::{Method, RequestBuilder};
///
/// let req = RequestBuilder::new()
///     .method(Method::POST)
///     .path("/2CGISQL.cgi")
///     .body("user=alice&passwd=pw")
///     .build()
///     .unwrap();
/// assert_eq!(req.content_length, 20);
/// assert_eq!(req.version, "HTTP/1.1");
/// ```
pub struct RequestBuilder {
    method: Method,
    path: Option<String>,
    version: Option<String>,
    host: Option<String>,
    keep_alive: bool,
    body: Bytes,
}

impl Method {
    /// Parses a method name, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// # use webserv::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("post"), Some(Method::POST));
    /// assert_eq!(Method::from_str("PUT"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("GET") {
            Some(Method::GET)
        } else if s.eq_ignore_ascii_case("POST") {
            Some(Method::POST)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            path: None,
            version: None,
            host: None,
            keep_alive: false,
            body: Bytes::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method,
            path: self.path.ok_or("path missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            host: self.host,
            content_length: self.body.len(),
            keep_alive: self.keep_alive,
            body: self.body,
        })
    }
}

impl Request {
    /// The last path segment, i.e. everything after the final `/`.
    pub fn last_segment(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }

    /// Body as text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

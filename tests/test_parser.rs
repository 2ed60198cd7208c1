use webserv::http::buffer::ReadBuffer;
use webserv::http::parser::{
    DEFAULT_LANDING_PAGE, LineStatus, ParseError, ParseState, ParseStatus, RequestParser, scan_line,
};
use webserv::http::request::{Method, Request};

fn buffer(bytes: &[u8]) -> ReadBuffer {
    let mut buf = ReadBuffer::default();
    assert_eq!(buf.extend(bytes), bytes.len());
    buf
}

fn parse_all(bytes: &[u8]) -> Result<ParseStatus, ParseError> {
    let mut buf = buffer(bytes);
    RequestParser::new().parse(&mut buf, DEFAULT_LANDING_PAGE)
}

fn complete(bytes: &[u8]) -> Request {
    match parse_all(bytes) {
        Ok(ParseStatus::Complete(req)) => req,
        other => panic!("expected a complete request, got {other:?}"),
    }
}

#[test]
fn test_parse_simple_get_request() {
    let req = complete(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n");

    assert_eq!(req.method, Method::GET);
    assert_eq!(req.path, "/index.html");
    assert_eq!(req.version, "HTTP/1.1");
    assert_eq!(req.host.as_deref(), Some("example.com"));
    assert_eq!(req.content_length, 0);
    assert!(!req.keep_alive);
    assert!(req.body.is_empty());
}

#[test]
fn test_parse_root_maps_to_landing_page() {
    let req = complete(b"GET / HTTP/1.1\r\n\r\n");
    assert_eq!(req.path, "/judge.html");
}

#[test]
fn test_parse_root_uses_configured_landing_page() {
    let mut buf = buffer(b"GET / HTTP/1.1\r\n\r\n");
    let status = RequestParser::new().parse(&mut buf, "home.html").unwrap();
    let ParseStatus::Complete(req) = status else {
        panic!("request should be complete");
    };
    assert_eq!(req.path, "/home.html");
}

#[test]
fn test_parse_absolute_form_target() {
    let req = complete(b"GET http://example.com/picture.html HTTP/1.1\r\n\r\n");
    assert_eq!(req.path, "/picture.html");

    let req = complete(b"GET HTTPS://example.com:8443/a/b?x=1 HTTP/1.1\r\n\r\n");
    assert_eq!(req.path, "/a/b?x=1");
}

#[test]
fn test_parse_absolute_form_without_path_is_landing_page() {
    let req = complete(b"GET http://example.com HTTP/1.1\r\n\r\n");
    assert_eq!(req.path, "/judge.html");
}

#[test]
fn test_parse_method_and_version_ignore_case() {
    let req = complete(b"post /x http/1.1\r\n\r\n");
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.version, "http/1.1");
}

#[test]
fn test_parse_tabs_separate_request_line() {
    let req = complete(b"GET\t/index.html\tHTTP/1.1\r\n\r\n");
    assert_eq!(req.path, "/index.html");
}

#[test]
fn test_parse_keep_alive_header() {
    let req = complete(b"GET /a HTTP/1.1\r\nconnection:   Keep-Alive\r\n\r\n");
    assert!(req.keep_alive);

    let req = complete(b"GET /a HTTP/1.1\r\nConnection: close\r\n\r\n");
    assert!(!req.keep_alive);
}

#[test]
fn test_parse_unknown_headers_are_ignored() {
    let req = complete(b"GET /a HTTP/1.1\r\nUser-Agent: test\r\nAccept: */*\r\nHost: h\r\n\r\n");
    assert_eq!(req.host.as_deref(), Some("h"));
}

#[test]
fn test_parse_post_request_with_body() {
    let req = complete(
        b"POST /2CGISQL.cgi HTTP/1.1\r\nContent-Length: 22\r\n\r\nuser=alice&passwd=1234",
    );

    assert_eq!(req.method, Method::POST);
    assert_eq!(req.content_length, 22);
    assert_eq!(&req.body[..], b"user=alice&passwd=1234");
    assert_eq!(req.body_str(), Some("user=alice&passwd=1234"));
}

#[test]
fn test_parse_body_ignores_bytes_past_content_length() {
    let req = complete(b"POST /x HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcdef");
    assert_eq!(&req.body[..], b"abc");
}

#[test]
fn test_parse_incomplete_request_line() {
    let mut buf = buffer(b"GET / HT");
    let mut parser = RequestParser::new();

    assert!(matches!(
        parser.parse(&mut buf, DEFAULT_LANDING_PAGE),
        Ok(ParseStatus::Incomplete)
    ));
    assert_eq!(parser.state(), ParseState::RequestLine);
}

#[test]
fn test_parse_incomplete_headers_then_complete() {
    let mut buf = buffer(b"GET /a HTTP/1.1\r\nHost: x\r\n");
    let mut parser = RequestParser::new();

    assert!(matches!(
        parser.parse(&mut buf, DEFAULT_LANDING_PAGE),
        Ok(ParseStatus::Incomplete)
    ));
    assert_eq!(parser.state(), ParseState::Headers);

    buf.extend(b"\r\n");
    assert!(matches!(
        parser.parse(&mut buf, DEFAULT_LANDING_PAGE),
        Ok(ParseStatus::Complete(_))
    ));
}

#[test]
fn test_parse_waits_for_body() {
    let mut buf = buffer(b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello");
    let mut parser = RequestParser::new();

    assert!(matches!(
        parser.parse(&mut buf, DEFAULT_LANDING_PAGE),
        Ok(ParseStatus::Incomplete)
    ));
    assert_eq!(parser.state(), ParseState::Body);
    assert_eq!(parser.content_length(), 10);

    buf.extend(b"world");
    let ParseStatus::Complete(req) = parser.parse(&mut buf, DEFAULT_LANDING_PAGE).unwrap() else {
        panic!("body should be complete");
    };
    assert_eq!(&req.body[..], b"helloworld");
}

#[test]
fn test_parse_rejects_unsupported_method() {
    assert_eq!(
        parse_all(b"PUT /a HTTP/1.1\r\n\r\n").unwrap_err(),
        ParseError::InvalidMethod("PUT".to_string())
    );
}

#[test]
fn test_parse_rejects_other_versions() {
    assert_eq!(
        parse_all(b"GET /a HTTP/1.0\r\n\r\n").unwrap_err(),
        ParseError::InvalidVersion("HTTP/1.0".to_string())
    );
}

#[test]
fn test_parse_rejects_relative_target() {
    assert_eq!(
        parse_all(b"GET index.html HTTP/1.1\r\n\r\n").unwrap_err(),
        ParseError::InvalidTarget("index.html".to_string())
    );
}

#[test]
fn test_parse_rejects_wrong_field_count() {
    assert_eq!(
        parse_all(b"GET /a\r\n\r\n").unwrap_err(),
        ParseError::InvalidRequest
    );
    assert_eq!(
        parse_all(b"GET /a HTTP/1.1 extra\r\n\r\n").unwrap_err(),
        ParseError::InvalidRequest
    );
}

#[test]
fn test_parse_rejects_garbage() {
    assert!(parse_all(b"GARBAGE\r\n\r\n").is_err());
}

#[test]
fn test_parse_rejects_bad_content_length() {
    assert_eq!(
        parse_all(b"POST /a HTTP/1.1\r\nContent-Length: lots\r\n\r\n").unwrap_err(),
        ParseError::InvalidContentLength("lots".to_string())
    );
}

#[test]
fn test_parse_rejects_body_larger_than_buffer() {
    let mut buf = ReadBuffer::with_capacity(64);
    buf.extend(b"POST /a HTTP/1.1\r\nContent-Length: 100\r\n\r\n");

    let err = RequestParser::new()
        .parse(&mut buf, DEFAULT_LANDING_PAGE)
        .unwrap_err();
    assert!(matches!(err, ParseError::BodyTooLarge { length: 100, .. }));
}

#[test]
fn test_parse_rejects_bare_cr_and_lf() {
    assert_eq!(
        parse_all(b"GET / HTTP/1.1\rX\n\r\n").unwrap_err(),
        ParseError::MalformedLine
    );
    assert_eq!(
        parse_all(b"GET / HTTP/1.1\n\n").unwrap_err(),
        ParseError::MalformedLine
    );
}

#[test]
fn test_parse_rejects_non_utf8_line() {
    assert_eq!(
        parse_all(b"GET /\xff HTTP/1.1\r\n\r\n").unwrap_err(),
        ParseError::NotUtf8
    );
}

#[test]
fn test_parser_reset_allows_next_request() {
    let mut buf = buffer(b"GET /a HTTP/1.1\r\nConnection: keep-alive\r\n\r\n");
    let mut parser = RequestParser::new();
    assert!(matches!(
        parser.parse(&mut buf, DEFAULT_LANDING_PAGE),
        Ok(ParseStatus::Complete(_))
    ));
    assert!(parser.keep_alive());

    parser.reset();
    buf.clear();
    assert_eq!(parser, RequestParser::new());

    buf.extend(b"GET /b HTTP/1.1\r\n\r\n");
    let ParseStatus::Complete(req) = parser.parse(&mut buf, DEFAULT_LANDING_PAGE).unwrap() else {
        panic!("second request should be complete");
    };
    assert_eq!(req.path, "/b");
    assert!(!req.keep_alive);
}

#[test]
fn test_scan_line_walks_lines() {
    let mut buf = buffer(b"ab\r\ncd\r\n");

    assert_eq!(scan_line(&mut buf), LineStatus::Complete(0..2));
    assert_eq!(buf.checked_pos(), 4);
    assert_eq!(buf.line_start(), 0);
}

#[test]
fn test_scan_line_incomplete_without_terminator() {
    let mut buf = buffer(b"abc");
    assert_eq!(scan_line(&mut buf), LineStatus::Incomplete);
    assert_eq!(buf.checked_pos(), 3);
}

#[test]
fn test_scan_line_cr_followed_by_other_byte() {
    let mut buf = buffer(b"ab\rc");
    assert_eq!(scan_line(&mut buf), LineStatus::Malformed);
}

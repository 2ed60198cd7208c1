use proptest::prelude::*;

use webserv::http::buffer::ReadBuffer;
use webserv::http::parser::{DEFAULT_LANDING_PAGE, ParseStatus, RequestParser};
use webserv::http::request::Request;

const REQUESTS: &[&[u8]] = &[
    b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n",
    b"GET /picture.html HTTP/1.1\r\nConnection: keep-alive\r\nHost: a\r\n\r\n",
    b"GET http://example.com/video.html?x=1 HTTP/1.1\r\nAccept: */*\r\n\r\n",
    b"POST /2CGISQL.cgi HTTP/1.1\r\nContent-Length: 22\r\nConnection: keep-alive\r\n\r\nuser=alice&passwd=1234",
    b"POST /3CGISQL.cgi HTTP/1.1\r\nHost: h\r\nContent-Length: 18\r\n\r\nuser=bob&passwd=pw",
];

fn one_shot(bytes: &[u8]) -> Request {
    let mut buf = ReadBuffer::default();
    buf.extend(bytes);
    match RequestParser::new().parse(&mut buf, DEFAULT_LANDING_PAGE) {
        Ok(ParseStatus::Complete(req)) => req,
        other => panic!("sample request did not parse: {other:?}"),
    }
}

/// Feeds `bytes` in the given pieces, parsing after each one.
fn in_pieces(bytes: &[u8], cuts: &[usize]) -> Request {
    let mut buf = ReadBuffer::default();
    let mut parser = RequestParser::new();
    let mut start = 0;
    for &end in cuts.iter().chain(std::iter::once(&bytes.len())) {
        buf.extend(&bytes[start..end]);
        start = end;
        match parser.parse(&mut buf, DEFAULT_LANDING_PAGE) {
            Ok(ParseStatus::Complete(req)) => {
                assert_eq!(end, bytes.len(), "completed before the last byte arrived");
                return req;
            }
            Ok(ParseStatus::Incomplete) => {}
            Err(e) => panic!("prefix of length {end} was rejected: {e}"),
        }
    }
    panic!("request never completed");
}

proptest! {
    #[test]
    fn any_two_way_split_parses_like_one_shot(idx in 0..REQUESTS.len(), cut in 0usize..=1000) {
        let bytes = REQUESTS[idx];
        let cut = cut % (bytes.len() + 1);
        prop_assert_eq!(in_pieces(bytes, &[cut]), one_shot(bytes));
    }

    #[test]
    fn any_many_way_split_parses_like_one_shot(
        idx in 0..REQUESTS.len(),
        raw in proptest::collection::vec(0usize..1000, 0..8),
    ) {
        let bytes = REQUESTS[idx];
        let mut cuts: Vec<usize> = raw.into_iter().map(|c| c % (bytes.len() + 1)).collect();
        cuts.sort_unstable();
        prop_assert_eq!(in_pieces(bytes, &cuts), one_shot(bytes));
    }
}

#[test]
fn byte_at_a_time_matches_one_shot() {
    for bytes in REQUESTS {
        let cuts: Vec<usize> = (1..bytes.len()).collect();
        assert_eq!(in_pieces(bytes, &cuts), one_shot(bytes));
    }
}

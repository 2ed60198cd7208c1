mod common;

use std::io::Write;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use common::{JUDGE, LOG_ERROR, TestServer, WELCOME, connect, is_closed, read_reply, request};

fn server() -> &'static TestServer {
    static SERVER: OnceLock<TestServer> = OnceLock::new();
    SERVER.get_or_init(common::start)
}

#[test]
fn test_landing_page_with_keep_alive_reuse() {
    let srv = server();
    let mut stream = connect(srv.addr);

    for _ in 0..3 {
        let reply = request(
            &mut stream,
            b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\n\r\n",
        );
        assert_eq!(reply.status(), 200);
        assert_eq!(reply.header("Connection"), Some("keep-alive"));
        assert_eq!(reply.body_text(), JUDGE);
    }
    assert!(srv.handle.active_connections() >= 1);
}

#[test]
fn test_close_after_response_without_keep_alive() {
    let srv = server();
    let mut stream = connect(srv.addr);

    let reply = request(&mut stream, b"GET /judge.html HTTP/1.1\r\n\r\n");
    assert_eq!(reply.status(), 200);
    assert_eq!(reply.header("Connection"), Some("close"));
    assert!(is_closed(&mut stream));
}

#[test]
fn test_garbage_gets_bad_request_and_close() {
    let srv = server();
    let mut stream = connect(srv.addr);

    let reply = request(&mut stream, b"GARBAGE\r\n\r\n");
    assert_eq!(reply.status(), 400);
    assert_eq!(reply.header("Connection"), Some("close"));
    assert!(is_closed(&mut stream));
}

#[test]
fn test_unknown_method_gets_bad_request_and_close() {
    let srv = server();
    let mut stream = connect(srv.addr);

    let reply = request(&mut stream, b"GARBAGE /x HTTP/1.1\r\n\r\n");
    assert_eq!(reply.status(), 400);
    assert!(is_closed(&mut stream));
}

#[test]
fn test_missing_page_is_not_found() {
    let srv = server();
    let mut stream = connect(srv.addr);

    let reply = request(
        &mut stream,
        b"GET /nothing-here.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
    );
    assert_eq!(reply.status(), 404);
    assert_eq!(reply.header("Connection"), Some("keep-alive"));
}

#[test]
fn test_request_split_across_writes() {
    let srv = server();
    let mut stream = connect(srv.addr);

    stream.write_all(b"GET /judge.html HT").unwrap();
    thread::sleep(Duration::from_millis(100));
    stream.write_all(b"TP/1.1\r\nHost: x\r").unwrap();
    thread::sleep(Duration::from_millis(100));
    stream.write_all(b"\n\r\n").unwrap();

    let reply = read_reply(&mut stream).unwrap();
    assert_eq!(reply.status(), 200);
    assert_eq!(reply.body_text(), JUDGE);
}

#[test]
fn test_login_failure_and_success() {
    let srv = server();
    let mut stream = connect(srv.addr);

    let reply = request(
        &mut stream,
        b"POST /2CGISQL.cgi HTTP/1.1\r\nConnection: keep-alive\r\nContent-Length: 23\r\n\r\nuser=alice&passwd=wrong",
    );
    assert_eq!(reply.status(), 200);
    assert_eq!(reply.body_text(), LOG_ERROR);

    let reply = request(
        &mut stream,
        b"POST /2CGISQL.cgi HTTP/1.1\r\nContent-Length: 20\r\n\r\nuser=alice&passwd=pw",
    );
    assert_eq!(reply.body_text(), WELCOME);
}

#[test]
fn test_idle_connection_is_evicted() {
    let srv = server();
    let mut stream = connect(srv.addr);
    let started = Instant::now();

    assert!(is_closed(&mut stream));
    let idle = started.elapsed();
    assert!(idle >= Duration::from_secs(2), "evicted after {idle:?}");
    assert!(idle < Duration::from_secs(9), "evicted after {idle:?}");
}

#[test]
fn test_active_keep_alive_connection_outlives_idle_window() {
    let srv = server();
    let mut stream = connect(srv.addr);

    // Activity every second pushes the three-second deadline out.
    for _ in 0..5 {
        let reply = request(
            &mut stream,
            b"GET /judge.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
        );
        assert_eq!(reply.status(), 200);
        thread::sleep(Duration::from_secs(1));
    }
}

extern crate hitchpost;

use hitchpost::{Error, Request};

fn request() -> Request {
    Request::new("127.0.0.1:9".parse().unwrap())
}

#[test]
fn parses_request_line_and_headers_in_one_feed() {
    let mut req = request();
    req.feed(b"GET /path HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
    assert!(req.is_complete());
    assert_eq!(req.url.path, "/path");
    assert_eq!(req.url.host.as_deref(), Some("example.com"));
}

#[test]
fn partial_request_line_waits_for_more_bytes() {
    let mut req = request();
    req.feed(b"HEAD /path?with=query HTTP/1.1\r\n").unwrap();
    assert!(!req.is_complete());

    req.feed(b"Host: www.example.com\r\n\r\n").unwrap();
    assert!(req.is_complete());
    assert_eq!(req.url.path, "/path");
    assert_eq!(req.url.query.as_deref(), Some("with=query"));
    assert_eq!(req.url.host.as_deref(), Some("www.example.com"));
}

#[test]
fn malformed_request_line_is_an_unrecoverable_parse_error() {
    let mut req = request();
    let err = req.feed(b"GET / TTMP/2.0\r\n\r\n").unwrap_err();
    assert!(matches!(err, Error::ParseError(_)));
}

#[test]
fn duplicate_content_length_is_rejected() {
    let mut req = request();
    let err = req
        .feed(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\n")
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateContentLength));
}

#[test]
fn non_numeric_content_length_is_rejected() {
    let mut req = request();
    let err = req
        .feed(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: abc\r\n\r\n")
        .unwrap_err();
    assert!(matches!(err, Error::ContentLengthInvalid));
}

#[test]
fn chunked_transfer_encoding_is_reassembled_across_feeds() {
    let mut req = request();
    let head = b"POST /c HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n";
    req.feed(head).unwrap();
    assert!(!req.is_complete());

    req.feed(b"5\r\nhello\r\n").unwrap();
    assert!(!req.is_complete());

    req.feed(b"0\r\n\r\n").unwrap();
    assert!(req.is_complete());
    assert_eq!(req.body, b"hello");
}

#[test]
fn malformed_chunk_size_surfaces_a_chunk_parse_error() {
    let mut req = request();
    req.feed(b"POST /c HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n")
        .unwrap();
    let err = req.feed(b"not-hex\r\n").unwrap_err();
    assert!(matches!(err, Error::ChunkParseError(_)));
}

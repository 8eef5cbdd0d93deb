extern crate hitchpost;

use hitchpost::{Error, Method, Request};

fn request() -> Request {
    Request::new("127.0.0.1:9".parse().unwrap())
}

#[test]
fn extension_methods_round_trip_through_headers() {
    let mut req = request();
    req.feed(b"PROPFIND /d HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
    assert!(req.is_complete());
    assert_eq!(req.method, Method::Extension("PROPFIND".to_string()));
}

#[test]
fn ipv6_host_header_keeps_brackets() {
    let mut req = request();
    req.feed(b"GET /x HTTP/1.1\r\nHost: [::1]:8080\r\n\r\n")
        .unwrap();
    assert!(req.is_complete());
    assert_eq!(req.url.host.as_deref(), Some("[::1]"));
    assert_eq!(req.url.port, Some(8080));
}

#[test]
fn host_header_without_port_leaves_port_none() {
    let mut req = request();
    req.feed(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
        .unwrap();
    assert!(req.is_complete());
    assert_eq!(req.url.host.as_deref(), Some("example.com"));
    assert_eq!(req.url.port, None);
}

#[test]
fn host_header_is_case_preserved_but_matched_case_insensitively() {
    let mut req = request();
    req.feed(b"GET / HTTP/1.1\r\nHOST: Example.COM\r\n\r\n")
        .unwrap();
    assert!(req.is_complete());
    assert!(req.headers().get("host").is_some());
}

#[test]
fn http_1_0_request_parses_with_correct_version() {
    use hitchpost::Version;
    let mut req = request();
    req.feed(b"GET / HTTP/1.0\r\n\r\n").unwrap();
    assert!(req.is_complete());
    assert_eq!(req.version, Version::Http10);
}

#[test]
fn unusual_query_string_is_preserved_verbatim() {
    let mut req = request();
    req.feed(b"GET /search?q=a+b&x=1%202 HTTP/1.1\r\nHost: h\r\n\r\n")
        .unwrap();
    assert!(req.is_complete());
    assert_eq!(req.url.path, "/search");
    assert_eq!(req.url.query.as_deref(), Some("q=a+b&x=1%202"));
}

#[test]
fn connect_request_is_never_treated_as_a_websocket_upgrade() {
    let mut req = request();
    req.feed(
        b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\
          Connection: upgrade\r\nUpgrade: websocket\r\n\r\n",
    )
    .unwrap();
    assert!(req.is_complete());
    assert!(!req.is_upgrade());
}

#[test]
fn duplicate_content_length_is_reported_through_the_public_error_type() {
    let mut req = request();
    let err = req
        .feed(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 1\r\nContent-Length: 1\r\n\r\n")
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateContentLength));
}

#[test]
fn reset_clears_method_url_and_headers_between_messages_on_one_connection() {
    let mut req = request();
    req.feed(b"POST /first HTTP/1.1\r\nHost: h\r\nContent-Length: 2\r\n\r\nhi")
        .unwrap();
    assert!(req.is_complete());

    req.reset();
    assert!(!req.is_complete());
    assert_eq!(req.url.path, "");
    assert!(req.headers().is_empty());

    req.feed(b"GET /second HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
    assert!(req.is_complete());
    assert_eq!(req.url.path, "/second");
    assert_eq!(req.method, Method::Get);
}

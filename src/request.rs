use std::net::SocketAddr;

use httparse;
use netbuf::Buf;
use url;

use crate::chunked::ChunkedState;
use crate::error::Error;
use crate::headers::{self, HeaderMap, Method, Version};

const MAX_HEADERS: usize = 64;

/// Coarse states of the per-request parse, named after the
/// callback-driven wire parser described in `spec.md` §4.1. `httparse`
/// parses the request line and the full header block in one shot
/// rather than field-by-field, so `OnUrl`/`OnStatus`/`OnHeaders` collapse
/// into a single transition to `HeadersDone`; chunk framing has its own
/// sub-state inside `BodyMode::Chunked` rather than separate
/// `OnChunkHeader`/`OnChunkComplete` request states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Initial,
    HeadersPartial,
    HeadersDone,
    Body,
    MessageComplete,
}

#[derive(Debug, Clone)]
enum BodyMode {
    None,
    Fixed(u64),
    Chunked(ChunkedState),
}

/// A minimal absolute-origin URL: scheme, optional host/port (from the
/// `Host` header), path and query. `spec.md` §3 requires exposing an
/// empty authority when no `Host` header is present, which the `url`
/// crate's `Url` type can't represent for the `http` scheme (it
/// rejects an empty host as a special scheme) -- so this crate pairs
/// `url::Host` (used to validate/parse just the authority) with its
/// own small holder struct instead of a full `Url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
}

impl RequestUrl {
    pub fn authority(&self) -> String {
        match (&self.host, self.port) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.clone(),
            (None, _) => String::new(),
        }
    }
}

/// A fully- or partially-assembled HTTP request.
///
/// Mutated only by `feed()` on its owning `Stream`; reset between
/// messages on the same connection. See `spec.md` §3/§4.1.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: RequestUrl,
    pub version: Version,
    pub body: Vec<u8>,
    pub remote_addr: SocketAddr,
    /// Set while a `Responder` is alive for this request; blocks the
    /// owning `Stream` from tearing down on disconnect.
    pub handling: bool,
    /// True once headers-complete determined this is a websocket
    /// upgrade request (`Connection: Upgrade` + `Upgrade: websocket`,
    /// method other than CONNECT).
    upgrade: bool,
    headers: HeaderMap,
    state: ParseState,
    body_mode: BodyMode,
    buf: Buf,
}

impl Request {
    pub fn new(remote_addr: SocketAddr) -> Request {
        Request {
            method: Method::Get,
            url: RequestUrl {
                scheme: "http".to_string(),
                host: None,
                port: None,
                path: String::new(),
                query: None,
            },
            version: Version::Http11,
            body: Vec::new(),
            remote_addr,
            handling: false,
            upgrade: false,
            headers: HeaderMap::new(),
            state: ParseState::Initial,
            body_mode: BodyMode::None,
            buf: Buf::new(),
        }
    }

    /// Clears everything parsed so far (per `spec.md` §4.1, "after
    /// OnMessageComplete the Request is reset before the next read").
    /// Any bytes buffered beyond the completed message -- a pipelined
    /// follow-on request -- are deliberately *not* discarded: `feed`
    /// drains them on the very next call, possibly without being
    /// handed any new bytes at all.
    pub fn reset(&mut self) {
        self.method = Method::Get;
        self.url = RequestUrl {
            scheme: "http".to_string(),
            host: None,
            port: None,
            path: String::new(),
            query: None,
        };
        self.version = Version::Http11;
        self.body.clear();
        self.handling = false;
        self.upgrade = false;
        self.headers.clear();
        self.state = ParseState::Initial;
        self.body_mode = BodyMode::None;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParseState::MessageComplete
    }

    /// Set once headers are parsed; see `spec.md` §4.5.
    pub fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    /// Used by the websocket hand-off check (`spec.md` §4.5): a
    /// handshake request must not carry a body.
    pub fn body_is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Feeds `data` to the parser.
    ///
    /// Returns the number of bytes of `data` that were consumed by
    /// this message. Per `spec.md` §4.1 this is `data.len()` unless
    /// the message completed partway through `data`, in which case
    /// the remainder is a pipelined follow-on request the caller must
    /// hand to a fresh `Request` (after `reset()` and, typically,
    /// calling `feed(&[])` once more to drain what's already buffered
    /// here).
    ///
    /// A parse error is this crate's rendering of "the parser is left
    /// in an unrecoverable state" (`spec.md` §4.1): the owning `Stream`
    /// must drop the connection without committing the read
    /// transaction.
    pub fn feed(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.buf.extend(data);
        loop {
            match self.state {
                ParseState::Initial | ParseState::HeadersPartial => {
                    if self.try_parse_headers()? {
                        self.state = ParseState::Body;
                    } else {
                        self.state = ParseState::HeadersPartial;
                        break;
                    }
                }
                ParseState::Body => {
                    if self.consume_body()? {
                        self.state = ParseState::MessageComplete;
                        break;
                    } else {
                        break;
                    }
                }
                ParseState::HeadersDone => unreachable!("transient state"),
                ParseState::MessageComplete => break,
            }
        }
        if self.state == ParseState::MessageComplete {
            Ok(data.len().saturating_sub(self.buf.len()))
        } else {
            Ok(data.len())
        }
    }

    fn try_parse_headers(&mut self) -> Result<bool, Error> {
        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let (method, version, path, owned_headers, consumed) = {
            let mut parsed = httparse::Request::new(&mut raw_headers);
            match parsed.parse(&self.buf[..])? {
                httparse::Status::Partial => return Ok(false),
                httparse::Status::Complete(n) => {
                    let method = parsed.method.unwrap_or("GET").to_string();
                    let version = parsed.version.unwrap_or(1);
                    let path = parsed.path.unwrap_or("/").to_string();
                    let owned_headers: Vec<(String, String)> = parsed
                        .headers
                        .iter()
                        .map(|h| {
                            (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned())
                        })
                        .collect();
                    (method, version, path, owned_headers, n)
                }
            }
        };

        self.method = Method::from(method.as_str());
        self.version = if version == 0 { Version::Http10 } else { Version::Http11 };

        self.headers.clear();
        let mut host_header = None;
        let mut content_length: Option<u64> = None;
        let mut transfer_chunked = false;
        let mut connection_upgrade = false;
        let mut upgrade_websocket = false;
        for (name, value) in owned_headers {
            if host_header.is_none() && name.eq_ignore_ascii_case("host") {
                host_header = Some(value.clone());
            }
            if name.eq_ignore_ascii_case("content-length") {
                if content_length.is_some() {
                    return Err(Error::DuplicateContentLength);
                }
                let n: u64 = value
                    .trim()
                    .parse()
                    .map_err(|_| Error::ContentLengthInvalid)?;
                content_length = Some(n);
            }
            if name.eq_ignore_ascii_case("transfer-encoding") {
                if value
                    .split(',')
                    .last()
                    .map(|tok| tok.trim().eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false)
                {
                    transfer_chunked = true;
                }
            }
            if name.eq_ignore_ascii_case("connection") {
                connection_upgrade = headers::token_list_contains(value.as_bytes(), "upgrade");
            }
            if name.eq_ignore_ascii_case("upgrade") {
                upgrade_websocket =
                    headers::token_eq_ignore_ascii_case(value.as_bytes(), "websocket");
            }
            self.headers.append(name, value);
        }

        self.upgrade = !self.method.as_str().eq_ignore_ascii_case("CONNECT")
            && connection_upgrade
            && upgrade_websocket;

        self.body_mode = if transfer_chunked {
            BodyMode::Chunked(ChunkedState::new())
        } else if let Some(n) = content_length {
            self.body.reserve(n as usize);
            BodyMode::Fixed(n)
        } else {
            BodyMode::None
        };

        self.url = Request::build_url(host_header.as_deref(), &path)?;
        self.buf.consume(consumed);
        Ok(true)
    }

    fn consume_body(&mut self) -> Result<bool, Error> {
        match self.body_mode {
            BodyMode::None => Ok(true),
            BodyMode::Fixed(ref mut remaining) => {
                let take = std::cmp::min(*remaining as usize, self.buf.len());
                if take > 0 {
                    self.body.extend_from_slice(&self.buf[..take]);
                    self.buf.consume(take);
                    *remaining -= take as u64;
                }
                Ok(*remaining == 0)
            }
            BodyMode::Chunked(ref mut state) => {
                state.parse(&mut self.buf)?;
                let n = state.buffered();
                if n > 0 {
                    self.body.extend_from_slice(&self.buf[..n]);
                    self.buf.consume(n);
                    state.consume(n);
                }
                Ok(state.is_done())
            }
        }
    }

    /// Builds the request's `RequestUrl` from the parsed request-target
    /// (origin-form, absolute-form, authority-form or `*`, per RFC 7230
    /// §5.3 -- see `crate::request_target`) and the `Host` header.
    /// Absolute-form carries its own authority and overrides `Host`
    /// (the usual proxy-request shape); the other three forms fall
    /// back to `Host`, as `spec.md` §3 requires ("Host header, if
    /// present, contributes authority/port to URL").
    fn build_url(host_header: Option<&str>, target: &str) -> Result<RequestUrl, Error> {
        use crate::request_target::RequestTarget;
        match RequestTarget::parse(target) {
            Some(RequestTarget::Origin(s)) => {
                let (path, query) = Request::split_query(s);
                let (host, port) = Request::authority_from_host_header(host_header)?;
                Ok(RequestUrl { scheme: "http".to_string(), host, port, path, query })
            }
            Some(RequestTarget::Absolute { scheme, authority, path }) => {
                let (path, query) = Request::split_query(path);
                let path = if path.is_empty() { "/".to_string() } else { path };
                let (host, port) = Request::parse_authority(authority)?;
                Ok(RequestUrl { scheme: scheme.to_string(), host, port, path, query })
            }
            Some(RequestTarget::Authority(auth)) => {
                let (host, port) = Request::parse_authority(auth)?;
                Ok(RequestUrl { scheme: "http".to_string(), host, port, path: String::new(), query: None })
            }
            Some(RequestTarget::Asterisk) => {
                let (host, port) = Request::authority_from_host_header(host_header)?;
                Ok(RequestUrl { scheme: "http".to_string(), host, port, path: "*".to_string(), query: None })
            }
            None => Err(Error::BadRequestTarget),
        }
    }

    fn split_query(s: &str) -> (String, Option<String>) {
        match s.find('?') {
            Some(idx) => (s[..idx].to_string(), Some(s[idx + 1..].to_string())),
            None => (s.to_string(), None),
        }
    }

    fn authority_from_host_header(host_header: Option<&str>) -> Result<(Option<String>, Option<u16>), Error> {
        match host_header {
            Some(h) if !h.trim().is_empty() => Request::parse_authority(h.trim()),
            _ => Ok((None, None)),
        }
    }

    fn parse_authority(raw: &str) -> Result<(Option<String>, Option<u16>), Error> {
        if let Some(bracket_end) = raw.strip_prefix('[').and_then(|r| r.find(']')) {
            let host_part = &raw[..bracket_end + 2];
            let rest = &raw[bracket_end + 2..];
            let host = url::Host::parse(host_part).map_err(|_| Error::HostInvalid)?;
            let port = match rest.strip_prefix(':') {
                Some(p) => Some(p.parse().map_err(|_| Error::HostInvalid)?),
                None => None,
            };
            return Ok((Some(host.to_string()), port));
        }
        match raw.rfind(':') {
            Some(idx) => {
                let (host_part, port_part) = (&raw[..idx], &raw[idx + 1..]);
                match port_part.parse::<u16>() {
                    Ok(port) => {
                        let host = url::Host::parse(host_part).map_err(|_| Error::HostInvalid)?;
                        Ok((Some(host.to_string()), Some(port)))
                    }
                    Err(_) => {
                        let host = url::Host::parse(raw).map_err(|_| Error::HostInvalid)?;
                        Ok((Some(host.to_string()), None))
                    }
                }
            }
            None => {
                let host = url::Host::parse(raw).map_err(|_| Error::HostInvalid)?;
                Ok((Some(host.to_string()), None))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn whole_request_in_one_feed() {
        let mut req = Request::new("127.0.0.1:1234".parse().unwrap());
        let n = req
            .feed(b"GET /hello?x=1 HTTP/1.1\r\nHost: example.org\r\n\r\n")
            .unwrap();
        assert_eq!(n, "GET /hello?x=1 HTTP/1.1\r\nHost: example.org\r\n\r\n".len());
        assert!(req.is_complete());
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url.path, "/hello");
        assert_eq!(req.url.query.as_deref(), Some("x=1"));
        assert_eq!(req.url.host.as_deref(), Some("example.org"));
    }

    #[test]
    fn split_across_many_feeds_yields_same_request() {
        let whole = b"POST /p HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\nhello";
        for split in 0..whole.len() {
            let (a, b) = whole.split_at(split);
            let mut req = Request::new("127.0.0.1:1".parse().unwrap());
            req.feed(a).unwrap();
            req.feed(b).unwrap();
            assert!(req.is_complete(), "split at {}", split);
            assert_eq!(req.body, b"hello");
            assert_eq!(req.url.path, "/p");
        }
    }

    #[test]
    fn no_host_header_gives_empty_authority() {
        let mut req = Request::new("127.0.0.1:1".parse().unwrap());
        req.feed(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(req.is_complete());
        assert_eq!(req.url.scheme, "http");
        assert_eq!(req.url.authority(), "");
    }

    #[test]
    fn pipelined_requests_leave_remainder_unconsumed() {
        let mut req = Request::new("127.0.0.1:1".parse().unwrap());
        let both = b"GET /a HTTP/1.1\r\nHost: h\r\n\r\nGET /b HTTP/1.1\r\nHost: h\r\n\r\n";
        let n = req.feed(both).unwrap();
        assert!(req.is_complete());
        assert_eq!(req.url.path, "/a");
        assert!(n < both.len());

        req.reset();
        req.feed(&[]).unwrap();
        assert!(req.is_complete());
        assert_eq!(req.url.path, "/b");
    }

    #[test]
    fn absolute_form_target_overrides_host_header() {
        let mut req = Request::new("127.0.0.1:1".parse().unwrap());
        req.feed(b"GET http://proxy.example/hello?a=b HTTP/1.1\r\nHost: origin.example\r\n\r\n")
            .unwrap();
        assert!(req.is_complete());
        assert_eq!(req.url.scheme, "http");
        assert_eq!(req.url.host.as_deref(), Some("proxy.example"));
        assert_eq!(req.url.path, "/hello");
        assert_eq!(req.url.query.as_deref(), Some("a=b"));
    }

    #[test]
    fn asterisk_form_target() {
        let mut req = Request::new("127.0.0.1:1".parse().unwrap());
        req.feed(b"OPTIONS * HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        assert!(req.is_complete());
        assert_eq!(req.url.path, "*");
    }

    #[test]
    fn chunked_body_is_reassembled() {
        let mut req = Request::new("127.0.0.1:1".parse().unwrap());
        let whole = b"POST /c HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n\
            5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        req.feed(whole).unwrap();
        assert!(req.is_complete());
        assert_eq!(req.body, b"hello world");
    }
}

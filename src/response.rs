//! A fully materialized response: the value handlers return and the
//! value `AfterRequestChain` transforms operate on. `Responder`
//! serializes one of these (via `send_response`) the same way it
//! serializes a handler's direct `write_*` calls.
use crate::headers::HeaderMap;
use crate::status::StatusCode;

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode) -> Response {
        Response { status, headers: HeaderMap::new(), body: Vec::new() }
    }

    pub fn with_body(status: StatusCode, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = HeaderMap::new();
        headers.append("Content-Type", content_type.to_string());
        Response { status, headers, body }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
        Response::with_body(status, "text/plain", body.into().into_bytes())
    }

    pub fn json(status: StatusCode, body: Vec<u8>) -> Response {
        Response::with_body(status, "application/json", body)
    }

    pub fn empty(status: StatusCode) -> Response {
        Response::with_body(status, "application/x-empty", Vec::new())
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Response {
        self.headers.append(name, value);
        self
    }
}

//! Status-line/header/body serialization state machine shared by every
//! response the `Responder` writes.
//!
//! Grounded on the teacher's `base_serializer.rs::MessageState`. Per
//! `spec.md` §9's open question on chunked responses ("no source draft
//! emits chunked on the way out"), the chunked-response states
//! (`ChunkedHeaders`/`ChunkedBody`/`add_chunked`) are dropped and
//! replaced with a close-delimited body: a response of unknown length
//! is framed by closing the connection once the body ends, rather than
//! by a transfer-encoding.
use std::fmt::Display;
use std::io::Write;

use tk_bufstream::Buf;

use crate::headers::Version;

quick_error! {
    #[derive(Debug)]
    pub enum HeaderError {
        DuplicateContentLength {
            description("Content-Length is added twice")
        }
        InvalidHeaderName {
            description("Header name contains invalid characters")
        }
        InvalidHeaderValue {
            description("Header value contains invalid characters")
        }
        BodyLengthHeader {
            description("Content-Length must be set using add_length()")
        }
        RequireBodyless {
            description("This message must not contain a body")
        }
    }
}

/// State of an in-progress response serialization. The same buffer is
/// expected to be passed to every method call.
#[derive(Debug)]
pub enum MessageState {
    ResponseStart { version: Version, body: Body, close: bool },
    Headers { body: Body, close: bool },
    FixedHeaders { is_head: bool, close: bool, content_length: u64 },
    /// Headers are complete but no length header was written: the
    /// body will be framed by closing the connection at the end.
    CloseDelimitedHeaders { is_head: bool },
    Bodyless,
    FixedBody { is_head: bool, content_length: u64 },
    CloseDelimitedBody { is_head: bool },
    Done,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Body {
    Normal,
    Head,
    /// 1xx, 204, 304: must never carry a body.
    Denied,
}

fn invalid_header(value: &[u8]) -> bool {
    value.iter().any(|&x| x == b'\r' || x == b'\n')
}

impl MessageState {
    pub fn new(version: Version, body: Body, close: bool) -> MessageState {
        MessageState::ResponseStart { version, body, close }
    }

    /// Writes the status line. Must be the first call.
    ///
    /// # Panics
    /// If called twice, or with status 100 (Continue is not a legal
    /// final status).
    pub fn write_status_line(&mut self, buf: &mut Buf, code: u16, reason: &str) {
        use self::MessageState::*;
        match *self {
            ResponseStart { version, mut body, close } => {
                assert!(code != 100, "100 Continue is not a valid final status");
                write!(buf, "{} {} {}\r\n", version, code, reason).unwrap();
                if (100..200).contains(&code) || code == 204 || code == 304 {
                    body = Body::Denied;
                }
                *self = Headers { body, close };
            }
            ref state => panic!("write_status_line() called in state {:?}", state),
        }
    }

    fn raw_header(&mut self, buf: &mut Buf, name: &str, value: &[u8]) -> Result<(), HeaderError> {
        if invalid_header(name.as_bytes()) {
            return Err(HeaderError::InvalidHeaderName);
        }
        let start = buf.len();
        buf.write_all(name.as_bytes()).unwrap();
        buf.write_all(b": ").unwrap();
        let value_start = buf.len();
        buf.write_all(value).unwrap();
        if invalid_header(&buf[value_start..]) {
            buf.remove_range(start..);
            return Err(HeaderError::InvalidHeaderValue);
        }
        buf.write_all(b"\r\n").unwrap();
        Ok(())
    }

    fn raw_formatted<D: Display>(
        &mut self,
        buf: &mut Buf,
        name: &str,
        value: D,
    ) -> Result<(), HeaderError> {
        if invalid_header(name.as_bytes()) {
            return Err(HeaderError::InvalidHeaderName);
        }
        let start = buf.len();
        buf.write_all(name.as_bytes()).unwrap();
        buf.write_all(b": ").unwrap();
        let value_start = buf.len();
        write!(buf, "{}", value).unwrap();
        if invalid_header(&buf[value_start..]) {
            buf.remove_range(start..);
            return Err(HeaderError::InvalidHeaderValue);
        }
        buf.write_all(b"\r\n").unwrap();
        Ok(())
    }

    /// Writes a literal header line. Names and values pass through
    /// unmodified (`spec.md` §8 invariant 4): no lowercasing, no
    /// reordering.
    ///
    /// # Panics
    /// In any state before `write_status_line` or after headers are closed.
    pub fn write_header(&mut self, buf: &mut Buf, name: &str, value: &[u8]) -> Result<(), HeaderError> {
        use self::MessageState::*;
        use self::HeaderError::*;
        if name.eq_ignore_ascii_case("Content-Length") {
            return Err(BodyLengthHeader);
        }
        match *self {
            Headers { .. } | FixedHeaders { .. } | CloseDelimitedHeaders { .. } => {
                self.raw_header(buf, name, value)
            }
            ref state => panic!("write_header() called in state {:?}", state),
        }
    }

    pub fn format_header<D: Display>(&mut self, buf: &mut Buf, name: &str, value: D) -> Result<(), HeaderError> {
        use self::MessageState::*;
        use self::HeaderError::*;
        if name.eq_ignore_ascii_case("Content-Length") {
            return Err(BodyLengthHeader);
        }
        match *self {
            Headers { .. } | FixedHeaders { .. } | CloseDelimitedHeaders { .. } => {
                self.raw_formatted(buf, name, value)
            }
            ref state => panic!("format_header() called in state {:?}", state),
        }
    }

    /// Sets `Content-Length` and transitions to a fixed-size body.
    ///
    /// # Panics
    /// If the length was already set, or the response is bodyless.
    pub fn add_length(&mut self, buf: &mut Buf, n: u64) -> Result<(), HeaderError> {
        use self::MessageState::*;
        use self::HeaderError::*;
        use self::Body::*;
        match *self {
            FixedHeaders { .. } | CloseDelimitedHeaders { .. } => Err(DuplicateContentLength),
            Headers { body: Denied, .. } => Err(RequireBodyless),
            Headers { body, close } => {
                self.raw_formatted(buf, "Content-Length", n)?;
                *self = FixedHeaders { is_head: body == Head, close, content_length: n };
                Ok(())
            }
            ref state => panic!("add_length() called in state {:?}", state),
        }
    }

    /// Leaves the length unset: the body will be framed by closing the
    /// connection once it ends. Forces `Connection: close` onto the
    /// response.
    pub fn set_close_delimited(&mut self) {
        use self::MessageState::*;
        use self::Body::*;
        match *self {
            Headers { body, .. } => {
                *self = CloseDelimitedHeaders { is_head: body == Head };
            }
            ref state => panic!("set_close_delimited() called in state {:?}", state),
        }
    }

    pub fn is_started(&self) -> bool {
        !matches!(*self, MessageState::ResponseStart { .. })
    }

    /// Closes the header section. Returns `true` if a body is expected.
    pub fn done_headers(&mut self, buf: &mut Buf) -> Result<bool, HeaderError> {
        use self::Body::*;
        use self::MessageState::*;
        let force_close = matches!(
            *self,
            Headers { close: true, .. } | FixedHeaders { close: true, .. }
        ) || matches!(*self, CloseDelimitedHeaders { .. });
        if force_close {
            self.raw_header(buf, "Connection", b"close").unwrap();
        }
        let expect_body = match *self {
            Headers { body: Denied, .. } => {
                *self = Bodyless;
                false
            }
            Headers { body: Normal, .. } | Headers { body: Head, .. } => {
                return Err(HeaderError::BodyLengthHeader);
            }
            FixedHeaders { is_head, content_length, .. } => {
                *self = FixedBody { is_head, content_length };
                !is_head
            }
            CloseDelimitedHeaders { is_head } => {
                *self = CloseDelimitedBody { is_head };
                !is_head
            }
            ref state => panic!("done_headers() called in state {:?}", state),
        };
        buf.write_all(b"\r\n").unwrap();
        Ok(expect_body)
    }

    /// Writes a chunk of the body. For a close-delimited body the
    /// bytes are simply appended; the connection close itself is what
    /// terminates it.
    pub fn write_body(&mut self, buf: &mut Buf, data: &[u8]) {
        use self::MessageState::*;
        match *self {
            Bodyless => panic!("message must not contain a body"),
            FixedBody { is_head, ref mut content_length } => {
                if data.len() as u64 > *content_length {
                    panic!(
                        "fixed size response overrun: {} bytes left but got {} more",
                        content_length,
                        data.len()
                    );
                }
                if !is_head {
                    buf.write_all(data).unwrap();
                }
                *content_length -= data.len() as u64;
            }
            CloseDelimitedBody { is_head } => {
                if !is_head {
                    buf.write_all(data).unwrap();
                }
            }
            ref state => panic!("write_body() called in state {:?}", state),
        }
    }

    pub fn is_after_headers(&self) -> bool {
        use self::MessageState::*;
        matches!(*self, Bodyless | Done | FixedBody { .. } | CloseDelimitedBody { .. })
    }

    pub fn is_complete(&self) -> bool {
        matches!(*self, MessageState::Done)
    }

    /// True once the connection must be closed after this response:
    /// either `Connection: close` was forced, or the body was
    /// close-delimited.
    pub fn requires_close(&self) -> bool {
        matches!(
            *self,
            MessageState::CloseDelimitedHeaders { .. }
                | MessageState::CloseDelimitedBody { .. }
                | MessageState::Headers { close: true, .. }
                | MessageState::FixedHeaders { close: true, .. }
        )
    }

    /// Finalizes the message.
    ///
    /// # Panics
    /// If a fixed-size body still has bytes remaining.
    pub fn done(&mut self, _buf: &mut Buf) {
        use self::MessageState::*;
        match *self {
            Bodyless => *self = Done,
            FixedBody { is_head: true, .. } | CloseDelimitedBody { is_head: true } => *self = Done,
            FixedBody { is_head: false, content_length: 0 } => *self = Done,
            FixedBody { is_head: false, content_length } => {
                panic!("tried to close message with {} bytes remaining", content_length)
            }
            CloseDelimitedBody { is_head: false } => *self = Done,
            Done => {}
            ref state => panic!("done() called in state {:?}", state),
        }
    }
}

#[cfg(test)]
mod test {
    use tk_bufstream::Buf;

    use super::{Body, MessageState};
    use crate::headers::Version;

    fn response(close: bool) -> MessageState {
        MessageState::new(Version::Http11, Body::Normal, close)
    }

    #[test]
    fn minimal_response() {
        let mut buf = Buf::new();
        let mut msg = response(false);
        msg.write_status_line(&mut buf, 200, "OK");
        msg.add_length(&mut buf, 0).unwrap();
        msg.done_headers(&mut buf).unwrap();
        msg.done(&mut buf);
        assert_eq!(&buf[..], b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    }

    #[test]
    fn close_forces_connection_header() {
        let mut buf = Buf::new();
        let mut msg = response(true);
        msg.write_status_line(&mut buf, 200, "OK");
        msg.add_length(&mut buf, 0).unwrap();
        msg.done_headers(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn informational_forbids_length() {
        let mut buf = Buf::new();
        let mut msg = response(false);
        msg.write_status_line(&mut buf, 204, "No Content");
        msg.add_length(&mut buf, 5).unwrap_err();
        msg.done_headers(&mut buf).unwrap();
        assert_eq!(&buf[..], b"HTTP/1.1 204 No Content\r\n\r\n");
    }

    #[test]
    fn close_delimited_body_has_no_length_header() {
        let mut buf = Buf::new();
        let mut msg = response(false);
        msg.write_status_line(&mut buf, 200, "OK");
        msg.set_close_delimited();
        msg.done_headers(&mut buf).unwrap();
        msg.write_body(&mut buf, b"hello");
        assert!(msg.requires_close());
        msg.done(&mut buf);
        assert_eq!(
            &buf[..],
            b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nhello"
        );
    }

    #[test]
    fn head_response_omits_body_bytes() {
        let mut buf = Buf::new();
        let mut msg = MessageState::new(Version::Http11, Body::Head, false);
        msg.write_status_line(&mut buf, 200, "OK");
        msg.add_length(&mut buf, 5).unwrap();
        msg.done_headers(&mut buf).unwrap();
        msg.write_body(&mut buf, b"hello");
        msg.done(&mut buf);
        assert_eq!(&buf[..], b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n");
    }
}

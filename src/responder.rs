//! The write-side handle a handler uses to answer a request.
//!
//! Grounded on the teacher's `server/response_writer.rs::ResponseWriter`
//! (a thin wrapper around `MessageState` plus the connection's output
//! buffer) and `base_serializer.rs`. Unlike the teacher's version,
//! `Responder` doesn't own the socket: per `spec.md` §3 ("a Responder
//! holds a borrowed, non-null reference to its Stream for its
//! lifetime"), it borrows the owning `Stream`'s connection state and
//! writes straight into fields the `Stream` keeps alive across the
//! whole request/response cycle -- including past the point where the
//! `Responder` itself is dropped, which is what lets
//! `write_stream(..)` keep streaming after the handler returns
//! (`spec.md` §4.3). It borrows only the connection-state half of the
//! `Stream` (`ConnState`), not the in-progress `Request`, so a caller
//! can hold a `Responder` and a `&Request` from the same `Stream` at
//! once -- exactly what `Router::dispatch` needs to do.
use std::io;

use crate::base_serializer::{Body, MessageState};
use crate::error::Error;
use crate::headers::Version;
use crate::opt_future::OptFuture;
use crate::response::Response;
use crate::status::StatusCode;
use crate::stream::ConnState;

/// An arbitrary byte source streamed into a response body by
/// `Responder::write_stream`. Grounded on `tokio_io::AsyncRead`'s
/// shape but kept plain-synchronous (`spec.md` §5: handlers assume no
/// in-handler suspension), matching this crate's choice to drive
/// streaming as a bounded bounce-buffer loop inside `Stream::poll`
/// rather than a second reactor registration per body.
pub trait BodySource {
    /// Reads up to `buf.len()` bytes. Returns `Ok(0)` at end-of-stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Declared total size, if known up front (a file, a `Vec<u8>`). A
    /// source that can't predict its length returns `None` and the
    /// response falls back to connection-close framing (`spec.md` §9).
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

impl<R: io::Read> BodySource for R {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }
}

/// Move-only, single-use response writer. See `spec.md` §4.3.
pub struct Responder<'a, S: 'a> {
    pub(crate) io: &'a mut ConnState<S>,
}

impl<'a, S: 'a> Responder<'a, S> {
    /// `is_head`/`close` are read out of the `Request` by the caller
    /// before this borrow starts (`Stream::dispatch`), since a
    /// `Responder` must not itself hold a reference into the `Request`
    /// -- see the module doc.
    pub(crate) fn new(io: &'a mut ConnState<S>, version: Version, is_head: bool, close: bool) -> Responder<'a, S> {
        io.handling_request = true;
        io.resp_state = Some(MessageState::new(
            version,
            if is_head { Body::Head } else { Body::Normal },
            close,
        ));
        // Captured here rather than read back out of `resp_state` later:
        // `done_headers` drops the `close` field when it transitions a
        // `FixedHeaders` into a `FixedBody` (a fixed-length response
        // carries no `close` state of its own once headers are
        // written), so by the time the response is finished there is no
        // way to recover a fixed-length HTTP/1.0 or `Connection: close`
        // response's close intent from `MessageState` alone.
        io.force_close = io.force_close || close;
        Responder { io }
    }

    /// Rebuilds a `Responder` borrow over a `ConnState` whose
    /// `MessageState` is already live -- used by `Stream` to serialize
    /// a response that arrives after the handler returned (a deferred
    /// future or a streamed body's completion), where no handler-owned
    /// `Responder` is around to reuse.
    pub(crate) fn from_conn_state(io: &'a mut ConnState<S>) -> Responder<'a, S> {
        Responder { io }
    }

    fn state(&mut self) -> &mut MessageState {
        self.io.resp_state.as_mut().expect("Responder always has a live MessageState")
    }

    /// Must be called first. Panics (per `spec.md` §4.3) if `status`
    /// is not a registered IANA code.
    pub fn write_status_line(&mut self, status: StatusCode) {
        let code = status.code();
        let reason = status.reason();
        let state = self.io.resp_state.as_mut().unwrap();
        let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
        state.write_status_line(buf, code, reason);
    }

    /// Writes one literal header line: no lowercasing, no reordering
    /// (`spec.md` §8 invariant 4).
    pub fn write_header(&mut self, name: &str, value: &str) {
        let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
        self.io
            .resp_state
            .as_mut()
            .unwrap()
            .write_header(buf, name, value.as_bytes())
            .expect("invalid header name/value");
    }

    pub fn write_headers<'h, I>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (&'h str, &'h str)>,
    {
        for (name, value) in headers {
            self.write_header(name, value);
        }
    }

    /// Writes the blank-line separator on first call, then body bytes.
    /// Requires `Content-Length` (or `set_close_delimited`) to have
    /// been established already, same as the underlying
    /// `MessageState`.
    pub fn write_body(&mut self, data: &[u8]) {
        if self.state().is_started() && !self.state_after_headers() {
            let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
            self.io
                .resp_state
                .as_mut()
                .unwrap()
                .done_headers(buf)
                .expect("write_body called before a response length was established");
        }
        let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
        self.io.resp_state.as_mut().unwrap().write_body(buf, data);
    }

    fn state_after_headers(&self) -> bool {
        self.io.resp_state.as_ref().unwrap().is_after_headers()
    }

    /// Convenience: status + headers + body bytes, `Content-Length`
    /// and `Content-Type` always set. For a status that forbids a body
    /// (1xx, 204, 304), `Content-Type`/`Content-Length` are skipped
    /// entirely and `body` is ignored -- matching `spec.md` §4.3's
    /// `write(status)` working for any registered status, not just
    /// ones with a body.
    pub fn write_bytes(mut self, status: StatusCode, content_type: &str, body: &[u8]) {
        self.write_status_line(status);
        if status.forbids_body() {
            let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
            self.io.resp_state.as_mut().unwrap().done_headers(buf).expect("headers closed twice");
            self.finish();
            return;
        }
        self.write_header("Content-Type", content_type);
        let len = body.len() as u64;
        {
            let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
            self.io.resp_state.as_mut().unwrap().add_length(buf, len).expect("length not yet set");
            self.io.resp_state.as_mut().unwrap().done_headers(buf).expect("headers closed twice");
        }
        if !body.is_empty() {
            let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
            self.io.resp_state.as_mut().unwrap().write_body(buf, body);
        }
        self.finish();
    }

    pub fn write_json(self, status: StatusCode, body: &[u8]) {
        self.write_bytes(status, "application/json", body);
    }

    pub fn write_status(self, status: StatusCode) {
        self.write_bytes(status, "application/x-empty", &[]);
    }

    /// Writes a fully materialized `Response` (used for `Router`
    /// matches that return a value rather than taking a `Responder`,
    /// and by `Server::send_response`).
    pub fn send_response(mut self, resp: Response) {
        self.write_status_line(resp.status);
        let headers: Vec<(&str, &str)> = resp.headers.iter().collect();
        self.write_headers(headers);
        let len = resp.body.len() as u64;
        {
            let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
            self.io.resp_state.as_mut().unwrap().add_length(buf, len).expect("length not yet set");
            self.io.resp_state.as_mut().unwrap().done_headers(buf).expect("headers closed twice");
        }
        if !resp.body.is_empty() {
            let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
            self.io.resp_state.as_mut().unwrap().write_body(buf, &resp.body);
        }
        self.finish();
    }

    /// Streams `source` as the body. If `source.len_hint()` is known,
    /// emits `Content-Length`; otherwise the response is
    /// connection-close framed (`spec.md` §9). Ownership of `source`
    /// moves into the owning `Stream`'s `ConnState`, which keeps
    /// pumping it in `BOUNCE_BUFFER_SIZE`-sized chunks across future
    /// `poll()` calls even after this `Responder` (and the handler
    /// that created it) is gone -- see `spec.md` §4.3's "Responder is
    /// allowed to be destroyed at any time during the transfer".
    pub fn write_stream<B, H>(mut self, mut source: B, headers: H, status: StatusCode)
    where
        B: BodySource + 'static,
        H: IntoIterator,
        H::Item: Into<(String, String)>,
    {
        self.write_status_line(status);
        for pair in headers {
            let (name, value) = pair.into();
            self.write_header(&name, &value);
        }
        match source.len_hint() {
            Some(n) => {
                let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
                self.io.resp_state.as_mut().unwrap().add_length(buf, n).expect("length not yet set");
            }
            None => {
                self.io.resp_state.as_mut().unwrap().set_close_delimited();
                self.io.force_close = true;
            }
        }
        {
            let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
            self.io.resp_state.as_mut().unwrap().done_headers(buf).expect("headers closed twice");
        }
        self.io.body_source = Some(Box::new(source));
        // `handling_request` stays true; `Stream::pump_body_source`
        // clears it once `source` is exhausted. No call to `finish()`
        // here -- this is the one write path that outlives `self`.
        std::mem::forget(self);
    }

    /// Hands an in-progress future off to the owning `Stream`
    /// (`spec.md` §5): the `Responder`'s borrow of `ConnState` is kept
    /// alive past this call's return by moving the future into
    /// `io.pending_response` and forgetting `self`, the same escape
    /// hatch `write_stream` uses. `Stream::poll` drives the future to
    /// completion and serializes the resulting `Response` exactly as
    /// `send_response` would.
    pub(crate) fn defer(mut self, fut: OptFuture<Response, Error>) {
        self.io.pending_response = Some(fut);
        std::mem::forget(self);
    }

    fn finish(mut self) {
        let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
        self.io.resp_state.as_mut().unwrap().done(buf);
        self.io.finalize();
        std::mem::forget(self);
    }
}

#[cfg(test)]
mod test {
    use tk_bufstream::{IoBuf, MockData};

    use super::*;
    use crate::status::codes;

    fn conn_state() -> ConnState<MockData> {
        ConnState {
            conn: Some(IoBuf::new(MockData::new())),
            handling_request: false,
            resp_state: None,
            body_source: None,
            pending_response: None,
            close_after_response: false,
            force_close: false,
        }
    }

    #[test]
    fn write_status_does_not_panic_for_a_bodyless_code() {
        let mut io = conn_state();
        let responder = Responder::new(&mut io, Version::Http11, false, false);
        responder.write_status(codes::NO_CONTENT);
        assert!(io.resp_state.as_ref().unwrap().is_complete());
    }

    #[test]
    fn connection_close_on_a_fixed_length_response_marks_the_conn_state_for_close() {
        let mut io = conn_state();
        let responder = Responder::new(&mut io, Version::Http11, false, true);
        responder.write_status(codes::OK);
        assert!(io.force_close);
    }
}

impl<'a, S: 'a> Drop for Responder<'a, S> {
    fn drop(&mut self) {
        if self.io.body_source.is_some() {
            // write_stream already took over; never reached in
            // practice since write_stream forgets self, kept for
            // panic-safety (a panicking handler still runs Drop).
            return;
        }
        match self.io.resp_state.as_ref() {
            Some(state) if state.is_complete() => {}
            Some(state) if state.is_after_headers() => {
                let buf = &mut self.io.conn.as_mut().unwrap().out_buf;
                self.io.resp_state.as_mut().unwrap().done(buf);
            }
            _ => {
                // Nothing was written: spec.md §4.3 calls for an
                // empty, ungracefully-terminated response rather than
                // synthesizing a page, so just mark the connection for
                // close instead of trying to serialize anything.
                self.io.force_close = true;
            }
        }
        self.io.finalize();
    }
}

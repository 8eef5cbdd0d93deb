//! Per-connection state machine.
//!
//! Grounded on the teacher's `server.rs::HttpServer`: the
//! flush-then-read-then-dispatch shape of `Future::poll` is kept, but
//! the teacher's `VecDeque`-based `InFlight` (several pipelined
//! requests answered out of order, re-joined by a `Responding` future
//! at the front of the queue) is simplified to a single in-flight
//! slot. `spec.md` explicitly scopes out concurrent pipelining: only
//! one handler runs per connection at a time, and a second pipelined
//! request simply waits, buffered, until the first is answered.
use std::net::SocketAddr;
use std::rc::Rc;

use futures::{Async, Future, Poll};
use tk_bufstream::IoBuf;
use tokio_core::io::Io;
use tokio_io::{AsyncRead, AsyncWrite};

use crate::base_serializer::MessageState;
use crate::error::Error;
use crate::headers::{Method, Version};
use crate::opt_future::OptFuture;
use crate::request::Request;
use crate::responder::{BodySource, Responder};
use crate::response::Response;
use crate::router::{DispatchResult, RouteOutcome};
use crate::server::ServerShared;
use crate::status::codes;
use crate::websocket;

const BOUNCE_BUFFER_SIZE: usize = 128 * 1024;

/// A socket handed off after a successful websocket handshake,
/// delivered through `Server::next_pending_websocket_connection`
/// (`spec.md` §4.5). Carries the still-buffered `IoBuf` -- the request
/// line and headers were never consumed from it, so a websocket
/// collaborator that wants to re-inspect the raw handshake bytes can.
pub struct UpgradedConnection<S> {
    pub socket: IoBuf<S>,
    pub request: Request,
    pub handshake: websocket::Handshake,
}

/// The half of a `Stream` a `Responder` is allowed to touch: the
/// socket, the in-progress response serialization, and the streamed
/// body source, if any. Split out from `Stream` itself so a
/// `Responder` (which holds `&mut ConnState`) and a `&Request` borrowed
/// from the same `Stream` can coexist -- `Router::dispatch` needs
/// exactly that, handing `Handler::call` both at once.
pub struct ConnState<S> {
    pub(crate) conn: Option<IoBuf<S>>,
    pub(crate) handling_request: bool,
    pub(crate) resp_state: Option<MessageState>,
    pub(crate) body_source: Option<Box<dyn BodySource>>,
    /// Set by `Responder::defer` when a handler returns a future
    /// instead of resolving synchronously (`spec.md` §5).
    pub(crate) pending_response: Option<OptFuture<Response, Error>>,
    pub(crate) close_after_response: bool,
    pub(crate) force_close: bool,
}

impl<S> ConnState<S> {
    /// Called once a response is fully written (normal completion, or
    /// a `Responder` dropped without writing anything): clears the
    /// per-response state so the connection is ready for whatever
    /// comes next. `force_close` is set earlier, at the points where
    /// the close intent is still available (`Responder::new`,
    /// `Responder::write_stream`'s close-delimited branch) -- by the
    /// time `finalize` runs, `done()` has already moved `resp_state` to
    /// `Done`, where a fixed-length response's original close intent
    /// can no longer be read back out of it.
    pub(crate) fn finalize(&mut self) {
        self.resp_state = None;
        self.handling_request = false;
    }
}

/// Owns one accepted connection: the socket, the request currently
/// being parsed (if any), and the state needed to answer it.
pub struct Stream<S> {
    pub(crate) io: ConnState<S>,
    pub(crate) request: Request,
    header_fed: usize,
    shared: Rc<ServerShared<S>>,
}

impl<S: Io + AsyncRead + AsyncWrite> Stream<S> {
    pub fn new(socket: S, remote_addr: SocketAddr, shared: Rc<ServerShared<S>>) -> Stream<S> {
        Stream {
            io: ConnState {
                conn: Some(IoBuf::new(socket)),
                handling_request: false,
                resp_state: None,
                body_source: None,
                pending_response: None,
                close_after_response: false,
                force_close: false,
            },
            request: Request::new(remote_addr),
            header_fed: 0,
            shared,
        }
    }

    /// Reads bytes off the socket until one full request is parsed
    /// (dispatching it immediately) or the socket runs dry.
    fn read_and_dispatch(&mut self) -> Result<(), Error> {
        loop {
            if self.io.handling_request
                || self.io.body_source.is_some()
                || self.io.pending_response.is_some()
                || self.io.conn.is_none()
            {
                return Ok(());
            }
            let avail = self.io.conn.as_ref().unwrap().in_buf.len();
            if avail > self.header_fed {
                let consumed = {
                    let conn = self.io.conn.as_ref().unwrap();
                    self.request.feed(&conn.in_buf[self.header_fed..])?
                };
                self.header_fed += consumed;
                if self.request.is_complete() {
                    if self.request.is_upgrade() {
                        if self.try_hand_off_upgrade() {
                            return Ok(());
                        }
                        warn!("rejecting websocket upgrade for {}: no interested route", self.request.url.path);
                        self.commit_header_bytes();
                        self.io.force_close = true;
                        self.dispatch_missing_handler();
                    } else {
                        self.commit_header_bytes();
                        self.io.close_after_response = self
                            .request
                            .headers()
                            .get("connection")
                            .map(|v| crate::headers::token_list_contains(v.as_bytes(), "close"))
                            .unwrap_or(false);
                        self.dispatch();
                    }
                    if !self.io.handling_request {
                        self.request.reset();
                        self.header_fed = 0;
                    }
                    continue;
                }
                continue;
            }
            if self.io.conn.as_mut().unwrap().read()? == 0 {
                return Ok(());
            }
        }
    }

    fn commit_header_bytes(&mut self) {
        if let Some(ref mut conn) = self.io.conn {
            conn.in_buf.consume(self.header_fed);
        }
        self.header_fed = 0;
    }

    /// `spec.md` §4.5: surrenders the socket to a websocket
    /// collaborator only if the application registered interest *and*
    /// the router has a rule that would have handled this path/method.
    /// Returns `true` if the hand-off happened.
    fn try_hand_off_upgrade(&mut self) -> bool {
        if !self.shared.websocket_interest() {
            return false;
        }
        if !self.shared.router.has_match(&self.request) {
            return false;
        }
        let handshake = match websocket::detect(self.request.headers(), !self.request.body_is_empty()) {
            Ok(Some(h)) => h,
            _ => return false,
        };
        let conn = self.io.conn.take().expect("socket is owned while a request is in flight");
        let mut request = Request::new(self.request.remote_addr);
        std::mem::swap(&mut request, &mut self.request);
        self.shared.push_upgraded(UpgradedConnection { socket: conn, request, handshake });
        true
    }

    /// Builds a `Responder` borrowing `self.io` and immediately hands
    /// it to `Router::dispatch` alongside `&self.request`. The
    /// `Responder::new(&mut self.io, ..)` call is written inline
    /// (rather than behind a `&mut self` helper) so the borrow checker
    /// sees it as borrowing only the `io` field, leaving `self.request`
    /// free to be borrowed at the same time.
    fn dispatch(&mut self) {
        let shared = self.shared.clone();
        let version = self.request.version;
        let is_head = self.request.method == Method::Head;
        let close = self.io.close_after_response || version == Version::Http10;
        let responder = Responder::new(&mut self.io, version, is_head, close);
        match shared.router.dispatch(&self.request, Some(responder)) {
            DispatchResult::Matched(RouteOutcome::Responded) => {}
            DispatchResult::Matched(RouteOutcome::Response(resp, responder)) => {
                let resp = shared.after_request.apply(resp, &self.request);
                if let Some(responder) = responder {
                    responder.send_response(resp);
                }
            }
            DispatchResult::Matched(RouteOutcome::Deferred(fut, responder)) => {
                if let Some(responder) = responder {
                    responder.defer(fut);
                }
            }
            DispatchResult::NoMatch(Some(responder)) => {
                shared.invoke_missing_handler(&self.request, responder);
            }
            DispatchResult::NoMatch(None) => unreachable!("a Responder was always supplied"),
        }
    }

    fn dispatch_missing_handler(&mut self) {
        let shared = self.shared.clone();
        let version = self.request.version;
        let is_head = self.request.method == Method::Head;
        let close = self.io.close_after_response || version == Version::Http10;
        let responder = Responder::new(&mut self.io, version, is_head, close);
        shared.invoke_missing_handler(&self.request, responder);
        if !self.io.handling_request {
            self.request.reset();
            self.header_fed = 0;
        }
    }

    /// Pumps up to `BOUNCE_BUFFER_SIZE` bytes at a time from a
    /// streamed body into the output buffer (`spec.md` §4.3's
    /// `write_stream`), the same bounded-bounce-buffer discipline the
    /// teacher's `IoBuf` uses between the socket and its own in/out
    /// buffers.
    fn pump_body_source(&mut self) -> Result<(), Error> {
        while self.io.body_source.is_some() {
            if let Some(ref conn) = self.io.conn {
                if conn.out_buf.len() > BOUNCE_BUFFER_SIZE {
                    break;
                }
            }
            let mut chunk = [0u8; BOUNCE_BUFFER_SIZE];
            let n = {
                let source = self.io.body_source.as_mut().unwrap();
                source.read(&mut chunk).map_err(Error::BodySourceUnavailable)?
            };
            if n == 0 {
                self.io.body_source = None;
                if let Some(ref mut state) = self.io.resp_state {
                    let conn = self.io.conn.as_mut().expect("socket owned while streaming a response");
                    state.done(&mut conn.out_buf);
                }
                self.io.finalize();
                self.request.reset();
                self.header_fed = 0;
                break;
            }
            if let Some(ref mut conn) = self.io.conn {
                if let Some(ref mut state) = self.io.resp_state {
                    state.write_body(&mut conn.out_buf, &chunk[..n]);
                }
            }
        }
        Ok(())
    }

    /// Drives a future handed off by `Responder::defer` (`spec.md`
    /// §5): polled on every `Stream::poll`, and on readiness serialized
    /// through a freshly-built `Responder` the same way `dispatch`
    /// serializes an immediately-returned `Response`.
    fn poll_pending_response(&mut self) -> Result<(), Error> {
        let mut fut = match self.io.pending_response.take() {
            Some(fut) => fut,
            None => return Ok(()),
        };
        match fut.poll() {
            Ok(Async::Ready(resp)) => {
                let resp = self.shared.after_request.apply(resp, &self.request);
                let responder = Responder::from_conn_state(&mut self.io);
                responder.send_response(resp);
                self.request.reset();
                self.header_fed = 0;
            }
            Ok(Async::NotReady) => {
                self.io.pending_response = Some(fut);
            }
            Err(e) => {
                warn!("deferred handler failed: {}", e);
                self.io.force_close = true;
                self.io.finalize();
            }
        }
        Ok(())
    }
}

impl<S: Io + AsyncRead + AsyncWrite> Future for Stream<S> {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        if let Some(ref mut conn) = self.io.conn {
            conn.flush()?;
        }

        self.read_and_dispatch()?;
        self.pump_body_source()?;
        self.poll_pending_response()?;

        match self.io.conn {
            Some(ref mut conn) => {
                conn.flush()?;
                let idle = !self.io.handling_request
                    && self.io.body_source.is_none()
                    && self.io.pending_response.is_none();
                if conn.done() || (idle && self.io.force_close) {
                    return Ok(Async::Ready(()));
                }
            }
            None => return Ok(Async::Ready(())),
        }
        Ok(Async::NotReady)
    }
}

/// Emits the library's built-in 404: invoked when no route matched and
/// the application never registered a `missing_handler` (`spec.md`
/// §4.6).
pub fn default_missing_handler<S>(_req: &Request, responder: Responder<'_, S>) {
    responder.write_status(codes::NOT_FOUND);
}

//! Top-level façade: binds listeners, owns the Router and the
//! AfterRequestChain, and drives the single-threaded accept loop.
//!
//! Grounded on the teacher's `server.rs::HttpServer` (single Future per
//! connection, driven by one reactor) and `examples/hello_world.rs`'s
//! `listener.incoming().map(..).buffer_unordered(n).for_each(..)`
//! accept-loop shape, generalized from wrapping one `tokio_service::Service`
//! into driving this crate's own `Router`/`AfterRequestChain` pair
//! directly (`spec.md` §4.6). `server/config.rs::Config`'s mutable-self
//! builder (`.inflight_request_limit(n)` then `.done()`) is the model
//! for this crate's own `Config`.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;

use futures::{Future, Stream as FutureStream};
use tokio_core::net::{TcpListener, TcpStream};
use tokio_core::reactor::Core;

use crate::after_request::AfterRequestChain;
use crate::error::Error;
use crate::headers::MethodMask;
use crate::request::Request;
use crate::responder::Responder;
use crate::response::Response;
use crate::router::{Handler, Router};
use crate::stream::{default_missing_handler, Stream, UpgradedConnection};

/// Tunables for the accept loop. Builder-style, mirroring the
/// teacher's `server/config.rs::Config`.
#[derive(Debug, Clone)]
pub struct Config {
    max_connections: usize,
}

impl Config {
    /// Defaults: 8192 concurrently-driven connections, matching the
    /// teacher's own examples (`buffer_unordered(200000)` is the
    /// teacher's demo value; 8192 is a saner default for an embeddable
    /// library that hasn't been told its deployment's fan-out).
    pub fn new() -> Config {
        Config { max_connections: 8192 }
    }

    /// Width of the accept loop's `buffer_unordered`: how many
    /// connections are driven concurrently before a new `accept()` is
    /// read off the listener.
    pub fn max_connections(&mut self, value: usize) -> &mut Self {
        self.max_connections = value;
        self
    }

    pub fn done(&mut self) -> Config {
        self.clone()
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

type MissingHandler<S> = Box<dyn for<'r> Fn(&Request, Responder<'r, S>)>;

/// Immutable, shared-between-connections half of `Server`: the
/// `Router`, the `AfterRequestChain` and the missing-handler, frozen
/// the first time a listener starts accepting (`spec.md` §4.6:
/// "Converters and rules are treated as immutable once serving
/// begins"). `router`/`after_request` are plain fields rather than
/// `RefCell`s -- `Stream::dispatch` only ever reads them, and nothing
/// mutates a `ServerShared` after `Server::freeze` builds it.
pub struct ServerShared<S> {
    pub(crate) router: Router<S>,
    pub(crate) after_request: AfterRequestChain,
    missing_handler: MissingHandler<S>,
    websocket_interest: Cell<bool>,
    upgraded: RefCell<VecDeque<UpgradedConnection<S>>>,
}

impl<S> ServerShared<S> {
    pub(crate) fn websocket_interest(&self) -> bool {
        self.websocket_interest.get()
    }

    pub(crate) fn push_upgraded(&self, conn: UpgradedConnection<S>) {
        self.upgraded.borrow_mut().push_back(conn);
    }

    pub(crate) fn invoke_missing_handler(&self, req: &Request, responder: Responder<'_, S>) {
        (self.missing_handler)(req, responder);
    }
}

/// Pre-serve registration state. Consumed into an `Rc<ServerShared<S>>`
/// the first time a listener starts accepting; kept in a
/// `RefCell<Option<..>>` on `Server` so the registration methods can
/// mutate it through `&self` (`spec.md` §4.6 gives every façade method
/// a `&self`-shaped signature, not `&mut self`).
struct Builder<S> {
    router: Router<S>,
    after_request: AfterRequestChain,
    missing_handler: MissingHandler<S>,
}

impl<S: 'static> Builder<S> {
    fn new() -> Builder<S> {
        Builder {
            router: Router::new(),
            after_request: AfterRequestChain::new(),
            missing_handler: Box::new(default_missing_handler),
        }
    }
}

/// Top-level façade (`spec.md` §4.6): owns the `Router`, the
/// `AfterRequestChain`, the missing-handler and the set of bound
/// listeners, and runs the single-threaded accept loop.
///
/// Concretely parameterized over `tokio_core::net::TcpStream`: this
/// crate has one transport (plain TCP), so unlike `Stream<S>` and
/// `Router<S>` (left generic so they're unit-testable without a real
/// socket), `Server` fixes `S` instead of threading a type parameter
/// through the public façade -- the same choice the teacher's own
/// `examples/*.rs` binaries make when they instantiate `Proto<TcpStream, _>`
/// directly rather than staying generic up to `main`.
pub struct Server {
    core: RefCell<Core>,
    config: Config,
    builder: RefCell<Option<Builder<TcpStream>>>,
    shared: RefCell<Option<Rc<ServerShared<TcpStream>>>>,
    listeners: RefCell<Vec<SocketAddr>>,
}

impl Server {
    pub fn new(config: Config) -> Result<Server, Error> {
        Ok(Server {
            core: RefCell::new(Core::new()?),
            config,
            builder: RefCell::new(Some(Builder::new())),
            shared: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// Registers `handler` for `pattern`/`methods`. Returns `false` if
    /// the pattern's capture count doesn't match the handler's arity,
    /// or if serving has already begun (`spec.md` §7's "registration
    /// API returns false" for a shape error or a too-late call).
    pub fn route<H, M>(&self, pattern: &str, methods: MethodMask, handler: H) -> bool
    where
        H: Handler<TcpStream, M> + 'static,
        M: 'static,
    {
        match self.builder.borrow_mut().as_mut() {
            Some(b) => b.router.route(pattern, methods, handler),
            None => false,
        }
    }

    /// Overrides the built-in 404 (`crate::stream::default_missing_handler`).
    /// Returns `false` once serving has begun.
    pub fn set_missing_handler<F>(&self, handler: F) -> bool
    where
        F: for<'r> Fn(&Request, Responder<'r, TcpStream>) + 'static,
    {
        match self.builder.borrow_mut().as_mut() {
            Some(b) => {
                b.missing_handler = Box::new(handler);
                true
            }
            None => false,
        }
    }

    /// Appends a response transform to the `AfterRequestChain`.
    /// Returns `false` once serving has begun.
    pub fn add_after_request_handler<F>(&self, f: F) -> bool
    where
        F: Fn(Response, &Request) -> Response + 'static,
    {
        match self.builder.borrow_mut().as_mut() {
            Some(b) => {
                b.after_request.add(f);
                true
            }
            None => false,
        }
    }

    /// Applies the `AfterRequestChain` and serializes `resp` (`spec.md`
    /// §4.6's `send_response` operation) -- for a caller that obtained
    /// a `Request`/`Responder` pair outside the ordinary dispatch path.
    pub fn send_response(&self, req: &Request, responder: Responder<'_, TcpStream>, resp: Response) {
        let resp = self.freeze().after_request.apply(resp, req);
        responder.send_response(resp);
    }

    fn freeze(&self) -> Rc<ServerShared<TcpStream>> {
        if self.shared.borrow().is_none() {
            let builder = self.builder.borrow_mut().take().unwrap_or_else(Builder::new);
            *self.shared.borrow_mut() = Some(Rc::new(ServerShared {
                router: builder.router,
                after_request: builder.after_request,
                missing_handler: builder.missing_handler,
                websocket_interest: Cell::new(false),
                upgraded: RefCell::new(VecDeque::new()),
            }));
        }
        self.shared.borrow().as_ref().unwrap().clone()
    }

    /// Marks the application as interested in WebSocket hand-offs
    /// (`spec.md` §4.5's "signal subscription"). A request whose
    /// handshake the `Router` would also route is detached from the
    /// HTTP pipeline and queued for `next_pending_websocket_connection`
    /// instead of being answered as an ordinary request.
    pub fn accept_websocket_upgrades(&self) {
        self.freeze().websocket_interest.set(true);
    }

    /// Drains one hand-off from the queue populated by a successful
    /// upgrade, if any (`spec.md` §4.5/§9's publish side of a
    /// single-consumer queue).
    pub fn next_pending_websocket_connection(&self) -> Option<UpgradedConnection<TcpStream>> {
        self.freeze().upgraded.borrow_mut().pop_front()
    }

    /// Binds `address:port` and starts accepting connections on it.
    /// Returns the bound port, or `0` on failure (`spec.md` §4.6); a
    /// requested port of `0` asks the OS for an ephemeral one, whose
    /// actual value is returned.
    pub fn listen(&self, address: &str, port: u16) -> u16 {
        let addr: SocketAddr = match format!("{}:{}", address, port).parse() {
            Ok(a) => a,
            Err(_) => return 0,
        };
        let handle = self.core.borrow().handle();
        let listener = match TcpListener::bind(&addr, &handle) {
            Ok(l) => l,
            Err(e) => {
                warn!("failed to bind {}: {}", addr, e);
                return 0;
            }
        };
        let bound_addr = match listener.local_addr() {
            Ok(a) => a,
            Err(_) => addr,
        };
        if self.spawn_listener(listener, Some(bound_addr)) {
            bound_addr.port()
        } else {
            0
        }
    }

    /// Accepts connections on an already-bound `TcpListener` (`spec.md`
    /// §4.6's `bind(listener) -> bool`, for a socket the application
    /// set up itself -- e.g. one inherited from a supervisor).
    pub fn bind(&self, listener: TcpListener) -> bool {
        let local = listener.local_addr().ok();
        self.spawn_listener(listener, local)
    }

    fn spawn_listener(&self, listener: TcpListener, addr: Option<SocketAddr>) -> bool {
        let shared = self.freeze();
        let handle = self.core.borrow().handle();
        let max_connections = self.config.max_connections;
        let accept_loop = listener
            .incoming()
            .map_err(|e| {
                warn!("accept error: {}", e);
            })
            .map(move |(socket, remote_addr)| {
                Stream::new(socket, remote_addr, shared.clone()).map_err(|e| {
                    debug!("connection error: {}", e);
                })
            })
            .buffer_unordered(max_connections)
            .for_each(|()| Ok(()));
        handle.spawn(accept_loop);
        if let Some(addr) = addr {
            self.listeners.borrow_mut().push(addr);
        }
        true
    }

    /// Bound listener addresses, in the order `listen`/`bind` were
    /// called (`spec.md` §4.6's `servers()`).
    pub fn servers(&self) -> Vec<SocketAddr> {
        self.listeners.borrow().clone()
    }

    /// Runs the event loop forever, driving every spawned listener and
    /// connection (`spec.md` §5's single-threaded cooperative model:
    /// "blocking inside a handler blocks the entire Server").
    pub fn run(&self) -> Result<(), Error> {
        self.core.borrow_mut().run(futures::future::empty::<(), Error>())
    }

    /// Pumps the reactor for a single bounded iteration, processing
    /// whatever I/O is already ready and waiting up to `max_wait` for
    /// more (`None` waits indefinitely for at least one event). A
    /// thin wrapper over `tokio_core::reactor::Core::turn`, useful for
    /// embedding the loop inside an application's own scheduling or for
    /// driving a handful of connections in a test without calling the
    /// forever-blocking `run`.
    pub fn turn(&self, max_wait: Option<std::time::Duration>) {
        self.core.borrow_mut().turn(max_wait);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::status::codes;

    #[test]
    fn registration_is_rejected_after_serving_begins() {
        let server = Server::new(Config::new()).unwrap();
        assert!(server.route("/hello", MethodMask::ALL, |_req: &Request| Response::text(codes::OK, "hi")));
        let port = server.listen("127.0.0.1", 0);
        assert!(port != 0, "binding an ephemeral port should succeed");
        assert!(!server.route("/late", MethodMask::ALL, || Response::text(codes::OK, "late")));
        assert!(!server.add_after_request_handler(|resp, _req| resp));
        assert_eq!(server.servers(), vec![format!("127.0.0.1:{}", port).parse().unwrap()]);
    }
}

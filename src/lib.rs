//! An embeddable HTTP/1.1 server library built on `tokio-core`: bind
//! listeners, register routes with typed path captures, stream
//! responses, and hand off upgraded connections to a WebSocket
//! collaborator.
#![recursion_limit = "100"]

extern crate futures;
extern crate httparse;
extern crate netbuf;
extern crate rand;
extern crate sha1;
extern crate tk_bufstream;
extern crate tokio_core;
extern crate url;
#[macro_use(quick_error)]
extern crate quick_error;
#[macro_use]
extern crate matches;
#[macro_use]
extern crate log;

mod base_serializer;
mod chunked;
mod opt_future;
mod request_target;

pub mod after_request;
pub mod error;
pub mod headers;
pub mod request;
pub mod responder;
pub mod response;
pub mod router;
pub mod server;
pub mod status;
pub mod stream;
pub mod websocket;

pub use crate::after_request::AfterRequestChain;
pub use crate::error::Error;
pub use crate::headers::{HeaderMap, Method, MethodMask, Version};
pub use crate::opt_future::OptFuture;
pub use crate::request::Request;
pub use crate::responder::{BodySource, Responder};
pub use crate::response::Response;
pub use crate::router::{FromCapture, Router};
pub use crate::server::{Config, Server};
pub use crate::status::{codes, StatusCode};

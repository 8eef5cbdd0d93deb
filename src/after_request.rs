//! Response-transform pipeline applied before a `Response` reaches the
//! `Responder`.
//!
//! Grounded on `spec.md` §4.6: an ordered list of `(Response, Request)
//! -> Response` callables, owned by `Server` alongside the `Router`,
//! run in registration order on every matched dispatch before
//! serialization. The teacher has no direct counterpart (`tk-http`
//! leaves response post-processing to the application's `Service`),
//! so this is a thin, newly-written piece shaped the same way the
//! rest of the crate's registries are: a `Vec<Box<dyn Fn(..)>>`
//! pushed to at registration time, walked read-only at dispatch time.
use crate::request::Request;
use crate::response::Response;

/// Ordered list of response transforms. Owned by `Server`; see
/// `spec.md` §3 ("Applied in registration order, each taking and
/// returning an owned Response").
#[derive(Default)]
pub struct AfterRequestChain {
    transforms: Vec<Box<dyn Fn(Response, &Request) -> Response>>,
}

impl AfterRequestChain {
    pub fn new() -> AfterRequestChain {
        AfterRequestChain { transforms: Vec::new() }
    }

    pub fn add<F>(&mut self, f: F)
    where
        F: Fn(Response, &Request) -> Response + 'static,
    {
        self.transforms.push(Box::new(f));
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Runs every transform over `resp` in registration order.
    pub fn apply(&self, mut resp: Response, req: &Request) -> Response {
        for transform in &self.transforms {
            resp = transform(resp, req);
        }
        resp
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::status::codes;
    use std::net::SocketAddr;

    fn req() -> Request {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        Request::new(addr)
    }

    #[test]
    fn transforms_run_in_registration_order() {
        let mut chain = AfterRequestChain::new();
        chain.add(|resp, _req| resp.header("X-Order", "1"));
        chain.add(|resp, _req| resp.header("X-Order", "2"));

        let resp = chain.apply(Response::empty(codes::OK), &req());
        let values: Vec<_> = resp.headers.get_all("X-Order").collect();
        assert_eq!(values, vec!["1", "2"]);
    }

    #[test]
    fn empty_chain_returns_response_unchanged() {
        let chain = AfterRequestChain::new();
        let resp = chain.apply(Response::text(codes::OK, "hi"), &req());
        assert_eq!(resp.body, b"hi");
    }
}

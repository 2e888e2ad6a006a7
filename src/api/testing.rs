//! Test support: a middleware that stands in for the transport.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::api::client::ApiClient;
use crate::api::middleware::{CallRequest, CallResult, Middleware, Next};
use crate::config::Config;

/// Short-circuits the chain with canned response bodies, recording every
/// request it sees. The last body repeats once the queue runs dry, so a
/// stub with one body answers forever.
pub(crate) struct StubTransport {
    responses: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<CallRequest>>,
}

impl StubTransport {
    pub(crate) fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub(crate) fn request(&self, index: usize) -> CallRequest {
        self.seen.lock()[index].clone()
    }
}

impl Middleware for StubTransport {
    fn handle<'a>(&'a self, request: CallRequest, _next: Next<'a>) -> BoxFuture<'a, CallResult> {
        self.seen.lock().push(request);
        let mut responses = self.responses.lock();
        let body = if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap_or_default()
        };
        Box::pin(async move { Ok(body) })
    }
}

/// A client wired to a [`StubTransport`]; no network is ever touched.
pub(crate) fn stub_client(responses: &[&str], config: Config) -> (ApiClient, Arc<StubTransport>) {
    let stub = StubTransport::new(responses);
    let client = ApiClient::new("123:ABCdef", config)
        .expect("test token is valid")
        .with_middleware(stub.clone());
    (client, stub)
}

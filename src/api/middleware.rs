//! Middleware chain for outgoing calls.
//!
//! Middleware units observe or transform a call on its way to the
//! transport and the raw response on its way back, or short-circuit by
//! answering without delegating. The engine walks the chain
//! front-to-back, so the first-registered middleware sees the call first
//! and the response last; the terminal link performs the transport send.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::api::params::WirePayload;
use crate::error::Error;

/// HTTP verb of an outgoing call. The API is driven over POST; GET is
/// kept for custom calls against non-standard endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVerb {
    #[default]
    Post,
    Get,
}

/// One outgoing call as seen by the middleware chain.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub method: String,
    pub verb: HttpVerb,
    pub payload: WirePayload,
}

/// Raw response body produced by the terminal link (or a short-circuit).
pub type CallResult = Result<String, Error>;

/// The innermost link: sends the request over the configured transport.
pub type Terminal = dyn Fn(CallRequest) -> BoxFuture<'static, CallResult> + Send + Sync;

/// A middleware unit.
///
/// Implementations receive the request and a [`Next`] handle; calling
/// `next.run(request)` delegates to the rest of the chain, returning
/// without doing so short-circuits the call.
pub trait Middleware: Send + Sync {
    fn handle<'a>(&'a self, request: CallRequest, next: Next<'a>) -> BoxFuture<'a, CallResult>;
}

/// Handle to the remainder of the chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a Terminal,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], terminal: &'a Terminal) -> Self {
        Self { chain, terminal }
    }

    /// Run the rest of the chain, ending at the transport.
    pub fn run(self, request: CallRequest) -> BoxFuture<'a, CallResult> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(
                request,
                Next {
                    chain: rest,
                    terminal: self.terminal,
                },
            ),
            None => (self.terminal)(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Appends a tag on the way in and on the way out.
    struct Tracer {
        tag: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Tracer {
        fn handle<'a>(&'a self, request: CallRequest, next: Next<'a>) -> BoxFuture<'a, CallResult> {
            Box::pin(async move {
                self.trace.lock().push(format!("{}:in", self.tag));
                let result = next.run(request).await;
                self.trace.lock().push(format!("{}:out", self.tag));
                result
            })
        }
    }

    /// Answers without delegating.
    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn handle<'a>(&'a self, _request: CallRequest, _next: Next<'a>) -> BoxFuture<'a, CallResult> {
            Box::pin(async { Ok(r#"{"ok":true,"result":"short"}"#.to_string()) })
        }
    }

    fn request() -> CallRequest {
        CallRequest {
            method: "getMe".to_string(),
            verb: HttpVerb::Post,
            payload: WirePayload::Form(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_first_registered_runs_outermost() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Tracer {
                tag: "first",
                trace: trace.clone(),
            }),
            Arc::new(Tracer {
                tag: "second",
                trace: trace.clone(),
            }),
        ];
        let terminal: Box<Terminal> = Box::new(|_request| {
            Box::pin(async { Ok(r#"{"ok":true}"#.to_string()) })
        });

        Next::new(&chain, terminal.as_ref())
            .run(request())
            .await
            .unwrap();

        assert_eq!(
            *trace.lock(),
            vec!["first:in", "second:in", "second:out", "first:out"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_terminal() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(ShortCircuit)];
        let terminal: Box<Terminal> = Box::new(|_request| {
            Box::pin(async { panic!("terminal must not run") })
        });

        let body = Next::new(&chain, terminal.as_ref())
            .run(request())
            .await
            .unwrap();
        assert!(body.contains("short"));
    }
}

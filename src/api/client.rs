//! Request dispatch engine.
//!
//! Every API call funnels through [`ApiClient`]: method validation,
//! parameter normalization, the middleware chain, the retry loop with
//! its rate-limit resubmission, and response decoding.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::api::middleware::{CallRequest, CallResult, HttpVerb, Middleware, Next, Terminal};
use crate::api::params::{self, Params};
use crate::api::transport::TransportBackend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::ApiResponse;
use crate::utils::{is_valid_method, is_valid_token, redact_token};

/// Context handed to a recovery handler after the retry loop gives up.
#[derive(Debug)]
pub struct ErrorContext {
    pub method: String,
    /// Attempts charged against the retry budget.
    pub attempts: u32,
    pub error: Error,
}

/// Optional escape hatch consulted at the outermost retry boundary.
///
/// When registered it fully replaces error propagation: its return value
/// becomes the call's result.
pub type RecoveryHandler = Arc<dyn Fn(ErrorContext) -> Result<Value> + Send + Sync>;

/// A deferred call: a handle resolving to the call's result later.
///
/// Ordering between concurrently issued deferred calls is not
/// guaranteed; callers must not assume it.
#[derive(Debug)]
pub struct CallHandle {
    join: JoinHandle<Result<Value>>,
}

impl CallHandle {
    /// Await the call's result.
    pub async fn wait(self) -> Result<Value> {
        match self.join.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(Error::Validation("deferred call was cancelled".to_string())),
        }
    }

    /// Abandon the call. The request may still reach the server.
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Client for the Bot API.
///
/// Holds the validated credential, the configured transport backend and
/// the middleware chain. Immutable once built; cheap to share through an
/// [`Arc`], which deferred calls and update handlers rely on.
pub struct ApiClient {
    token: String,
    config: Config,
    base_url: String,
    transport: TransportBackend,
    middleware: Vec<Arc<dyn Middleware>>,
    recovery: Option<RecoveryHandler>,
}

impl ApiClient {
    /// Create a client, validating the token and configuration before
    /// any network activity.
    pub fn new(token: impl Into<String>, config: Config) -> Result<Self> {
        let token = token.into();
        if !is_valid_token(&token) {
            return Err(Error::Validation(
                "malformed bot token (expected '<digits>:<secret>')".to_string(),
            ));
        }

        let transport = TransportBackend::new(&config)?;
        let base_url = format!("https://{}/bot{}", config.api_host, token);

        info!(bot = %redact_token(&token), "api client initialized");

        Ok(Self {
            token,
            config,
            base_url,
            transport,
            middleware: Vec::new(),
            recovery: None,
        })
    }

    /// Append a middleware unit. Registration order is significant: the
    /// first-registered middleware sees the call first and the response
    /// last.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Register the recovery handler consulted when a call has exhausted
    /// its retries.
    #[must_use]
    pub fn with_recovery(mut self, handler: RecoveryHandler) -> Self {
        self.recovery = Some(handler);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bot id half of the token, for log correlation.
    pub fn bot_id(&self) -> &str {
        self.token.split(':').next().unwrap_or("")
    }

    /// Invoke an API method and await its decoded result.
    pub async fn call(&self, method: &str, params: Params) -> Result<Value> {
        let request = self.prepare(method, params, HttpVerb::Post)?;
        self.run_with_retries(request).await
    }

    /// Invoke a custom method over GET instead of POST.
    pub async fn call_get(&self, method: &str, params: Params) -> Result<Value> {
        let request = self.prepare(method, params, HttpVerb::Get)?;
        self.run_with_retries(request).await
    }

    /// Issue a call without awaiting it, returning a handle that
    /// resolves to the result later.
    ///
    /// Requires the pooled transport; on the simple backend this is a
    /// configuration error signaled immediately, never retried.
    pub fn call_deferred(self: &Arc<Self>, method: &str, params: Params) -> Result<CallHandle> {
        if !self.transport.is_pooled() {
            return Err(Error::Validation(
                "deferred calls require the pooled transport".to_string(),
            ));
        }

        // Validate and normalize before spawning so malformed calls are
        // rejected on the caller's side of the task boundary.
        let request = self.prepare(method, params, HttpVerb::Post)?;

        let client = Arc::clone(self);
        let join = tokio::spawn(async move { client.run_with_retries(request).await });
        Ok(CallHandle { join })
    }

    /// Validation and normalization, shared by every entry point.
    fn prepare(&self, method: &str, params: Params, verb: HttpVerb) -> Result<CallRequest> {
        if !is_valid_method(method) {
            return Err(Error::Validation(format!(
                "malformed method name '{method}' (letters only)"
            )));
        }
        self.check_memory_ceiling()?;

        Ok(CallRequest {
            method: method.to_string(),
            verb,
            payload: params::normalize(params),
        })
    }

    /// Advisory guardrail: refuse new calls once process memory exceeds
    /// the configured ceiling. Calls already in flight are unaffected.
    fn check_memory_ceiling(&self) -> Result<()> {
        let Some(limit) = self.config.memory_limit else {
            return Ok(());
        };
        let Some(rss) = process_rss_bytes() else {
            // No RSS accounting on this platform; the guardrail is off.
            return Ok(());
        };
        if rss > limit {
            return Err(Error::Validation(format!(
                "refusing call: process rss {rss} exceeds memory limit {limit}"
            )));
        }
        Ok(())
    }

    /// The retry loop.
    ///
    /// Attempts are charged against the configured budget; a rate-limit
    /// response earns one resubmission after the server-specified wait,
    /// outside that budget.
    async fn run_with_retries(&self, request: CallRequest) -> Result<Value> {
        let method = request.method.clone();
        let mut attempts: u32 = 0;
        let mut rate_limit_spent = false;

        loop {
            attempts += 1;
            let error = match self.execute_once(request.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if let Some(wait) = error.rate_limit_wait() {
                if !rate_limit_spent {
                    rate_limit_spent = true;
                    attempts -= 1;
                    warn!(
                        method = %method,
                        wait_secs = wait.as_secs(),
                        "rate limited, resubmitting after server-specified wait"
                    );
                    sleep(wait).await;
                    continue;
                }
                return self.surface(&method, attempts, error);
            }

            if error.is_retryable() && attempts <= self.config.max_retries {
                let delay = self.config.retry_backoff.delay_for(attempts);
                warn!(
                    method = %method,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "api call failed, retrying"
                );
                sleep(delay).await;
                continue;
            }

            return self.surface(&method, attempts, error);
        }
    }

    /// One pass through the middleware chain plus response decoding.
    async fn execute_once(&self, request: CallRequest) -> Result<Value> {
        let method = request.method.clone();

        let transport = self.transport.clone();
        let config = self.config.clone();
        let base_url = self.base_url.clone();
        let terminal: Box<Terminal> = Box::new(move |req: CallRequest| -> BoxFuture<'static, CallResult> {
            let transport = transport.clone();
            let config = config.clone();
            let base_url = base_url.clone();
            Box::pin(async move { transport.send(&config, &base_url, req).await })
        });

        let body = Next::new(&self.middleware, terminal.as_ref())
            .run(request)
            .await?;

        let response: ApiResponse =
            serde_json::from_str(&body).map_err(|source| Error::Decode {
                method: method.clone(),
                source,
            })?;

        response.into_result(&method)
    }

    /// Give up: log, then either propagate or hand the error to the
    /// registered recovery handler, whose return value becomes the
    /// call's result.
    fn surface(&self, method: &str, attempts: u32, error: Error) -> Result<Value> {
        error!(method = %method, attempts, error = %error, "api call failed permanently");

        match &self.recovery {
            Some(recovery) => recovery(ErrorContext {
                method: method.to_string(),
                attempts,
                error,
            }),
            None => Err(error),
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("bot", &redact_token(&self.token))
            .field("transport", &self.config.transport)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Resident set size of this process, if the platform exposes it.
#[cfg(target_os = "linux")]
fn process_rss_bytes() -> Option<u64> {
    const PAGE_SIZE: u64 = 4096;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * PAGE_SIZE)
}

#[cfg(not(target_os = "linux"))]
fn process_rss_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::stub_client;
    use crate::config::TransportKind;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_malformed_token_rejected_before_io() {
        match ApiClient::new("not-a-token", Config::default()) {
            Err(Error::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_me_happy_path_zero_retries() {
        let (client, stub) = stub_client(
            &[r#"{"ok":true,"result":{"id":1,"is_bot":true}}"#],
            Config::default(),
        );

        let result = client.call("getMe", Params::new()).await.unwrap();
        assert_eq!(result["id"], 1);
        assert_eq!(result["is_bot"], true);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_method_rejected_before_transport() {
        let (client, stub) = stub_client(&[r#"{"ok":true}"#], Config::default());

        match client.call("send_message", Params::new()).await {
            Err(Error::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_yields_n_plus_one_attempts() {
        // Bodies that never decode keep the call failing retryably.
        let (client, stub) = stub_client(
            &["not json"],
            Config {
                max_retries: 2,
                ..Config::default()
            },
        );

        match client.call("getMe", Params::new()).await {
            Err(Error::Decode { .. }) => {}
            other => panic!("expected decode error, got {other:?}"),
        }
        assert_eq!(stub.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_resubmits_once_outside_budget() {
        // Zero ordinary retries: the resubmission must not consume them.
        let (client, stub) = stub_client(
            &[
                r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":5}}"#,
                r#"{"ok":true,"result":"done"}"#,
            ],
            Config::default(),
        );

        let result = client.call("sendMessage", Params::new()).await.unwrap();
        assert_eq!(result, json!("done"));
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_rate_limit_surfaces() {
        let (client, stub) = stub_client(
            &[
                r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":1}}"#,
            ],
            Config::default(),
        );

        match client.call("sendMessage", Params::new()).await {
            Err(Error::Api { code: 429, .. }) => {}
            other => panic!("expected rate-limit error, got {other:?}"),
        }
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_handler_replaces_propagation() {
        let consulted = Arc::new(Mutex::new(0u32));
        let seen = consulted.clone();

        let (client, _stub) = stub_client(
            &["not json"],
            Config {
                max_retries: 1,
                ..Config::default()
            },
        );
        let client = client.with_recovery(Arc::new(move |context| {
            *seen.lock() += 1;
            assert_eq!(context.method, "getMe");
            assert_eq!(context.attempts, 2);
            Ok(json!("recovered"))
        }));

        let result = client.call("getMe", Params::new()).await.unwrap();
        assert_eq!(result, json!("recovered"));
        assert_eq!(*consulted.lock(), 1);
    }

    #[tokio::test]
    async fn test_api_error_carries_code_and_description() {
        let (client, _stub) = stub_client(
            &[r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#],
            Config::default(),
        );

        match client.call("sendMessage", Params::new()).await {
            Err(Error::Api { code, description, .. }) => {
                assert_eq!(code, 400);
                assert!(description.contains("chat not found"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deferred_requires_pooled_transport() {
        let (client, _stub) = stub_client(
            &[r#"{"ok":true,"result":1}"#],
            Config {
                transport: TransportKind::Simple,
                ..Config::default()
            },
        );
        let client = Arc::new(client);

        match client.call_deferred("getMe", Params::new()) {
            Err(Error::Validation(message)) => assert!(message.contains("pooled")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deferred_call_resolves_later() {
        let (client, _stub) = stub_client(&[r#"{"ok":true,"result":{"id":9}}"#], Config::default());
        let client = Arc::new(client);

        let handle = client.call_deferred("getMe", Params::new()).unwrap();
        let result = handle.wait().await.unwrap();
        assert_eq!(result["id"], 9);
    }
}

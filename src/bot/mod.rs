//! Bot module - the update ingestion engine.
//!
//! Ties the dispatcher to one of the two ingestion modes fixed at
//! construction: a long-polling loop or a webhook server.

pub mod dispatcher;
pub mod handlers;
mod polling;
mod webhook;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::api::ApiClient;
use crate::config::{BotMode, Config};
use crate::error::Result;
use crate::storage::{InMemoryStorage, UpdateStorage};

pub use dispatcher::Dispatcher;
pub use polling::{Poller, PollerState, StopHandle};

/// A bot: an API client plus a dispatcher, run in the configured mode.
pub struct Bot {
    client: Arc<ApiClient>,
    dispatcher: Arc<Dispatcher>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot").finish_non_exhaustive()
    }
}

impl Bot {
    /// Create a bot with the in-memory update storage.
    pub fn new(token: impl Into<String>, config: Config) -> Result<Self> {
        Self::with_storage(token, config, Arc::new(InMemoryStorage::new()))
    }

    /// Create a bot deduplicating against the given storage backend.
    pub fn with_storage(
        token: impl Into<String>,
        config: Config,
        storage: Arc<dyn UpdateStorage>,
    ) -> Result<Self> {
        let dispatcher = Arc::new(Dispatcher::new(storage, &config));
        let client = Arc::new(ApiClient::new(token, config)?);
        let (stop_tx, stop_rx) = watch::channel(false);

        Ok(Self {
            client,
            dispatcher,
            stop_tx,
            stop_rx,
        })
    }

    /// The underlying API client, shareable with handlers and tasks.
    pub fn client(&self) -> Arc<ApiClient> {
        Arc::clone(&self.client)
    }

    /// The dispatcher, for registering handlers.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// A handle that stops whichever mode [`run`](Bot::run) is in.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::from_sender(self.stop_tx.clone())
    }

    /// Run the bot in the configured mode until stopped.
    ///
    /// Polling additionally returns an error if the fetch-failure
    /// ceiling is hit; the webhook server runs until the stop handle
    /// fires.
    pub async fn run(&self) -> Result<()> {
        let config = self.client.config();
        match config.bot_mode {
            BotMode::Polling => {
                info!("starting bot in polling mode");
                let poller = Poller::with_stop(
                    self.client(),
                    Arc::clone(&self.dispatcher),
                    self.stop_rx.clone(),
                );
                poller.run().await
            }
            BotMode::Webhook => {
                info!("starting bot in webhook mode");
                let state = Arc::new(webhook::WebhookState {
                    dispatcher: Arc::clone(&self.dispatcher),
                    client: self.client(),
                    secret: config.webhook_secret.clone(),
                    restrict_ips: config.restrict_webhook_ips,
                });
                webhook::serve(state, config.webhook_port, self.stop_rx.clone()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_bot_rejects_malformed_token() {
        match Bot::new("definitely wrong", Config::default()) {
            Err(Error::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_bot_exposes_shared_client() {
        let bot = Bot::new("123:ABCdef", Config::default()).unwrap();
        let first = bot.client();
        let second = bot.client();
        assert!(Arc::ptr_eq(&first, &second));
    }
}

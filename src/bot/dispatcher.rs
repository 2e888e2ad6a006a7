//! Update dispatcher.
//!
//! Applies the same algorithm to every inbound envelope, whether it
//! arrived over a webhook or from the polling loop: duplicate
//! suppression against update storage, minimum-spacing enforcement,
//! then handler dispatch in a fixed precedence order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::bot::handlers::{
    CallbackQueryHandler, CommandHandler, EventHandler, HandlerFn, wrap,
};
use crate::config::Config;
use crate::storage::UpdateStorage;
use crate::types::Update;

/// Dispatches envelopes to at most one of the registered handler kinds.
///
/// Dedup check, spacing and the processed-mark are serialized through an
/// internal gate so the at-most-once and minimum-spacing guarantees hold
/// even if callers overlap; handler bodies run outside the gate.
pub struct Dispatcher {
    storage: Arc<dyn UpdateStorage>,
    dedup_ttl: Duration,
    min_spacing: Duration,
    /// Instant of the previous dispatch; also the serialization gate.
    gate: tokio::sync::Mutex<Option<Instant>>,
    update_callback: RwLock<Option<Arc<HandlerFn>>>,
    commands: CommandHandler,
    callbacks: CallbackQueryHandler,
    events: EventHandler,
}

impl Dispatcher {
    pub fn new(storage: Arc<dyn UpdateStorage>, config: &Config) -> Self {
        Self {
            storage,
            dedup_ttl: config.dedup_ttl,
            min_spacing: config.min_update_spacing,
            gate: tokio::sync::Mutex::new(None),
            update_callback: RwLock::new(None),
            commands: CommandHandler::new(),
            callbacks: CallbackQueryHandler::new(),
            events: EventHandler::new(),
        }
    }

    /// Register the generic update callback, invoked for every
    /// dispatched envelope before the keyed handlers.
    pub fn on_update<F, Fut>(&self, callback: F)
    where
        F: Fn(Arc<Update>, Arc<ApiClient>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        *self.update_callback.write() = Some(wrap(callback));
    }

    /// Register a `/command` action.
    pub fn on_command<F, Fut>(&self, command: &str, action: F)
    where
        F: Fn(Arc<Update>, Arc<ApiClient>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.commands.register(command, action);
    }

    /// Register an action for a callback query with this exact data.
    pub fn on_callback_query<F, Fut>(&self, data: &str, action: F)
    where
        F: Fn(Arc<Update>, Arc<ApiClient>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.callbacks.register(data, action);
    }

    /// Register the catch-all handler for messages no command claimed.
    pub fn on_event<F, Fut>(&self, action: F)
    where
        F: Fn(Arc<Update>, Arc<ApiClient>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.events.register(action);
    }

    /// Dispatch one envelope.
    ///
    /// Returns whether the envelope reached the handlers (`false` means
    /// it was suppressed as a duplicate). Handler failures are caught
    /// and logged here, never propagated to the loop driver.
    pub async fn dispatch(&self, update: Update, client: Arc<ApiClient>) -> bool {
        let id = update.update_id.to_string();

        {
            let mut gate = self.gate.lock().await;

            if self.storage.has(&id) {
                debug!(update_id = update.update_id, "suppressing duplicate update");
                return false;
            }

            if let Some(previous) = *gate {
                let wait = self.min_spacing.saturating_sub(previous.elapsed());
                if !wait.is_zero() {
                    sleep(wait).await;
                }
            }

            // Mark before running handlers: a handler failure must not
            // cause redelivery.
            self.storage.mark_processed(&id, self.dedup_ttl);
            *gate = Some(Instant::now());
        }

        let update = Arc::new(update);
        debug!(
            update_id = update.update_id,
            kind = update.kind(),
            "dispatching update"
        );

        let callback = self.update_callback.read().clone();
        if let Some(callback) = callback {
            if let Err(error) = callback(Arc::clone(&update), Arc::clone(&client)).await {
                tracing::error!(
                    update_id = update.update_id,
                    error = %error,
                    "update callback failed"
                );
            }
        }

        let mut handled = false;
        if update.callback_query.is_some() {
            handled = self.callbacks.handle(&update, &client).await;
        } else if update.message.is_some() {
            if self.commands.handle(&update, &client).await {
                handled = true;
            } else if self.events.handle(&update, &client).await {
                handled = true;
            }
        }

        if !handled {
            warn!(
                update_id = update.update_id,
                kind = update.kind(),
                "no handler claimed update"
            );
        }

        true
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("min_spacing", &self.min_spacing)
            .field("dedup_ttl", &self.dedup_ttl)
            .field("commands", &!self.commands.is_empty())
            .field("events", &self.events.is_registered())
            .finish()
    }
}

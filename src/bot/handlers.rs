//! Handler registry.
//!
//! Three independently optional handler kinds plus the generic update
//! callback, consulted by the dispatcher in a fixed precedence order.
//! Registration may happen at any time between updates; the maps are
//! concurrent so a running bot can grow its command set.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::api::ApiClient;
use crate::types::Update;

/// The future every handler action returns.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A registered action: receives the immutable envelope and the client
/// handle.
pub type HandlerFn = dyn Fn(Arc<Update>, Arc<ApiClient>) -> HandlerFuture + Send + Sync;

/// Box a plain async closure into a registrable action.
pub(crate) fn wrap<F, Fut>(action: F) -> Arc<HandlerFn>
where
    F: Fn(Arc<Update>, Arc<ApiClient>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |update, client| Box::pin(action(update, client)))
}

/// Run one action, catching its error so a broken handler never takes
/// down the loop.
async fn run_action(action: Arc<HandlerFn>, update: &Arc<Update>, client: &Arc<ApiClient>) {
    if let Err(error) = action(Arc::clone(update), Arc::clone(client)).await {
        error!(
            update_id = update.update_id,
            error = %error,
            "handler failed"
        );
    }
}

/// Command-prefix dispatch: `(command, action)` pairs matched against
/// the leading `/command` of a message.
#[derive(Default)]
pub struct CommandHandler {
    actions: DashMap<String, Arc<HandlerFn>>,
}

impl CommandHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action for a command; a missing leading slash is
    /// added so `start` and `/start` register the same command.
    pub fn register<F, Fut>(&self, command: &str, action: F)
    where
        F: Fn(Arc<Update>, Arc<ApiClient>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let command = if command.starts_with('/') {
            command.to_string()
        } else {
            format!("/{command}")
        };
        debug!(command = %command, "registered command handler");
        self.actions.insert(command, wrap(action));
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run the action matching the message's command, if any.
    ///
    /// Returns whether this handler claimed the update. An action error
    /// still counts as claimed: the command ran, it just failed.
    pub(crate) async fn handle(&self, update: &Arc<Update>, client: &Arc<ApiClient>) -> bool {
        let Some(message) = update.message.as_ref() else {
            return false;
        };
        let Some(command) = message.command() else {
            return false;
        };
        let Some(action) = self.actions.get(command).map(|entry| Arc::clone(entry.value()))
        else {
            return false;
        };

        run_action(action, update, client).await;
        true
    }
}

/// Inline-callback-data dispatch: actions keyed on the exact `data`
/// payload of a callback query.
#[derive(Default)]
pub struct CallbackQueryHandler {
    actions: DashMap<String, Arc<HandlerFn>>,
}

impl CallbackQueryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, data: &str, action: F)
    where
        F: Fn(Arc<Update>, Arc<ApiClient>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        debug!(data = %data, "registered callback-query handler");
        self.actions.insert(data.to_string(), wrap(action));
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub(crate) async fn handle(&self, update: &Arc<Update>, client: &Arc<ApiClient>) -> bool {
        let Some(query) = update.callback_query.as_ref() else {
            return false;
        };
        let Some(data) = query.data.as_deref() else {
            return false;
        };
        let Some(action) = self.actions.get(data).map(|entry| Arc::clone(entry.value())) else {
            return false;
        };

        run_action(action, update, client).await;
        true
    }
}

/// Catch-all for message updates no command claimed.
#[derive(Default)]
pub struct EventHandler {
    action: RwLock<Option<Arc<HandlerFn>>>,
}

impl EventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, action: F)
    where
        F: Fn(Arc<Update>, Arc<ApiClient>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        *self.action.write() = Some(wrap(action));
    }

    pub fn is_registered(&self) -> bool {
        self.action.read().is_some()
    }

    pub(crate) async fn handle(&self, update: &Arc<Update>, client: &Arc<ApiClient>) -> bool {
        if update.message.is_none() {
            return false;
        }
        let Some(action) = self.action.read().clone() else {
            return false;
        };

        run_action(action, update, client).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::stub_client;
    use crate::config::Config;
    use parking_lot::Mutex;
    use serde_json::json;

    fn update(value: serde_json::Value) -> Arc<Update> {
        Arc::new(serde_json::from_value(value).unwrap())
    }

    fn client() -> Arc<ApiClient> {
        let (client, _stub) = stub_client(&[r#"{"ok":true,"result":null}"#], Config::default());
        Arc::new(client)
    }

    fn counting_action(
        hits: &Arc<Mutex<Vec<i64>>>,
    ) -> impl Fn(Arc<Update>, Arc<ApiClient>) -> futures::future::Ready<anyhow::Result<()>>
    + Send
    + Sync
    + 'static {
        let hits = hits.clone();
        move |update, _client| {
            hits.lock().push(update.update_id);
            futures::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_command_handler_matches_registered_command() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let commands = CommandHandler::new();
        commands.register("/start", counting_action(&hits));

        let matched = update(json!({
            "update_id": 1,
            "message": {"message_id": 1, "chat": {"id": 7, "type": "private"}, "text": "/start now"}
        }));
        assert!(commands.handle(&matched, &client()).await);
        assert_eq!(*hits.lock(), vec![1]);

        let unmatched = update(json!({
            "update_id": 2,
            "message": {"message_id": 2, "chat": {"id": 7, "type": "private"}, "text": "/stop"}
        }));
        assert!(!commands.handle(&unmatched, &client()).await);
    }

    #[tokio::test]
    async fn test_register_adds_missing_slash() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let commands = CommandHandler::new();
        commands.register("help", counting_action(&hits));

        let message = update(json!({
            "update_id": 3,
            "message": {"message_id": 1, "chat": {"id": 7, "type": "private"}, "text": "/help"}
        }));
        assert!(commands.handle(&message, &client()).await);
    }

    #[tokio::test]
    async fn test_callback_handler_keyed_on_data() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let callbacks = CallbackQueryHandler::new();
        callbacks.register("pick:1", counting_action(&hits));

        let matched = update(json!({
            "update_id": 4,
            "callback_query": {"id": "q1", "from": {"id": 9, "first_name": "A"}, "data": "pick:1"}
        }));
        assert!(callbacks.handle(&matched, &client()).await);

        let unmatched = update(json!({
            "update_id": 5,
            "callback_query": {"id": "q2", "from": {"id": 9, "first_name": "A"}, "data": "pick:2"}
        }));
        assert!(!callbacks.handle(&unmatched, &client()).await);
    }

    #[tokio::test]
    async fn test_event_handler_catches_any_message() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let events = EventHandler::new();
        events.register(counting_action(&hits));

        let message = update(json!({
            "update_id": 6,
            "message": {"message_id": 1, "chat": {"id": 7, "type": "private"}, "text": "plain text"}
        }));
        assert!(events.handle(&message, &client()).await);

        let not_message = update(json!({
            "update_id": 7,
            "poll": {"id": "p1", "question": "?"}
        }));
        assert!(!events.handle(&not_message, &client()).await);
    }

    #[tokio::test]
    async fn test_failing_action_still_claims_update() {
        let commands = CommandHandler::new();
        commands.register("/boom", |_update, _client| {
            futures::future::ready(Err(anyhow::anyhow!("broken handler")))
        });

        let message = update(json!({
            "update_id": 8,
            "message": {"message_id": 1, "chat": {"id": 7, "type": "private"}, "text": "/boom"}
        }));
        assert!(commands.handle(&message, &client()).await);
    }
}

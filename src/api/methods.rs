//! Thin typed wrappers over [`ApiClient::call`].
//!
//! Pure parameter shaping; none of the dispatch logic lives here. The
//! full per-endpoint surface belongs to callers; these are the handful
//! the crate itself needs (polling, webhook management) plus the most
//! common conveniences.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::client::ApiClient;
use crate::api::params::{InputFile, Params};
use crate::error::{Error, Result};
use crate::types::{Message, Update, User};

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|source| Error::Decode {
        method: method.to_string(),
        source,
    })
}

impl ApiClient {
    /// `getMe`: the bot's own account.
    pub async fn get_me(&self) -> Result<User> {
        let result = self.call("getMe", Params::new()).await?;
        decode("getMe", result)
    }

    /// `sendMessage` with plain text.
    pub async fn send_message(&self, chat_id: i64, text: impl Into<String>) -> Result<Message> {
        let params = Params::new().with("chat_id", chat_id).with("text", text.into());
        let result = self.call("sendMessage", params).await?;
        decode("sendMessage", result)
    }

    /// `sendDocument` with an upload.
    pub async fn send_document(
        &self,
        chat_id: i64,
        document: InputFile,
        caption: Option<&str>,
    ) -> Result<Message> {
        let mut params = Params::new().with("chat_id", chat_id).with("document", document);
        if let Some(caption) = caption {
            params.insert("caption", caption);
        }
        let result = self.call("sendDocument", params).await?;
        decode("sendDocument", result)
    }

    /// `getUpdates`: one long-poll fetch starting at `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        limit: Option<u8>,
        timeout: Option<Duration>,
    ) -> Result<Vec<Update>> {
        let mut params = Params::new();
        if let Some(offset) = offset {
            params.insert("offset", offset);
        }
        if let Some(limit) = limit {
            params.insert("limit", limit as i64);
        }
        if let Some(timeout) = timeout {
            params.insert("timeout", timeout.as_secs() as i64);
        }
        let result = self.call("getUpdates", params).await?;
        decode("getUpdates", result)
    }

    /// `setWebhook`: register the public endpoint updates are pushed to.
    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<bool> {
        let mut params = Params::new().with("url", url);
        if let Some(secret) = secret_token {
            params.insert("secret_token", secret);
        }
        let result = self.call("setWebhook", params).await?;
        decode("setWebhook", result)
    }

    /// `deleteWebhook`: back to polling.
    pub async fn delete_webhook(&self) -> Result<bool> {
        let result = self.call("deleteWebhook", Params::new()).await?;
        decode("deleteWebhook", result)
    }

    /// `answerCallbackQuery`: acknowledge a button press.
    pub async fn answer_callback_query(&self, query_id: &str, text: Option<&str>) -> Result<bool> {
        let mut params = Params::new().with("callback_query_id", query_id);
        if let Some(text) = text {
            params.insert("text", text);
        }
        let result = self.call("answerCallbackQuery", params).await?;
        decode("answerCallbackQuery", result)
    }
}

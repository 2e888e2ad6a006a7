//! Wire types - Update envelopes and API response decoding.
//!
//! Only the fields the dispatch and ingestion engines need are modeled;
//! everything else in a payload is ignored by serde so the types stay
//! permissive across Bot API revisions.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

/// A Telegram user or bot.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

/// A chat: private conversation, group, supergroup or channel.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// An inbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// The leading `/command` of this message, if any.
    ///
    /// Strips a trailing `@botname` suffix so `/start@my_bot arg` and
    /// `/start arg` resolve to the same command.
    pub fn command(&self) -> Option<&str> {
        let text = self.text.as_deref()?;
        if !text.starts_with('/') {
            return None;
        }
        let first = text.split_whitespace().next()?;
        Some(first.split('@').next().unwrap_or(first))
    }
}

/// A button press on an inline keyboard.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

/// An inline query typed after the bot's username.
#[derive(Debug, Clone, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub offset: String,
}

/// A shipping address confirmation request.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub invoice_payload: String,
}

/// A pre-checkout confirmation request.
#[derive(Debug, Clone, Deserialize)]
pub struct PreCheckoutQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub total_amount: i64,
    #[serde(default)]
    pub invoice_payload: String,
}

/// A native poll state change.
#[derive(Debug, Clone, Deserialize)]
pub struct Poll {
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub is_closed: bool,
}

/// A user's answer in a non-anonymous poll.
#[derive(Debug, Clone, Deserialize)]
pub struct PollAnswer {
    pub poll_id: String,
    pub user: Option<User>,
    #[serde(default)]
    pub option_ids: Vec<i32>,
}

/// A chat-member status transition.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub from: User,
    #[serde(default)]
    pub date: i64,
}

/// A request to join a chat.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatJoinRequest {
    pub chat: Chat,
    pub from: User,
    #[serde(default)]
    pub date: i64,
}

/// One inbound update envelope.
///
/// Carries a unique identifier and, per the Bot API contract, at most one
/// populated payload variant. Envelopes are decoded once (webhook body or
/// polling response element) and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub edited_message: Option<Message>,
    pub channel_post: Option<Message>,
    pub edited_channel_post: Option<Message>,
    pub inline_query: Option<InlineQuery>,
    pub callback_query: Option<CallbackQuery>,
    pub shipping_query: Option<ShippingQuery>,
    pub pre_checkout_query: Option<PreCheckoutQuery>,
    pub poll: Option<Poll>,
    pub poll_answer: Option<PollAnswer>,
    pub my_chat_member: Option<ChatMemberUpdated>,
    pub chat_member: Option<ChatMemberUpdated>,
    pub chat_join_request: Option<ChatJoinRequest>,
}

impl Update {
    /// The message-shaped payload, whichever variant carries it.
    pub fn any_message(&self) -> Option<&Message> {
        self.message
            .as_ref()
            .or(self.edited_message.as_ref())
            .or(self.channel_post.as_ref())
            .or(self.edited_channel_post.as_ref())
    }

    /// Short payload-variant name for log lines.
    pub fn kind(&self) -> &'static str {
        if self.message.is_some() {
            "message"
        } else if self.edited_message.is_some() {
            "edited_message"
        } else if self.channel_post.is_some() {
            "channel_post"
        } else if self.edited_channel_post.is_some() {
            "edited_channel_post"
        } else if self.inline_query.is_some() {
            "inline_query"
        } else if self.callback_query.is_some() {
            "callback_query"
        } else if self.shipping_query.is_some() {
            "shipping_query"
        } else if self.pre_checkout_query.is_some() {
            "pre_checkout_query"
        } else if self.poll.is_some() {
            "poll"
        } else if self.poll_answer.is_some() {
            "poll_answer"
        } else if self.my_chat_member.is_some() {
            "my_chat_member"
        } else if self.chat_member.is_some() {
            "chat_member"
        } else if self.chat_join_request.is_some() {
            "chat_join_request"
        } else {
            "unknown"
        }
    }
}

/// Extra failure metadata the service attaches to some error responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseParameters {
    /// Seconds to wait before resubmitting, on rate-limit responses.
    pub retry_after: Option<u64>,
    pub migrate_to_chat_id: Option<i64>,
}

/// The decoded API response envelope.
///
/// A `result` is usable only when `ok` is true; callers must branch on
/// [`ApiResponse::into_result`] rather than assuming a payload exists.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    pub result: Option<Value>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
    pub parameters: Option<ResponseParameters>,
}

impl ApiResponse {
    /// Convert into the success payload or a typed API error.
    pub fn into_result(self, method: &str) -> Result<Value, Error> {
        if self.ok {
            return Ok(self.result.unwrap_or(Value::Null));
        }

        let retry_after = self
            .parameters
            .as_ref()
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs);

        Err(Error::Api {
            method: method.to_string(),
            code: self.error_code.unwrap_or(0),
            description: self
                .description
                .unwrap_or_else(|| "no description".to_string()),
            retry_after,
        })
    }
}

//! Hermes - Telegram Bot API client and update dispatch.
//!
//! A lightweight client for the Bot API with both ingestion modes and a
//! single `call` entry point every request funnels through.
//!
//! ## Architecture
//!
//! - `config` - Explicit configuration struct with env loading
//! - `api` - Request dispatch engine (transports, middleware, retries)
//! - `types` - Update envelopes and response decoding
//! - `storage` - Pluggable processed-update set (in-memory included)
//! - `bot` - Update ingestion engine (polling loop, webhook server,
//!   handler dispatch)
//! - `error` - The error taxonomy
//!
//! ## Usage
//!
//! ```no_run
//! use hermes::{Bot, Config};
//! use tracing_subscriber::EnvFilter;
//!
//! # async fn run() -> hermes::Result<()> {
//! let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hermes=info"));
//! tracing_subscriber::fmt().with_env_filter(filter).init();
//!
//! let bot = Bot::new("123456:ABC-DEF_token", Config::from_env()?)?;
//!
//! bot.dispatcher().on_command("/start", |update, client| async move {
//!     let chat_id = update.message.as_ref().unwrap().chat.id;
//!     client.send_message(chat_id, "hello!").await?;
//!     Ok(())
//! });
//!
//! bot.run().await
//! # }
//! ```

pub mod api;
pub mod bot;
pub mod config;
pub mod error;
pub mod storage;
pub mod types;
pub mod utils;

pub use api::{ApiClient, CallHandle, InputFile, Middleware, Params};
pub use bot::{Bot, Dispatcher, Poller, PollerState, StopHandle};
pub use config::{BackoffStrategy, BotMode, Config, TransportKind};
pub use error::{Error, Result};
pub use storage::{InMemoryStorage, UpdateStorage};
pub use types::{ApiResponse, Update};

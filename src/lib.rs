//! chatrelay - multi-provider LLM chat client library
//!
//! This library forwards chat messages to OpenAI, Google, Anthropic, Groq,
//! HuggingFace or a locally hosted OpenAI-compatible server, normalizes
//! their answers, and keeps conversation history in SQLite.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `config`: Configuration loading, clamping and endpoint resolution
//! - `providers`: Provider enum, per-vendor wire adapters and model catalog
//! - `request`: History filtering/truncation and payload construction
//! - `transport`: HTTP transport, timeout/cancellation race, health checks
//! - `response`: Normalizing provider replies
//! - `policy`: Per-provider rate windows and the explicit retry helper
//! - `client`: The exchange pipeline tying the above together
//! - `conversation` / `storage`: History model and its SQLite store
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use chatrelay::{ChatClient, Config, SendOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let client = ChatClient::new(config)?;
//!     let answer = client.send("Hello", &[], &SendOptions::default()).await?;
//!     println!("{}", answer.content);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod providers;
pub mod request;
pub mod response;
pub mod storage;
pub mod transport;

// Re-export commonly used types
pub use client::{ChatClient, SendOptions};
pub use config::Config;
pub use conversation::{Conversation, Message, MessageKind};
pub use error::{ChatRelayError, Result};
pub use policy::ExchangePolicy;
pub use providers::{NormalizedResponse, Provider};

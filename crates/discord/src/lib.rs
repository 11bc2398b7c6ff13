//! Discord interface for truthwatch
//!
//! - **Gateway** (`gateway`) - event stream runner with reconnect backoff
//! - **Commands** (`commands`) - prefix and mention parsing, `!filter-posts`, `!monitor-posts`, ...
//! - **Events** (`events`) - ready and message-create dispatch
//! - **Embeds** (`embeds`) - message and embed builders
//! - **REST** (`rest`) - channel message delivery over the HTTP API
//!
//! # Architecture
//!
//! ```text
//! Gateway events → EventDispatcher → MessageCreateHandler → CommandRouter → BotCommandService
//!                                                                   ↓
//!                                     ChannelMessenger ← MessageTemplate
//! ```

pub mod commands;
pub mod embeds;
pub mod events;
pub mod gateway;
pub mod rest;

//! # Hubcast
//!
//! Rust SDK for Workspace Hub, the real-time workspace chat service bridging
//! humans and coding agents.
//!
//! ## Receiving pushes (browser-style viewer)
//!
//! ```rust,no_run
//! use hubcast::{PushClient, PushClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = PushClientOptions::new("hub_live_token", "workspace-1")
//!         .with_base_url("http://127.0.0.1:7910");
//!     let mut push = PushClient::new(options)?;
//!
//!     let mut messages = push.subscribe_messages();
//!     push.connect().await?;
//!
//!     while let Ok(message) = messages.recv().await {
//!         println!("[{}] {}", message.id, message.content);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! The push client heartbeats the socket, tears it down when the network goes
//! silent, reconnects on a fixed delay, and backfills gaps from the catch-up
//! read — subscribers see every message exactly once, in id order.
//!
//! ## Waiting for a human reply (agent side)
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use hubcast::{AgentWaitLoop, AwaitOutcome, CancelToken, ClientOptions, HubClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HubClient::new(ClientOptions::new("hub_live_token"))?;
//!     let wait = AgentWaitLoop::new(client, "workspace-1", "coder");
//!     let (_canceller, mut cancel) = CancelToken::new();
//!
//!     match wait
//!         .send_and_await_reply("Done — ship it?", Duration::from_secs(300), &mut cancel)
//!         .await?
//!     {
//!         AwaitOutcome::Reply(message) => println!("human said: {}", message.content),
//!         AwaitOutcome::TimedOut => println!("no reply yet"),
//!         AwaitOutcome::Cancelled => println!("shutting down"),
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod types;
pub mod wait;
pub mod ws;

// Re-export main types
pub use cache::MessageCache;
pub use client::{ClientOptions, HubClient};
pub use error::{HubError, Result};
pub use wait::{AgentWaitLoop, AwaitOutcome, CancelToken, Canceller, DEFAULT_POLL_INTERVAL};
pub use ws::{
    CloseReason, LifecycleEvent, LifecycleReceiver, MessageReceiver, PushClient,
    PushClientOptions, SessionState, CLOSE_CODE_ACCESS_DENIED, CLOSE_CODE_AUTH_FAILED,
    DEFAULT_PING_INTERVAL, DEFAULT_PONG_TIMEOUT, DEFAULT_RECONNECT_DELAY,
};

// Re-export commonly used wire types
pub use types::{
    AcknowledgeRequest, AcknowledgeResponse, AgentActivityInfo, Message, MessageBatch,
    MessageKind, PostMessageRequest, PushFrame, Sender,
};

/// SDK version.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

//! Blocking "wait for a reply" support for agents.
//!
//! Agents cannot hold a push socket open the way a browser tab can, so the
//! hand-off is an explicit poll loop: persist the outgoing message, then
//! sleep/poll the unseen surface until a reply arrives, the budget runs out,
//! or the loop is cancelled. Timeout and cancellation are outcomes the caller
//! branches on, not errors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::client::HubClient;
use crate::error::Result;
use crate::types::{Message, PostMessageRequest, Sender};

/// Default sleep between polls of the unseen surface.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How a wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AwaitOutcome {
    /// The earliest unseen reply, already acknowledged.
    Reply(Message),
    /// The budget elapsed with no reply. The caller decides whether to keep
    /// waiting, do other work, or give up.
    TimedOut,
    /// The loop was cancelled externally.
    Cancelled,
}

/// Cancels an [`AgentWaitLoop`] from outside.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Arc<watch::Sender<bool>>,
}

impl Canceller {
    /// Cancel every loop holding a token from this pair. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Cancel as soon as `signal` resolves — e.g. the agent's controlling
    /// connection closing. Keeps a dead agent from leaving a poller behind.
    pub fn cancel_when<F>(&self, signal: F)
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send,
    {
        let canceller = self.clone();
        tokio::spawn(async move {
            signal.await;
            canceller.cancel();
        });
    }
}

/// Cancellation flag checked at every suspension point of the wait loop.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a connected `(Canceller, CancelToken)` pair.
    pub fn new() -> (Canceller, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Canceller { tx: Arc::new(tx) }, CancelToken { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled. Also resolves if the canceller was dropped:
    /// nobody can cancel an orphaned loop, so it must not outlive its owner.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        loop {
            if self.rx.changed().await.is_err() {
                return;
            }
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

/// One agent's blocking hand-off loop against a workspace.
pub struct AgentWaitLoop {
    client: HubClient,
    workspace_id: String,
    sender: Sender,
    poll_interval: Duration,
}

impl AgentWaitLoop {
    /// Create a wait loop for the given agent name.
    pub fn new(
        client: HubClient,
        workspace_id: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            workspace_id: workspace_id.into(),
            sender: Sender::agent(agent_name),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval (tests, latency tuning).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The consumer key this loop polls and acknowledges as.
    pub fn consumer_key(&self) -> String {
        self.sender.consumer_key()
    }

    /// Persist `content` (fanned out to live viewers server-side), then poll
    /// for the next unseen message until one arrives, `budget` elapses, or
    /// `cancel` fires. The reply is acknowledged before it is returned.
    pub async fn send_and_await_reply(
        &self,
        content: &str,
        budget: Duration,
        cancel: &mut CancelToken,
    ) -> Result<AwaitOutcome> {
        self.post(content, serde_json::json!({})).await?;
        self.await_reply(budget, cancel).await
    }

    /// The poll half of [`send_and_await_reply`], for callers that already
    /// posted (or have nothing to say).
    pub async fn await_reply(
        &self,
        budget: Duration,
        cancel: &mut CancelToken,
    ) -> Result<AwaitOutcome> {
        let consumer = self.consumer_key();
        let started = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Ok(AwaitOutcome::Cancelled);
            }
            let elapsed = started.elapsed();
            if elapsed >= budget {
                return Ok(AwaitOutcome::TimedOut);
            }

            let nap = self.poll_interval.min(budget - elapsed);
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = cancel.cancelled() => return Ok(AwaitOutcome::Cancelled),
            }

            let unseen = self
                .client
                .list_unseen(&self.workspace_id, &consumer)
                .await?;
            if let Some(reply) = unseen.into_iter().next() {
                self.client
                    .acknowledge(&self.workspace_id, &[reply.id], &consumer)
                    .await?;
                debug!(message_id = reply.id, "reply acknowledged");
                return Ok(AwaitOutcome::Reply(reply));
            }
        }
    }

    /// Non-blocking sibling: persist and fan out a status update, no wait.
    pub async fn post_status(&self, content: &str) -> Result<Message> {
        self.post(content, serde_json::json!({"status": true})).await
    }

    async fn post(&self, content: &str, metadata: serde_json::Value) -> Result<Message> {
        self.client
            .post_message(
                &self.workspace_id,
                &PostMessageRequest::chat(self.sender.clone(), content).with_metadata(metadata),
            )
            .await
    }
}

//! Wire types shared by the hub server and this SDK.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// === API Response Envelope ===

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<ApiErrorInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorInfo {
    pub code: String,
    pub message: String,
}

// === Messages ===

/// Who authored a message: a human identity or an agent name, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Sender {
    Human { id: String },
    Agent { name: String },
}

impl Sender {
    pub fn human(id: impl Into<String>) -> Self {
        Self::Human { id: id.into() }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self::Agent { name: name.into() }
    }

    /// Canonical consumer key for seen-tracking and self-exclusion,
    /// `"human:<id>"` or `"agent:<name>"`.
    pub fn consumer_key(&self) -> String {
        match self {
            Self::Human { id } => format!("human:{id}"),
            Self::Agent { name } => format!("agent:{name}"),
        }
    }

    /// Storage column pair `(sender_kind, sender_id)`.
    pub fn column_parts(&self) -> (&'static str, &str) {
        match self {
            Self::Human { id } => ("human", id),
            Self::Agent { name } => ("agent", name),
        }
    }

    /// Rebuild from the storage column pair. `None` for unknown kinds.
    pub fn from_parts(kind: &str, id: &str) -> Option<Self> {
        match kind {
            "human" => Some(Self::human(id)),
            "agent" => Some(Self::agent(id)),
            _ => None,
        }
    }
}

/// Closed set of message kinds. Matched exhaustively wherever kind drives
/// behavior, so a new kind is a compile-visible change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::System => "system",
        }
    }

    /// `None` for unknown values; callers surface that as a decode error.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chat" => Some(Self::Chat),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// A persisted workspace message. Immutable once created; `id` is unique and
/// monotonically increasing per workspace in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub workspace_id: String,
    pub sender: Sender,
    pub content: String,
    #[serde(rename = "type")]
    pub message_kind: MessageKind,
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

fn default_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

// === Requests / responses ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageRequest {
    pub sender: Sender,
    pub content: String,
    #[serde(rename = "type")]
    pub message_kind: MessageKind,
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

impl PostMessageRequest {
    pub fn chat(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            message_kind: MessageKind::Chat,
            metadata: default_metadata(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A page of messages from the catch-up read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBatch {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    pub message_ids: Vec<i64>,
    pub consumer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeResponse {
    pub acknowledged: u64,
}

/// Last poll-surface activity recorded for a workspace's agent side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActivityInfo {
    pub consumer: String,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActivityResponse {
    pub activity: Option<AgentActivityInfo>,
}

// === Push frames ===

/// Server → client frames on the push channel. The heartbeat itself is plain
/// text (`"ping"` / `"pong"`), not JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    Connected { workspace_id: String },
    NewMessage { message: Message },
}

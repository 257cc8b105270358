//! Resource summaries returned by paginated listings

use serde::{Deserialize, Serialize};

use crate::gmail::api::{DraftRef, MessageRef, ThreadRef};

/// Minimal identifying metadata for a listed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
}

impl From<MessageRef> for MessageSummary {
    fn from(r: MessageRef) -> Self {
        Self { id: r.id, thread_id: r.thread_id }
    }
}

/// Minimal identifying metadata for a listed thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub snippet: Option<String>,
}

impl From<ThreadRef> for ThreadSummary {
    fn from(r: ThreadRef) -> Self {
        Self { id: r.id, snippet: r.snippet }
    }
}

/// Minimal identifying metadata for a listed draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSummary {
    pub id: String,
    /// Id of the message the draft wraps, when the listing includes it
    pub message_id: Option<String>,
}

impl From<DraftRef> for DraftSummary {
    fn from(r: DraftRef) -> Self {
        Self {
            id: r.id,
            message_id: r.message.map(|m| m.id),
        }
    }
}

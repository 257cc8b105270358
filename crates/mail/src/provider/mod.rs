//! Provider capability trait
//!
//! The request engine talks to the mailbox provider through this trait
//! rather than through a concrete HTTP client, so tests can script pages
//! and batch outcomes without a network. [`GmailClient`](crate::GmailClient)
//! is the production implementation.

mod memory;

pub use memory::InMemoryMailProvider;

use crate::error::Result;
use crate::gmail::api::{
    Draft, GmailMessage, Label, ListDraftsResponse, ListMessagesResponse, ListThreadsResponse,
    SendResponse,
};

/// Mutating operation a batch request can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Trash,
    Untrash,
    Delete,
}

impl BatchOperation {
    /// URL path suffix for the per-message call inside a batch
    pub fn path_suffix(&self) -> &'static str {
        match self {
            BatchOperation::Trash => "/trash",
            BatchOperation::Untrash => "/untrash",
            BatchOperation::Delete => "",
        }
    }

    /// HTTP method for the per-message call inside a batch
    pub fn method(&self) -> &'static str {
        match self {
            BatchOperation::Trash | BatchOperation::Untrash => "POST",
            BatchOperation::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchOperation::Trash => write!(f, "trash"),
            BatchOperation::Untrash => write!(f, "untrash"),
            BatchOperation::Delete => write!(f, "delete"),
        }
    }
}

/// Per-item outcome of a batch request, in submission order
#[derive(Debug, Clone)]
pub struct BatchItemResult {
    pub id: String,
    pub status: u16,
}

impl BatchItemResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Resource-oriented operations exposed by the mailbox provider.
///
/// One-page list calls take the page size and an opaque continuation
/// token; walking pages is the engine's job, not the provider's.
/// `raw` message arguments are base64url-encoded RFC 2822 payloads built
/// by the caller (MIME construction is not this crate's concern).
pub trait MailProvider: Send + Sync {
    /// List one page of message refs, optionally filtered by label ids
    /// and/or a search query.
    fn list_messages(
        &self,
        label_ids: &[String],
        query: Option<&str>,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse>;

    /// List one page of thread refs matching a search query.
    fn list_threads(
        &self,
        query: Option<&str>,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListThreadsResponse>;

    /// List one page of draft refs.
    fn list_drafts(&self, page_size: usize, page_token: Option<&str>)
    -> Result<ListDraftsResponse>;

    /// List all labels in the mailbox.
    fn list_labels(&self) -> Result<Vec<Label>>;

    /// Fetch the full representation of a message.
    fn get_message(&self, id: &str) -> Result<GmailMessage>;

    /// Fetch the full representation of a draft.
    fn get_draft(&self, id: &str) -> Result<Draft>;

    /// Fetch and decode an attachment.
    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>>;

    /// Send a pre-encoded message.
    fn send_raw(&self, raw: &str) -> Result<SendResponse>;

    /// Save a pre-encoded message as a draft.
    fn create_draft(&self, raw: &str) -> Result<Draft>;

    /// Send an existing draft.
    fn send_draft(&self, draft_id: &str) -> Result<SendResponse>;

    /// Delete a draft.
    fn delete_draft(&self, draft_id: &str) -> Result<()>;

    /// Create a label with default visibility.
    fn create_label(&self, name: &str) -> Result<Label>;

    /// Delete a label by id.
    fn delete_label(&self, label_id: &str) -> Result<()>;

    /// Add and/or remove label ids on a single message.
    fn modify_message(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()>;

    /// Submit one batch request carrying `op` for every id. Callers keep
    /// chunks within the provider's 100-call batch ceiling; outcomes come
    /// back per item and are not all-or-nothing.
    fn execute_batch(&self, op: BatchOperation, ids: &[String]) -> Result<Vec<BatchItemResult>>;
}

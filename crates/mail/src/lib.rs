//! Mail backend: OAuth2 credential lifecycle and a paginated, batched
//! request engine over the Gmail REST API.
//!
//! [`GmailAuth`] owns credential acquisition: it loads a persisted token,
//! refreshes an expired one, and falls back to the interactive browser
//! flow only when it must. [`GmailClient`] implements the
//! [`MailProvider`] capability over that credential; the [`engine`]
//! functions layer the listing and batch protocols on top of any
//! provider, so tests run against [`InMemoryMailProvider`] without a
//! network.

pub mod config;
pub mod engine;
pub mod error;
pub mod gmail;
pub mod models;
pub mod provider;

pub use config::GoogleCredentials;
pub use engine::{
    BatchFailure, BatchOutcome, empty_folder, get_draft_detail, get_message_detail, list_drafts,
    list_messages, list_threads, modify_message_labels, resolve_folder_id, submit_batch,
};
pub use error::{Error, Result};
pub use gmail::{GmailAuth, GmailClient, ServiceIdentity, StoredToken};
pub use models::{DraftDetail, DraftSummary, MessageDetail, MessageSummary, ThreadSummary};
pub use provider::{BatchItemResult, BatchOperation, InMemoryMailProvider, MailProvider};

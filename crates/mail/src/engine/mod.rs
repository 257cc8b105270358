//! Request engine layered over a [`MailProvider`](crate::provider::MailProvider)
//!
//! The provider exposes one-page and one-batch primitives; this module
//! owns the protocol around them: walking continuation tokens, resolving
//! folder names to label ids, chunking batch submissions, and draining
//! folders page by page.

mod batch;
mod list;

pub use batch::{
    BATCH_CHUNK_SIZE, BatchFailure, BatchOutcome, empty_folder, modify_message_labels,
    submit_batch,
};
pub use list::{
    PROVIDER_PAGE_CAP, get_draft_detail, get_message_detail, list_drafts, list_messages,
    list_threads, resolve_folder_id,
};

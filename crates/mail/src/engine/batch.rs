//! Batch submission and folder draining

use log::{debug, warn};

use crate::error::Result;
use crate::provider::{BatchOperation, MailProvider};

use super::list::PROVIDER_PAGE_CAP;

/// Most calls the provider accepts in one batch request
pub const BATCH_CHUNK_SIZE: usize = 100;

/// One failed item from a batch submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub id: String,
    pub status: u16,
}

/// Aggregate outcome of a batch submission.
///
/// Item failures do not abort the submission; the remaining chunks are
/// still sent and the failures are collected here.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Total items submitted across all chunks
    pub submitted: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.submitted - self.failures.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Apply `op` to every id, splitting into chunks of [`BATCH_CHUNK_SIZE`].
///
/// An empty id list is a no-op and issues no request.
pub fn submit_batch(
    provider: &dyn MailProvider,
    op: BatchOperation,
    ids: &[String],
) -> Result<BatchOutcome> {
    if ids.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let mut outcome = BatchOutcome::default();
    for chunk in ids.chunks(BATCH_CHUNK_SIZE) {
        let results = provider.execute_batch(op, chunk)?;
        outcome.submitted += chunk.len();
        for result in results {
            if !result.is_success() {
                outcome
                    .failures
                    .push(BatchFailure { id: result.id, status: result.status });
            }
        }
    }

    if outcome.is_complete_success() {
        debug!("batch {op}: {} items submitted", outcome.submitted);
    } else {
        warn!(
            "batch {op}: {} of {} items failed",
            outcome.failures.len(),
            outcome.submitted
        );
    }
    Ok(outcome)
}

/// Add and/or remove labels on one message, keeping each request within
/// the provider's per-call label ceiling.
pub fn modify_message_labels(
    provider: &dyn MailProvider,
    message_id: &str,
    add: &[String],
    remove: &[String],
) -> Result<()> {
    let mut add_chunks = add.chunks(BATCH_CHUNK_SIZE);
    let mut remove_chunks = remove.chunks(BATCH_CHUNK_SIZE);
    loop {
        let add_chunk = add_chunks.next().unwrap_or_default();
        let remove_chunk = remove_chunks.next().unwrap_or_default();
        if add_chunk.is_empty() && remove_chunk.is_empty() {
            break;
        }
        provider.modify_message(message_id, add_chunk, remove_chunk)?;
    }
    Ok(())
}

/// Permanently delete every message matching `query`, page by page.
///
/// Each page is fetched at the provider's page cap and deleted through
/// [`submit_batch`]. Returns the number of messages actually deleted;
/// per-item failures are logged and skipped rather than aborting the
/// drain. An already-empty result issues no batch request.
pub fn empty_folder(provider: &dyn MailProvider, query: &str) -> Result<usize> {
    let mut total = 0;
    let mut page_token: Option<String> = None;

    loop {
        let response =
            provider.list_messages(&[], Some(query), PROVIDER_PAGE_CAP, page_token.as_deref())?;
        let refs = response.messages.unwrap_or_default();
        if refs.is_empty() {
            break;
        }

        let ids: Vec<String> = refs.into_iter().map(|m| m.id).collect();
        let outcome = submit_batch(provider, BatchOperation::Delete, &ids)?;
        total += outcome.succeeded();

        page_token = response.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    debug!("emptied '{query}': {total} messages deleted");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::{ListMessagesResponse, MessageRef};
    use crate::provider::InMemoryMailProvider;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("m{i}")).collect()
    }

    #[test]
    fn test_submit_splits_into_chunks_of_100() {
        let provider = InMemoryMailProvider::new();
        let outcome = submit_batch(&provider, BatchOperation::Trash, &ids(250)).unwrap();

        assert_eq!(outcome.submitted, 250);
        assert!(outcome.is_complete_success());

        let calls = provider.batch_calls();
        let sizes: Vec<usize> = calls.iter().map(|(_, ids)| ids.len()).collect();
        assert_eq!(sizes, [100, 100, 50]);
        assert!(calls.iter().all(|(op, _)| *op == BatchOperation::Trash));
        // submission order is preserved across chunks
        assert_eq!(calls[2].1[49], "m249");
    }

    #[test]
    fn test_submit_empty_is_a_no_op() {
        let provider = InMemoryMailProvider::new();
        let outcome = submit_batch(&provider, BatchOperation::Delete, &[]).unwrap();

        assert_eq!(outcome.submitted, 0);
        assert_eq!(outcome.succeeded(), 0);
        assert!(provider.batch_calls().is_empty());
    }

    #[test]
    fn test_submit_collects_partial_failures() {
        let provider = InMemoryMailProvider::new();
        for i in 0..3 {
            provider.add_simple_message(&format!("m{i}"), &["INBOX"]);
        }
        provider.fail_in_batch("m1");

        let outcome = submit_batch(&provider, BatchOperation::Delete, &ids(3)).unwrap();
        assert_eq!(outcome.submitted, 3);
        assert_eq!(outcome.succeeded(), 2);
        assert_eq!(outcome.failures, vec![BatchFailure { id: "m1".into(), status: 404 }]);
    }

    #[test]
    fn test_modify_labels_chunks_large_sets() {
        let provider = InMemoryMailProvider::new();
        provider.add_simple_message("m1", &[]);

        let add: Vec<String> = (0..150).map(|i| format!("L{i}")).collect();
        modify_message_labels(&provider, "m1", &add, &[]).unwrap();

        let calls = provider.modify_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1.len(), 100);
        assert_eq!(calls[1].1.len(), 50);
        assert_eq!(provider.message_labels("m1").unwrap().len(), 150);
    }

    #[test]
    fn test_modify_labels_add_and_remove_together() {
        let provider = InMemoryMailProvider::new();
        provider.add_simple_message("m1", &["UNREAD"]);

        modify_message_labels(
            &provider,
            "m1",
            &["STARRED".to_string()],
            &["UNREAD".to_string()],
        )
        .unwrap();

        assert_eq!(provider.modify_calls().len(), 1);
        assert_eq!(provider.message_labels("m1").unwrap(), vec!["STARRED".to_string()]);
    }

    #[test]
    fn test_empty_folder_on_empty_result_issues_no_batch() {
        let provider = InMemoryMailProvider::new();
        let deleted = empty_folder(&provider, "in:trash").unwrap();

        assert_eq!(deleted, 0);
        assert!(provider.batch_calls().is_empty());
    }

    #[test]
    fn test_empty_folder_drains_all_pages() {
        let provider = InMemoryMailProvider::new();
        let page = |ids: &[&str], token: Option<&str>| ListMessagesResponse {
            messages: Some(
                ids.iter()
                    .map(|id| MessageRef { id: id.to_string(), thread_id: id.to_string() })
                    .collect(),
            ),
            next_page_token: token.map(str::to_string),
            result_size_estimate: None,
        };
        provider.push_message_page(page(&["t1", "t2"], Some("next")));
        provider.push_message_page(page(&["t3"], None));

        let deleted = empty_folder(&provider, "in:trash").unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(provider.batch_calls().len(), 2);
    }

    #[test]
    fn test_empty_folder_counts_only_successes() {
        let provider = InMemoryMailProvider::new();
        provider.add_simple_message("t1", &["TRASH"]);
        provider.add_simple_message("t2", &["TRASH"]);
        provider.fail_in_batch("t2");

        let deleted = empty_folder(&provider, "in:trash").unwrap();
        assert_eq!(deleted, 1);
    }
}

//! In-memory mail provider
//!
//! This implementation is used for testing and as a stub backend.
//! Listings paginate over the stored items with numeric offset tokens.
//! Tests that need exact page shapes (sparse pages, dangling tokens) can
//! queue scripted responses, which are served before the stored items.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BatchItemResult, BatchOperation, MailProvider};
use crate::error::{Error, Result};
use crate::gmail::api::{
    Draft, DraftRef, GmailMessage, Label, ListDraftsResponse, ListMessagesResponse,
    ListThreadsResponse, MessageRef, SendResponse, ThreadRef,
};

/// In-memory [`MailProvider`] backed by plain vectors
#[derive(Default)]
pub struct InMemoryMailProvider {
    labels: Mutex<Vec<Label>>,
    messages: Mutex<Vec<GmailMessage>>,
    drafts: Mutex<Vec<Draft>>,
    attachments: Mutex<HashMap<(String, String), Vec<u8>>>,
    message_pages: Mutex<VecDeque<ListMessagesResponse>>,
    thread_pages: Mutex<VecDeque<ListThreadsResponse>>,
    draft_pages: Mutex<VecDeque<ListDraftsResponse>>,
    message_list_calls: Mutex<Vec<Vec<String>>>,
    batch_calls: Mutex<Vec<(BatchOperation, Vec<String>)>>,
    modify_calls: Mutex<Vec<(String, Vec<String>, Vec<String>)>>,
    failing_ids: Mutex<Vec<String>>,
    draft_counter: AtomicUsize,
    send_counter: AtomicUsize,
    label_counter: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Slice out one page of `items` using a numeric offset token
fn paginate<T: Clone>(
    items: &[T],
    page_size: usize,
    page_token: Option<&str>,
) -> (Vec<T>, Option<String>) {
    let offset = page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
    let end = offset.saturating_add(page_size).min(items.len());
    let page = items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
    let next = (end < items.len()).then(|| end.to_string());
    (page, next)
}

fn matches(message: &GmailMessage, label_ids: &[String], query: Option<&str>) -> bool {
    let labels = message.label_ids.as_deref().unwrap_or_default();
    if !label_ids.iter().all(|want| labels.iter().any(|l| l == want)) {
        return false;
    }
    match query {
        None => true,
        // the one query form the stub understands structurally
        Some("in:trash") => labels.iter().any(|l| l == "TRASH"),
        Some(q) => message.snippet.as_deref().is_some_and(|s| s.contains(q)),
    }
}

impl InMemoryMailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_label(&self, id: &str, name: &str) {
        lock(&self.labels).push(Label {
            id: id.to_string(),
            name: name.to_string(),
            label_list_visibility: None,
            message_list_visibility: None,
            kind: None,
        });
    }

    pub fn add_message(&self, message: GmailMessage) {
        lock(&self.messages).push(message);
    }

    /// Add a minimal message carrying only an id and label ids
    pub fn add_simple_message(&self, id: &str, label_ids: &[&str]) {
        self.add_message(GmailMessage {
            id: id.to_string(),
            thread_id: Some(id.to_string()),
            label_ids: Some(label_ids.iter().map(|l| l.to_string()).collect()),
            snippet: None,
            internal_date: None,
            payload: None,
        });
    }

    pub fn add_draft(&self, draft: Draft) {
        lock(&self.drafts).push(draft);
    }

    pub fn add_attachment(&self, message_id: &str, attachment_id: &str, bytes: Vec<u8>) {
        lock(&self.attachments).insert((message_id.to_string(), attachment_id.to_string()), bytes);
    }

    /// Queue an exact message listing response, served before stored items
    pub fn push_message_page(&self, page: ListMessagesResponse) {
        lock(&self.message_pages).push_back(page);
    }

    pub fn push_thread_page(&self, page: ListThreadsResponse) {
        lock(&self.thread_pages).push_back(page);
    }

    pub fn push_draft_page(&self, page: ListDraftsResponse) {
        lock(&self.draft_pages).push_back(page);
    }

    /// Make future batch items for `id` report a 404
    pub fn fail_in_batch(&self, id: &str) {
        lock(&self.failing_ids).push(id.to_string());
    }

    /// Batch requests received so far, in submission order
    pub fn batch_calls(&self) -> Vec<(BatchOperation, Vec<String>)> {
        lock(&self.batch_calls).clone()
    }

    /// Label modifications received so far as (message id, added, removed)
    pub fn modify_calls(&self) -> Vec<(String, Vec<String>, Vec<String>)> {
        lock(&self.modify_calls).clone()
    }

    /// Label id filters passed to each message listing call
    pub fn message_list_filters(&self) -> Vec<Vec<String>> {
        lock(&self.message_list_calls).clone()
    }

    pub fn message_count(&self) -> usize {
        lock(&self.messages).len()
    }

    pub fn message_labels(&self, id: &str) -> Option<Vec<String>> {
        lock(&self.messages)
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.label_ids.clone().unwrap_or_default())
    }
}

impl MailProvider for InMemoryMailProvider {
    fn list_messages(
        &self,
        label_ids: &[String],
        query: Option<&str>,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        lock(&self.message_list_calls).push(label_ids.to_vec());
        if let Some(page) = lock(&self.message_pages).pop_front() {
            return Ok(page);
        }
        let refs: Vec<MessageRef> = lock(&self.messages)
            .iter()
            .filter(|m| matches(m, label_ids, query))
            .map(|m| MessageRef {
                id: m.id.clone(),
                thread_id: m.thread_id.clone().unwrap_or_else(|| m.id.clone()),
            })
            .collect();
        let (page, next) = paginate(&refs, page_size, page_token);
        Ok(ListMessagesResponse {
            result_size_estimate: Some(refs.len() as u32),
            messages: Some(page),
            next_page_token: next,
        })
    }

    fn list_threads(
        &self,
        query: Option<&str>,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListThreadsResponse> {
        if let Some(page) = lock(&self.thread_pages).pop_front() {
            return Ok(page);
        }
        let mut refs: Vec<ThreadRef> = Vec::new();
        for message in lock(&self.messages).iter().filter(|m| matches(m, &[], query)) {
            let thread_id = message.thread_id.clone().unwrap_or_else(|| message.id.clone());
            if !refs.iter().any(|t| t.id == thread_id) {
                refs.push(ThreadRef { id: thread_id, snippet: message.snippet.clone() });
            }
        }
        let (page, next) = paginate(&refs, page_size, page_token);
        Ok(ListThreadsResponse {
            result_size_estimate: Some(refs.len() as u32),
            threads: Some(page),
            next_page_token: next,
        })
    }

    fn list_drafts(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListDraftsResponse> {
        if let Some(page) = lock(&self.draft_pages).pop_front() {
            return Ok(page);
        }
        let refs: Vec<DraftRef> = lock(&self.drafts)
            .iter()
            .map(|d| DraftRef {
                id: d.id.clone(),
                message: Some(MessageRef {
                    id: d.message.id.clone(),
                    thread_id: d.message.thread_id.clone().unwrap_or_else(|| d.message.id.clone()),
                }),
            })
            .collect();
        let (page, next) = paginate(&refs, page_size, page_token);
        Ok(ListDraftsResponse {
            result_size_estimate: Some(refs.len() as u32),
            drafts: Some(page),
            next_page_token: next,
        })
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        Ok(lock(&self.labels).clone())
    }

    fn get_message(&self, id: &str) -> Result<GmailMessage> {
        lock(&self.messages)
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("message {id}")))
    }

    fn get_draft(&self, id: &str) -> Result<Draft> {
        lock(&self.drafts)
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("draft {id}")))
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        lock(&self.attachments)
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("attachment {attachment_id}")))
    }

    fn send_raw(&self, _raw: &str) -> Result<SendResponse> {
        let n = self.send_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SendResponse {
            id: format!("sent-{n}"),
            thread_id: None,
            label_ids: Some(vec!["SENT".to_string()]),
        })
    }

    fn create_draft(&self, _raw: &str) -> Result<Draft> {
        let n = self.draft_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let draft = Draft {
            id: format!("draft-{n}"),
            message: GmailMessage {
                id: format!("draft-msg-{n}"),
                thread_id: None,
                label_ids: Some(vec!["DRAFT".to_string()]),
                snippet: None,
                internal_date: None,
                payload: None,
            },
        };
        lock(&self.drafts).push(draft.clone());
        Ok(draft)
    }

    fn send_draft(&self, draft_id: &str) -> Result<SendResponse> {
        let mut drafts = lock(&self.drafts);
        let position = drafts
            .iter()
            .position(|d| d.id == draft_id)
            .ok_or_else(|| Error::NotFound(format!("draft {draft_id}")))?;
        let draft = drafts.remove(position);
        Ok(SendResponse {
            id: draft.message.id,
            thread_id: draft.message.thread_id,
            label_ids: Some(vec!["SENT".to_string()]),
        })
    }

    fn delete_draft(&self, draft_id: &str) -> Result<()> {
        let mut drafts = lock(&self.drafts);
        let position = drafts
            .iter()
            .position(|d| d.id == draft_id)
            .ok_or_else(|| Error::NotFound(format!("draft {draft_id}")))?;
        drafts.remove(position);
        Ok(())
    }

    fn create_label(&self, name: &str) -> Result<Label> {
        let n = self.label_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let label = Label {
            id: format!("Label_{n}"),
            name: name.to_string(),
            label_list_visibility: Some("labelShow".to_string()),
            message_list_visibility: Some("show".to_string()),
            kind: Some("user".to_string()),
        };
        lock(&self.labels).push(label.clone());
        Ok(label)
    }

    fn delete_label(&self, label_id: &str) -> Result<()> {
        let mut labels = lock(&self.labels);
        let position = labels
            .iter()
            .position(|l| l.id == label_id)
            .ok_or_else(|| Error::NotFound(format!("label {label_id}")))?;
        labels.remove(position);
        Ok(())
    }

    fn modify_message(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()> {
        lock(&self.modify_calls).push((message_id.to_string(), add.to_vec(), remove.to_vec()));
        let mut messages = lock(&self.messages);
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        let labels = message.label_ids.get_or_insert_with(Vec::new);
        for label in add {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels.retain(|l| !remove.contains(l));
        Ok(())
    }

    fn execute_batch(&self, op: BatchOperation, ids: &[String]) -> Result<Vec<BatchItemResult>> {
        lock(&self.batch_calls).push((op, ids.to_vec()));
        let failing = lock(&self.failing_ids);
        let mut messages = lock(&self.messages);
        let results = ids
            .iter()
            .map(|id| {
                if failing.contains(id) {
                    return BatchItemResult { id: id.clone(), status: 404 };
                }
                match op {
                    BatchOperation::Delete => {
                        messages.retain(|m| &m.id != id);
                        BatchItemResult { id: id.clone(), status: 204 }
                    }
                    BatchOperation::Trash | BatchOperation::Untrash => {
                        if let Some(message) = messages.iter_mut().find(|m| &m.id == id) {
                            let labels = message.label_ids.get_or_insert_with(Vec::new);
                            if op == BatchOperation::Trash {
                                labels.retain(|l| l != "INBOX");
                                if !labels.iter().any(|l| l == "TRASH") {
                                    labels.push("TRASH".to_string());
                                }
                            } else {
                                labels.retain(|l| l != "TRASH");
                            }
                        }
                        BatchItemResult { id: id.clone(), status: 200 }
                    }
                }
            })
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_pagination() {
        let provider = InMemoryMailProvider::new();
        for i in 0..5 {
            provider.add_simple_message(&format!("m{i}"), &["INBOX"]);
        }

        let first = provider.list_messages(&[], None, 2, None).unwrap();
        assert_eq!(first.messages.as_ref().unwrap().len(), 2);
        let token = first.next_page_token.unwrap();

        let second = provider.list_messages(&[], None, 2, Some(&token)).unwrap();
        assert_eq!(second.messages.unwrap()[0].id, "m2");

        let last = provider
            .list_messages(&[], None, 10, second.next_page_token.as_deref())
            .unwrap();
        assert_eq!(last.messages.unwrap().len(), 1);
        assert!(last.next_page_token.is_none());
    }

    #[test]
    fn test_label_filter_requires_all_labels() {
        let provider = InMemoryMailProvider::new();
        provider.add_simple_message("m1", &["INBOX", "UNREAD"]);
        provider.add_simple_message("m2", &["INBOX"]);

        let filter = vec!["INBOX".to_string(), "UNREAD".to_string()];
        let page = provider.list_messages(&filter, None, 10, None).unwrap();
        let refs = page.messages.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, "m1");
    }

    #[test]
    fn test_batch_trash_moves_labels() {
        let provider = InMemoryMailProvider::new();
        provider.add_simple_message("m1", &["INBOX"]);

        let ids = vec!["m1".to_string()];
        let results = provider.execute_batch(BatchOperation::Trash, &ids).unwrap();
        assert!(results[0].is_success());
        assert_eq!(provider.message_labels("m1").unwrap(), vec!["TRASH".to_string()]);

        provider.execute_batch(BatchOperation::Delete, &ids).unwrap();
        assert_eq!(provider.message_count(), 0);
    }

    #[test]
    fn test_failing_id_reports_status() {
        let provider = InMemoryMailProvider::new();
        provider.add_simple_message("m1", &["INBOX"]);
        provider.fail_in_batch("m1");

        let results = provider
            .execute_batch(BatchOperation::Delete, &["m1".to_string()])
            .unwrap();
        assert_eq!(results[0].status, 404);
        // a failed item is left in place
        assert_eq!(provider.message_count(), 1);
    }
}

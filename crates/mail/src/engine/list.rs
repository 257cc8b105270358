//! Paginated listings and detail fetches

use log::debug;

use crate::error::{Error, Result};
use crate::models::{DraftDetail, DraftSummary, MessageDetail, MessageSummary, ThreadSummary};
use crate::provider::MailProvider;

/// Largest page size the provider accepts in one listing call
pub const PROVIDER_PAGE_CAP: usize = 500;

/// Walk continuation tokens until the listing is exhausted or `max_results`
/// items have been gathered.
///
/// `fetch` is called with the page size to request and the token from the
/// previous page. Pages that carry a token but no items keep the walk
/// going, so sparse listings are not cut short. A `max_results` of zero
/// or `None` means unbounded.
pub(crate) fn collect_pages<T>(
    max_results: Option<usize>,
    mut fetch: impl FnMut(usize, Option<&str>) -> Result<(Vec<T>, Option<String>)>,
) -> Result<Vec<T>> {
    let bound = max_results.filter(|&max| max > 0);
    let mut items: Vec<T> = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page_size = match bound {
            Some(max) => PROVIDER_PAGE_CAP.min(max - items.len()),
            None => PROVIDER_PAGE_CAP,
        };
        let (page, next) = fetch(page_size, page_token.as_deref())?;
        items.extend(page);
        page_token = next;
        if page_token.is_none() {
            break;
        }
        if let Some(max) = bound
            && items.len() >= max
        {
            break;
        }
    }

    if let Some(max) = bound {
        items.truncate(max);
    }
    Ok(items)
}

/// Resolve a folder name to its label id, ignoring case.
///
/// System folders (INBOX, TRASH, SPAM) and user labels both resolve
/// through the same listing. Passing a string that is already a label id
/// resolves to itself, since ids appear in the listing too.
pub fn resolve_folder_id(provider: &dyn MailProvider, folder: &str) -> Result<String> {
    let labels = provider.list_labels()?;
    labels
        .iter()
        .find(|l| l.name.eq_ignore_ascii_case(folder) || l.id.eq_ignore_ascii_case(folder))
        .map(|l| l.id.clone())
        .ok_or_else(|| Error::NotFound(format!("folder '{folder}'")))
}

/// List messages, newest first in provider order.
///
/// `folder` is resolved to a label id and unioned into `label_ids`;
/// `query` is passed through as a provider search expression.
pub fn list_messages(
    provider: &dyn MailProvider,
    folder: Option<&str>,
    label_ids: &[String],
    query: Option<&str>,
    max_results: Option<usize>,
) -> Result<Vec<MessageSummary>> {
    let mut ids = label_ids.to_vec();
    if let Some(name) = folder {
        let folder_id = resolve_folder_id(provider, name)?;
        if !ids.contains(&folder_id) {
            ids.push(folder_id);
        }
    }

    let refs = collect_pages(max_results, |page_size, page_token| {
        let response = provider.list_messages(&ids, query, page_size, page_token)?;
        Ok((response.messages.unwrap_or_default(), response.next_page_token))
    })?;
    debug!("listed {} messages (labels: {:?}, query: {:?})", refs.len(), ids, query);
    Ok(refs.into_iter().map(MessageSummary::from).collect())
}

/// List threads matching a search query.
pub fn list_threads(
    provider: &dyn MailProvider,
    query: Option<&str>,
    max_results: Option<usize>,
) -> Result<Vec<ThreadSummary>> {
    let refs = collect_pages(max_results, |page_size, page_token| {
        let response = provider.list_threads(query, page_size, page_token)?;
        Ok((response.threads.unwrap_or_default(), response.next_page_token))
    })?;
    debug!("listed {} threads (query: {:?})", refs.len(), query);
    Ok(refs.into_iter().map(ThreadSummary::from).collect())
}

/// List drafts.
pub fn list_drafts(
    provider: &dyn MailProvider,
    max_results: Option<usize>,
) -> Result<Vec<DraftSummary>> {
    let refs = collect_pages(max_results, |page_size, page_token| {
        let response = provider.list_drafts(page_size, page_token)?;
        Ok((response.drafts.unwrap_or_default(), response.next_page_token))
    })?;
    debug!("listed {} drafts", refs.len());
    Ok(refs.into_iter().map(DraftSummary::from).collect())
}

/// Fetch a message and derive its display fields.
pub fn get_message_detail(provider: &dyn MailProvider, id: &str) -> Result<MessageDetail> {
    provider.get_message(id).map(MessageDetail::from_api)
}

/// Fetch a draft and derive its display fields.
pub fn get_draft_detail(provider: &dyn MailProvider, id: &str) -> Result<DraftDetail> {
    provider.get_draft(id).map(DraftDetail::from_api)
}

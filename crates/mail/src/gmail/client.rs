//! Gmail REST client
//!
//! Implements [`MailProvider`] over ureq. Every request carries a bearer
//! token obtained from [`GmailAuth::access_token`], which refreshes or
//! re-authenticates as needed, so a client stays usable past token
//! expiry. Reads retry transient failures with exponential backoff;
//! mutations are sent once.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::thread::sleep;
use std::time::Duration;

use base64::prelude::*;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::auth::GmailAuth;
use crate::error::{Error, Result};
use crate::gmail::api::{
    AttachmentResponse, Draft, GmailMessage, Label, ListDraftsResponse, ListLabelsResponse,
    ListMessagesResponse, ListThreadsResponse, SendResponse,
};
use crate::provider::{BatchItemResult, BatchOperation, MailProvider};

const BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
const BATCH_URL: &str = "https://www.googleapis.com/batch/gmail/v1";

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gmail client bound to one authenticated account
pub struct GmailClient {
    auth: GmailAuth,
    agent: ureq::Agent,
}

impl GmailClient {
    /// Authenticate and probe the account before handing out a client.
    ///
    /// The probe catches revoked or stale credentials at construction
    /// time; a rejected credential record is deleted so the next attempt
    /// starts the interactive flow.
    pub fn connect(auth: GmailAuth) -> Result<Self> {
        Self::connect_with_timeout(auth, DEFAULT_TIMEOUT)
    }

    /// Connect with a caller-chosen per-request timeout
    pub fn connect_with_timeout(auth: GmailAuth, timeout: Duration) -> Result<Self> {
        let profile = auth.verify()?;
        info!("connected to gmail as {}", profile.email_address);
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Ok(Self { auth, agent })
    }

    fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.auth.access_token()?))
    }

    /// GET with bounded retry on transient failures
    fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<T> {
        let mut delay = INITIAL_BACKOFF;
        let mut attempt = 0;
        loop {
            match self.get_once(url, context) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < MAX_RETRIES => {
                    attempt += 1;
                    debug!("{context} failed ({e}), retry {attempt}/{}", MAX_RETRIES - 1);
                    sleep(delay + Duration::from_millis(rand_below(50)));
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn get_once<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<T> {
        match self.agent.get(url).header("Authorization", &self.bearer()?).call() {
            Ok(mut response) => Ok(response.body_mut().read_json()?),
            Err(ureq::Error::StatusCode(code)) => Err(Error::from_status(code, context)),
            Err(e) => Err(e.into()),
        }
    }

    fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
        context: &str,
    ) -> Result<T> {
        match self.agent.post(url)
            .header("Authorization", &self.bearer()?)
            .send_json(body)
        {
            Ok(mut response) => Ok(response.body_mut().read_json()?),
            Err(ureq::Error::StatusCode(code)) => Err(Error::from_status(code, context)),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, url: &str, context: &str) -> Result<()> {
        match self.agent.delete(url).header("Authorization", &self.bearer()?).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(code)) => Err(Error::from_status(code, context)),
            Err(e) => Err(e.into()),
        }
    }
}

impl MailProvider for GmailClient {
    fn list_messages(
        &self,
        label_ids: &[String],
        query: Option<&str>,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let mut url = format!("{BASE_URL}/users/me/messages?maxResults={}", page_size.min(500));
        for id in label_ids {
            url.push_str(&format!("&labelIds={}", urlencoding::encode(id)));
        }
        if let Some(q) = query {
            url.push_str(&format!("&q={}", urlencoding::encode(q)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        self.get_json(&url, "list messages")
    }

    fn list_threads(
        &self,
        query: Option<&str>,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListThreadsResponse> {
        let mut url = format!("{BASE_URL}/users/me/threads?maxResults={}", page_size.min(500));
        if let Some(q) = query {
            url.push_str(&format!("&q={}", urlencoding::encode(q)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        self.get_json(&url, "list threads")
    }

    fn list_drafts(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ListDraftsResponse> {
        let mut url = format!("{BASE_URL}/users/me/drafts?maxResults={}", page_size.min(500));
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        self.get_json(&url, "list drafts")
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        let response: ListLabelsResponse =
            self.get_json(&format!("{BASE_URL}/users/me/labels"), "list labels")?;
        Ok(response.labels.unwrap_or_default())
    }

    fn get_message(&self, id: &str) -> Result<GmailMessage> {
        let url = format!(
            "{BASE_URL}/users/me/messages/{}?format=full",
            urlencoding::encode(id)
        );
        self.get_json(&url, "get message")
    }

    fn get_draft(&self, id: &str) -> Result<Draft> {
        let url = format!(
            "{BASE_URL}/users/me/drafts/{}?format=full",
            urlencoding::encode(id)
        );
        self.get_json(&url, "get draft")
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{BASE_URL}/users/me/messages/{}/attachments/{}",
            urlencoding::encode(message_id),
            urlencoding::encode(attachment_id)
        );
        let response: AttachmentResponse = self.get_json(&url, "get attachment")?;
        let data = response
            .data
            .ok_or_else(|| Error::NotFound(format!("attachment {attachment_id} has no data")))?;
        decode_attachment(&data)
    }

    fn send_raw(&self, raw: &str) -> Result<SendResponse> {
        self.post_json(
            &format!("{BASE_URL}/users/me/messages/send"),
            &json!({ "raw": raw }),
            "send message",
        )
    }

    fn create_draft(&self, raw: &str) -> Result<Draft> {
        self.post_json(
            &format!("{BASE_URL}/users/me/drafts"),
            &json!({ "message": { "raw": raw } }),
            "create draft",
        )
    }

    fn send_draft(&self, draft_id: &str) -> Result<SendResponse> {
        self.post_json(
            &format!("{BASE_URL}/users/me/drafts/send"),
            &json!({ "id": draft_id }),
            "send draft",
        )
    }

    fn delete_draft(&self, draft_id: &str) -> Result<()> {
        let url = format!("{BASE_URL}/users/me/drafts/{}", urlencoding::encode(draft_id));
        self.delete(&url, "delete draft")
    }

    fn create_label(&self, name: &str) -> Result<Label> {
        self.post_json(
            &format!("{BASE_URL}/users/me/labels"),
            &json!({
                "name": name,
                "labelListVisibility": "labelShow",
                "messageListVisibility": "show",
            }),
            "create label",
        )
    }

    fn delete_label(&self, label_id: &str) -> Result<()> {
        let url = format!("{BASE_URL}/users/me/labels/{}", urlencoding::encode(label_id));
        self.delete(&url, "delete label")
    }

    fn modify_message(&self, message_id: &str, add: &[String], remove: &[String]) -> Result<()> {
        let url = format!(
            "{BASE_URL}/users/me/messages/{}/modify",
            urlencoding::encode(message_id)
        );
        let _: GmailMessage = self.post_json(
            &url,
            &json!({ "addLabelIds": add, "removeLabelIds": remove }),
            "modify message",
        )?;
        Ok(())
    }

    fn execute_batch(&self, op: BatchOperation, ids: &[String]) -> Result<Vec<BatchItemResult>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > 100 {
            return Err(Error::Configuration(format!(
                "batch of {} exceeds the 100-call ceiling",
                ids.len()
            )));
        }

        let boundary = format!("batch_{:016x}", rand_below(u64::MAX));
        let body = build_batch_body(&boundary, op, ids);
        let bearer = self.bearer()?;

        let mut response = match self.agent.post(BATCH_URL)
            .header("Authorization", &bearer)
            .header("Content-Type", &format!("multipart/mixed; boundary={boundary}"))
            .send(body.as_bytes())
        {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(code)) => {
                return Err(Error::from_status(code, format!("batch {op}")));
            }
            Err(e) => return Err(e.into()),
        };
        let text = response.body_mut().read_to_string()?;
        let results = parse_batch_response(&text, ids);

        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            warn!("batch {op}: {failed} of {} parts returned errors", ids.len());
        }
        Ok(results)
    }
}

/// Attachment data arrives base64url encoded, padded or not
fn decode_attachment(data: &str) -> Result<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| BASE64_URL_SAFE.decode(data))
        .map_err(Error::from)
}

/// Build the multipart/mixed body, one application/http part per id
fn build_batch_body(boundary: &str, op: BatchOperation, ids: &[String]) -> String {
    let mut body = String::new();
    for (index, id) in ids.iter().enumerate() {
        body.push_str(&format!(
            "--{boundary}\r\n\
             Content-Type: application/http\r\n\
             Content-ID: <item-{index}>\r\n\r\n\
             {} /gmail/v1/users/me/messages/{}{} HTTP/1.1\r\n\r\n",
            op.method(),
            urlencoding::encode(id),
            op.path_suffix()
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    body
}

/// Pair the inner status lines of a batch response with the submitted ids.
///
/// Parts come back in submission order, so pairing is positional. An id
/// with no matching status line is reported as a 500 rather than dropped.
fn parse_batch_response(body: &str, ids: &[String]) -> Vec<BatchItemResult> {
    let mut statuses = Vec::with_capacity(ids.len());
    for line in body.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("HTTP/1.1 ").or_else(|| line.strip_prefix("HTTP/1.0 "))
            && let Some(code) = rest.split_whitespace().next().and_then(|c| c.parse::<u16>().ok())
        {
            statuses.push(code);
        }
    }

    ids.iter()
        .enumerate()
        .map(|(index, id)| BatchItemResult {
            id: id.clone(),
            status: statuses.get(index).copied().unwrap_or(500),
        })
        .collect()
}

/// Pseudo-random value below `bound` without pulling in a rand crate
fn rand_below(bound: u64) -> u64 {
    RandomState::new().build_hasher().finish() % bound
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_batch_body_layout() {
        let body = build_batch_body("batch_x", BatchOperation::Trash, &ids(&["m1", "m2"]));

        assert!(body.starts_with("--batch_x\r\n"));
        assert!(body.contains("POST /gmail/v1/users/me/messages/m1/trash HTTP/1.1"));
        assert!(body.contains("POST /gmail/v1/users/me/messages/m2/trash HTTP/1.1"));
        assert!(body.contains("Content-ID: <item-1>"));
        assert!(body.ends_with("--batch_x--\r\n"));

        let delete = build_batch_body("batch_x", BatchOperation::Delete, &ids(&["m1"]));
        assert!(delete.contains("DELETE /gmail/v1/users/me/messages/m1 HTTP/1.1"));
    }

    #[test]
    fn test_parse_batch_response_pairs_statuses_in_order() {
        let body = "--batch_abc\r\n\
                    Content-Type: application/http\r\n\r\n\
                    HTTP/1.1 204 No Content\r\n\r\n\
                    --batch_abc\r\n\
                    Content-Type: application/http\r\n\r\n\
                    HTTP/1.1 404 Not Found\r\n\
                    Content-Type: application/json\r\n\r\n\
                    {\"error\": {\"code\": 404}}\r\n\
                    --batch_abc--\r\n";

        let results = parse_batch_response(body, &ids(&["m1", "m2"]));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, 204);
        assert!(results[0].is_success());
        assert_eq!(results[1].id, "m2");
        assert_eq!(results[1].status, 404);
    }

    #[test]
    fn test_parse_batch_response_missing_part_is_a_failure() {
        let body = "--b\r\nHTTP/1.1 200 OK\r\n--b--\r\n";
        let results = parse_batch_response(body, &ids(&["m1", "m2"]));
        assert_eq!(results[0].status, 200);
        assert_eq!(results[1].status, 500);
    }
}

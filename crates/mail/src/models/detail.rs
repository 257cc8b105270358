//! Full message and draft representations with derived metadata
//!
//! Header-derived fields fall back to documented placeholder strings when
//! a header is absent, matching what downstream consumers already display.

use serde::{Deserialize, Serialize};

use crate::gmail::api::{Draft, GmailMessage};
use crate::gmail::{extract_plain_text_body, header_value};

const NO_SUBJECT: &str = "No subject";
const UNKNOWN_SENDER: &str = "Unknown sender";
const UNKNOWN_RECIPIENT: &str = "Unknown recipient(s)";
const NO_SNIPPET: &str = "No snippet available";
const NO_DATE: &str = "No date available";

/// Label id Gmail uses for starred messages
const STARRED: &str = "STARRED";

/// Full representation of a message with extracted metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDetail {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub snippet: String,
    pub body: String,
    pub has_attachments: bool,
    pub starred: bool,
    pub label_ids: Vec<String>,
}

impl MessageDetail {
    /// Build a detail record from a full API message
    pub fn from_api(message: GmailMessage) -> Self {
        let id = message.id;
        let payload = message.payload.unwrap_or_default();
        let headers = payload.headers.as_deref();
        let label_ids = message.label_ids.unwrap_or_default();

        Self {
            thread_id: message.thread_id.unwrap_or_else(|| id.clone()),
            subject: header_value(headers, "Subject").unwrap_or_else(|| NO_SUBJECT.into()),
            from: header_value(headers, "From").unwrap_or_else(|| UNKNOWN_SENDER.into()),
            to: header_value(headers, "To").unwrap_or_else(|| UNKNOWN_RECIPIENT.into()),
            date: header_value(headers, "Date").unwrap_or_else(|| NO_DATE.into()),
            snippet: message.snippet.unwrap_or_else(|| NO_SNIPPET.into()),
            body: extract_plain_text_body(&payload),
            has_attachments: crate::gmail::payload_has_attachments(&payload),
            starred: label_ids.iter().any(|l| l == STARRED),
            label_ids,
            id,
        }
    }
}

/// Full representation of a draft with extracted metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftDetail {
    pub id: String,
    pub message: MessageDetail,
}

impl DraftDetail {
    /// Build a detail record from a full API draft
    pub fn from_api(draft: Draft) -> Self {
        Self {
            id: draft.id,
            message: MessageDetail::from_api(draft.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::{Header, MessagePayload};

    fn message_with_headers(headers: Vec<(&str, &str)>) -> GmailMessage {
        GmailMessage {
            id: "m1".into(),
            thread_id: Some("t1".into()),
            label_ids: Some(vec!["INBOX".into(), "STARRED".into()]),
            snippet: Some("preview".into()),
            internal_date: None,
            payload: Some(MessagePayload {
                headers: Some(
                    headers
                        .into_iter()
                        .map(|(n, v)| Header { name: n.into(), value: v.into() })
                        .collect(),
                ),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_detail_from_full_headers() {
        let detail = MessageDetail::from_api(message_with_headers(vec![
            ("Subject", "Quarterly report"),
            ("From", "alice@example.com"),
            ("To", "bob@example.com"),
            ("Date", "Mon, 1 Jan 2024 10:00:00 +0000"),
        ]));

        assert_eq!(detail.id, "m1");
        assert_eq!(detail.thread_id, "t1");
        assert_eq!(detail.subject, "Quarterly report");
        assert_eq!(detail.from, "alice@example.com");
        assert_eq!(detail.to, "bob@example.com");
        assert!(detail.starred);
        assert!(!detail.has_attachments);
    }

    #[test]
    fn test_detail_header_fallbacks() {
        let detail = MessageDetail::from_api(message_with_headers(vec![]));
        assert_eq!(detail.subject, "No subject");
        assert_eq!(detail.from, "Unknown sender");
        assert_eq!(detail.to, "Unknown recipient(s)");
        assert_eq!(detail.date, "No date available");
    }

    #[test]
    fn test_detail_missing_everything() {
        let message = GmailMessage {
            id: "m2".into(),
            thread_id: None,
            label_ids: None,
            snippet: None,
            internal_date: None,
            payload: None,
        };
        let detail = MessageDetail::from_api(message);

        // thread id falls back to the message id
        assert_eq!(detail.thread_id, "m2");
        assert_eq!(detail.snippet, "No snippet available");
        assert_eq!(detail.body, crate::gmail::TEXT_BODY_FALLBACK);
        assert!(!detail.starred);
        assert!(detail.label_ids.is_empty());
    }

    #[test]
    fn test_draft_detail_wraps_message() {
        let draft = Draft {
            id: "d1".into(),
            message: message_with_headers(vec![("Subject", "Draft subject")]),
        };
        let detail = DraftDetail::from_api(draft);
        assert_eq!(detail.id, "d1");
        assert_eq!(detail.message.subject, "Draft subject");
    }
}

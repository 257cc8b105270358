//! Plain-text body extraction from Gmail message payloads
//!
//! The search is deliberately shallow: a first-match scan over the top
//! level parts, descending only into a `multipart/alternative` container
//! to find its first inline `text/plain` sub-part. Deeply nested
//! structures (e.g. alternative inside mixed inside related) fall through
//! to the sentinel rather than being walked recursively. Fixing that
//! would change observable output for messages the rest of the system
//! already handles, so the limitation is kept.

use base64::prelude::*;

use super::api::{Header, MessagePart, MessagePayload};

/// Sentinel returned when no inline plain-text body is found
pub const TEXT_BODY_FALLBACK: &str = "<Text body not available>";

/// Extract the plain-text body of a message payload.
///
/// A payload with parts is scanned in order: the first inline
/// `text/plain` sub-part of a `multipart/alternative` container is taken
/// (inner scan stops there, the outer scan continues); a direct inline
/// `text/plain` part is taken and stops the scan. A payload without
/// parts contributes its own inline body data. HTML-only parts are
/// ignored.
pub fn extract_plain_text_body(payload: &MessagePayload) -> String {
    let mut body = TEXT_BODY_FALLBACK.to_string();

    if let Some(parts) = &payload.parts {
        for part in parts {
            match part.mime_type.as_deref() {
                Some("multipart/alternative") => {
                    if let Some(subparts) = &part.parts {
                        for subpart in subparts {
                            if subpart.mime_type.as_deref() == Some("text/plain")
                                && let Some(text) = decode_part_data(subpart)
                            {
                                body = text;
                                break;
                            }
                        }
                    }
                }
                Some("text/plain") => {
                    if let Some(text) = decode_part_data(part) {
                        return text;
                    }
                }
                _ => {}
            }
        }
    } else if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref())
        && let Some(text) = decode_body_data(data)
    {
        body = text;
    }

    body
}

/// Decode a part's inline body data, if any
fn decode_part_data(part: &MessagePart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_deref()?;
    decode_body_data(data)
}

/// Decode base64-encoded body data.
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple
/// decoders.
pub(crate) fn decode_body_data(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data)
            && let Ok(s) = String::from_utf8(decoded)
        {
            return Some(s);
        }
    }

    None
}

/// Look up a header value by name, case-insensitively
pub fn header_value(headers: Option<&[Header]>, name: &str) -> Option<String> {
    headers?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// True if any part carries a filename, i.e. an attachment
pub(crate) fn payload_has_attachments(payload: &MessagePayload) -> bool {
    payload
        .parts
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|p| p.filename.as_deref().is_some_and(|f| !f.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::MessageBody;

    fn encode(text: &str) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(text)
    }

    fn part(mime: &str, data: Option<&str>) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(MessageBody {
                size: None,
                data: data.map(encode),
                attachment_id: None,
            }),
            ..Default::default()
        }
    }

    fn container(mime: &str, parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            parts: Some(parts),
            ..Default::default()
        }
    }

    #[test]
    fn test_flat_plain_text_payload() {
        let payload = MessagePayload {
            mime_type: Some("text/plain".into()),
            body: Some(MessageBody {
                size: None,
                data: Some(encode("hello world")),
                attachment_id: None,
            }),
            ..Default::default()
        };
        assert_eq!(extract_plain_text_body(&payload), "hello world");
    }

    #[test]
    fn test_direct_plain_text_part() {
        let payload = MessagePayload {
            parts: Some(vec![
                part("text/html", Some("<p>html</p>")),
                part("text/plain", Some("plain text")),
            ]),
            ..Default::default()
        };
        assert_eq!(extract_plain_text_body(&payload), "plain text");
    }

    #[test]
    fn test_multipart_alternative_prefers_first_plain_text() {
        let payload = MessagePayload {
            parts: Some(vec![container(
                "multipart/alternative",
                vec![
                    part("text/html", Some("<p>html</p>")),
                    part("text/plain", Some("first")),
                    part("text/plain", Some("second")),
                ],
            )]),
            ..Default::default()
        };
        assert_eq!(extract_plain_text_body(&payload), "first");
    }

    #[test]
    fn test_html_only_returns_fallback() {
        let payload = MessagePayload {
            parts: Some(vec![part("text/html", Some("<p>html</p>"))]),
            ..Default::default()
        };
        assert_eq!(extract_plain_text_body(&payload), TEXT_BODY_FALLBACK);
    }

    #[test]
    fn test_no_body_data_returns_fallback() {
        let payload = MessagePayload::default();
        assert_eq!(extract_plain_text_body(&payload), TEXT_BODY_FALLBACK);

        let payload = MessagePayload {
            parts: Some(vec![part("text/plain", None)]),
            ..Default::default()
        };
        assert_eq!(extract_plain_text_body(&payload), TEXT_BODY_FALLBACK);
    }

    #[test]
    fn test_deeply_nested_is_not_walked() {
        // alternative inside mixed is below the search depth; the shallow
        // scan must not find it
        let payload = MessagePayload {
            parts: Some(vec![container(
                "multipart/mixed",
                vec![container(
                    "multipart/alternative",
                    vec![part("text/plain", Some("buried"))],
                )],
            )]),
            ..Default::default()
        };
        assert_eq!(extract_plain_text_body(&payload), TEXT_BODY_FALLBACK);
    }

    #[test]
    fn test_header_value_case_insensitive() {
        let headers = vec![
            Header { name: "Subject".into(), value: "Hi".into() },
            Header { name: "FROM".into(), value: "a@b.c".into() },
        ];
        assert_eq!(header_value(Some(&headers), "subject").as_deref(), Some("Hi"));
        assert_eq!(header_value(Some(&headers), "from").as_deref(), Some("a@b.c"));
        assert_eq!(header_value(Some(&headers), "to"), None);
        assert_eq!(header_value(None, "subject"), None);
    }

    #[test]
    fn test_has_attachments() {
        let with = MessagePayload {
            parts: Some(vec![MessagePart {
                filename: Some("report.pdf".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert!(payload_has_attachments(&with));

        let without = MessagePayload {
            parts: Some(vec![MessagePart {
                filename: Some(String::new()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert!(!payload_has_attachments(&without));
        assert!(!payload_has_attachments(&MessagePayload::default()));
    }

    #[test]
    fn test_decode_body_data_padding_variants() {
        // "Hello, World!" without padding
        assert_eq!(
            decode_body_data("SGVsbG8sIFdvcmxkIQ"),
            Some("Hello, World!".to_string())
        );
        assert_eq!(decode_body_data("!!not base64!!"), None);
    }
}

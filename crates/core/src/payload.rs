use serde_json::Value;

/// The logical text a guardrail evaluates.
///
/// Proxied bodies are provider-specific JSON; the checkers operate on the
/// human-readable content inside them. Extraction understands the common
/// chat-completion shapes (`messages`, `choices`, content-part arrays) and
/// falls back to the raw body text for anything else, so no payload ever
/// bypasses checking merely by being unrecognized.
#[derive(Debug, Clone)]
pub struct CheckPayload {
    text: String,
    bytes: usize,
}

impl CheckPayload {
    /// Wrap already-extracted text.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let bytes = text.len();
        Self { text, bytes }
    }

    /// Build the pre-request payload from a raw request body.
    ///
    /// Collects every message's content (system and user alike) plus bare
    /// `prompt`/`input` fields from completion-style bodies.
    pub fn from_request_bytes(body: &[u8]) -> Self {
        let Ok(json) = serde_json::from_slice::<Value>(body) else {
            return Self::raw(body);
        };

        let mut parts = Vec::new();
        if let Some(messages) = json.get("messages").and_then(Value::as_array) {
            for message in messages {
                collect_content(message.get("content"), &mut parts);
            }
        }
        for field in ["prompt", "input"] {
            collect_content(json.get(field), &mut parts);
        }

        if parts.is_empty() {
            return Self::raw(body);
        }
        Self {
            text: parts.join("\n"),
            bytes: body.len(),
        }
    }

    /// Build the post-response payload from a raw response body.
    ///
    /// Understands chat-completion `choices`, legacy completion `text`, and
    /// content-block arrays.
    pub fn from_response_bytes(body: &[u8]) -> Self {
        let Ok(json) = serde_json::from_slice::<Value>(body) else {
            return Self::raw(body);
        };

        let mut parts = Vec::new();
        if let Some(choices) = json.get("choices").and_then(Value::as_array) {
            for choice in choices {
                collect_content(choice.get("message").and_then(|m| m.get("content")), &mut parts);
                collect_content(choice.get("text"), &mut parts);
            }
        }
        // Content-block response shape: {"content": [{"type": "text", ...}]}.
        collect_content(json.get("content"), &mut parts);
        collect_content(json.get("output_text"), &mut parts);

        if parts.is_empty() {
            return Self::raw(body);
        }
        Self {
            text: parts.join("\n"),
            bytes: body.len(),
        }
    }

    fn raw(body: &[u8]) -> Self {
        Self {
            text: String::from_utf8_lossy(body).into_owned(),
            bytes: body.len(),
        }
    }

    /// The extracted text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Size of the original body in bytes.
    pub fn source_bytes(&self) -> usize {
        self.bytes
    }
}

/// Append string content to `parts`, descending into content-part arrays
/// (`[{"type": "text", "text": "..."}]`).
fn collect_content(value: Option<&Value>, parts: &mut Vec<String>) {
    match value {
        Some(Value::String(s)) if !s.is_empty() => parts.push(s.clone()),
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    if !text.is_empty() {
                        parts.push(text.to_owned());
                    }
                } else if let Some(s) = item.as_str() {
                    parts.push(s.to_owned());
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_chat_messages_including_system() {
        let body = serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": "My SSN is 123-45-6789."},
            ]
        });
        let payload = CheckPayload::from_request_bytes(body.to_string().as_bytes());
        assert!(payload.text().contains("helpful assistant"));
        assert!(payload.text().contains("123-45-6789"));
    }

    #[test]
    fn extracts_content_part_arrays() {
        let body = serde_json::json!({
            "messages": [
                {"role": "user", "content": [
                    {"type": "text", "text": "part one"},
                    {"type": "image_url", "image_url": {"url": "https://x"}},
                    {"type": "text", "text": "part two"},
                ]},
            ]
        });
        let payload = CheckPayload::from_request_bytes(body.to_string().as_bytes());
        assert!(payload.text().contains("part one"));
        assert!(payload.text().contains("part two"));
        assert!(!payload.text().contains("image_url"));
    }

    #[test]
    fn extracts_completion_prompt() {
        let body = serde_json::json!({"prompt": "complete this"});
        let payload = CheckPayload::from_request_bytes(body.to_string().as_bytes());
        assert_eq!(payload.text(), "complete this");
    }

    #[test]
    fn falls_back_to_raw_for_unrecognized_json() {
        let body = br#"{"custom": "shape"}"#;
        let payload = CheckPayload::from_request_bytes(body);
        assert!(payload.text().contains("custom"));
    }

    #[test]
    fn falls_back_to_raw_for_non_json() {
        let payload = CheckPayload::from_request_bytes(b"plain text body");
        assert_eq!(payload.text(), "plain text body");
        assert_eq!(payload.source_bytes(), 15);
    }

    #[test]
    fn extracts_chat_response_choices() {
        let body = serde_json::json!({
            "choices": [
                {"message": {"role": "assistant", "content": "Visiting hours are 9-5."}},
            ]
        });
        let payload = CheckPayload::from_response_bytes(body.to_string().as_bytes());
        assert_eq!(payload.text(), "Visiting hours are 9-5.");
    }

    #[test]
    fn extracts_content_block_response() {
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "blocked content"}],
            "role": "assistant",
        });
        let payload = CheckPayload::from_response_bytes(body.to_string().as_bytes());
        assert_eq!(payload.text(), "blocked content");
    }

    #[test]
    fn extracts_legacy_completion_text() {
        let body = serde_json::json!({"choices": [{"text": "old style"}]});
        let payload = CheckPayload::from_response_bytes(body.to_string().as_bytes());
        assert_eq!(payload.text(), "old style");
    }
}

//! Classification of inbound stream messages.

use serde_json::Value;

/// Reason used when an authorization error carries no text.
const DEFAULT_AUTH_REASON: &str = "unauthorized";

/// What an inbound text frame means to the device.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The backend rejected the credential.
    AuthError { reason: String },
    /// A query for the RPC handler.
    Request(Value),
    /// Anything else, including frames that are not JSON objects.
    Ignored,
}

fn non_empty_str<'a>(msg: &'a Value, key: &str) -> Option<&'a str> {
    msg.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn is_auth_error(msg: &Value) -> bool {
    let kind = msg.get("type").and_then(Value::as_str).unwrap_or("");
    let reason = non_empty_str(msg, "reason");
    let error = non_empty_str(msg, "error");

    matches!(kind, "auth_error" | "unauthorized")
        || (kind == "error" && (reason.is_some() || error.is_some()))
        || error == Some("invalid_home_token")
}

/// Classify one inbound text frame.
pub fn classify_inbound(text: &str) -> InboundMessage {
    let msg: Value = match serde_json::from_str(text) {
        Ok(v @ Value::Object(_)) => v,
        _ => return InboundMessage::Ignored,
    };

    if is_auth_error(&msg) {
        let reason = non_empty_str(&msg, "reason")
            .or_else(|| non_empty_str(&msg, "error"))
            .unwrap_or(DEFAULT_AUTH_REASON)
            .to_string();
        return InboundMessage::AuthError { reason };
    }

    match msg.get("id") {
        Some(id) if !id.is_null() => InboundMessage::Request(msg),
        _ => InboundMessage::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason_of(text: &str) -> Option<String> {
        match classify_inbound(text) {
            InboundMessage::AuthError { reason } => Some(reason),
            _ => None,
        }
    }

    // ==================== Auth Error Tests ====================

    #[test]
    fn test_auth_error_types() {
        assert_eq!(reason_of(r#"{"type":"auth_error"}"#).as_deref(), Some("unauthorized"));
        assert_eq!(
            reason_of(r#"{"type":"unauthorized","reason":"expired"}"#).as_deref(),
            Some("expired")
        );
    }

    #[test]
    fn test_generic_error_needs_text() {
        assert_eq!(
            reason_of(r#"{"type":"error","error":"bad_sig"}"#).as_deref(),
            Some("bad_sig")
        );
        assert_eq!(
            reason_of(r#"{"type":"error","reason":"revoked","error":"x"}"#).as_deref(),
            Some("revoked")
        );
        assert_eq!(reason_of(r#"{"type":"error"}"#), None);
        assert_eq!(reason_of(r#"{"type":"error","reason":""}"#), None);
    }

    #[test]
    fn test_invalid_home_token_without_type() {
        assert_eq!(
            reason_of(r#"{"error":"invalid_home_token"}"#).as_deref(),
            Some("invalid_home_token")
        );
    }

    #[test]
    fn test_empty_reason_falls_back_to_error() {
        assert_eq!(
            reason_of(r#"{"type":"auth_error","reason":"","error":"nope"}"#).as_deref(),
            Some("nope")
        );
    }

    #[test]
    fn test_auth_error_with_id_is_not_a_request() {
        assert_eq!(
            reason_of(r#"{"type":"auth_error","id":7}"#).as_deref(),
            Some("unauthorized")
        );
    }

    // ==================== Request Tests ====================

    #[test]
    fn test_request_needs_non_null_id() {
        assert!(matches!(
            classify_inbound(r#"{"id":"r1","method":"get_latest"}"#),
            InboundMessage::Request(_)
        ));
        assert!(matches!(
            classify_inbound(r#"{"id":0,"method":"get_latest"}"#),
            InboundMessage::Request(_)
        ));
        assert_eq!(
            classify_inbound(r#"{"id":null,"method":"get_latest"}"#),
            InboundMessage::Ignored
        );
        assert_eq!(classify_inbound(r#"{"method":"get_latest"}"#), InboundMessage::Ignored);
    }

    #[test]
    fn test_other_errors_with_id_are_requests() {
        // "error" without text is not an auth failure
        assert!(matches!(
            classify_inbound(r#"{"type":"error","id":3}"#),
            InboundMessage::Request(_)
        ));
    }

    #[test]
    fn test_non_objects_are_ignored() {
        assert_eq!(classify_inbound("hello"), InboundMessage::Ignored);
        assert_eq!(classify_inbound("[1,2]"), InboundMessage::Ignored);
        assert_eq!(classify_inbound("42"), InboundMessage::Ignored);
        assert_eq!(classify_inbound(""), InboundMessage::Ignored);
    }
}

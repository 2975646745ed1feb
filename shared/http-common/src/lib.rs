//! Shared HTTP utilities for the user API workspace.
//!
//! Provides the JSON error body shape and request-origin helpers used by
//! api-server handlers and its request-log extractor.

use http::HeaderMap;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Resource not found",
        "bad_request" => "Bad request",
        "invalid_body" => "Request body is not a valid user",
        "unavailable" => "Backing store unavailable",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

// ============================================================================
// Request Origin
// ============================================================================

/// Client address as reported by a fronting proxy.
///
/// Prefers the first hop of `X-Forwarded-For`, then `X-Real-IP`. Returns `None`
/// when neither header carries a non-empty value; callers fall back to the
/// socket peer address.
pub fn origin_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Request id set by the request-id middleware, or `-` when absent.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_json_err() {
        let err = json_err("internal");
        assert_eq!(err, serde_json::json!({"error": {"code": "internal", "message": "Internal server error"}}));

        // Unknown code falls back to code as message
        let err = json_err("custom_error");
        assert_eq!(err, serde_json::json!({"error": {"code": "custom_error", "message": "custom_error"}}));
    }

    #[test]
    fn test_json_error_with_message() {
        let err = json_error_with_message("invalid_body", "expected value at line 1 column 1");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "invalid_body", "message": "expected value at line 1 column 1"}})
        );
    }

    #[test]
    fn test_origin_ip_prefers_first_forwarded_hop() {
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        h.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(origin_ip(&h).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_origin_ip_falls_back_to_real_ip() {
        let mut h = HeaderMap::new();
        h.insert("x-forwarded-for", HeaderValue::from_static("  "));
        h.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(origin_ip(&h).as_deref(), Some("198.51.100.2"));
        assert_eq!(origin_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_request_id() {
        let mut h = HeaderMap::new();
        assert_eq!(request_id(&h), "-");
        h.insert("x-request-id", HeaderValue::from_static("abc-123"));
        assert_eq!(request_id(&h), "abc-123");
    }
}

//! NextDNS response envelope classification
//!
//! Every JSON response of the API is either
//!
//! ```json
//! { "data": ... }
//! ```
//!
//! or
//!
//! ```json
//! { "errors": [ { "code": "notFound", "detail": "...", "source": { ... } } ] }
//! ```
//!
//! Only the first error is inspected. `notFound` is the one code callers can
//! act on; every other code collapses into a generic failure.

use rewrite_core::ProviderOutcome;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Error code the API uses for an unknown profile or record
pub const NOT_FOUND_CODE: &str = "notFound";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

/// One entry of the `errors` array
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub source: Option<Value>,
}

/// Classify a raw response body
pub fn classify<T: DeserializeOwned>(body: &str) -> ProviderOutcome<T> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => return ProviderOutcome::Failure(format!("malformed response envelope: {}", e)),
    };

    if let Some(data) = envelope.data.filter(|d| !d.is_null()) {
        return match serde_json::from_value(data) {
            Ok(value) => ProviderOutcome::Success(value),
            Err(e) => ProviderOutcome::Failure(format!("malformed response data: {}", e)),
        };
    }

    let Some(first) = envelope.errors.first() else {
        tracing::warn!("NextDNS returned neither data nor errors");
        return ProviderOutcome::Failure("unknown server error".to_string());
    };

    tracing::warn!(
        "NextDNS returned error: code={:?}, detail={:?}, source={:?}",
        first.code,
        first.detail,
        first.source
    );

    match first.code.as_deref() {
        Some(NOT_FOUND_CODE) => ProviderOutcome::NotFound,
        Some(code) => ProviderOutcome::Failure(format!("unhandled server error: {}", code)),
        None => ProviderOutcome::Failure("server error without code".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewrite_core::ObservedRewrite;

    #[test]
    fn test_data_is_success() {
        let outcome: ProviderOutcome<Vec<ObservedRewrite>> = classify(
            r#"{ "data": [ { "id": "r1", "name": "a.example.com", "type": "A", "content": "1.2.3.4" } ] }"#,
        );

        assert_eq!(
            outcome,
            ProviderOutcome::Success(vec![ObservedRewrite::new("r1", "a.example.com", "1.2.3.4")])
        );
    }

    #[test]
    fn test_not_found_code() {
        let outcome: ProviderOutcome<Vec<ObservedRewrite>> =
            classify(r#"{ "errors": [ { "code": "notFound", "detail": "Not Found" } ] }"#);
        assert_eq!(outcome, ProviderOutcome::NotFound);
    }

    #[test]
    fn test_only_first_error_counts() {
        let outcome: ProviderOutcome<Vec<ObservedRewrite>> = classify(
            r#"{ "errors": [ { "code": "invalid" }, { "code": "notFound" } ] }"#,
        );
        assert!(matches!(outcome, ProviderOutcome::Failure(msg) if msg.contains("invalid")));
    }

    #[test]
    fn test_empty_errors_is_unknown_failure() {
        let outcome: ProviderOutcome<Vec<ObservedRewrite>> = classify(r#"{ "errors": [] }"#);
        assert!(matches!(outcome, ProviderOutcome::Failure(msg) if msg.contains("unknown")));

        let outcome: ProviderOutcome<Vec<ObservedRewrite>> = classify("{}");
        assert!(matches!(outcome, ProviderOutcome::Failure(_)));
    }

    #[test]
    fn test_malformed_body_is_failure() {
        let outcome: ProviderOutcome<Vec<ObservedRewrite>> = classify("Bad Gateway");
        assert!(matches!(outcome, ProviderOutcome::Failure(_)));

        let outcome: ProviderOutcome<Vec<ObservedRewrite>> = classify(r#"{ "data": "nope" }"#);
        assert!(matches!(outcome, ProviderOutcome::Failure(msg) if msg.contains("data")));
    }

    #[test]
    fn test_null_data_falls_through_to_errors() {
        let outcome: ProviderOutcome<Vec<ObservedRewrite>> =
            classify(r#"{ "data": null, "errors": [ { "code": "notFound" } ] }"#);
        assert_eq!(outcome, ProviderOutcome::NotFound);
    }
}

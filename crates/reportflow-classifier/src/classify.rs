use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;

use reportflow_utils::error::ErrorCategory;

use crate::RawError;

/// Which signal of the raw error decided the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchedSignal {
    Status,
    NetworkCode,
    Message,
    Fallback,
}

/// Verdict for one raw failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: ErrorCategory,
    pub retryable: bool,
    pub user_message: String,
    pub suggested_actions: Vec<String>,
    /// Server `Retry-After` hint, kept only for `rateLimit`
    pub retry_after: Option<Duration>,
    pub matched: MatchedSignal,
}

impl Classification {
    fn new(category: ErrorCategory, matched: MatchedSignal, raw: &RawError) -> Self {
        Self {
            category,
            retryable: category.is_retryable(),
            user_message: category.user_message().to_string(),
            suggested_actions: category.suggested_actions(),
            retry_after: raw
                .retry_after
                .filter(|_| category == ErrorCategory::RateLimit),
            matched,
        }
    }
}

/// Classify a raw failure.
///
/// Precedence: HTTP status, then network fault code, then message heuristics.
/// The first matching rule wins and `unknown` is the fallback. Pure and total.
#[must_use]
pub fn classify(raw: &RawError) -> Classification {
    if let Some(category) = raw.status.and_then(classify_status) {
        return Classification::new(category, MatchedSignal::Status, raw);
    }
    if let Some(category) = raw.code.as_deref().and_then(classify_code) {
        return Classification::new(category, MatchedSignal::NetworkCode, raw);
    }
    if let Some(category) = raw.message.as_deref().and_then(classify_message) {
        return Classification::new(category, MatchedSignal::Message, raw);
    }
    Classification::new(ErrorCategory::Unknown, MatchedSignal::Fallback, raw)
}

/// Explicit HTTP status mapping; other statuses defer to later rules
#[must_use]
pub fn classify_status(status: u16) -> Option<ErrorCategory> {
    match status {
        400 => Some(ErrorCategory::Validation),
        401 | 403 => Some(ErrorCategory::Authentication),
        429 => Some(ErrorCategory::RateLimit),
        500..=599 => Some(ErrorCategory::ServiceFault),
        _ => None,
    }
}

const NETWORK_CODES: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "ECONNABORTED",
    "ETIMEDOUT",
    "ESOCKETTIMEDOUT",
    "ENOTFOUND",
    "EAI_AGAIN",
    "EPIPE",
    "ENOTCONN",
    "EHOSTUNREACH",
    "ENETUNREACH",
    "ENETDOWN",
    "EADDRNOTAVAIL",
];

/// Network fault codes (case-insensitive); unrecognised codes defer to the message
#[must_use]
pub fn classify_code(code: &str) -> Option<ErrorCategory> {
    let code = code.trim();
    let known = NETWORK_CODES.iter().any(|c| c.eq_ignore_ascii_case(code))
        || code.to_ascii_uppercase().starts_with("UND_ERR_");
    known.then_some(ErrorCategory::NetworkFault)
}

/// One message heuristic: text matching `pattern` maps to `category`, after
/// any text matching `ignore` has been removed.
struct MessageRule {
    category: ErrorCategory,
    pattern: &'static str,
    ignore: Option<&'static str>,
}

/// Message heuristics, checked in order; first match wins
const MESSAGE_RULES: &[MessageRule] = &[
    MessageRule {
        category: ErrorCategory::RateLimit,
        pattern: r"(?i)rate[\s_-]?limit|too many requests|\bquota\b|throttl",
        ignore: None,
    },
    MessageRule {
        category: ErrorCategory::Authentication,
        pattern: r"(?i)unauthori[sz]ed|forbidden|\bapi[\s_-]?key\b|authenticat|invalid[\s_-]token|permission denied|credential",
        ignore: None,
    },
    // "pdf" and "file" match anywhere: PDFs, pdfjs, filename, file_id
    MessageRule {
        category: ErrorCategory::FileProcessing,
        pattern: r"(?i)pdf|file|document|attachment|upload|\.docx?\b",
        ignore: Some(r"(?i)profile"),
    },
    MessageRule {
        category: ErrorCategory::ServiceFault,
        pattern: r"(?i)internal server error|service unavailable|bad gateway|gateway timeout|overloaded|server error",
        ignore: None,
    },
    MessageRule {
        category: ErrorCategory::NetworkFault,
        pattern: r"(?i)network|connection (?:reset|refused|closed|aborted)|timed out|timeout|\bdns\b|socket hang up|fetch failed|unreachable",
        ignore: None,
    },
    MessageRule {
        category: ErrorCategory::Validation,
        pattern: r"(?i)invalid|validation|malformed|bad request|\brequired\b|must be|too long|context length",
        ignore: None,
    },
];

struct MessageMatcher {
    category: ErrorCategory,
    pattern: Regex,
    ignore: Option<Regex>,
}

impl MessageMatcher {
    fn compile(rule: &MessageRule) -> Option<Self> {
        let ignore = match rule.ignore {
            Some(pattern) => Some(Regex::new(pattern).ok()?),
            None => None,
        };
        Some(Self {
            category: rule.category,
            pattern: Regex::new(rule.pattern).ok()?,
            ignore,
        })
    }

    fn is_match(&self, message: &str) -> bool {
        match &self.ignore {
            Some(ignore) => self.pattern.is_match(&ignore.replace_all(message, " ")),
            None => self.pattern.is_match(message),
        }
    }
}

// Patterns are literals covered by tests; a rule that fails to compile is skipped.
static MESSAGE_MATCHERS: Lazy<Vec<MessageMatcher>> =
    Lazy::new(|| MESSAGE_RULES.iter().filter_map(MessageMatcher::compile).collect());

/// Substring heuristics over free-form error text
#[must_use]
pub fn classify_message(message: &str) -> Option<ErrorCategory> {
    MESSAGE_MATCHERS
        .iter()
        .find(|matcher| matcher.is_match(message))
        .map(|matcher| matcher.category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_all_message_patterns_compile() {
        assert_eq!(MESSAGE_MATCHERS.len(), MESSAGE_RULES.len());
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (400, ErrorCategory::Validation),
            (401, ErrorCategory::Authentication),
            (403, ErrorCategory::Authentication),
            (429, ErrorCategory::RateLimit),
            (500, ErrorCategory::ServiceFault),
            (503, ErrorCategory::ServiceFault),
            (599, ErrorCategory::ServiceFault),
        ];
        for (status, expected) in cases {
            let c = classify(&RawError::new().with_status(status));
            assert_eq!(c.category, expected, "status {status}");
            assert_eq!(c.matched, MatchedSignal::Status);
        }
    }

    #[test]
    fn test_status_wins_over_code_and_message() {
        let raw = RawError::http(401, "connection reset while uploading pdf").with_code("ECONNRESET");
        let c = classify(&raw);
        assert_eq!(c.category, ErrorCategory::Authentication);
        assert!(!c.retryable);
    }

    #[test]
    fn test_code_wins_over_message() {
        let raw = RawError::network("ECONNRESET").with_message("failed to read pdf file");
        let c = classify(&raw);
        assert_eq!(c.category, ErrorCategory::NetworkFault);
        assert_eq!(c.matched, MatchedSignal::NetworkCode);
        assert!(c.retryable);
    }

    #[test]
    fn test_unmapped_status_falls_through() {
        let raw = RawError::http(404, "model not found");
        let c = classify(&raw);
        assert_eq!(c.category, ErrorCategory::Unknown);
        assert_eq!(c.matched, MatchedSignal::Fallback);

        let raw = RawError::http(413, "uploaded file too large");
        assert_eq!(classify(&raw).category, ErrorCategory::FileProcessing);
    }

    #[test]
    fn test_network_codes_are_case_insensitive() {
        assert_eq!(classify_code("etimedout"), Some(ErrorCategory::NetworkFault));
        assert_eq!(classify_code("UND_ERR_SOCKET"), Some(ErrorCategory::NetworkFault));
        assert_eq!(classify_code("E_SOMETHING_ELSE"), None);
    }

    #[test]
    fn test_message_heuristics() {
        let cases = [
            ("Rate limit reached for requests", ErrorCategory::RateLimit),
            ("You exceeded your current quota", ErrorCategory::RateLimit),
            ("Incorrect API key provided", ErrorCategory::Authentication),
            ("Failed to parse PDF", ErrorCategory::FileProcessing),
            ("could not read file contents", ErrorCategory::FileProcessing),
            ("The server is overloaded", ErrorCategory::ServiceFault),
            ("request timed out", ErrorCategory::NetworkFault),
            ("fetch failed", ErrorCategory::NetworkFault),
            ("field 'topic' is required", ErrorCategory::Validation),
            ("something odd happened", ErrorCategory::Unknown),
        ];
        for (message, expected) in cases {
            assert_eq!(
                classify(&RawError::message(message)).category,
                expected,
                "message {message:?}"
            );
        }
    }

    #[test]
    fn test_file_heuristic_matches_inside_words() {
        let cases = [
            "Could not parse the uploaded PDFs",
            "invalid filename in upload_file field",
            "pdfjs: unexpected end of stream",
            "file_id not recognised",
            "Attachments exceed the size limit",
        ];
        for message in cases {
            let c = classify(&RawError::message(message));
            assert_eq!(c.category, ErrorCategory::FileProcessing, "message {message:?}");
            assert_eq!(c.matched, MatchedSignal::Message);
            assert!(!c.retryable);
        }
    }

    #[test]
    fn test_file_heuristic_ignores_profile() {
        let c = classify(&RawError::message("profile lookup returned nothing"));
        assert_eq!(c.category, ErrorCategory::Unknown);

        let c = classify(&RawError::message("Profile 'weekly' is invalid"));
        assert_eq!(c.category, ErrorCategory::Validation);

        // a real file mention next to "profile" still counts
        let c = classify(&RawError::message("profile references a missing file"));
        assert_eq!(c.category, ErrorCategory::FileProcessing);
    }

    #[test]
    fn test_retry_after_kept_only_for_rate_limit() {
        let hint = Duration::from_secs(12);
        let c = classify(&RawError::http(429, "slow down").with_retry_after(hint));
        assert_eq!(c.retry_after, Some(hint));

        let c = classify(&RawError::http(503, "unavailable").with_retry_after(hint));
        assert_eq!(c.retry_after, None);
    }

    #[test]
    fn test_classification_carries_category_text() {
        let c = classify(&RawError::http(400, "bad"));
        assert_eq!(c.user_message, ErrorCategory::Validation.user_message());
        assert_eq!(c.suggested_actions, ErrorCategory::Validation.suggested_actions());
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["category"], "validation");
        assert_eq!(json["matched"], "status");
    }

    #[test]
    fn test_empty_error_is_unknown() {
        let c = classify(&RawError::new());
        assert_eq!(c.category, ErrorCategory::Unknown);
        assert!(!c.retryable);
    }

    proptest! {
        #[test]
        fn prop_classify_is_total(
            status in proptest::option::of(any::<u16>()),
            code in proptest::option::of(".{0,24}"),
            message in proptest::option::of(".{0,200}"),
            retry_after in proptest::option::of(0u64..100_000),
        ) {
            let raw = RawError {
                status,
                code,
                message,
                retry_after: retry_after.map(Duration::from_millis),
            };
            let c = classify(&raw);
            prop_assert_eq!(c.retryable, c.category.is_retryable());
            prop_assert!(!c.user_message.is_empty());
            prop_assert!(!c.suggested_actions.is_empty());
            prop_assert_eq!(classify(&raw), c);
        }

        #[test]
        fn prop_mapped_status_always_decides(status in prop_oneof![Just(400u16), Just(401), Just(403), Just(429), 500u16..600]) {
            let raw = RawError::http(status, "connection reset").with_code("ECONNRESET");
            prop_assert_eq!(classify(&raw).matched, MatchedSignal::Status);
        }
    }
}

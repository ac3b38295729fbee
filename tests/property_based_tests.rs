//! Property tests across the classifier and retry executor
//!
//! For arbitrary raw failures and attempt limits, the number of attempts the
//! executor makes is fully determined by the classifier's retry verdict.

use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use reportflow::{ErrorCategory, RawError, RetryError, RetryPolicy, classify};

fn arb_raw_error() -> impl Strategy<Value = RawError> {
    let code = prop_oneof![
        Just("ECONNRESET".to_string()),
        Just("ETIMEDOUT".to_string()),
        Just("ENOENT".to_string()),
        "[A-Z_]{0,12}",
    ];
    let message = prop_oneof![
        Just("rate limit exceeded".to_string()),
        Just("invalid api key".to_string()),
        Just("could not read the uploaded PDF".to_string()),
        Just("socket hang up".to_string()),
        ".{0,40}",
    ];
    (
        prop::option::of(0u16..1000),
        prop::option::of(code),
        prop::option::of(message),
        prop::option::of(0u64..120),
    )
        .prop_map(|(status, code, message, retry_after)| RawError {
            status,
            code,
            message,
            retry_after: retry_after.map(Duration::from_secs),
        })
}

fn run_always_failing(raw: RawError, max_attempts: u32) -> (u32, RetryError) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    rt.block_on(async move {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy::new(max_attempts, Duration::from_millis(100));
        let err = reportflow::retry::execute(&policy, || {
            counter.fetch_add(1, Ordering::SeqCst);
            let raw = raw.clone();
            async move { Err::<(), _>(raw) }
        })
        .await
        .unwrap_err();
        (calls.load(Ordering::SeqCst), err)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_attempts_follow_retry_verdict(raw in arb_raw_error(), max_attempts in 1u32..6) {
        let verdict = classify(&raw);
        let (calls, err) = run_always_failing(raw, max_attempts);

        let expected = if verdict.retryable { max_attempts } else { 1 };
        prop_assert_eq!(calls, expected);
        prop_assert_eq!(err.attempts(), expected);
        prop_assert_eq!(err.category(), Some(verdict.category));
        prop_assert_eq!(err.is_retryable(), verdict.retryable);
    }

    #[test]
    fn prop_user_rendering_is_never_empty(raw in arb_raw_error()) {
        let verdict = classify(&raw);
        prop_assert!(!verdict.user_message.is_empty());
        prop_assert!(!verdict.suggested_actions.is_empty());
        let rate_limited = verdict.category == ErrorCategory::RateLimit;
        prop_assert_eq!(
            verdict.retry_after.is_some(),
            rate_limited && raw.retry_after.is_some()
        );
    }
}

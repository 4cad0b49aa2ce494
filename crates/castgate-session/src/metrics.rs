//! Session metrics.
//!
//! # Metrics
//!
//! - `castgate_refresh_total` - Counter of refresh flights by outcome
//! - `castgate_refresh_joined_total` - Counter of callers that joined a flight already in progress
//! - `castgate_refresh_duration_seconds` - Histogram of refresh round trips
//! - `castgate_interceptor_requests_total` - Counter of intercepted requests by result
//! - `castgate_login_total` - Counter of login attempts by outcome
//!
//! Calls are no-ops until a `metrics` recorder is installed, e.g. with
//! `metrics-exporter-prometheus`.

use metrics::{counter, histogram};

/// Metric name for refresh flights.
pub const REFRESH_TOTAL: &str = "castgate_refresh_total";

/// Metric name for callers joining an in-flight refresh.
pub const REFRESH_JOINED_TOTAL: &str = "castgate_refresh_joined_total";

/// Metric name for refresh duration histogram.
pub const REFRESH_DURATION_SECONDS: &str = "castgate_refresh_duration_seconds";

/// Metric name for intercepted requests.
pub const INTERCEPTOR_REQUESTS_TOTAL: &str = "castgate_interceptor_requests_total";

/// Metric name for login attempts.
pub const LOGIN_TOTAL: &str = "castgate_login_total";

/// How a refresh flight ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    Failure,
    /// The session changed while the flight was running; the result was dropped.
    Discarded,
}

impl RefreshOutcome {
    /// Label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Discarded => "discarded",
        }
    }
}

/// Record a finished refresh flight.
pub fn record_refresh(outcome: RefreshOutcome, duration_seconds: f64) {
    counter!(REFRESH_TOTAL, "outcome" => outcome.as_str()).increment(1);
    histogram!(REFRESH_DURATION_SECONDS).record(duration_seconds);
}

/// Record a caller joining a flight already in progress.
pub fn record_refresh_joined() {
    counter!(REFRESH_JOINED_TOTAL).increment(1);
}

/// Record an intercepted request.
///
/// `result` is one of `ok`, `retried`, `unauthorized`, `network_error`, `storage_error`.
pub fn record_request(result: &'static str) {
    counter!(INTERCEPTOR_REQUESTS_TOTAL, "result" => result).increment(1);
}

/// Record a login attempt.
pub fn record_login(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(LOGIN_TOTAL, "outcome" => outcome).increment(1);
}

/// Describe all metrics for registration with a recorder.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram, Unit};

    describe_counter!(REFRESH_TOTAL, Unit::Count, "Token refresh flights by outcome");
    describe_counter!(
        REFRESH_JOINED_TOTAL,
        Unit::Count,
        "Callers that awaited a refresh already in flight"
    );
    describe_histogram!(
        REFRESH_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of token refresh flights in seconds"
    );
    describe_counter!(
        INTERCEPTOR_REQUESTS_TOTAL,
        Unit::Count,
        "Outbound requests passing through the session interceptor"
    );
    describe_counter!(LOGIN_TOTAL, Unit::Count, "Login attempts by outcome");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RefreshOutcome::Success.as_str(), "success");
        assert_eq!(RefreshOutcome::Failure.as_str(), "failure");
        assert_eq!(RefreshOutcome::Discarded.as_str(), "discarded");
    }

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        record_refresh(RefreshOutcome::Success, 0.05);
        record_refresh_joined();
        record_request("ok");
        record_login(false);
        describe_metrics();
    }
}

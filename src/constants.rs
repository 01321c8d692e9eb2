/// How long a series key sits in the debounce window before its burst is
/// processed. Episodes of the same series typically land within seconds of
/// each other, so the window restarts on every arrival.
pub const SERIES_DEBOUNCE_SECS: u64 = 15;

/// Timeout applied to every collaborator HTTP call.
pub const COLLABORATOR_TIMEOUT_SECS: u64 = 10;

/// Shorter timeout for login/token exchanges.
pub const LOGIN_TIMEOUT_SECS: u64 = 5;

/// Name of the compiled-in scheme used when neither matcher pass hits.
pub const SYSTEM_DEFAULT_SCHEME: &str = "system_default";

/// History outcome labels
pub const HISTORY_SUCCESS: &str = "success";
pub const HISTORY_FAILED: &str = "failed";
pub const HISTORY_SKIPPED: &str = "skipped";

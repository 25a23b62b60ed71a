/// Number of records returned by the recent-records query when no usable limit is given.
pub const RECENT_DEFAULT_LIMIT: i64 = 50;

/// Upper bound for the recent-records query.
pub const RECENT_MAX_LIMIT: i64 = 200;

/// SSE event name carrying a serialized broadcast message.
pub const SUBMISSION_EVENT: &str = "submission";

// Field limits for submissions
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 320;
pub const MAX_MESSAGE_LEN: usize = 5000;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

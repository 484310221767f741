/// Server configuration constants

/// Port used when `SOLI_PORT` is not set
pub const DEFAULT_PORT: u16 = 3000;

/// Bind address used when `SOLI_HOST` is not set
pub const DEFAULT_HOST: [u8; 4] = [0, 0, 0, 0];

/// Session lifetime when `SOLI_SESSION_MAX_AGE` is not set (24 hours)
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// How often `serve` sweeps expired sessions from the store
pub const SESSION_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Largest request body the adapter will buffer
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Form/query field that overrides the method of a POST
pub const METHOD_OVERRIDE_PARAM: &str = "_method";

/// Methods a `_method` override may select
pub const OVERRIDABLE_METHODS: &[&str] = &["PUT", "PATCH", "DELETE"];

/// Session key holding flash messages queued for the next request
pub const FLASH_SESSION_KEY: &str = "_flash";

/// Replacement for redacted parameter values in request logs
pub const FILTERED_PLACEHOLDER: &str = "[FILTERED]";

// Environment variables read by `ServeConfig::from_env`
pub const ENV_HOST: &str = "SOLI_HOST";
pub const ENV_PORT: &str = "SOLI_PORT";
pub const ENV_CSRF_SECRET: &str = "SOLI_CSRF_SECRET";
pub const ENV_CSRF_PARAM: &str = "SOLI_CSRF_PARAM";
pub const ENV_SESSION_MAX_AGE: &str = "SOLI_SESSION_MAX_AGE";
pub const ENV_LOG_REQUESTS: &str = "SOLI_LOG_REQUESTS";

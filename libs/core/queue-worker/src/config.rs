//! Worker configuration
//!
//! `WorkerConfig` is built once at startup and shared read-only by every
//! lifecycle in the pool.

use core_config::{env_flag, env_optional, env_parse, env_required, ConfigError, FromEnv};
use std::time::Duration;

/// Longest long-poll wait SQS accepts.
pub const MAX_RECEIVE_WAIT: Duration = Duration::from_secs(20);

/// Extra visibility granted on top of the job timeout so a message is not
/// redelivered while its dispatch is still legitimately running.
pub const DEFAULT_VISIBILITY_MARGIN: Duration = Duration::from_secs(5);

/// Longest visibility timeout SQS accepts (12 hours).
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(43_200);

/// Configuration for the bridge worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Source queue URL
    pub queue_url: String,

    /// Dead-letter queue URL (only used with dead-letter emulation)
    pub dead_letter_queue_url: Option<String>,

    /// Job endpoint that receives every message body
    pub job_url: String,

    /// Upper bound for a single job invocation
    pub job_timeout: Duration,

    /// Promote messages to the DLQ ourselves once they hit `max_receive_count`.
    /// Needed on queue servers without native redrive (ElasticMQ).
    pub dead_letter_emulation: bool,

    /// Receive count at which a failing message is dead-lettered
    pub max_receive_count: u32,

    /// Number of concurrent worker lifecycles
    pub pool_size: usize,

    /// Long-poll wait per receive call
    pub receive_wait: Duration,

    /// Added to `job_timeout` to form the visibility timeout
    pub visibility_margin: Duration,
}

impl WorkerConfig {
    /// Create a config with defaults for everything except the two URLs.
    pub fn new(queue_url: impl Into<String>, job_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            dead_letter_queue_url: None,
            job_url: job_url.into(),
            job_timeout: Duration::from_secs(60),
            dead_letter_emulation: false,
            max_receive_count: 5,
            pool_size: 10,
            receive_wait: MAX_RECEIVE_WAIT,
            visibility_margin: DEFAULT_VISIBILITY_MARGIN,
        }
    }

    /// Enable dead-letter emulation against the given queue.
    pub fn with_dead_letter_queue(mut self, url: impl Into<String>, max_receive_count: u32) -> Self {
        self.dead_letter_queue_url = Some(url.into());
        self.dead_letter_emulation = true;
        self.max_receive_count = max_receive_count.max(1);
        self
    }

    /// Set the per-job timeout
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Set the pool size (at least one lifecycle)
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Set the long-poll wait, capped at the SQS maximum of 20 seconds
    pub fn with_receive_wait(mut self, wait: Duration) -> Self {
        self.receive_wait = wait.min(MAX_RECEIVE_WAIT);
        self
    }

    /// Set the visibility margin, never below the 5 second default
    pub fn with_visibility_margin(mut self, margin: Duration) -> Self {
        self.visibility_margin = margin.max(DEFAULT_VISIBILITY_MARGIN);
        self
    }

    /// Visibility timeout requested on every receive.
    pub fn visibility_timeout(&self) -> Duration {
        self.job_timeout + self.visibility_margin
    }

    /// The DLQ to promote into, if emulation is active.
    pub fn dead_letter_target(&self) -> Option<&str> {
        if self.dead_letter_emulation {
            self.dead_letter_queue_url.as_deref()
        } else {
            None
        }
    }

    /// Reject combinations that would make the worker misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_url.trim().is_empty() {
            return Err(invalid("SQSD_QUEUE_URL", "must not be empty"));
        }
        if self.job_url.trim().is_empty() {
            return Err(invalid("SQSD_WORKER_URL", "must not be empty"));
        }
        if self.job_timeout.is_zero() {
            return Err(invalid("SQSD_JOB_TIMEOUT_SECS", "must be at least 1 second"));
        }
        if self.visibility_timeout() > MAX_VISIBILITY_TIMEOUT {
            return Err(invalid(
                "SQSD_JOB_TIMEOUT_SECS",
                "job timeout plus visibility margin must not exceed 12 hours",
            ));
        }
        if self.pool_size == 0 {
            return Err(invalid("SQSD_POOL_SIZE", "must be at least 1"));
        }
        if self.max_receive_count == 0 {
            return Err(invalid("SQSD_MAX_RECEIVE_COUNT", "must be at least 1"));
        }
        if self.receive_wait > MAX_RECEIVE_WAIT {
            return Err(invalid("SQSD_RECEIVE_WAIT_SECS", "must be 20 seconds or less"));
        }
        if self.dead_letter_emulation && self.dead_letter_queue_url.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "SQSD_DEAD_LETTER_QUEUE_URL".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(key: &str, details: &str) -> ConfigError {
    ConfigError::ParseError {
        key: key.to_string(),
        details: details.to_string(),
    }
}

impl FromEnv for WorkerConfig {
    /// Reads the `SQSD_*` variables:
    /// - `SQSD_QUEUE_URL`, `SQSD_WORKER_URL`: required
    /// - `SQSD_DEAD_LETTER_QUEUE_URL`: required when `SQSD_DEAD_LETTER_EMULATION` is on
    /// - `SQSD_JOB_TIMEOUT_SECS` (60), `SQSD_MAX_RECEIVE_COUNT` (5),
    ///   `SQSD_POOL_SIZE` (10), `SQSD_RECEIVE_WAIT_SECS` (20)
    fn from_env() -> Result<Self, ConfigError> {
        let receive_wait_secs: u64 = env_parse("SQSD_RECEIVE_WAIT_SECS", 20)?;
        if receive_wait_secs > MAX_RECEIVE_WAIT.as_secs() {
            return Err(invalid("SQSD_RECEIVE_WAIT_SECS", "must be 20 seconds or less"));
        }

        let config = Self {
            queue_url: env_required("SQSD_QUEUE_URL")?,
            dead_letter_queue_url: env_optional("SQSD_DEAD_LETTER_QUEUE_URL"),
            job_url: env_required("SQSD_WORKER_URL")?,
            job_timeout: Duration::from_secs(env_parse("SQSD_JOB_TIMEOUT_SECS", 60)?),
            dead_letter_emulation: env_flag("SQSD_DEAD_LETTER_EMULATION", false)?,
            max_receive_count: env_parse("SQSD_MAX_RECEIVE_COUNT", 5)?,
            pool_size: env_parse("SQSD_POOL_SIZE", 10)?,
            receive_wait: Duration::from_secs(receive_wait_secs),
            visibility_margin: DEFAULT_VISIBILITY_MARGIN,
        };

        config.validate()?;
        Ok(config)
    }
}

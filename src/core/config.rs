/*!
 * Service Configuration
 *
 * Runtime configuration for the handle service, loaded from defaults,
 * environment variables, or JSON.
 */

use super::errors::HandleError;
use super::limits;
use super::types::HandleResult;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Handle service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Lifecycle event ring capacity
    pub lifecycle_capacity: usize,
    /// First id handed out by the handle id arena
    pub first_handle_id: u32,
    /// Exclusive upper bound on handle ids; the usable range is
    /// `first_handle_id..max_handle_ids`
    pub max_handle_ids: u32,
    /// Handles a single client may own, shadows included
    pub max_handles_per_client: usize,
    /// Handles that may refer to one open file
    pub max_handles_per_file: usize,
    /// Open files the provider may hold
    pub max_files: usize,
    /// Abort the process on lifecycle queue overflow instead of returning an error
    pub abort_on_overflow: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            lifecycle_capacity: limits::LIFECYCLE_QUEUE_CAPACITY,
            first_handle_id: limits::FIRST_HANDLE_ID,
            max_handle_ids: limits::MAX_HANDLE_IDS,
            max_handles_per_client: limits::MAX_HANDLES_PER_CLIENT,
            max_handles_per_file: limits::MAX_HANDLES_PER_FILE,
            max_files: limits::MAX_FILES,
            abort_on_overflow: true,
        }
    }
}

impl ServiceConfig {
    /// Small limits for constrained providers
    pub fn minimal() -> Self {
        Self {
            lifecycle_capacity: 16,
            first_handle_id: limits::FIRST_HANDLE_ID,
            max_handle_ids: 4096,
            max_handles_per_client: 64,
            max_handles_per_file: 256,
            max_files: 256,
            abort_on_overflow: true,
        }
    }

    #[must_use]
    pub fn with_lifecycle_capacity(mut self, capacity: usize) -> Self {
        self.lifecycle_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_handle_ids(mut self, first: u32, max: u32) -> Self {
        self.first_handle_id = first;
        self.max_handle_ids = max;
        self
    }

    #[must_use]
    pub fn with_max_handles_per_client(mut self, max: usize) -> Self {
        self.max_handles_per_client = max;
        self
    }

    #[must_use]
    pub fn with_max_handles_per_file(mut self, max: usize) -> Self {
        self.max_handles_per_file = max;
        self
    }

    #[must_use]
    pub fn with_max_files(mut self, max: usize) -> Self {
        self.max_files = max;
        self
    }

    #[must_use]
    pub fn with_abort_on_overflow(mut self, abort: bool) -> Self {
        self.abort_on_overflow = abort;
        self
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> HandleResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HandleError::Internal(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `HANDLE_*` environment variables
    ///
    /// Environment variables:
    /// - HANDLE_LIFECYCLE_CAPACITY
    /// - HANDLE_MAX_PER_CLIENT
    /// - HANDLE_MAX_PER_FILE
    /// - HANDLE_MAX_FILES
    /// - HANDLE_ABORT_ON_OVERFLOW (1/true/0/false)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("HANDLE_LIFECYCLE_CAPACITY") {
            config.lifecycle_capacity = v;
        }
        if let Some(v) = env_parse("HANDLE_MAX_PER_CLIENT") {
            config.max_handles_per_client = v;
        }
        if let Some(v) = env_parse("HANDLE_MAX_PER_FILE") {
            config.max_handles_per_file = v;
        }
        if let Some(v) = env_parse("HANDLE_MAX_FILES") {
            config.max_files = v;
        }
        if let Ok(v) = std::env::var("HANDLE_ABORT_ON_OVERFLOW") {
            config.abort_on_overflow = v == "1" || v == "true";
        }
        if let Err(e) = config.validate() {
            warn!(error = %e, "Ignoring invalid environment configuration");
            return Self::default();
        }
        config
    }

    pub fn validate(&self) -> HandleResult<()> {
        if self.lifecycle_capacity == 0 {
            return Err(HandleError::Internal(
                "lifecycle_capacity must be greater than 0".into(),
            ));
        }
        if self.first_handle_id >= self.max_handle_ids {
            return Err(HandleError::Internal(format!(
                "first_handle_id {} not below max_handle_ids {}",
                self.first_handle_id, self.max_handle_ids
            )));
        }
        if self.max_handles_per_client == 0 || self.max_handles_per_file == 0 {
            return Err(HandleError::Internal("handle limits must be non-zero".into()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Could not parse configuration variable");
            None
        }
    }
}

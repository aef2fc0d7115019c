use crate::core::{PersistError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Persistence layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Fail with an out-of-date schema error when a fetched row lacks a declared field
    pub check_field_integrity: bool,

    /// Run the entity integrity hook on every construction
    pub strict_mode: bool,

    /// Upper bound of each identity cache, `None` keeps every instance
    pub cache_capacity: Option<usize>,

    /// Apply the valid fields of an update even when other fields failed
    pub allow_partial_updates: bool,

    /// Address recorded by audit fields when the request carries none
    pub default_client_ip: String,

    /// Flush dirty entities when a session goes out of scope
    pub flush_on_drop: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            check_field_integrity: true,
            strict_mode: false,
            cache_capacity: None,
            allow_partial_updates: false,
            default_client_ip: "127.0.0.1".to_string(),
            flush_on_drop: true,
        }
    }
}

impl PersistConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_field_integrity(mut self, enabled: bool) -> Self {
        self.check_field_integrity = enabled;
        self
    }

    pub fn strict_mode(mut self, enabled: bool) -> Self {
        self.strict_mode = enabled;
        self
    }

    /// Bound identity caches to `capacity` instances (LRU eviction)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn allow_partial_updates(mut self, enabled: bool) -> Self {
        self.allow_partial_updates = enabled;
        self
    }

    pub fn default_client_ip(mut self, ip: &str) -> Self {
        self.default_client_ip = ip.to_string();
        self
    }

    pub fn flush_on_drop(mut self, enabled: bool) -> Self {
        self.flush_on_drop = enabled;
        self
    }

    /// Parse a JSON document; missing keys keep their defaults.
    ///
    /// ```ignore
    /// let config = PersistConfig::from_json(r#"{"strict_mode": true}"#)?;
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PersistError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == Some(0) {
            return Err(PersistError::Config(
                "cache_capacity must be > 0".to_string(),
            ));
        }
        if self.default_client_ip.trim().is_empty() {
            return Err(PersistError::Config(
                "default_client_ip cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request data recorded by audit fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_ip(mut self, ip: &str) -> Self {
        self.client_ip = Some(ip.to_string());
        self
    }

    pub fn user_agent(mut self, agent: &str) -> Self {
        self.user_agent = Some(agent.to_string());
        self
    }

    pub fn referer(mut self, referer: &str) -> Self {
        self.referer = Some(referer.to_string());
        self
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Everything an entity needs besides its schema and adapter.
#[derive(Clone)]
pub struct PersistContext {
    pub config: PersistConfig,
    pub clock: Arc<dyn Clock>,
    pub request: RequestContext,
}

impl PersistContext {
    pub fn new(config: PersistConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            request: RequestContext::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = request;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn client_ip(&self) -> &str {
        self.request
            .client_ip
            .as_deref()
            .unwrap_or(&self.config.default_client_ip)
    }
}

impl Default for PersistContext {
    fn default() -> Self {
        Self::new(PersistConfig::default())
    }
}

impl fmt::Debug for PersistContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistContext")
            .field("config", &self.config)
            .field("request", &self.request)
            .field("now", &self.clock.now())
            .finish()
    }
}

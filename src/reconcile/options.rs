//! Reconciler options.
//!
//! ```ignore
//! let options = Options::new("data-id").with_watch(["data-lat", "data-lng"]).with_batch(true);
//!
//! // Or from JSON, e.g. read out of a data attribute:
//! let options = Options::from_json(r#"{"key": "data-id", "watch": ["data-lat"]}"#)?;
//! ```

use serde::{Deserialize, Serialize};

use super::scheduler::FlushMode;
use crate::error::ConfigurationError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Attribute whose value identifies an entity. Required.
    pub key: String,
    /// Attributes compared between swapped nodes and observed for direct changes.
    pub watch: Vec<String>,
    /// Coalesce bursts until the next frame instead of flushing each one.
    pub batch: bool,
}

impl Options {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_watch<I, S>(mut self, watch: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.watch = watch.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    /// Decode and validate options from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.key.trim().is_empty() {
            return Err(ConfigurationError::MissingKey);
        }
        Ok(())
    }

    pub fn flush_mode(&self) -> FlushMode {
        if self.batch {
            FlushMode::NextFrame
        } else {
            FlushMode::Immediate
        }
    }
}

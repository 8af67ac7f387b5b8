use regex::Regex;

use crate::config::PlateConfig;
use crate::config::PlateFormat;
use crate::error::ConfigError;

/// Whole-string match of recognized text against a plate pattern.
///
/// The text is expected to be normalized already; matching is case sensitive.
#[derive(Debug, Clone)]
pub struct PlateFormatValidator {
    pattern: Regex,
    source: String,
}

impl PlateFormatValidator {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let anchored = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            pattern: anchored,
            source: pattern.to_string(),
        })
    }

    pub fn for_format(format: PlateFormat) -> Result<Self, ConfigError> {
        Self::new(format.pattern())
    }

    pub fn from_config(cfg: &PlateConfig) -> Result<Self, ConfigError> {
        Self::new(cfg.pattern())
    }

    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

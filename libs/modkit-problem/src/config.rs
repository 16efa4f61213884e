//! Configuration for problem construction.
//!
//! Read leniently from the `problem` section of the service configuration: a missing
//! section yields defaults, an invalid one is an error.

use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::catalog::TypeDef;
use crate::context::DEFAULT_TYPE_BASE_URI;

/// Configuration key holding the problem settings.
pub const CONFIG_SECTION: &str = "problem";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid '{section}' config: {source}")]
    InvalidConfig {
        section: String,
        #[source]
        source: Box<figment::Error>,
    },
    #[error("problem type '{title}' declared more than once")]
    DuplicateType { title: String },
    #[error("problem type '{title}' has invalid status {status}")]
    InvalidStatus { title: String, status: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProblemConfig {
    /// Base of derived type URIs (`{base}/{category}/{title}`).
    pub type_base_uri: String,
    /// Service-specific problem types registered alongside the built-in catalog.
    pub types: Vec<TypeDef>,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            type_base_uri: DEFAULT_TYPE_BASE_URI.to_owned(),
            types: Vec::new(),
        }
    }
}

impl ProblemConfig {
    /// Extracts the `problem` section, falling back to defaults when it is absent.
    ///
    /// # Errors
    /// Returns `ConfigError` if the section is present but malformed, or declares
    /// duplicate or out-of-range problem types.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        if !figment.contains(CONFIG_SECTION) {
            tracing::debug!(section = CONFIG_SECTION, "no problem config, using defaults");
            return Ok(Self::default());
        }

        let config: Self =
            figment
                .extract_inner(CONFIG_SECTION)
                .map_err(|e| ConfigError::InvalidConfig {
                    section: CONFIG_SECTION.to_owned(),
                    source: Box::new(e),
                })?;
        config.validate()?;

        tracing::debug!(
            type_base_uri = %config.type_base_uri,
            types = config.types.len(),
            "problem config loaded"
        );
        Ok(config)
    }

    /// # Errors
    /// Returns `ConfigError` on duplicate titles or statuses outside `100..=599`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for def in &self.types {
            if !(100..=599).contains(&def.status) {
                return Err(ConfigError::InvalidStatus {
                    title: def.title.clone(),
                    status: def.status,
                });
            }
            if !seen.insert(def.title.as_str()) {
                return Err(ConfigError::DuplicateType {
                    title: def.title.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use figment::providers::Serialized;
    use serde_json::json;

    #[test]
    fn missing_section_uses_defaults() {
        let figment = Figment::new().merge(Serialized::defaults(json!({
            "server": { "port": 8080 }
        })));
        let config = ProblemConfig::from_figment(&figment).unwrap();
        assert_eq!(config, ProblemConfig::default());
    }

    #[test]
    fn section_overrides_base_and_adds_types() {
        let figment = Figment::new().merge(Serialized::defaults(json!({
            "problem": {
                "type_base_uri": "https://errors.acme.io",
                "types": [
                    { "title": "quota_exceeded", "status": 429, "category": "billing" }
                ]
            }
        })));
        let config = ProblemConfig::from_figment(&figment).unwrap();
        assert_eq!(config.type_base_uri, "https://errors.acme.io");
        assert_eq!(config.types.len(), 1);
        assert_eq!(config.types[0].category.as_deref(), Some("billing"));
    }

    #[test]
    fn malformed_section_is_rejected() {
        let figment = Figment::new().merge(Serialized::defaults(json!({
            "problem": { "types": "not-a-list" }
        })));
        let err = ProblemConfig::from_figment(&figment).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig { .. }));
    }

    #[test]
    fn duplicate_titles_are_rejected() {
        let figment = Figment::new().merge(Serialized::defaults(json!({
            "problem": {
                "types": [
                    { "title": "gone", "status": 410 },
                    { "title": "gone", "status": 404 }
                ]
            }
        })));
        let err = ProblemConfig::from_figment(&figment).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateType { title } if title == "gone"));
    }

    #[test]
    fn out_of_range_status_is_rejected() {
        let config = ProblemConfig {
            types: vec![TypeDef::new("weird", 1000)],
            ..ProblemConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidStatus { status: 1000, .. })
        ));
    }
}

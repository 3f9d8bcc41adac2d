//! Environment configuration
//!
//! The pipeline reads its settings from the environment (a `.env` file is
//! honored in development). The only mandatory pairing is the legacy-path
//! rewrite: `REWRITE_MATCH_PATTERN` and `REWRITE_SUBSTITUTION` must be set
//! together or not at all.

use std::env;

/// Runtime configuration for the translation pipeline.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Regex matched against legacy request paths before tokenizing.
    pub rewrite_match_pattern: Option<String>,
    /// Replacement string applied wherever the pattern matches.
    pub rewrite_substitution: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config = Config {
            rewrite_match_pattern: env::var("REWRITE_MATCH_PATTERN")
                .ok()
                .filter(|s| !s.is_empty()),
            rewrite_substitution: env::var("REWRITE_SUBSTITUTION")
                .ok()
                .filter(|s| !s.is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.rewrite_match_pattern.is_some() != self.rewrite_substitution.is_some() {
            return Err(anyhow::anyhow!(
                "REWRITE_MATCH_PATTERN and REWRITE_SUBSTITUTION must be set together"
            ));
        }
        Ok(())
    }

    /// The rewrite pair when legacy-path rewriting is configured.
    pub fn rewrite_pair(&self) -> Option<(&str, &str)> {
        match (&self.rewrite_match_pattern, &self.rewrite_substitution) {
            (Some(pattern), Some(subst)) => Some((pattern.as_str(), subst.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_half_configured_rewrite() {
        let config = Config {
            rewrite_match_pattern: Some("filters-".to_string()),
            rewrite_substitution: None,
        };
        assert!(config.validate().is_err());

        let config = Config {
            rewrite_match_pattern: Some("filters-".to_string()),
            rewrite_substitution: Some("filters:".to_string()),
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.rewrite_pair(), Some(("filters-", "filters:")));

        assert!(Config::default().validate().is_ok());
        assert_eq!(Config::default().rewrite_pair(), None);
    }
}

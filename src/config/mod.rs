//! Session configuration management for `bindwire.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── rate       # [rate.<driver>]
//! │   ├── serve      # [serve]
//! │   └── session    # [session]
//! ├── error          # ConfigError
//! └── mod.rs         # BindConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section           | Purpose                                       |
//! |-------------------|-----------------------------------------------|
//! | `[session]`       | Echo policy, deferred mode, binding marker    |
//! | `[rate.<driver>]` | Rate policy override for one driver           |
//! | `[serve]`         | WebSocket endpoint (interface, port)          |
//!
//! The file is optional: without it every section takes its defaults.

mod error;
pub mod section;

pub use error::ConfigError;
pub use section::{DEFAULT_PORT, PolicyKind, RateEntry, ServeConfig, SessionSection};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::log;
use crate::session::SessionOptions;

/// Default config file name
pub const CONFIG_FILE: &str = "bindwire.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing bindwire.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Path the config was read from (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Session behavior
    pub session: SessionSection,

    /// Per-driver rate policy overrides, keyed by registry name
    pub rate: BTreeMap<String, RateEntry>,

    /// WebSocket endpoint for `serve`
    pub serve: ServeConfig,
}

impl BindConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file is not an error: defaults are used. Unknown fields are
    /// reported and ignored.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            crate::debug!("config"; "{} not found, using defaults", path.display());
            return Ok(Self {
                config_path: path.to_path_buf(),
                ..Self::default()
            });
        }

        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let (mut config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        config.config_path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {field}");
        }
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.session.marker_is_valid() {
            return Err(ConfigError::Validation(format!(
                "[session] marker `{}` is not a valid attribute name",
                self.session.marker
            )));
        }
        for (driver, entry) in &self.rate {
            entry
                .to_policy()
                .map_err(|reason| ConfigError::Validation(format!("[rate.{driver}] {reason}")))?;
        }
        Ok(())
    }

    /// Session options built from `[session]` and `[rate.*]`.
    pub fn session_options(&self) -> Result<SessionOptions, ConfigError> {
        self.validate()?;
        let mut options = SessionOptions::default()
            .with_echo(self.session.echo)
            .with_defer(self.session.defer);
        options.marker.clone_from(&self.session.marker);
        for (driver, entry) in &self.rate {
            if let Ok(policy) = entry.to_policy() {
                options = options.with_override(driver, policy);
            }
        }
        Ok(options)
    }
}

// ============================================================================
// test helpers
// ============================================================================

/// Parse config, panicking on unknown fields (to catch typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> BindConfig {
    let (parsed, ignored) = BindConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::core::RatePolicy;
    use crate::session::EchoPolicy;

    #[test]
    fn test_from_str_invalid_toml() {
        // Unclosed table header
        let result = BindConfig::from_str("[session\necho = \"mirror\"");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[session]\necho = \"suppress\"\nechoo = 1\n[unknown_section]\nfield = \"value\"";
        let (config, ignored) = BindConfig::parse_with_ignored(content).unwrap();

        assert_eq!(config.session.echo, EchoPolicy::Suppress);
        assert!(ignored.iter().any(|f| f.contains("echoo")));
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }

    #[test]
    fn test_validation_errors() {
        let err = BindConfig::from_str("[rate.text]\npolicy = \"throttle\"").unwrap_err();
        assert!(matches!(&err, ConfigError::Validation(msg) if msg.contains("[rate.text]")));

        let err = BindConfig::from_str("[session]\nmarker = \"data bind\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        assert!(BindConfig::from_str("[rate.text]\npolicy = \"sometimes\"").is_err());
    }

    #[test]
    fn test_session_options() {
        let config = test_parse_config(
            "[session]\necho = \"suppress\"\nmarker = \"data-live\"\n\n[rate.text]\npolicy = \"debounce\"\ndelay = 100",
        );
        let options = config.session_options().unwrap();

        assert_eq!(options.echo, EchoPolicy::Suppress);
        assert!(!options.defer);
        assert_eq!(options.marker, "data-live");
        assert_eq!(options.overrides.get("text"), Some(&RatePolicy::debounce(100)));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let config = BindConfig::load(&path).unwrap();
        assert_eq!(config.config_path, path);
        assert_eq!(config.serve, ServeConfig::default());
        assert!(config.rate.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[serve]\nport = 6000\n[rate.slider]\npolicy = \"throttle\"\ndelay = 50").unwrap();

        let config = BindConfig::load(file.path()).unwrap();
        assert_eq!(config.serve.port, 6000);
        assert_eq!(config.rate["slider"].to_policy(), Ok(RatePolicy::throttle(50)));
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Where and how to reach the booking API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Cookie holding the anti-forgery token
    pub csrf_cookie: String,
    /// Header the token is echoed back in
    pub csrf_header: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 30_000,
            csrf_cookie: "csrftoken".to_string(),
            csrf_header: "X-CSRFToken".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingsConfig {
    pub page_size: u32,
    /// How long an error banner stays visible
    pub error_ttl_ms: u64,
}

impl Default for BookingsConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            error_ttl_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalConfig {
    pub enabled: bool,
    /// Defaults to .dormbook/journal under the working directory
    pub dir: Option<PathBuf>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    pub api: ApiConfig,
    pub bookings: BookingsConfig,
    pub journal: JournalConfig,
}

/// One config file as written on disk; every key is optional so layers can
/// override each other field by field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub bookings: BookingsSection,
    #[serde(default)]
    pub journal: JournalSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSection {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub csrf_cookie: Option<String>,
    pub csrf_header: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingsSection {
    pub page_size: Option<u32>,
    pub error_ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JournalSection {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(file)
    }
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.dormbook/config.local.toml) > project (.dormbook/config.toml) > user (~/.dormbook/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".dormbook").join("config.toml");
            if user_config.exists() {
                config.merge(ConfigFile::load_from(&user_config)?);
            }
        }

        let project_dir = Path::new(".dormbook");
        for name in ["config.toml", "config.local.toml"] {
            let path = project_dir.join(name);
            if path.exists() {
                config.merge(ConfigFile::load_from(&path)?);
            }
        }

        Ok(config)
    }

    /// Load defaults overlaid with a single file
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge(ConfigFile::load_from(path)?);
        Ok(config)
    }

    /// Overlay a file layer; keys present in `other` win
    pub fn merge(&mut self, other: ConfigFile) {
        if let Some(v) = other.api.base_url {
            self.api.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = other.api.timeout_ms {
            self.api.timeout_ms = v;
        }
        if let Some(v) = other.api.csrf_cookie {
            self.api.csrf_cookie = v;
        }
        if let Some(v) = other.api.csrf_header {
            self.api.csrf_header = v;
        }

        if let Some(v) = other.bookings.page_size {
            self.bookings.page_size = v;
        }
        if let Some(v) = other.bookings.error_ttl_ms {
            self.bookings.error_ttl_ms = v;
        }

        if let Some(v) = other.journal.enabled {
            self.journal.enabled = v;
        }
        if other.journal.dir.is_some() {
            self.journal.dir = other.journal.dir;
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let url = &self.api.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "api.base_url".to_string(),
                message: format!("Must start with http:// or https://, got '{}'", url),
            });
        }

        if self.api.timeout_ms == 0 {
            errors.push(ValidationError {
                field: "api.timeout_ms".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        for (field, value) in [
            ("api.csrf_cookie", &self.api.csrf_cookie),
            ("api.csrf_header", &self.api.csrf_header),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: "Must not be empty".to_string(),
                });
            }
        }

        if !(1..=100).contains(&self.bookings.page_size) {
            errors.push(ValidationError {
                field: "bookings.page_size".to_string(),
                message: format!("Must be between 1 and 100, got {}", self.bookings.page_size),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.csrf_cookie, "csrftoken");
        assert_eq!(config.bookings.error_ttl_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
base_url = "https://dorms.example.edu/api/"

[bookings]
page_size = 25
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.api.base_url, "https://dorms.example.edu/api");
        assert_eq!(config.api.timeout_ms, 30_000);
        assert_eq!(config.bookings.page_size, 25);
        assert_eq!(config.bookings.error_ttl_ms, 5_000);
        assert!(config.journal.enabled);
    }

    #[test]
    fn test_merge_later_layer_wins() {
        let mut config = Config::default();
        let project: ConfigFile = toml::from_str(
            r#"
[api]
timeout_ms = 1000
csrf_header = "X-CSRF"
[journal]
enabled = false
"#,
        )
        .unwrap();
        let local: ConfigFile = toml::from_str(
            r#"
[api]
timeout_ms = 2000
[journal]
dir = "/tmp/dormbook"
"#,
        )
        .unwrap();

        config.merge(project);
        config.merge(local);
        assert_eq!(config.api.timeout_ms, 2000);
        assert_eq!(config.api.csrf_header, "X-CSRF");
        assert!(!config.journal.enabled);
        assert_eq!(config.journal.dir, Some(PathBuf::from("/tmp/dormbook")));
    }

    #[test]
    fn test_load_from_reports_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api\nbase_url = ").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.api.base_url = "localhost:8000".to_string();
        config.api.timeout_ms = 0;
        config.api.csrf_cookie = " ".to_string();
        config.bookings.page_size = 0;

        let errors = config.validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "api.base_url",
                "api.timeout_ms",
                "api.csrf_cookie",
                "bookings.page_size"
            ]
        );
        assert!(errors[0].to_string().starts_with("[api.base_url]"));
    }
}

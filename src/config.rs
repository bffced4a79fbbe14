//! Configuration file handling.
//!
//! Settings are read from a YAML file. Every section is optional and falls back to
//! defaults that point at the public CMS and Census endpoints.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::schema::DatasetKind;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Selection rendered by the snapshot driver.
    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// One upstream dataset location.
///
/// `url` may contain `{year}`, `{month}` (zero padded) and `{month_name}` tokens.
/// When `link_pattern` is set, `url` is a listing page and the first `.zip` link whose
/// URL matches the expanded pattern (a regex) is downloaded instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,

    #[serde(default)]
    pub link_pattern: Option<String>,

    /// Regex selecting the archive entry to decode when the payload is a ZIP.
    pub entry_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_enrollment")]
    pub enrollment: EndpointConfig,

    #[serde(default = "default_penetration")]
    pub penetration: EndpointConfig,

    #[serde(default = "default_ratebook")]
    pub ratebook: EndpointConfig,

    #[serde(default = "default_geography")]
    pub geography: EndpointConfig,
}

impl Endpoints {
    pub fn get(&self, kind: DatasetKind) -> &EndpointConfig {
        match kind {
            DatasetKind::Enrollment => &self.enrollment,
            DatasetKind::Penetration => &self.penetration,
            DatasetKind::Ratebook => &self.ratebook,
            DatasetKind::Geography => &self.geography,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            enrollment: default_enrollment(),
            penetration: default_penetration(),
            ratebook: default_ratebook(),
            geography: default_geography(),
        }
    }
}

fn default_enrollment() -> EndpointConfig {
    EndpointConfig {
        url: "https://www.cms.gov/files/zip/monthly-enrollment-cpsc-{month_name}-{year}.zip"
            .to_string(),
        link_pattern: None,
        entry_pattern: r"(?i)enrollment[^/]*\.csv$".to_string(),
    }
}

fn default_penetration() -> EndpointConfig {
    EndpointConfig {
        url: "https://www.cms.gov/files/zip/ma-state-county-penetration-{month_name}-{year}.zip"
            .to_string(),
        link_pattern: None,
        entry_pattern: r"(?i)penetration[^/]*\.csv$".to_string(),
    }
}

fn default_ratebook() -> EndpointConfig {
    EndpointConfig {
        url: "https://www.cms.gov/files/zip/{year}-ratebooks-and-supporting-data.zip".to_string(),
        link_pattern: None,
        entry_pattern: r"(?i)ratebook[^/]*\.csv$".to_string(),
    }
}

fn default_geography() -> EndpointConfig {
    EndpointConfig {
        url: "https://raw.githubusercontent.com/plotly/datasets/master/geojson-counties-fips.json"
            .to_string(),
        link_pattern: None,
        entry_pattern: r"(?i)\.(geo)?json$".to_string(),
    }
}

/// Bounded retry policy for every HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay before the second attempt; doubles on each further attempt.
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Per-attempt request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff to wait after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            initial_backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Months of enrollment shown by the trend chart, ending at the selected month.
    #[serde(default = "default_trend_months")]
    pub trend_months: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            trend_months: default_trend_months(),
        }
    }
}

fn default_trend_months() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_year")]
    pub year: u16,

    #[serde(default = "default_month")]
    pub month: u8,

    /// Two-letter state code, or `All`.
    #[serde(default = "default_state")]
    pub state: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            year: default_year(),
            month: default_month(),
            state: default_state(),
        }
    }
}

fn default_year() -> u16 {
    2023
}

fn default_month() -> u8 {
    1
}

fn default_state() -> String {
    "All".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Also write the enriched enrollment table as Parquet.
    #[serde(default)]
    pub export_parquet: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            export_parquet: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dashboard")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        anyhow::ensure!(config.retry.attempts > 0, "retry.attempts must be at least 1");
        anyhow::ensure!(config.retry.timeout_secs > 0, "retry.timeout_secs must be at least 1");
        Ok(config)
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            r#"
retry:
  attempts: 5
request:
  year: 2022
  state: IL
"#,
        )
        .unwrap();

        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.timeout_secs, 30);
        assert_eq!(config.request.year, 2022);
        assert_eq!(config.request.month, 1);
        assert_eq!(config.request.state, "IL");
        assert!(config.endpoints.ratebook.url.contains("{year}"));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(Config::from_yaml("retry:\n  attempts: 0\n").is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(Config::from_yaml("retry:\n  timeout_secs: 0\n").is_err());
    }

    #[test]
    fn backoff_doubles() {
        let retry = RetryConfig {
            attempts: 3,
            initial_backoff_ms: 100,
            timeout_secs: 1,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(400));
    }
}

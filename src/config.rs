use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use humantime::{format_duration, parse_duration};
use secrecy::SecretString;
use serde::Deserialize;
use serde_with::{DeserializeAs, SerializeAs, serde_as};
use url::Url;

use crate::Result;
use crate::error::ConfigError;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    /// Monitor instance name; namespaces the persisted cache.
    pub name: String,
    pub search_phrases: Vec<String>,
    pub excluded_repos: BTreeSet<String>,
    pub excluded_orgs: BTreeSet<String>,
    pub lookback_hours: u32,
    pub filter_non_english: bool,
    pub token: SecretString,
    pub api_url: Url,
    /// Repository hosting this monitor, excluded from every query.
    pub deployment_repo: Option<String>,
    pub cache_dir: PathBuf,
    pub slack: SlackSettings,
    pub downstream: DownstreamSettings,
    pub http_connect_timeout: Duration,
    pub http_request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SlackSettings {
    pub enabled: bool,
    pub webhook_url: Option<Url>,
    pub username: String,
    pub icon_emoji: String,
    pub channel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DownstreamSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Config {
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileRead {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }
            .into());
        }

        let mut builder = ::config::Config::builder();
        builder = builder.add_source(::config::File::from(path));
        builder = builder.add_source(
            ::config::Environment::with_prefix("ISSUEWATCH")
                .separator("__")
                .try_parsing(true),
        );

        let mut raw: RawConfig = builder
            .build()
            .map_err(|err| ConfigError::Other(err.to_string()))?
            .try_deserialize()
            .map_err(|err| ConfigError::Parse(err.to_string()))?;

        raw.apply_env_overrides()?;
        raw.validate_and_build()
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct RawConfig {
    name: Option<String>,
    #[serde(default)]
    search_phrases: Vec<String>,
    #[serde(default)]
    excluded_repos: Vec<String>,
    #[serde(default)]
    excluded_orgs: Vec<String>,
    #[serde(default = "default_lookback_hours")]
    lookback_hours: u32,
    #[serde(default)]
    filter_non_english: bool,
    #[serde(default)]
    github: RawGithub,
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    notifications: RawNotifications,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct RawGithub {
    token: Option<String>,
    #[serde(default = "default_api_url")]
    api_url: String,
    #[serde(default)]
    deployment_repo: Option<String>,
    #[serde(default)]
    #[serde_as(as = "Option<HumantimeDuration>")]
    request_timeout: Option<Duration>,
    #[serde(default)]
    #[serde_as(as = "Option<HumantimeDuration>")]
    connect_timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct RawCache {
    #[serde(default = "default_cache_dir")]
    dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct RawNotifications {
    #[serde(default)]
    slack: RawSlack,
    #[serde(default)]
    github_issues: RawDownstream,
}

#[derive(Debug, Deserialize)]
struct RawSlack {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    webhook_url: Option<String>,
    #[serde(default = "default_slack_username")]
    username: String,
    #[serde(default = "default_slack_icon")]
    icon_emoji: String,
    #[serde(default)]
    channel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDownstream {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_downstream_path")]
    path: PathBuf,
}

impl Default for RawGithub {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            deployment_repo: None,
            request_timeout: None,
            connect_timeout: None,
        }
    }
}

impl Default for RawCache {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

impl Default for RawSlack {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            username: default_slack_username(),
            icon_emoji: default_slack_icon(),
            channel: None,
        }
    }
}

impl Default for RawDownstream {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_downstream_path(),
        }
    }
}

impl RawConfig {
    fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        if let Some(token) = env_string("GITHUB_TOKEN")? {
            self.github.token = Some(token);
        }
        if let Some(repo) = env_string("GITHUB_REPOSITORY")? {
            self.github.deployment_repo = Some(repo);
        }
        // Explicit webhook configuration wins over the environment default.
        if self.notifications.slack.webhook_url.is_none() {
            self.notifications.slack.webhook_url = env_string("SLACK_WEBHOOK_URL")?;
        }
        Ok(())
    }

    fn validate_and_build(self) -> Result<Config> {
        let name = self.name.ok_or(ConfigError::MissingField { field: "name" })?;
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "name",
                message: "monitor name cannot be empty".to_string(),
            }
            .into());
        }

        if self.search_phrases.is_empty() {
            return Err(ConfigError::MissingField {
                field: "search_phrases",
            }
            .into());
        }
        if self.search_phrases.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidField {
                field: "search_phrases",
                message: "phrases cannot be blank".to_string(),
            }
            .into());
        }

        if self.lookback_hours == 0 {
            return Err(ConfigError::InvalidField {
                field: "lookback_hours",
                message: "lookback must cover at least one hour".to_string(),
            }
            .into());
        }

        let token = self.github.token.ok_or(ConfigError::MissingField {
            field: "github.token",
        })?;
        if token.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "github.token",
                message: "token cannot be empty".to_string(),
            }
            .into());
        }

        let api_url =
            Url::parse(&self.github.api_url).map_err(|err| ConfigError::InvalidField {
                field: "github.api_url",
                message: err.to_string(),
            })?;

        let webhook_url = self
            .notifications
            .slack
            .webhook_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|err| ConfigError::InvalidField {
                field: "notifications.slack.webhook_url",
                message: err.to_string(),
            })?;

        Ok(Config {
            name,
            search_phrases: self.search_phrases,
            excluded_repos: self.excluded_repos.into_iter().collect(),
            excluded_orgs: self.excluded_orgs.into_iter().collect(),
            lookback_hours: self.lookback_hours,
            filter_non_english: self.filter_non_english,
            token: token.into(),
            api_url,
            deployment_repo: self.github.deployment_repo,
            cache_dir: self.cache.dir,
            slack: SlackSettings {
                enabled: self.notifications.slack.enabled,
                webhook_url,
                username: self.notifications.slack.username,
                icon_emoji: self.notifications.slack.icon_emoji,
                channel: self.notifications.slack.channel,
            },
            downstream: DownstreamSettings {
                enabled: self.notifications.github_issues.enabled,
                path: self.notifications.github_issues.path,
            },
            http_connect_timeout: self
                .github
                .connect_timeout
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            http_request_timeout: self.github.request_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
        })
    }
}

struct HumantimeDuration;

impl<'de> DeserializeAs<'de, Duration> for HumantimeDuration {
    fn deserialize_as<D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

impl SerializeAs<Duration> for HumantimeDuration {
    fn serialize_as<S>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format_duration(*value).to_string())
    }
}

fn env_string(key: &'static str) -> std::result::Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(ConfigError::Other(err.to_string())),
    }
}

const fn default_lookback_hours() -> u32 {
    24
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_slack_username() -> String {
    "GitHub Monitor".to_string()
}

fn default_slack_icon() -> String {
    ":mag:".to_string()
}

fn default_downstream_path() -> PathBuf {
    PathBuf::from("new_issues.json")
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{HumantimeDuration, RawConfig};
    use crate::error::{ConfigError, Error};
    use serde::Deserialize;
    use serde_with::serde_as;
    use std::time::Duration;

    fn raw(body: &str) -> RawConfig {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn humantime_duration_parses_strings() {
        #[serde_as]
        #[derive(Deserialize)]
        struct Sample {
            #[serde_as(as = "Option<HumantimeDuration>")]
            duration: Option<Duration>,
        }

        let sample: Sample = serde_json::from_str(r#"{"duration":"5s"}"#).unwrap();
        assert_eq!(sample.duration, Some(Duration::from_secs(5)));
    }

    #[test]
    fn build_fills_defaults() {
        let config = raw(
            r#"{
                "name": "agent-monitor",
                "search_phrases": ["critical bug"],
                "github": { "token": "ghp_x" }
            }"#,
        )
        .validate_and_build()
        .unwrap();

        assert_eq!(config.lookback_hours, 24);
        assert_eq!(config.api_url.as_str(), "https://api.github.com/");
        assert_eq!(config.cache_dir, std::path::PathBuf::from("cache"));
        assert!(config.downstream.enabled);
        assert!(!config.slack.enabled);
        assert_eq!(config.slack.username, "GitHub Monitor");
        assert_eq!(config.http_request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn build_rejects_missing_phrases() {
        let err = raw(r#"{"name":"m","github":{"token":"t"}}"#)
            .validate_and_build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingField {
                field: "search_phrases"
            })
        ));
    }

    #[test]
    fn build_rejects_blank_phrase() {
        let err = raw(r#"{"name":"m","search_phrases":["  "],"github":{"token":"t"}}"#)
            .validate_and_build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidField {
                field: "search_phrases",
                ..
            })
        ));
    }

    #[test]
    fn build_rejects_zero_lookback() {
        let err = raw(
            r#"{"name":"m","search_phrases":["x"],"lookback_hours":0,"github":{"token":"t"}}"#,
        )
        .validate_and_build()
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidField {
                field: "lookback_hours",
                ..
            })
        ));
    }

    #[test]
    fn build_requires_token() {
        let err = raw(r#"{"name":"m","search_phrases":["x"]}"#)
            .validate_and_build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingField {
                field: "github.token"
            })
        ));
    }
}

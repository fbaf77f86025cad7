use chrono::{DateTime, TimeDelta, Utc};

use crate::config::Config;
use crate::error::ConfigError;

/// Builds the search query for one run.
///
/// Phrases are quoted verbatim and OR-joined, pull requests are excluded at
/// the query level, and the creation cutoff is truncated to day granularity,
/// so two runs within the same day produce the same query for a fixed
/// configuration.
pub fn build_query(
    config: &Config,
    now: DateTime<Utc>,
    deployment_repo: Option<&str>,
) -> std::result::Result<String, ConfigError> {
    if config.search_phrases.is_empty() {
        return Err(ConfigError::MissingField {
            field: "search_phrases",
        });
    }

    let phrases = config
        .search_phrases
        .iter()
        .map(|phrase| format!("\"{phrase}\""))
        .collect::<Vec<_>>()
        .join(" OR ");
    let mut query = format!("({phrases}) type:issue");

    let cutoff = now - TimeDelta::hours(i64::from(config.lookback_hours));
    query.push_str(&format!(" created:>={}", cutoff.format("%Y-%m-%d")));

    // The monitor must never react to issues filed against its own
    // hosting repository, e.g. the ones a downstream consumer opens.
    if let Some(repo) = deployment_repo {
        query.push_str(&format!(" -repo:{repo}"));
    }

    for repo in &config.excluded_repos {
        query.push_str(&format!(" -repo:{repo}"));
    }
    for org in &config.excluded_orgs {
        query.push_str(&format!(" -org:{org}"));
    }

    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::build_query;
    use crate::config::{Config, DownstreamSettings, SlackSettings};
    use crate::error::ConfigError;
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;
    use std::time::Duration;
    use url::Url;

    fn config(phrases: &[&str], repos: &[&str], orgs: &[&str]) -> Config {
        Config {
            name: "test".to_string(),
            search_phrases: phrases.iter().map(ToString::to_string).collect(),
            excluded_repos: repos.iter().map(ToString::to_string).collect(),
            excluded_orgs: orgs.iter().map(ToString::to_string).collect(),
            lookback_hours: 24,
            filter_non_english: false,
            token: SecretString::from("token"),
            api_url: Url::parse("https://api.github.com").unwrap(),
            deployment_repo: None,
            cache_dir: "cache".into(),
            slack: SlackSettings {
                enabled: false,
                webhook_url: None,
                username: "GitHub Monitor".to_string(),
                icon_emoji: ":mag:".to_string(),
                channel: None,
            },
            downstream: DownstreamSettings {
                enabled: true,
                path: "new_issues.json".into(),
            },
            http_connect_timeout: Duration::from_secs(5),
            http_request_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn joins_quoted_phrases_with_or() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 15, 30, 0).single().unwrap();
        let query = build_query(&config(&["agent failed", "bot broken"], &[], &[]), now, None).unwrap();
        insta::assert_snapshot!(
            query,
            @r#"("agent failed" OR "bot broken") type:issue created:>=2024-05-01"#
        );
    }

    #[test]
    fn cutoff_has_day_granularity() {
        let cfg = config(&["x"], &[], &[]);
        let morning = Utc.with_ymd_and_hms(2024, 5, 2, 1, 0, 0).single().unwrap();
        let evening = Utc.with_ymd_and_hms(2024, 5, 2, 23, 59, 0).single().unwrap();
        assert_eq!(
            build_query(&cfg, morning, None).unwrap(),
            build_query(&cfg, evening, None).unwrap()
        );
    }

    #[test]
    fn appends_exclusions_and_deployment_repo() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).single().unwrap();
        let query = build_query(
            &config(&["x"], &["spam/repo"], &["badorg"]),
            now,
            Some("me/monitor"),
        )
        .unwrap();
        assert_eq!(
            query,
            "(\"x\") type:issue created:>=2024-05-01 -repo:me/monitor -repo:spam/repo -org:badorg"
        );
    }

    #[test]
    fn rejects_empty_phrase_list() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).single().unwrap();
        let err = build_query(&config(&[], &[], &[]), now, None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                field: "search_phrases"
            }
        ));
    }
}

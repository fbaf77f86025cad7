use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::Result;
use crate::config::Config;
use crate::error::NotifyError;
use crate::types::Issue;

/// Slack renders at most this many issues individually; the rest collapse
/// into a trailing "and N more" line to stay under block limits.
pub const SLACK_MAX_ITEMS: usize = 10;

/// Hands a filtered batch to every enabled sink.
pub struct Dispatcher {
    http: reqwest::Client,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("issuewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| NotifyError::Client { source: err })?;
        Ok(Self { http })
    }

    /// Fans the batch out to the Slack webhook and the downstream issue
    /// file. A sink failure is logged and absorbed: one sink cannot take
    /// down the other, and neither can fail the run. An empty batch touches
    /// no sink at all.
    pub async fn dispatch(&self, issues: &[Issue], config: &Config) {
        if issues.is_empty() {
            return;
        }

        if let Err(err) = self.send_slack(issues, config).await {
            error!(error = %err, "failed to send Slack notification");
        }

        if config.downstream.enabled {
            match write_downstream(issues, &config.downstream.path) {
                Ok(()) => info!(
                    count = issues.len(),
                    path = %config.downstream.path.display(),
                    "wrote downstream issue file"
                ),
                Err(err) => error!(error = %err, "failed to write downstream issue file"),
            }
        }
    }

    async fn send_slack(
        &self,
        issues: &[Issue],
        config: &Config,
    ) -> std::result::Result<(), NotifyError> {
        if !config.slack.enabled {
            return Ok(());
        }
        let Some(webhook) = config.slack.webhook_url.as_ref() else {
            warn!("Slack notifications enabled but no webhook URL configured");
            return Ok(());
        };

        let payload = slack_payload(issues, config);
        let response = self
            .http
            .post(webhook.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|source| NotifyError::Delivery { source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::HttpStatus { status });
        }
        info!(count = issues.len(), "Slack notification sent");
        Ok(())
    }
}

/// Builds the Block Kit message: header with the count, a summary naming
/// the matched phrases, a divider, one section per issue up to
/// [`SLACK_MAX_ITEMS`], and an overflow line beyond that.
pub fn slack_payload(issues: &[Issue], config: &Config) -> Value {
    let count = issues.len();
    let plural = if count == 1 { "" } else { "s" };
    let phrases = config
        .search_phrases
        .iter()
        .map(|phrase| format!("\"{phrase}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("🔍 {count} new GitHub issue{plural} found!"),
            },
        }),
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("Found *{count}* new GitHub issue{plural} matching {phrases}"),
            },
        }),
        json!({ "type": "divider" }),
    ];

    for issue in issues.iter().take(SLACK_MAX_ITEMS) {
        let meta = format!(
            "📁 <https://github.com/{repo}|{repo}> | 👤 <https://github.com/{user}|@{user}> | 📅 {when}",
            repo = issue.repository,
            user = issue.user,
            when = fmt_created(issue.created_at),
        );
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*<{}|{}>*\n{meta}", issue.html_url, issue.title),
            },
            "accessory": {
                "type": "button",
                "text": { "type": "plain_text", "text": "View Issue" },
                "url": issue.html_url,
                "action_id": format!("view_issue_{}", issue.id),
            },
        }));
    }

    if count > SLACK_MAX_ITEMS {
        let more = count - SLACK_MAX_ITEMS;
        let more_plural = if more == 1 { "" } else { "s" };
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("_... and {more} more issue{more_plural}_"),
            },
        }));
    }

    let mut payload = json!({
        "username": config.slack.username,
        "icon_emoji": config.slack.icon_emoji,
        "blocks": blocks,
    });
    if let Some(channel) = &config.slack.channel {
        payload["channel"] = json!(channel);
    }
    payload
}

/// Minute precision, always UTC; seconds add nothing in a chat message.
fn fmt_created(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Writes the full batch for a separate process to consume. Never called
/// with an empty batch; an empty file would look like work to downstream
/// automation.
fn write_downstream(issues: &[Issue], path: &Path) -> std::result::Result<(), NotifyError> {
    let body = serde_json::to_vec_pretty(issues).map_err(NotifyError::Serialize)?;
    fs::write(path, body).map_err(|source| NotifyError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{SLACK_MAX_ITEMS, slack_payload};
    use crate::config::{Config, DownstreamSettings, SlackSettings};
    use crate::types::Issue;
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;
    use std::time::Duration;
    use url::Url;

    fn config(channel: Option<&str>) -> Config {
        Config {
            name: "test".to_string(),
            search_phrases: vec!["critical bug".to_string(), "agent broken".to_string()],
            excluded_repos: Default::default(),
            excluded_orgs: Default::default(),
            lookback_hours: 24,
            filter_non_english: false,
            token: SecretString::from("token"),
            api_url: Url::parse("https://api.github.com").unwrap(),
            deployment_repo: None,
            cache_dir: "cache".into(),
            slack: SlackSettings {
                enabled: true,
                webhook_url: Some(Url::parse("https://hooks.slack.example/T/B/x").unwrap()),
                username: "GitHub Monitor".to_string(),
                icon_emoji: ":mag:".to_string(),
                channel: channel.map(ToString::to_string),
            },
            downstream: DownstreamSettings {
                enabled: true,
                path: "new_issues.json".into(),
            },
            http_connect_timeout: Duration::from_secs(5),
            http_request_timeout: Duration::from_secs(10),
        }
    }

    fn issues(n: u64) -> Vec<Issue> {
        (1..=n)
            .map(|id| Issue {
                id,
                title: format!("issue {id}"),
                html_url: format!("https://github.com/ok/repo/issues/{id}"),
                repository: "ok/repo".to_string(),
                user: "reporter".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).single().unwrap(),
                body: String::new(),
            })
            .collect()
    }

    #[test]
    fn payload_lists_each_issue_with_metadata() {
        let payload = slack_payload(&issues(2), &config(None));
        let blocks = payload["blocks"].as_array().unwrap();
        // header + summary + divider + one section per issue
        assert_eq!(blocks.len(), 5);
        assert_eq!(
            blocks[0]["text"]["text"],
            "🔍 2 new GitHub issues found!"
        );
        assert_eq!(
            blocks[1]["text"]["text"],
            "Found *2* new GitHub issues matching \"critical bug\", \"agent broken\""
        );
        let first = blocks[3]["text"]["text"].as_str().unwrap();
        assert!(first.contains("<https://github.com/ok/repo/issues/1|issue 1>"));
        assert!(first.contains("2024-05-01 09:30 UTC"));
        assert_eq!(blocks[3]["accessory"]["action_id"], "view_issue_1");
        assert!(payload.get("channel").is_none());
    }

    #[test]
    fn payload_collapses_overflow_beyond_ten() {
        let payload = slack_payload(&issues(12), &config(None));
        let blocks = payload["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 3 + SLACK_MAX_ITEMS + 1);
        assert_eq!(
            blocks.last().unwrap()["text"]["text"],
            "_... and 2 more issues_"
        );
    }

    #[test]
    fn payload_singular_forms() {
        let payload = slack_payload(&issues(1), &config(None));
        let blocks = payload["blocks"].as_array().unwrap();
        assert_eq!(blocks[0]["text"]["text"], "🔍 1 new GitHub issue found!");
    }

    #[test]
    fn payload_carries_channel_override() {
        let payload = slack_payload(&issues(1), &config(Some("#alerts")));
        assert_eq!(payload["channel"], "#alerts");
    }
}

use chrono::{DateTime, Utc};
use tracing::info;

use crate::Result;
use crate::cache::CacheStore;
use crate::config::Config;
use crate::filter::filter_new;
use crate::github_client::GitHubClient;
use crate::notify::Dispatcher;
use crate::query::build_query;

/// Outcome of one monitoring cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunReport {
    /// Raw records returned by the search.
    pub fetched: usize,
    /// Issues that survived filtering and were handed to the sinks.
    pub dispatched: usize,
}

/// Runs one monitoring cycle: load the cache snapshot, build the query,
/// search, filter, dispatch, persist the updated cache.
///
/// Search and cache-save failures abort the cycle; filtering and
/// dispatching absorb their own faults and never do. A cycle where nothing
/// survives filtering leaves the persisted cache untouched, as does a dry
/// run.
pub async fn run_once(
    client: &GitHubClient,
    dispatcher: &Dispatcher,
    store: &CacheStore,
    config: &Config,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<RunReport> {
    let cache = store.load(&config.name);
    let query = build_query(config, now, config.deployment_repo.as_deref())?;
    info!(monitor = %config.name, query = %query, "searching for matching issues");

    let raw = client.search_issues(&query).await?;
    let fetched = raw.len();

    let fresh = filter_new(raw, &cache, config);
    info!(fetched, new = fresh.len(), "filtered search results");

    if fresh.is_empty() {
        return Ok(RunReport {
            fetched,
            dispatched: 0,
        });
    }

    if dry_run {
        for issue in &fresh {
            info!(
                issue_id = issue.id,
                repository = %issue.repository,
                title = %issue.title,
                "dry-run: would notify"
            );
        }
        return Ok(RunReport {
            fetched,
            dispatched: 0,
        });
    }

    dispatcher.dispatch(&fresh, config).await;

    let mut cache = cache;
    cache.record(fresh.iter().map(|issue| issue.id));
    store.save(&config.name, &cache)?;

    Ok(RunReport {
        fetched,
        dispatched: fresh.len(),
    })
}

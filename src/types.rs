use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single issue as it crosses from the search API into the pipeline.
///
/// Built once at the client boundary and immutable afterwards. The serialized
/// form is also the record format of the downstream issue file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Issue {
    pub id: u64,
    pub title: String,
    pub html_url: String,
    /// Full repository name, `owner/name`.
    pub repository: String,
    /// Author handle.
    pub user: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub body: String,
}

impl Issue {
    /// Organization part of `repository` (everything before the first `/`).
    pub fn org(&self) -> &str {
        match self.repository.split_once('/') {
            Some((org, _)) => org,
            None => &self.repository,
        }
    }
}

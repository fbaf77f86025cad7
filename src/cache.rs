use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;
use crate::error::CacheError;

/// Upper bound on remembered issue IDs; the oldest entries fall off first.
///
/// An evicted ID that resurfaces inside the search window is
/// indistinguishable from a new issue and gets re-notified once. Bounded
/// memory is the accepted tradeoff.
pub const NOTIFIED_CAP: usize = 1000;

/// The sole state carried across runs: IDs already notified, oldest first.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NotifiedCache {
    pub notified_issues: Vec<u64>,
}

impl NotifiedCache {
    pub fn contains(&self, id: u64) -> bool {
        self.notified_issues.contains(&id)
    }

    /// Appends newly notified IDs and truncates from the front once the
    /// cap is exceeded.
    pub fn record<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = u64>,
    {
        self.notified_issues.extend(ids);
        if self.notified_issues.len() > NOTIFIED_CAP {
            let excess = self.notified_issues.len() - NOTIFIED_CAP;
            self.notified_issues.drain(..excess);
        }
    }
}

/// Durable storage for [`NotifiedCache`], one JSON file per monitor name.
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}-cache.json"))
    }

    /// Loads the cache for `name`. Absence and corruption both yield an
    /// empty cache: a run must never fail because its history is missing,
    /// only re-notify at most once.
    pub fn load(&self, name: &str) -> NotifiedCache {
        let path = self.path_for(name);
        match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(cache) => cache,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding unparseable cache");
                    NotifiedCache::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => NotifiedCache::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not read cache");
                NotifiedCache::default()
            }
        }
    }

    /// Persists the cache for `name`, creating the storage directory first.
    /// Unlike [`CacheStore::load`], failures here are fatal to the caller:
    /// silently losing the notified window would re-notify everything on
    /// every subsequent run.
    pub fn save(&self, name: &str, cache: &NotifiedCache) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(name);
        let body = serde_json::to_vec_pretty(cache).map_err(CacheError::Serialize)?;
        fs::write(&path, body).map_err(|source| CacheError::Write { path, source })?;
        Ok(())
    }
}

use tracing::debug;
use whatlang::Lang;

use crate::cache::NotifiedCache;
use crate::config::Config;
use crate::types::Issue;

/// Longest body prefix fed to language detection. Keeps trailing URL dumps
/// and pasted logs from drowning out the prose that matters.
const BODY_SAMPLE_CHARS: usize = 500;
/// Combined texts shorter than this carry too little signal to classify.
const MIN_DETECT_CHARS: usize = 20;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    Keep,
    Drop(DropReason),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DropReason {
    AlreadyNotified,
    ExcludedRepo,
    ExcludedOrg,
    NonEnglish(Lang),
}

/// Decides the fate of a single issue.
///
/// Checks run in a fixed order and short-circuit: dedup against the cache,
/// then the exclusion lists (repo before org), then language. The exclusion
/// lists are checked here even though the query already carries `-repo:` and
/// `-org:` clauses; the search backend is not trusted to honor them.
pub fn classify(issue: &Issue, cache: &NotifiedCache, config: &Config) -> Verdict {
    if cache.contains(issue.id) {
        return Verdict::Drop(DropReason::AlreadyNotified);
    }
    if config.excluded_repos.contains(&issue.repository) {
        return Verdict::Drop(DropReason::ExcludedRepo);
    }
    if config.excluded_orgs.contains(issue.org()) {
        return Verdict::Drop(DropReason::ExcludedOrg);
    }
    if config.filter_non_english {
        if let Some(lang) = detected_non_english(issue) {
            return Verdict::Drop(DropReason::NonEnglish(lang));
        }
    }
    Verdict::Keep
}

/// Applies [`classify`] to a whole batch, preserving input order.
pub fn filter_new(issues: Vec<Issue>, cache: &NotifiedCache, config: &Config) -> Vec<Issue> {
    issues
        .into_iter()
        .filter(|issue| match classify(issue, cache, config) {
            Verdict::Keep => true,
            Verdict::Drop(reason) => {
                debug!(
                    issue_id = issue.id,
                    repository = %issue.repository,
                    ?reason,
                    "dropping issue"
                );
                false
            }
        })
        .collect()
}

/// Returns the detected language when the text is confidently not English.
///
/// Everything ambiguous keeps the issue: text under [`MIN_DETECT_CHARS`],
/// or detection declining to classify. A dropped real issue costs more than
/// a stray notification.
fn detected_non_english(issue: &Issue) -> Option<Lang> {
    let sample: String = issue.body.chars().take(BODY_SAMPLE_CHARS).collect();
    let text = format!("{} {sample}", issue.title);
    if text.trim().chars().count() < MIN_DETECT_CHARS {
        return None;
    }

    match whatlang::detect(&text) {
        Some(info) if info.lang() != Lang::Eng => Some(info.lang()),
        Some(_) => None,
        None => {
            debug!(issue_id = issue.id, "language detection inconclusive, keeping issue");
            None
        }
    }
}

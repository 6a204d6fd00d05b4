//! Immutable view of the interaction cache
//!
//! The actor builds a new snapshot for every committed mutation; readers
//! hold an `Arc` to whichever one was last published.

use std::collections::HashSet;

use crate::domain::JobOutcome;

/// What a mark records for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkAs {
    Applied,
    Rejected,
}

/// One consistent classification of job ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionSnapshot {
    applied: HashSet<String>,
    rejected: HashSet<String>,
    reconsidered: HashSet<String>,
    processed: HashSet<String>,
    session_seen: HashSet<String>,
    reconsideration_mode: bool,
    version: u64,
}

impl InteractionSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_applied(&self, job_id: &str) -> bool {
        self.applied.contains(job_id)
    }

    pub fn is_rejected(&self, job_id: &str) -> bool {
        self.rejected.contains(job_id)
    }

    /// Applied or rejected
    pub fn is_processed(&self, job_id: &str) -> bool {
        self.processed.contains(job_id)
    }

    pub fn is_reconsidered(&self, job_id: &str) -> bool {
        self.reconsidered.contains(job_id)
    }

    pub fn is_reconsideration_mode(&self) -> bool {
        self.reconsideration_mode
    }

    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn reconsidered_ids(&self) -> &HashSet<String> {
        &self.reconsidered
    }

    pub fn outcome(&self, job_id: &str) -> JobOutcome {
        if self.is_applied(job_id) {
            JobOutcome::Applied
        } else if self.is_rejected(job_id) && self.is_reconsidered(job_id) {
            JobOutcome::Reconsidered
        } else if self.is_rejected(job_id) {
            JobOutcome::Rejected
        } else {
            JobOutcome::None
        }
    }

    fn is_eligible(&self, job_id: &str) -> bool {
        self.rejected.contains(job_id) && !self.reconsidered.contains(job_id)
    }

    /// Rejected jobs never yet offered for reconsideration, sorted
    pub fn eligible_for_reconsideration(&self) -> Vec<String> {
        let mut eligible: Vec<String> = self.rejected.difference(&self.reconsidered).cloned().collect();
        eligible.sort();
        eligible
    }

    /// Whether the feed should show this job now.
    ///
    /// Normal mode hides every processed job. Reconsideration mode shows
    /// unprocessed and eligible jobs until they are acted on again.
    pub fn is_visible(&self, job_id: &str) -> bool {
        if self.session_seen.contains(job_id) {
            return false;
        }
        if self.reconsideration_mode {
            !self.processed.contains(job_id) || self.is_eligible(job_id)
        } else {
            !self.processed.contains(job_id)
        }
    }

    /// Keep the visible jobs of a candidate feed, in order, without duplicates
    pub fn filter_feed<I, S>(&self, job_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        job_ids
            .into_iter()
            .filter_map(|id| {
                let id = id.as_ref();
                (self.is_visible(id) && seen.insert(id.to_string())).then(|| id.to_string())
            })
            .collect()
    }

    pub(super) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub(super) fn mark(&mut self, job_id: &str, mark: MarkAs) {
        let (into, from) = match mark {
            MarkAs::Applied => (&mut self.applied, &mut self.rejected),
            MarkAs::Rejected => (&mut self.rejected, &mut self.applied),
        };
        from.remove(job_id);
        into.insert(job_id.to_string());
        self.processed.insert(job_id.to_string());
        self.session_seen.insert(job_id.to_string());
    }

    /// Returns how many ids were new
    pub(super) fn mark_reconsidered<'a>(&mut self, job_ids: impl IntoIterator<Item = &'a String>) -> usize {
        job_ids
            .into_iter()
            .filter(|id| self.reconsidered.insert((*id).clone()))
            .count()
    }

    pub(super) fn set_reconsideration_mode(&mut self, enabled: bool) {
        self.reconsideration_mode = enabled;
        if enabled {
            self.session_seen.clear();
        } else {
            self.session_seen = self.processed.clone();
        }
    }

    /// Replace applied and rejected wholesale; reconsidered only grows
    pub(super) fn bulk_load(
        &mut self,
        applied: HashSet<String>,
        rejected: HashSet<String>,
        reconsidered: HashSet<String>,
    ) {
        self.rejected = rejected.difference(&applied).cloned().collect();
        self.applied = applied;
        self.reconsidered.extend(reconsidered);
        self.processed = self.applied.union(&self.rejected).cloned().collect();
        if !self.reconsideration_mode {
            self.session_seen = self.processed.clone();
        }
    }

    pub(super) fn reset(&mut self) {
        let version = self.version;
        *self = Self::default();
        self.version = version;
    }
}

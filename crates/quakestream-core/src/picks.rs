//! Per-station pick registry with republish supersession.
//!
//! The upstream picker republishes one detection every second for several
//! seconds with an increasing counter, and may change the pick id while
//! doing so. Identity is therefore `(channel, time)` within a small
//! tolerance, and a republish only replaces the retained pick when its
//! counter is strictly higher.

use quakestream_types::Pick;

/// What an upsert did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No matching pick existed; the pick was added.
    Inserted,
    /// A matching pick with a lower counter was replaced.
    Superseded,
    /// A matching pick with an equal or higher counter was kept.
    Ignored,
}

/// Picks for one station, sorted by time ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct PickRegistry {
    picks: Vec<Pick>,
    match_epsilon_ms: i64,
}

impl PickRegistry {
    /// Create an empty registry matching picks closer than
    /// `match_epsilon_ms`.
    pub const fn new(match_epsilon_ms: i64) -> Self {
        Self {
            picks: Vec::new(),
            match_epsilon_ms,
        }
    }

    /// Insert a pick, or supersede the matching one if `pick` is newer.
    pub fn upsert(&mut self, pick: Pick) -> UpsertOutcome {
        let Some(index) = self.find_match(&pick) else {
            let at = self.insertion_point(pick.time);
            self.picks.insert(at, pick);
            return UpsertOutcome::Inserted;
        };

        let newer = self
            .picks
            .get(index)
            .is_some_and(|existing| pick.update_seq > existing.update_seq);
        if !newer {
            return UpsertOutcome::Ignored;
        }

        self.picks.remove(index);
        let kept = self.absorb_neighbours(pick);
        let at = self.insertion_point(kept.time);
        self.picks.insert(at, kept);
        UpsertOutcome::Superseded
    }

    /// Remove every same-channel pick within the tolerance of `pick` and
    /// return whichever of them has the highest counter.
    ///
    /// A superseding pick may move next to another retained pick; the pair
    /// collapses to one so each `(channel, time)` bucket holds a single pick.
    fn absorb_neighbours(&mut self, mut pick: Pick) -> Pick {
        while let Some(index) = self.find_match(&pick) {
            let neighbour = self.picks.remove(index);
            if neighbour.update_seq > pick.update_seq {
                pick = neighbour;
            }
        }
        pick
    }

    /// Drop every pick with `time < cutoff`. Returns how many were removed.
    pub fn evict(&mut self, cutoff: i64) -> usize {
        let expired = self.picks.partition_point(|p| p.time < cutoff);
        self.picks.drain(..expired);
        expired
    }

    /// Index of the closest pick on the same channel within the tolerance.
    fn find_match(&self, pick: &Pick) -> Option<usize> {
        let low = pick.time.saturating_sub(self.match_epsilon_ms);
        let high = pick.time.saturating_add(self.match_epsilon_ms);
        let first = self.picks.partition_point(|p| p.time <= low);

        self.picks
            .iter()
            .enumerate()
            .skip(first)
            .take_while(|(_, p)| p.time < high)
            .filter(|(_, p)| p.channel == pick.channel)
            .min_by_key(|(_, p)| p.time.abs_diff(pick.time))
            .map(|(index, _)| index)
    }

    /// Position after every pick at or before `time`.
    fn insertion_point(&self, time: i64) -> usize {
        self.picks.partition_point(|p| p.time <= time)
    }

    /// Retained picks, sorted by time.
    pub fn as_slice(&self) -> &[Pick] {
        &self.picks
    }

    /// Number of retained picks.
    pub fn len(&self) -> usize {
        self.picks.len()
    }

    /// Whether no picks are retained.
    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use rustc_hash::{FxHashMap, FxHashSet};

/// Generational reference-count diffing. Callers increment the count of each
/// ID in use while recording a generation, then commit, obtaining the set of
/// IDs that became referenced ("added") or fully unreferenced ("removed")
/// relative to the previous generation.
///
/// An ID appears in `removed` only if its count reached zero in the
/// just-committed generation.
#[derive(Default)]
pub struct ReferenceTracker {
    /// Counts for the generation currently being recorded.
    current: FxHashMap<u32, usize>,
    /// IDs that were referenced when the previous generation committed.
    previous: FxHashSet<u32>,
}

impl ReferenceTracker {
    pub fn new() -> ReferenceTracker {
        ReferenceTracker::default()
    }

    pub fn increment_ref_count(&mut self, id: u32) {
        *self.current.entry(id).or_insert(0) += 1;
    }

    /// Whether `id` has been referenced in the generation being recorded.
    pub fn is_referenced(&self, id: u32) -> bool {
        self.current.contains_key(&id)
    }

    /// Commits the recorded generation. `added` and `removed` must be empty
    /// on entry; on return they hold the (sorted) set difference against the
    /// previous generation, and the tracker is ready to record the next one.
    pub fn commit_ref_counts(&mut self, added: &mut Vec<u32>, removed: &mut Vec<u32>) {
        assert!(added.is_empty(), "commit_ref_counts with non-empty added");
        assert!(removed.is_empty(), "commit_ref_counts with non-empty removed");
        for id in self.current.keys() {
            if !self.previous.contains(id) {
                added.push(*id);
            }
        }
        for id in &self.previous {
            if !self.current.contains_key(id) {
                removed.push(*id);
            }
        }
        added.sort_unstable();
        removed.sort_unstable();
        self.previous = self.current.keys().copied().collect();
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ReferenceTracker;

    fn commit(tracker: &mut ReferenceTracker) -> (Vec<u32>, Vec<u32>) {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        tracker.commit_ref_counts(&mut added, &mut removed);
        (added, removed)
    }

    #[test]
    fn added_and_removed_across_generations() {
        let mut tracker = ReferenceTracker::new();
        tracker.increment_ref_count(1);
        tracker.increment_ref_count(2);
        let (added, removed) = commit(&mut tracker);
        assert_eq!(added, vec![1, 2]);
        assert!(removed.is_empty());

        tracker.increment_ref_count(2);
        tracker.increment_ref_count(3);
        let (added, removed) = commit(&mut tracker);
        assert_eq!(added, vec![3]);
        assert_eq!(removed, vec![1]);
    }

    #[test]
    fn multiple_increments_count_once() {
        let mut tracker = ReferenceTracker::new();
        tracker.increment_ref_count(7);
        tracker.increment_ref_count(7);
        tracker.increment_ref_count(7);
        let (added, removed) = commit(&mut tracker);
        assert_eq!(added, vec![7]);
        assert!(removed.is_empty());

        // Still referenced once is enough to stay alive.
        tracker.increment_ref_count(7);
        let (added, removed) = commit(&mut tracker);
        assert!(added.is_empty());
        assert!(removed.is_empty());

        let (added, removed) = commit(&mut tracker);
        assert!(added.is_empty());
        assert_eq!(removed, vec![7]);
    }

    #[test]
    #[should_panic(expected = "non-empty added")]
    fn commit_rejects_dirty_output_parameters() {
        let mut tracker = ReferenceTracker::new();
        let mut added = vec![9];
        let mut removed = Vec::new();
        tracker.commit_ref_counts(&mut added, &mut removed);
    }
}

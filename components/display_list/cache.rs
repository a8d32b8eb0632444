/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use bulk_buffer::{BulkBuffer, BulkBufferWriter};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::picture::PictureCache;
use crate::reference_tracker::ReferenceTracker;
use crate::DisplayItemList;

/// One serialized display list staged for transport: the list's unique ID
/// and the bulk buffer holding its bytes. Lives for one cache-update cycle.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DisplayItemListData {
    pub unique_id: u32,
    pub buffer: BulkBuffer,
}

/// Engine-side display list cache. Tracks which lists each commit references
/// and serializes a list at most once per generation, so repeated commits
/// referencing an unchanged list cost O(1) bookkeeping instead of another
/// serialization and transmission.
pub struct DisplayItemListCache {
    tracker: ReferenceTracker,
    /// Payloads serialized this generation, keyed by unique ID. Cleared on
    /// every flush.
    staged: FxHashMap<u32, DisplayItemListData>,
    pictures: PictureCache,
}

impl DisplayItemListCache {
    pub fn new() -> DisplayItemListCache {
        DisplayItemListCache {
            tracker: ReferenceTracker::new(),
            staged: FxHashMap::default(),
            pictures: PictureCache::new(),
        }
    }

    /// Records that the commit being prepared references `list`. The first
    /// call per unique ID in a generation serializes the list through
    /// `writer`; later calls (the list may be referenced by several layers)
    /// only bump the reference count.
    pub fn mark_used(&mut self, list: &DisplayItemList, writer: &mut BulkBufferWriter) {
        self.tracker.increment_ref_count(list.unique_id);
        if self.staged.contains_key(&list.unique_id) {
            return;
        }
        if let Some(buffer) = codec::serialize_into(list, writer, &mut self.pictures) {
            self.staged.insert(
                list.unique_id,
                DisplayItemListData {
                    unique_id: list.unique_id,
                    buffer,
                },
            );
        }
    }

    /// Commits the generation and returns the outgoing update: the staged
    /// payload of every ID the client does not have yet. Nothing is ever
    /// sent without having been marked used first.
    pub fn calculate_cache_update_and_flush(&mut self) -> Vec<DisplayItemListData> {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        self.tracker.commit_ref_counts(&mut added, &mut removed);
        let update = added
            .iter()
            .map(|id| {
                self.staged
                    .remove(id)
                    .expect("added display list was never staged")
            })
            .collect();
        self.staged.clear();
        update
    }
}

impl Default for DisplayItemListCache {
    fn default() -> DisplayItemListCache {
        DisplayItemListCache::new()
    }
}

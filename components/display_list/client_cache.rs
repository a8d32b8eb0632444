/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::mem;
use std::sync::Arc;

use bulk_buffer::BulkBufferReader;
use log::warn;
use rustc_hash::FxHashMap;

use crate::cache::DisplayItemListData;
use crate::codec;
use crate::picture::ClientPictureCache;
use crate::reference_tracker::ReferenceTracker;
use crate::DisplayItemList;

/// Client-side display list cache: holds the deserialized list for every ID
/// some not-yet-superseded commit references, and evicts lists once a
/// generation stops referencing them.
pub struct DisplayItemListClientCache {
    tracker: ReferenceTracker,
    lists: FxHashMap<u32, Arc<DisplayItemList>>,
    pictures: ClientPictureCache,
    /// IDs applied since the last flush, verified against the tracker's
    /// added set in debug builds.
    applied_since_flush: Vec<u32>,
}

impl DisplayItemListClientCache {
    pub fn new() -> DisplayItemListClientCache {
        DisplayItemListClientCache {
            tracker: ReferenceTracker::new(),
            lists: FxHashMap::default(),
            pictures: ClientPictureCache::new(),
            applied_since_flush: Vec::new(),
        }
    }

    /// Deserializes and inserts each payload of `update`. Receiving an ID
    /// that is already cached is a protocol violation: the engine only ships
    /// lists this cache has never seen.
    pub fn apply_cache_update(
        &mut self,
        update: &[DisplayItemListData],
        reader: &BulkBufferReader,
    ) {
        for data in update {
            assert!(
                !self.lists.contains_key(&data.unique_id),
                "duplicate display list {} in cache update",
                data.unique_id
            );
            let stream = reader.make_view(&data.buffer);
            let list = codec::create_from_stream(&mut stream.into_reader(), &mut self.pictures)
                .expect("malformed display list payload");
            debug_assert_eq!(list.unique_id, data.unique_id);
            self.applied_since_flush.push(data.unique_id);
            self.lists.insert(data.unique_id, Arc::new(list));
        }
    }

    /// Records that the commit being applied references the already-cached
    /// list `id`; called for every referenced list, newly applied or not.
    pub fn mark_used(&mut self, id: u32) {
        self.tracker.increment_ref_count(id);
    }

    /// Commits the generation and evicts every list it stopped referencing.
    pub fn flush(&mut self) {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        self.tracker.commit_ref_counts(&mut added, &mut removed);
        let mut applied = mem::take(&mut self.applied_since_flush);
        applied.sort_unstable();
        debug_assert_eq!(added, applied, "cache update out of step with marked IDs");
        for id in &removed {
            if self.lists.remove(id).is_none() {
                warn!("Evicting display list {id} that was never cached.");
            }
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.lists.contains_key(&id)
    }

    /// The cached list for `id`. Asking for an ID that is not cached is a
    /// caller error.
    pub fn get_display_item_list(&self, id: u32) -> Arc<DisplayItemList> {
        self.lists
            .get(&id)
            .cloned()
            .expect("display list missing from client cache")
    }
}

impl Default for DisplayItemListClientCache {
    fn default() -> DisplayItemListClientCache {
        DisplayItemListClientCache::new()
    }
}

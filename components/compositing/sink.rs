/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::mem;
use std::sync::Arc;

use base::Epoch;
use base::id::{FrameSinkId, SurfaceId};
use bulk_buffer::{BackingId, BulkBufferBackingHandle, BulkBufferReader, BulkBufferWriter};
use compositing_traits::ContentFrame;
use display_list::{
    DisplayItemList, DisplayItemListCache, DisplayItemListClientCache, DisplayItemListData,
};
use log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use surfaces::SurfaceManager;

/// Everything one commit sends across the process boundary, besides the
/// layer mutations themselves (which travel on the message pipe).
#[derive(Deserialize, Serialize)]
pub struct CommitMessage {
    pub frame_sink_id: FrameSinkId,
    /// An epoch used to key the commit's payloads with the frame the layer
    /// mutations arrive on, since the two travel on different channels.
    pub epoch: Epoch,
    /// Serialized display lists the consumer has never seen.
    pub cache_update: Vec<DisplayItemListData>,
    /// Every backing written since the previous commit.
    pub backings: Vec<BackingId>,
    /// Handles the consumer must map before touching any payload.
    pub new_handles: Vec<BulkBufferBackingHandle>,
    /// Backings the producer trimmed; the consumer drops its mappings.
    pub deleted_backings: Vec<BackingId>,
}

/// Producer half of a content frame sink: serializes the display lists a
/// frame references (deltas only, through the engine cache) and packages the
/// bulk-buffer bookkeeping for one commit.
pub struct ContentFrameSink {
    frame_sink_id: FrameSinkId,
    epoch: Epoch,
    writer: BulkBufferWriter,
    cache: DisplayItemListCache,
    trimmed_backings: Vec<BackingId>,
}

impl ContentFrameSink {
    pub fn new(frame_sink_id: FrameSinkId) -> ContentFrameSink {
        ContentFrameSink::with_writer(frame_sink_id, BulkBufferWriter::with_default_allocator())
    }

    pub fn with_writer(frame_sink_id: FrameSinkId, writer: BulkBufferWriter) -> ContentFrameSink {
        ContentFrameSink {
            frame_sink_id,
            epoch: Epoch(0),
            writer,
            cache: DisplayItemListCache::new(),
            trimmed_backings: Vec::new(),
        }
    }

    pub fn frame_sink_id(&self) -> FrameSinkId {
        self.frame_sink_id
    }

    /// Packages one commit. Every display list the frame's layers reference
    /// is marked used; the ones the consumer lacks are serialized into bulk
    /// buffers and shipped in the returned message.
    pub fn prepare_commit(
        &mut self,
        frame: &ContentFrame,
        lists: &FxHashMap<u32, DisplayItemList>,
    ) -> CommitMessage {
        for layer in &frame.layers {
            let Some(id) = layer.display_list_id else {
                continue;
            };
            match lists.get(&id) {
                Some(list) => self.cache.mark_used(list, &mut self.writer),
                None => warn!("Layer {} references unknown display list {id}.", layer.id),
            }
        }
        let cache_update = self.cache.calculate_cache_update_and_flush();
        let flush = self.writer.flush();
        self.epoch.next();
        CommitMessage {
            frame_sink_id: self.frame_sink_id,
            epoch: self.epoch,
            cache_update,
            backings: flush.backings,
            new_handles: flush.new_handles,
            deleted_backings: mem::take(&mut self.trimmed_backings),
        }
    }

    /// Accepts backings a processed commit reported back as consumed.
    pub fn return_backings(&mut self, ids: &[BackingId]) {
        self.writer.return_backings(ids);
    }

    /// Releases idle backings. The consumer is told to drop its mappings in
    /// the next commit.
    pub fn trim(&mut self) {
        let trimmed = self.writer.trim();
        self.trimmed_backings.extend(trimmed);
    }
}

/// Consumer half of a content frame sink: imports backings, applies display
/// list cache updates and activates committed frames on their surfaces.
pub struct CommitProcessor {
    reader: BulkBufferReader,
    cache: DisplayItemListClientCache,
}

impl CommitProcessor {
    pub fn new() -> CommitProcessor {
        CommitProcessor::with_reader(BulkBufferReader::new())
    }

    pub fn with_reader(reader: BulkBufferReader) -> CommitProcessor {
        CommitProcessor {
            reader,
            cache: DisplayItemListClientCache::new(),
        }
    }

    /// Applies one commit. New backings are imported before any payload is
    /// deserialized; the frame is then activated on its surface, and trimmed
    /// backings are dropped last. Returns the backings the producer can now
    /// reuse, or `None` if the commit had to be dropped.
    pub fn process_commit(
        &mut self,
        manager: &mut SurfaceManager,
        surface_id: SurfaceId,
        frame: ContentFrame,
        message: CommitMessage,
    ) -> Option<Vec<BackingId>> {
        if !self.reader.import_backings(message.new_handles) {
            warn!("Dropping commit for {surface_id}: backing import failed.");
            return None;
        }
        self.cache.apply_cache_update(&message.cache_update, &self.reader);
        for layer in &frame.layers {
            if let Some(id) = layer.display_list_id {
                self.cache.mark_used(id);
            }
        }
        self.cache.flush();
        match manager.surface_mut(surface_id) {
            Some(surface) => surface.activate_frame(frame),
            None => warn!("Commit for unregistered {surface_id}."),
        }
        self.reader.delete_backings(&message.deleted_backings);
        Some(message.backings)
    }

    /// The deserialized display list a rasterizer should draw for `id`.
    pub fn display_list(&self, id: u32) -> Arc<DisplayItemList> {
        self.cache.get_display_item_list(id)
    }

    pub fn display_list_cache(&self) -> &DisplayItemListClientCache {
        &self.cache
    }
}

impl Default for CommitProcessor {
    fn default() -> CommitProcessor {
        CommitProcessor::new()
    }
}

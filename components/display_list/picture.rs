/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

/// An opaque serialized picture: the rasterizer's input for one drawing item.
/// The ID lets repeated commits reference the picture instead of resending
/// its bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Picture {
    pub id: u32,
    pub data: Vec<u8>,
}

/// Engine-side record of which pictures the client already holds. The codec
/// consults this while serializing drawing items: a hit means the item's
/// payload can be just the picture ID.
#[derive(Default)]
pub struct PictureCache {
    sent: FxHashSet<u32>,
}

impl PictureCache {
    pub fn new() -> PictureCache {
        PictureCache::default()
    }

    /// Records that `id`'s bytes are crossing the wire now. Returns true if
    /// the client already had them, in which case the caller should emit a
    /// back-reference instead.
    pub fn note_sent(&mut self, id: u32) -> bool {
        !self.sent.insert(id)
    }
}

/// Client-side store of pictures received inline, so later back-references
/// resolve without another copy of the bytes.
#[derive(Default)]
pub struct ClientPictureCache {
    pictures: FxHashMap<u32, Arc<Picture>>,
}

impl ClientPictureCache {
    pub fn new() -> ClientPictureCache {
        ClientPictureCache::default()
    }

    pub fn insert(&mut self, picture: Arc<Picture>) {
        self.pictures.insert(picture.id, picture);
    }

    pub fn get(&self, id: u32) -> Option<Arc<Picture>> {
        self.pictures.get(&id).cloned()
    }
}

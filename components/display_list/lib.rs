/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! Display item lists and the caches that move them between processes.
//!
//! A display list is a serializable recording of the paint operations for one
//! layer's content. The engine-side [`DisplayItemListCache`] serializes each
//! list at most once per commit generation and ships only the lists the
//! client has never seen; the client-side [`DisplayItemListClientCache`]
//! deserializes those deltas and evicts lists no commit references anymore.
//! Both sides diff generations with a [`ReferenceTracker`].

mod cache;
mod client_cache;
pub mod codec;
mod picture;
mod reference_tracker;

pub use cache::{DisplayItemListCache, DisplayItemListData};
pub use client_cache::DisplayItemListClientCache;
pub use picture::{ClientPictureCache, Picture, PictureCache};
pub use reference_tracker::ReferenceTracker;

use std::sync::Arc;

use euclid::default::{Rect, Transform3D};

/// A serializable recording of paint operations for one layer's content.
/// The unique ID survives the serialization round trip and keys both caches.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayItemList {
    pub unique_id: u32,
    pub items: Vec<DisplayItem>,
}

/// One recorded operation and the visual rect it affects, in layer space.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayItem {
    pub bounds: Rect<i32>,
    pub kind: DisplayItemKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DisplayItemKind {
    /// Rasterizable picture content.
    Drawing(Arc<Picture>),
    /// Clips subsequent items to a rectangle.
    Clip(Rect<i32>),
    /// Applies a transform to subsequent items.
    Transform(Transform3D<f32>),
}

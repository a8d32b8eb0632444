/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! The interface to the `compositing` crate: the data model shared between
//! surface producers and the compositor core, and the traits the core calls
//! back into clients through.

pub mod property_trees;

use std::rc::Rc;

use base::id::SurfaceId;
use euclid::default::Rect;

use crate::property_trees::PropertyTrees;

/// A begin-frame source is a clock that tells a client when to start
/// producing its next frame. Sources are registered with the surface manager
/// and propagated down the client hierarchy; clients only ever observe them
/// through [`SurfaceClient::set_begin_frame_source`].
pub trait BeginFrameSource {
    /// A process-unique identifier for this source, used to tell sources
    /// apart when the manager re-broadcasts after an unregistration.
    fn source_id(&self) -> u32;
}

/// Implemented by the client half of a content frame sink. The surface
/// manager calls this to hand each client its effective begin-frame source,
/// or `None` when the client's subtree loses its source.
pub trait SurfaceClient {
    fn set_begin_frame_source(&self, source: Option<Rc<dyn BeginFrameSource>>);
}

/// One layer in a committed content frame. The layer's content, if any, is a
/// display list held in the display list client cache and named here by its
/// unique ID. The four tree indices point at the property nodes governing
/// this layer in the frame's [`PropertyTrees`].
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: i32,
    pub bounds: Rect<i32>,
    pub display_list_id: Option<u32>,
    pub transform_tree_index: i32,
    pub clip_tree_index: i32,
    pub effect_tree_index: i32,
    pub scroll_tree_index: i32,
}

/// Marks one layer of a frame as embedding another surface's content. The
/// aggregator splices the embedded surface's layers and property nodes in
/// under the marked layer's property nodes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceLayer {
    /// The ID of the embedding layer within the frame's layer list.
    pub layer_id: i32,
    /// The surface whose content this layer displays.
    pub surface_id: SurfaceId,
}

/// The layer list, property trees and surface-layer list one surface commits
/// in a single generation. Consumed by the aggregator; the flattened result
/// is an [`AggregatedContentFrame`] owned by the `compositing` crate.
#[derive(Clone, Debug)]
pub struct ContentFrame {
    pub layers: Vec<Layer>,
    pub property_trees: PropertyTrees,
    pub surface_layers: Vec<SurfaceLayer>,
}

impl ContentFrame {
    /// An empty frame whose property trees hold only their synthetic roots.
    pub fn new() -> ContentFrame {
        ContentFrame {
            layers: Vec::new(),
            property_trees: PropertyTrees::with_roots(),
            surface_layers: Vec::new(),
        }
    }

    /// The surfaces this frame's content points to, in surface-layer order.
    pub fn referenced_surfaces(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.surface_layers.iter().map(|surface_layer| surface_layer.surface_id)
    }
}

impl Default for ContentFrame {
    fn default() -> ContentFrame {
        ContentFrame::new()
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::ops::Range;

use base::id::SurfaceId;
use compositing_traits::property_trees::{
    INVALID_NODE_ID, PropertyTree, PropertyTrees, ROOT_NODE_ID, TreeNode,
};
use compositing_traits::{ContentFrame, Layer};
use log::warn;
use surfaces::SurfaceManager;

/// The flattened, renumbered composite of one or more content frames, with
/// its own owned property trees. Built fresh per aggregation pass.
pub struct AggregatedContentFrame {
    pub layers: Vec<Layer>,
    pub property_trees: PropertyTrees,
    /// Where each spliced surface's layers landed, so a later splice for the
    /// same surface layer replaces the old range instead of appending.
    spliced: Vec<SplicedSurface>,
    /// Layer IDs below this watermark are taken.
    next_layer_id: i32,
}

struct SplicedSurface {
    /// Aggregate-space ID of the surface layer this splice fills.
    surface_layer_id: i32,
    layer_range: Range<usize>,
}

impl AggregatedContentFrame {
    pub fn new() -> AggregatedContentFrame {
        AggregatedContentFrame {
            layers: Vec::new(),
            property_trees: PropertyTrees::with_roots(),
            spliced: Vec::new(),
            next_layer_id: 0,
        }
    }

    fn erase_spliced(&mut self, surface_layer_id: i32) {
        let Some(index) = self
            .spliced
            .iter()
            .position(|existing| existing.surface_layer_id == surface_layer_id)
        else {
            return;
        };
        let record = self.spliced.remove(index);
        let removed = record.layer_range.len();
        self.layers.drain(record.layer_range.clone());
        for later in &mut self.spliced {
            if later.layer_range.start >= record.layer_range.end {
                later.layer_range =
                    later.layer_range.start - removed..later.layer_range.end - removed;
            }
        }
        // The erased range's property nodes stay behind as inert entries; no
        // remaining layer points at them.
    }
}

impl Default for AggregatedContentFrame {
    fn default() -> AggregatedContentFrame {
        AggregatedContentFrame::new()
    }
}

/// Destination property node, per tree, that a spliced frame hangs off.
#[derive(Clone, Copy)]
struct ParentNodes {
    transform: i32,
    clip: i32,
    effect: i32,
    scroll: i32,
}

impl ParentNodes {
    fn tree_roots() -> ParentNodes {
        ParentNodes {
            transform: ROOT_NODE_ID,
            clip: ROOT_NODE_ID,
            effect: ROOT_NODE_ID,
            scroll: ROOT_NODE_ID,
        }
    }

    fn of_layer(layer: &Layer) -> ParentNodes {
        ParentNodes {
            transform: layer.transform_tree_index,
            clip: layer.clip_tree_index,
            effect: layer.effect_tree_index,
            scroll: layer.scroll_tree_index,
        }
    }
}

/// Walks a tree of surfaces rooted at one and flattens their layer lists and
/// property trees into a single coordinate space, remapping node and layer
/// IDs to avoid collisions.
pub struct ContentFrameAggregator {
    /// Surfaces encountered during the last aggregation pass: the root plus
    /// every surface its frame embeds.
    contained_surfaces: Vec<SurfaceId>,
}

impl ContentFrameAggregator {
    pub fn new() -> ContentFrameAggregator {
        ContentFrameAggregator {
            contained_surfaces: Vec::new(),
        }
    }

    pub fn contained_surfaces(&self) -> &[SurfaceId] {
        &self.contained_surfaces
    }

    /// Builds a fresh aggregate from `root`'s active frame. Only the root
    /// surface is flattened in this revision: surfaces its frame embeds keep
    /// their placeholder surface layers and are reported through
    /// [`Self::contained_surfaces`], and [`Self::splice_surface`] can fill
    /// them in afterwards.
    pub fn aggregate(
        &mut self,
        root: SurfaceId,
        manager: &SurfaceManager,
    ) -> AggregatedContentFrame {
        self.contained_surfaces.clear();
        let mut aggregate = AggregatedContentFrame::new();
        let Some(surface) = manager.surface(root) else {
            warn!("Aggregating unknown {root}.");
            return aggregate;
        };
        let Some(frame) = surface.current_frame() else {
            warn!("Aggregating {root} before its first frame.");
            return aggregate;
        };
        self.contained_surfaces.push(root);
        splice_frame(&mut aggregate, frame, ParentNodes::tree_roots(), None);
        for surface_layer in &frame.surface_layers {
            self.contained_surfaces.push(surface_layer.surface_id);
        }
        aggregate
    }

    /// Splices `frame` under the aggregate's surface layer with ID
    /// `surface_layer_id`, replacing whatever a previous splice put there.
    pub fn splice_surface(
        &self,
        aggregate: &mut AggregatedContentFrame,
        surface_layer_id: i32,
        frame: &ContentFrame,
    ) {
        let Some(layer) = aggregate
            .layers
            .iter()
            .find(|layer| layer.id == surface_layer_id)
        else {
            warn!("Splicing under unknown surface layer {surface_layer_id}.");
            return;
        };
        let parents = ParentNodes::of_layer(layer);
        splice_frame(aggregate, frame, parents, Some(surface_layer_id));
    }
}

impl Default for ContentFrameAggregator {
    fn default() -> ContentFrameAggregator {
        ContentFrameAggregator::new()
    }
}

fn splice_frame(
    aggregate: &mut AggregatedContentFrame,
    frame: &ContentFrame,
    parents: ParentNodes,
    replaces_surface_layer: Option<i32>,
) {
    if let Some(surface_layer_id) = replaces_surface_layer {
        aggregate.erase_spliced(surface_layer_id);
    }

    let layer_offset = aggregate.next_layer_id;
    let layer_start = aggregate.layers.len();

    let transform_offset = splice_tree(
        &mut aggregate.property_trees.transform,
        &frame.property_trees.transform,
        parents.transform,
        layer_offset,
    );
    // Transform targets are indices into the transform tree itself, so they
    // get the same translation as parents.
    for node in &mut aggregate.property_trees.transform.nodes[transform_offset as usize..] {
        node.target_id = remap_index(node.target_id, transform_offset, parents.transform);
        node.content_target_id =
            remap_index(node.content_target_id, transform_offset, parents.transform);
    }
    let clip_offset = splice_tree(
        &mut aggregate.property_trees.clip,
        &frame.property_trees.clip,
        parents.clip,
        layer_offset,
    );
    let effect_offset = splice_tree(
        &mut aggregate.property_trees.effect,
        &frame.property_trees.effect,
        parents.effect,
        layer_offset,
    );
    let scroll_offset = splice_tree(
        &mut aggregate.property_trees.scroll,
        &frame.property_trees.scroll,
        parents.scroll,
        layer_offset,
    );

    for layer in &frame.layers {
        let mut copy = layer.clone();
        copy.id += layer_offset;
        copy.transform_tree_index =
            remap_index(layer.transform_tree_index, transform_offset, parents.transform);
        copy.clip_tree_index = remap_index(layer.clip_tree_index, clip_offset, parents.clip);
        copy.effect_tree_index =
            remap_index(layer.effect_tree_index, effect_offset, parents.effect);
        copy.scroll_tree_index =
            remap_index(layer.scroll_tree_index, scroll_offset, parents.scroll);
        aggregate.layers.push(copy);
    }
    let max_layer_id = frame.layers.iter().map(|layer| layer.id).max().unwrap_or(0);
    aggregate.next_layer_id = layer_offset + max_layer_id + 1;

    if let Some(surface_layer_id) = replaces_surface_layer {
        aggregate.spliced.push(SplicedSurface {
            surface_layer_id,
            layer_range: layer_start..aggregate.layers.len(),
        });
    }
}

/// Copies every node of `source` except its synthetic root into `dest`,
/// translating IDs. Returns the destination offset the copies start at.
fn splice_tree<N: TreeNode + Clone>(
    dest: &mut PropertyTree<N>,
    source: &PropertyTree<N>,
    parent_node: i32,
    layer_offset: i32,
) -> i32 {
    let offset = dest.len() as i32;
    for node in source.nodes.iter().skip(1) {
        let mut copy = node.clone();
        copy.set_id(remap_index(node.id(), offset, parent_node));
        copy.set_parent_id(remap_index(node.parent_id(), offset, parent_node));
        if node.owning_layer_id() >= 0 {
            copy.set_owning_layer_id(node.owning_layer_id() + layer_offset);
        }
        dest.nodes.push(copy);
    }
    offset
}

/// Translates a node index from a spliced-in tree to the destination tree:
/// the uncopied synthetic root maps to the designated parent node, real
/// indices shift by the destination offset.
fn remap_index(index: i32, offset: i32, parent_node: i32) -> i32 {
    if index == ROOT_NODE_ID {
        parent_node
    } else if index == INVALID_NODE_ID {
        INVALID_NODE_ID
    } else {
        index + offset - 1
    }
}

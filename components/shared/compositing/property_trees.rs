/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The four property trees a content frame carries alongside its layer list.
//!
//! Node IDs are indices into the owning tree's node vector. Index 0 is the
//! synthetic root every tree starts with; it is never spliced into an
//! aggregate. The tree math itself (accumulating transforms, resolving
//! clips) belongs to the rasterizer side and is not modelled here.

use euclid::default::{Rect, Transform3D, Vector2D};

/// Index of the synthetic root node in every property tree.
pub const ROOT_NODE_ID: i32 = 0;

/// Marks a node index as unassigned.
pub const INVALID_NODE_ID: i32 = -1;

/// The splice seam: accessors the aggregator needs to renumber nodes when
/// flattening several frames' trees into one.
pub trait TreeNode {
    fn id(&self) -> i32;
    fn set_id(&mut self, id: i32);
    fn parent_id(&self) -> i32;
    fn set_parent_id(&mut self, id: i32);
    fn owning_layer_id(&self) -> i32;
    fn set_owning_layer_id(&mut self, id: i32);
}

macro_rules! tree_node_common {
    ($node:ty) => {
        impl TreeNode for $node {
            fn id(&self) -> i32 {
                self.id
            }
            fn set_id(&mut self, id: i32) {
                self.id = id;
            }
            fn parent_id(&self) -> i32 {
                self.parent_id
            }
            fn set_parent_id(&mut self, id: i32) {
                self.parent_id = id;
            }
            fn owning_layer_id(&self) -> i32 {
                self.owning_layer_id
            }
            fn set_owning_layer_id(&mut self, id: i32) {
                self.owning_layer_id = id;
            }
        }
    };
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransformNode {
    pub id: i32,
    pub parent_id: i32,
    pub owning_layer_id: i32,
    /// Index of the node this node draws into. An index into the transform
    /// tree itself, so it is renumbered on splice like `parent_id`.
    pub target_id: i32,
    /// Like `target_id`, but tracking the content rendering target.
    pub content_target_id: i32,
    pub local: Transform3D<f32>,
}

impl TransformNode {
    pub fn root() -> TransformNode {
        TransformNode {
            id: ROOT_NODE_ID,
            parent_id: INVALID_NODE_ID,
            owning_layer_id: INVALID_NODE_ID,
            target_id: ROOT_NODE_ID,
            content_target_id: ROOT_NODE_ID,
            local: Transform3D::identity(),
        }
    }
}

tree_node_common!(TransformNode);

#[derive(Clone, Debug, PartialEq)]
pub struct ClipNode {
    pub id: i32,
    pub parent_id: i32,
    pub owning_layer_id: i32,
    pub clip: Rect<f32>,
}

impl ClipNode {
    pub fn root() -> ClipNode {
        ClipNode {
            id: ROOT_NODE_ID,
            parent_id: INVALID_NODE_ID,
            owning_layer_id: INVALID_NODE_ID,
            clip: Rect::zero(),
        }
    }
}

tree_node_common!(ClipNode);

#[derive(Clone, Debug, PartialEq)]
pub struct EffectNode {
    pub id: i32,
    pub parent_id: i32,
    pub owning_layer_id: i32,
    pub opacity: f32,
}

impl EffectNode {
    pub fn root() -> EffectNode {
        EffectNode {
            id: ROOT_NODE_ID,
            parent_id: INVALID_NODE_ID,
            owning_layer_id: INVALID_NODE_ID,
            opacity: 1.0,
        }
    }
}

tree_node_common!(EffectNode);

#[derive(Clone, Debug, PartialEq)]
pub struct ScrollNode {
    pub id: i32,
    pub parent_id: i32,
    pub owning_layer_id: i32,
    pub scroll_offset: Vector2D<f32>,
}

impl ScrollNode {
    pub fn root() -> ScrollNode {
        ScrollNode {
            id: ROOT_NODE_ID,
            parent_id: INVALID_NODE_ID,
            owning_layer_id: INVALID_NODE_ID,
            scroll_offset: Vector2D::zero(),
        }
    }
}

tree_node_common!(ScrollNode);

/// One property tree: a flat node vector where each node's `id` equals its
/// index.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyTree<N> {
    pub nodes: Vec<N>,
}

impl<N: TreeNode> PropertyTree<N> {
    pub fn with_root(root: N) -> PropertyTree<N> {
        PropertyTree { nodes: vec![root] }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a node, assigning it the next index as its ID.
    pub fn push(&mut self, mut node: N) -> i32 {
        let id = self.nodes.len() as i32;
        node.set_id(id);
        self.nodes.push(node);
        id
    }
}

/// The transform, clip, effect and scroll trees of one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyTrees {
    pub transform: PropertyTree<TransformNode>,
    pub clip: PropertyTree<ClipNode>,
    pub effect: PropertyTree<EffectNode>,
    pub scroll: PropertyTree<ScrollNode>,
}

impl PropertyTrees {
    /// Four trees holding only their synthetic roots.
    pub fn with_roots() -> PropertyTrees {
        PropertyTrees {
            transform: PropertyTree::with_root(TransformNode::root()),
            clip: PropertyTree::with_root(ClipNode::root()),
            effect: PropertyTree::with_root(EffectNode::root()),
            scroll: PropertyTree::with_root(ScrollNode::root()),
        }
    }
}

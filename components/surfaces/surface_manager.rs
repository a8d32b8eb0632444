/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::rc::Rc;
use std::thread::{self, ThreadId};

use base::id::{FrameSinkId, SurfaceId};
use compositing_traits::{BeginFrameSource, SurfaceClient};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::surface::Surface;

/// Reference counts for one surface. `refs` count explicit references from
/// privileged owners; `temp_refs` hold a surface alive from the moment it is
/// embedded until the first explicit reference arrives.
#[derive(Clone, Copy, Debug, Default)]
pub struct SurfaceRefs {
    pub refs: usize,
    pub temp_refs: usize,
}

impl SurfaceRefs {
    fn is_referenced(&self) -> bool {
        self.refs > 0 || self.temp_refs > 0
    }
}

/// Per-namespace record: the registered client, the begin-frame source the
/// namespace currently inherits, and its child namespaces. Entries are
/// created on first touch and dropped once every field is empty, so
/// registrations may arrive in any order.
#[derive(Default)]
struct ClientSourceMapping {
    client: Option<Rc<dyn SurfaceClient>>,
    source: Option<Rc<dyn BeginFrameSource>>,
    children: SmallVec<[FrameSinkId; 4]>,
}

impl ClientSourceMapping {
    fn is_empty(&self) -> bool {
        self.client.is_none() && self.source.is_none() && self.children.is_empty()
    }
}

/// Central registry of live surfaces, their reference counts and the
/// client hierarchy used to propagate begin-frame sources.
///
/// The manager binds to the thread that creates it; every public method
/// asserts it is called from that thread. Concurrency comes from the
/// surrounding scheduler running separate sinks on separate threads, each
/// with its own manager.
pub struct SurfaceManager {
    thread_id: ThreadId,
    surfaces: FxHashMap<SurfaceId, Surface>,
    surface_refs: FxHashMap<SurfaceId, SurfaceRefs>,
    /// Destroyed surfaces awaiting garbage collection.
    surfaces_to_destroy: Vec<SurfaceId>,
    clients: FxHashMap<FrameSinkId, ClientSourceMapping>,
    registered_sources: Vec<(Rc<dyn BeginFrameSource>, FrameSinkId)>,
}

impl SurfaceManager {
    pub fn new() -> SurfaceManager {
        SurfaceManager {
            thread_id: thread::current().id(),
            surfaces: FxHashMap::default(),
            surface_refs: FxHashMap::default(),
            surfaces_to_destroy: Vec::new(),
            clients: FxHashMap::default(),
            registered_sources: Vec::new(),
        }
    }

    fn check_thread(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.thread_id,
            "SurfaceManager used off its owning thread"
        );
    }

    /// Registers a surface. Registering the same ID twice is a caller error.
    pub fn register_surface(&mut self, surface: Surface) {
        self.check_thread();
        let surface_id = surface.surface_id();
        assert!(surface_id.is_valid());
        let previous = self.surfaces.insert(surface_id, surface);
        assert!(previous.is_none(), "{surface_id} registered twice");
    }

    /// Removes a surface from the registry immediately. Normally deletion
    /// goes through [`Self::destroy_surface`] and garbage collection.
    pub fn deregister_surface(&mut self, surface_id: SurfaceId) {
        self.check_thread();
        let removed = self.surfaces.remove(&surface_id);
        assert!(removed.is_some(), "deregistering unregistered {surface_id}");
        self.surface_refs.remove(&surface_id);
    }

    /// Marks the surface destroyed and garbage-collects. The surface is
    /// deleted once nothing references it and no live surface can reach it.
    pub fn destroy_surface(&mut self, surface_id: SurfaceId) {
        self.check_thread();
        let surface = self
            .surfaces
            .get_mut(&surface_id)
            .expect("destroying unregistered surface");
        assert!(!surface.destroyed(), "{surface_id} destroyed twice");
        surface.set_destroyed();
        self.surfaces_to_destroy.push(surface_id);
        self.garbage_collect_surfaces();
    }

    pub fn surface(&self, surface_id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&surface_id)
    }

    pub fn surface_mut(&mut self, surface_id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&surface_id)
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn surface_refs(&self, surface_id: SurfaceId) -> SurfaceRefs {
        self.surface_refs.get(&surface_id).copied().unwrap_or_default()
    }

    /// Adds an explicit reference. A reference on the invalid ID is a no-op.
    /// The first explicit reference supersedes any temporary ones.
    pub fn add_ref_on_surface_id(&mut self, surface_id: SurfaceId) {
        self.check_thread();
        if !surface_id.is_valid() {
            return;
        }
        let refs = self.surface_refs.entry(surface_id).or_default();
        refs.refs += 1;
        refs.temp_refs = 0;
    }

    /// Holds a surface alive until the first explicit reference arrives.
    pub fn add_temp_ref_on_surface_id(&mut self, surface_id: SurfaceId) {
        self.check_thread();
        if !surface_id.is_valid() {
            return;
        }
        self.surface_refs.entry(surface_id).or_default().temp_refs += 1;
    }

    /// Drops an explicit reference, garbage-collecting when the count hits
    /// zero. Removing a ref for an ID with no tracked entry is tolerated:
    /// the surface may have come from a previous, since-restarted
    /// compositor instance.
    pub fn remove_ref_on_surface_id(&mut self, surface_id: SurfaceId) {
        self.check_thread();
        if !surface_id.is_valid() {
            return;
        }
        let Some(refs) = self.surface_refs.get_mut(&surface_id) else {
            warn!("Removing ref on untracked {surface_id}.");
            return;
        };
        assert!(refs.refs > 0, "ref count for {surface_id} went negative");
        refs.refs -= 1;
        if !refs.is_referenced() {
            self.garbage_collect_surfaces();
        }
    }

    /// Mark-and-sweep over the pending-destroy list. Roots are the surfaces
    /// that are still live; a pending surface survives if it still has refs
    /// (refs take priority) or if some root can reach it through
    /// `referenced_surfaces`.
    pub fn garbage_collect_surfaces(&mut self) {
        self.check_thread();
        if self.surfaces_to_destroy.is_empty() {
            return;
        }
        let roots = self
            .surfaces
            .values()
            .filter(|surface| !surface.destroyed())
            .map(|surface| surface.surface_id());
        let reachable = reachable_surfaces(roots, &self.surfaces);
        let pending = std::mem::take(&mut self.surfaces_to_destroy);
        for surface_id in pending {
            if self.surface_refs(surface_id).is_referenced() {
                self.surfaces_to_destroy.push(surface_id);
                continue;
            }
            if reachable.contains(&surface_id) {
                self.surfaces_to_destroy.push(surface_id);
                continue;
            }
            debug!("Garbage collecting {surface_id}.");
            self.surfaces.remove(&surface_id);
            self.surface_refs.remove(&surface_id);
        }
    }

    /// Registers the client half of a sink. Registering a second client for
    /// the same namespace is a caller error. If the namespace already
    /// inherited a begin-frame source, the client hears about it at once.
    pub fn register_surface_client(
        &mut self,
        frame_sink_id: FrameSinkId,
        client: Rc<dyn SurfaceClient>,
    ) {
        self.check_thread();
        let mapping = self.clients.entry(frame_sink_id).or_default();
        assert!(mapping.client.is_none(), "client registered twice for {frame_sink_id}");
        if let Some(source) = mapping.source.clone() {
            client.set_begin_frame_source(Some(source));
        }
        mapping.client = Some(client);
    }

    pub fn unregister_surface_client(&mut self, frame_sink_id: FrameSinkId) {
        self.check_thread();
        let Some(mapping) = self.clients.get_mut(&frame_sink_id) else {
            warn!("Unregistering unknown client for {frame_sink_id}.");
            return;
        };
        mapping.client = None;
        if mapping.is_empty() {
            self.clients.remove(&frame_sink_id);
        }
    }

    /// Attaches `source` to the namespace and broadcasts it down the
    /// hierarchy; descendants that already have a source keep it.
    pub fn register_begin_frame_source(
        &mut self,
        source: Rc<dyn BeginFrameSource>,
        frame_sink_id: FrameSinkId,
    ) {
        self.check_thread();
        assert!(
            !self
                .registered_sources
                .iter()
                .any(|(registered, _)| Rc::ptr_eq(registered, &source)),
            "begin-frame source registered twice"
        );
        self.registered_sources.push((source.clone(), frame_sink_id));
        self.recursively_attach_begin_frame_source(frame_sink_id, &source);
    }

    /// Detaches `source` from its namespace's subtree, then re-broadcasts
    /// every other registered source so any node that went sourceless can
    /// inherit an alternative.
    pub fn unregister_begin_frame_source(&mut self, source: &Rc<dyn BeginFrameSource>) {
        self.check_thread();
        let index = self
            .registered_sources
            .iter()
            .position(|(registered, _)| Rc::ptr_eq(registered, source))
            .expect("unregistering unknown begin-frame source");
        let (_, frame_sink_id) = self.registered_sources.remove(index);
        self.recursively_detach_begin_frame_source(frame_sink_id, source);
        let remaining = self.registered_sources.clone();
        for (other, sink) in remaining {
            self.recursively_attach_begin_frame_source(sink, &other);
        }
    }

    /// Records the parent → child namespace edge. Registering an edge whose
    /// child can already reach the parent would create a cycle and is fatal.
    pub fn register_surface_hierarchy(&mut self, parent: FrameSinkId, child: FrameSinkId) {
        self.check_thread();
        assert!(
            !self.child_contains(child, parent),
            "hierarchy cycle between {parent} and {child}"
        );
        let mapping = self.clients.entry(parent).or_default();
        mapping.children.push(child);
        if let Some(source) = mapping.source.clone() {
            self.recursively_attach_begin_frame_source(child, &source);
        }
    }

    /// Removes the parent → child edge, detaches the source the child
    /// subtree inherited through it, and re-broadcasts the rest.
    pub fn unregister_surface_hierarchy(&mut self, parent: FrameSinkId, child: FrameSinkId) {
        self.check_thread();
        let Some(mapping) = self.clients.get_mut(&parent) else {
            warn!("Unregistering hierarchy under unknown {parent}.");
            return;
        };
        let Some(index) = mapping.children.iter().position(|&existing| existing == child) else {
            warn!("Unregistering unknown hierarchy edge {parent} -> {child}.");
            return;
        };
        mapping.children.remove(index);
        let source = mapping.source.clone();
        if mapping.is_empty() {
            self.clients.remove(&parent);
        }
        if let Some(source) = source {
            self.recursively_detach_begin_frame_source(child, &source);
        }
        let remaining = self.registered_sources.clone();
        for (other, sink) in remaining {
            self.recursively_attach_begin_frame_source(sink, &other);
        }
    }

    fn recursively_attach_begin_frame_source(
        &mut self,
        frame_sink_id: FrameSinkId,
        source: &Rc<dyn BeginFrameSource>,
    ) {
        let mapping = self.clients.entry(frame_sink_id).or_default();
        if mapping.source.is_none() {
            mapping.source = Some(source.clone());
            if let Some(client) = mapping.client.clone() {
                client.set_begin_frame_source(Some(source.clone()));
            }
        }
        let children = mapping.children.clone();
        for child in children {
            self.recursively_attach_begin_frame_source(child, source);
        }
    }

    fn recursively_detach_begin_frame_source(
        &mut self,
        frame_sink_id: FrameSinkId,
        source: &Rc<dyn BeginFrameSource>,
    ) {
        let Some(mapping) = self.clients.get_mut(&frame_sink_id) else {
            return;
        };
        if mapping
            .source
            .as_ref()
            .is_some_and(|attached| Rc::ptr_eq(attached, source))
        {
            mapping.source = None;
            if let Some(client) = mapping.client.clone() {
                client.set_begin_frame_source(None);
            }
        }
        if mapping.is_empty() {
            self.clients.remove(&frame_sink_id);
            return;
        }
        let children = mapping.children.clone();
        for child in children {
            self.recursively_detach_begin_frame_source(child, source);
        }
    }

    /// Whether `search` is reachable from `sink` through hierarchy edges.
    fn child_contains(&self, sink: FrameSinkId, search: FrameSinkId) -> bool {
        let Some(mapping) = self.clients.get(&sink) else {
            return false;
        };
        for &child in &mapping.children {
            if child == search || self.child_contains(child, search) {
                return true;
            }
        }
        false
    }
}

impl Default for SurfaceManager {
    fn default() -> SurfaceManager {
        SurfaceManager::new()
    }
}

/// The set of surfaces transitively reachable from `roots`. Edges are the
/// `referenced_surfaces` of each surface, resolved via the live-surface map;
/// IDs with no resolvable surface are skipped, and a destroyed surface's own
/// references are not followed (its content will never be drawn again as a
/// root).
fn reachable_surfaces(
    roots: impl Iterator<Item = SurfaceId>,
    surfaces: &FxHashMap<SurfaceId, Surface>,
) -> FxHashSet<SurfaceId> {
    let mut reachable = FxHashSet::default();
    let mut frontier: Vec<SurfaceId> = roots.collect();
    while let Some(surface_id) = frontier.pop() {
        if !reachable.insert(surface_id) {
            continue;
        }
        if let Some(surface) = surfaces.get(&surface_id) {
            if !surface.destroyed() {
                frontier.extend_from_slice(surface.referenced_surfaces());
            }
        }
    }
    reachable
}

#[cfg(test)]
mod tests {
    use base::id::{FrameSinkId, SurfaceId};
    use compositing_traits::{ContentFrame, SurfaceLayer};
    use rustc_hash::FxHashMap;

    use super::reachable_surfaces;
    use crate::surface::Surface;

    fn surface_id(sink: u32, local: u32) -> SurfaceId {
        SurfaceId::new(FrameSinkId::new(1, sink), local)
    }

    fn surface_referencing(surface_id: SurfaceId, references: &[SurfaceId]) -> Surface {
        let mut surface = Surface::new(surface_id);
        let mut frame = ContentFrame::new();
        for (index, &referenced) in references.iter().enumerate() {
            frame.surface_layers.push(SurfaceLayer {
                layer_id: index as i32 + 1,
                surface_id: referenced,
            });
        }
        surface.activate_frame(frame);
        surface
    }

    #[test]
    fn reachability_is_transitive_through_live_surfaces() {
        let a = surface_id(1, 1);
        let b = surface_id(2, 1);
        let c = surface_id(3, 1);
        let mut surfaces = FxHashMap::default();
        surfaces.insert(a, surface_referencing(a, &[b]));
        surfaces.insert(b, surface_referencing(b, &[c]));
        surfaces.insert(c, surface_referencing(c, &[]));

        let reachable = reachable_surfaces([a].into_iter(), &surfaces);
        assert!(reachable.contains(&a));
        assert!(reachable.contains(&b));
        assert!(reachable.contains(&c));
    }

    #[test]
    fn reachability_stops_at_destroyed_surfaces() {
        let a = surface_id(1, 1);
        let b = surface_id(2, 1);
        let c = surface_id(3, 1);
        let mut surfaces = FxHashMap::default();
        surfaces.insert(a, surface_referencing(a, &[b]));
        let mut destroyed = surface_referencing(b, &[c]);
        destroyed.set_destroyed();
        surfaces.insert(b, destroyed);
        surfaces.insert(c, surface_referencing(c, &[]));

        let reachable = reachable_surfaces([a].into_iter(), &surfaces);
        assert!(reachable.contains(&b));
        assert!(!reachable.contains(&c));
    }

    #[test]
    fn unresolvable_references_are_skipped() {
        let a = surface_id(1, 1);
        let ghost = surface_id(9, 9);
        let mut surfaces = FxHashMap::default();
        surfaces.insert(a, surface_referencing(a, &[ghost]));

        let reachable = reachable_surfaces([a].into_iter(), &surfaces);
        assert!(reachable.contains(&a));
    }
}

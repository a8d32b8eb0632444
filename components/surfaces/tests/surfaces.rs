/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cell::RefCell;
use std::rc::Rc;

use base::id::{FrameSinkId, SurfaceId};
use compositing_traits::{BeginFrameSource, ContentFrame, SurfaceClient, SurfaceLayer};
use surfaces::{Surface, SurfaceManager};

fn sink(id: u32) -> FrameSinkId {
    FrameSinkId::new(id, 0)
}

fn surface_id(id: u32) -> SurfaceId {
    SurfaceId::new(sink(id), 1)
}

fn surface_referencing(id: SurfaceId, references: &[SurfaceId]) -> Surface {
    let mut surface = Surface::new(id);
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
fn garbage_collection_follows_reachability_from_live_roots() {
    let mut manager = SurfaceManager::new();
    let a = surface_id(1);
    let b = surface_id(2);
    let c = surface_id(3);
    manager.register_surface(surface_referencing(a, &[b]));
    manager.register_surface(surface_referencing(b, &[c]));
    manager.register_surface(surface_referencing(c, &[]));

    manager.destroy_surface(c);
    // C is still reachable through the live surface B.
    assert!(manager.surface(c).is_some());

    manager.destroy_surface(b);
    // B stays: the live root A references it. C is only reachable through
    // the destroyed B, so it goes.
    assert!(manager.surface(b).is_some());
    assert!(manager.surface(c).is_none());
    assert!(manager.surface(a).is_some());
}

#[test]
fn references_keep_a_destroyed_surface_pending() {
    let mut manager = SurfaceManager::new();
    let orphan = surface_id(7);
    manager.register_surface(surface_referencing(orphan, &[]));
    manager.add_ref_on_surface_id(orphan);

    // Unreachable from any live root, but the ref wins.
    manager.destroy_surface(orphan);
    assert!(manager.surface(orphan).is_some());

    manager.remove_ref_on_surface_id(orphan);
    assert!(manager.surface(orphan).is_none());
}

#[test]
fn temp_refs_hold_a_surface_until_the_real_ref_arrives() {
    let mut manager = SurfaceManager::new();
    let id = surface_id(4);
    manager.register_surface(surface_referencing(id, &[]));
    manager.add_temp_ref_on_surface_id(id);
    manager.destroy_surface(id);
    assert!(manager.surface(id).is_some());

    // The explicit ref supersedes the temporary one.
    manager.add_ref_on_surface_id(id);
    assert_eq!(manager.surface_refs(id).temp_refs, 0);
    manager.remove_ref_on_surface_id(id);
    assert!(manager.surface(id).is_none());
}

#[test]
fn ref_operations_on_the_invalid_id_are_no_ops() {
    let mut manager = SurfaceManager::new();
    let invalid = SurfaceId::new(sink(1), 0);
    manager.add_ref_on_surface_id(invalid);
    manager.remove_ref_on_surface_id(invalid);
    assert_eq!(manager.surface_refs(invalid).refs, 0);
}

#[test]
fn removing_a_ref_for_an_unknown_surface_is_tolerated() {
    // The surface may predate a compositor restart; nothing to panic about.
    let mut manager = SurfaceManager::new();
    manager.remove_ref_on_surface_id(surface_id(9));
}

#[test]
#[should_panic(expected = "went negative")]
fn dropping_more_refs_than_were_added_is_fatal() {
    let mut manager = SurfaceManager::new();
    let id = surface_id(5);
    manager.register_surface(surface_referencing(id, &[]));
    manager.add_ref_on_surface_id(id);
    manager.remove_ref_on_surface_id(id);
    manager.remove_ref_on_surface_id(id);
}

#[test]
#[should_panic(expected = "registered twice")]
fn registering_a_surface_twice_is_fatal() {
    let mut manager = SurfaceManager::new();
    let id = surface_id(6);
    manager.register_surface(surface_referencing(id, &[]));
    manager.register_surface(surface_referencing(id, &[]));
}

#[test]
#[should_panic(expected = "cycle")]
fn hierarchy_cycles_are_rejected() {
    let mut manager = SurfaceManager::new();
    manager.register_surface_hierarchy(sink(1), sink(2));
    manager.register_surface_hierarchy(sink(2), sink(1));
}

struct TestSource {
    id: u32,
}

impl BeginFrameSource for TestSource {
    fn source_id(&self) -> u32 {
        self.id
    }
}

#[derive(Default)]
struct TestClient {
    sources: RefCell<Vec<Option<u32>>>,
}

impl TestClient {
    fn last(&self) -> Option<Option<u32>> {
        self.sources.borrow().last().copied()
    }

    fn calls(&self) -> usize {
        self.sources.borrow().len()
    }
}

impl SurfaceClient for TestClient {
    fn set_begin_frame_source(&self, source: Option<Rc<dyn BeginFrameSource>>) {
        self.sources
            .borrow_mut()
            .push(source.map(|source| source.source_id()));
    }
}

#[test]
fn begin_frame_sources_propagate_down_the_hierarchy() {
    let mut manager = SurfaceManager::new();
    let parent = sink(1);
    let child = sink(2);
    let client = Rc::new(TestClient::default());
    manager.register_surface_client(child, client.clone());

    let source: Rc<dyn BeginFrameSource> = Rc::new(TestSource { id: 5 });
    manager.register_begin_frame_source(source.clone(), parent);
    assert_eq!(client.calls(), 0, "not connected to the source's namespace yet");

    manager.register_surface_hierarchy(parent, child);
    assert_eq!(client.last(), Some(Some(5)));

    manager.unregister_begin_frame_source(&source);
    assert_eq!(client.last(), Some(None));
}

#[test]
fn a_closer_source_is_kept_during_broadcast() {
    let mut manager = SurfaceManager::new();
    let parent = sink(1);
    let child = sink(2);
    let client = Rc::new(TestClient::default());
    manager.register_surface_client(child, client.clone());

    let near: Rc<dyn BeginFrameSource> = Rc::new(TestSource { id: 1 });
    let far: Rc<dyn BeginFrameSource> = Rc::new(TestSource { id: 2 });
    manager.register_begin_frame_source(near.clone(), child);
    assert_eq!(client.last(), Some(Some(1)));

    // The parent's source reaches the child during the broadcast but does
    // not displace the child's own.
    manager.register_begin_frame_source(far, parent);
    manager.register_surface_hierarchy(parent, child);
    assert_eq!(client.calls(), 1);
    assert_eq!(client.last(), Some(Some(1)));
}

#[test]
fn a_late_client_hears_about_its_namespace_source_immediately() {
    let mut manager = SurfaceManager::new();
    let namespace = sink(3);
    let source: Rc<dyn BeginFrameSource> = Rc::new(TestSource { id: 9 });
    manager.register_begin_frame_source(source, namespace);

    let client = Rc::new(TestClient::default());
    manager.register_surface_client(namespace, client.clone());
    assert_eq!(client.last(), Some(Some(9)));
}

#[test]
fn unregistering_a_hierarchy_edge_rebroadcasts_remaining_sources() {
    let mut manager = SurfaceManager::new();
    let parent = sink(1);
    let child = sink(2);
    let client = Rc::new(TestClient::default());
    manager.register_surface_client(child, client.clone());

    let parent_source: Rc<dyn BeginFrameSource> = Rc::new(TestSource { id: 1 });
    let child_source: Rc<dyn BeginFrameSource> = Rc::new(TestSource { id: 2 });
    manager.register_begin_frame_source(parent_source, parent);
    manager.register_surface_hierarchy(parent, child);
    assert_eq!(client.last(), Some(Some(1)));

    // With the edge gone, the child falls back to the source registered on
    // its own namespace.
    manager.register_begin_frame_source(child_source, child);
    assert_eq!(client.last(), Some(Some(1)), "the inherited source still wins");
    manager.unregister_surface_hierarchy(parent, child);
    assert_eq!(client.last(), Some(Some(2)));
}

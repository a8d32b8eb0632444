/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use base::FrameIndex;
use base::id::SurfaceId;
use compositing_traits::ContentFrame;

/// A named, versioned endpoint producing compositable frames. Owned by the
/// [`SurfaceManager`](crate::SurfaceManager) once registered; destruction is
/// deferred until garbage collection proves the surface unreachable and its
/// reference count is zero.
pub struct Surface {
    surface_id: SurfaceId,
    destroyed: bool,
    frame_index: FrameIndex,
    current_frame: Option<ContentFrame>,
    referenced_surfaces: Vec<SurfaceId>,
}

impl Surface {
    pub fn new(surface_id: SurfaceId) -> Surface {
        Surface {
            surface_id,
            destroyed: false,
            frame_index: FrameIndex::default(),
            current_frame: None,
            referenced_surfaces: Vec::new(),
        }
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }

    pub fn frame_index(&self) -> FrameIndex {
        self.frame_index
    }

    /// Commits a new content frame: advances the frame index and replaces
    /// the set of surfaces this surface's content points to.
    pub fn activate_frame(&mut self, frame: ContentFrame) {
        self.referenced_surfaces = frame.referenced_surfaces().collect();
        self.current_frame = Some(frame);
        self.frame_index.advance();
    }

    pub fn current_frame(&self) -> Option<&ContentFrame> {
        self.current_frame.as_ref()
    }

    /// The surfaces the active frame points to, e.g. via surface layers.
    pub fn referenced_surfaces(&self) -> &[SurfaceId] {
        &self.referenced_surfaces
    }

    pub fn destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn set_destroyed(&mut self) {
        self.destroyed = true;
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Identifiers for surfaces and the clients that produce them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one content frame sink: the endpoint inside a client process
/// that produces frames for a family of surfaces. The `client_id` half names
/// the process-level namespace, allocated by the privileged process, while
/// `sink_id` names one sink within that namespace.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct FrameSinkId {
    pub client_id: u32,
    pub sink_id: u32,
}

impl FrameSinkId {
    pub const fn new(client_id: u32, sink_id: u32) -> FrameSinkId {
        FrameSinkId { client_id, sink_id }
    }
}

impl fmt::Display for FrameSinkId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "FrameSinkId({}, {})", self.client_id, self.sink_id)
    }
}

/// Identifies one surface: the sink that produces it plus a nonce that the
/// sink advances each time it starts a new surface generation. A zero
/// `local_id` is the invalid sentinel and never names a real surface.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct SurfaceId {
    pub frame_sink_id: FrameSinkId,
    pub local_id: u32,
}

impl SurfaceId {
    pub const fn new(frame_sink_id: FrameSinkId, local_id: u32) -> SurfaceId {
        SurfaceId {
            frame_sink_id,
            local_id,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.local_id != 0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "SurfaceId({}, {})", self.frame_sink_id, self.local_id)
    }
}

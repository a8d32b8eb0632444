/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! Surface registration, reference counting and garbage collection.
//!
//! Surfaces are produced by independent, possibly crash-prone client
//! processes. The [`SurfaceManager`] tracks which surfaces exist, who
//! references them and when they may be deleted, without ever assuming that
//! a registration message and its inverse arrive in a fixed order: every
//! unregistration path tolerates the mapping already being gone.

mod surface;
mod surface_manager;

pub use surface::Surface;
pub use surface_manager::{SurfaceManager, SurfaceRefs};

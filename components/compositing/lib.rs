/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! The compositor core: flattens committed surfaces into one drawable frame
//! and moves commits between processes over the bulk buffer transport.

mod aggregator;
mod sink;

pub use aggregator::{AggregatedContentFrame, ContentFrameAggregator};
pub use sink::{CommitMessage, CommitProcessor, ContentFrameSink};

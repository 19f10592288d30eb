// Rust RTSP Server
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use futures::channel::oneshot;

use crate::client;
use crate::error::Error;
use crate::track::Tracks;

/// Everything a path's event loop consumes: requests from clients and the
/// manager, signals from the source, and its own timer fires.
///
/// The timer variants carry the generation current when the timer was
/// armed; the loop ignores fires whose generation is stale, which is what
/// cancels a timer.
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub(crate) enum PathMessage {
    /// The reply acknowledges the request; the describe outcome is
    /// delivered later as a client event.
    Describe {
        client: client::Handle,
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<Result<(), Error>>,
    },
    Announce {
        client: client::Handle,
        tracks: Tracks,
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<Result<(), Error>>,
    },
    SetupPlay {
        client: client::Handle,
        track_id: usize,
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<Result<(), Error>>,
    },
    Play {
        client: client::Id,
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<()>,
    },
    Record {
        client: client::Id,
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<()>,
    },
    Remove {
        client: client::Id,
        #[derivative(Debug = "ignore")]
        ret: oneshot::Sender<()>,
    },

    /// From the source: the stream is available with these tracks.
    SourceReady { tracks: Tracks },
    /// From the source: the stream is gone.
    SourceNotReady,

    DescribeTimeout { generation: u64 },
    SourceCloseElapsed { generation: u64 },
    RunOnDemandCloseElapsed { generation: u64 },
    CloseElapsed { generation: u64 },

    /// From the manager: tear the path down.
    Quit,
}

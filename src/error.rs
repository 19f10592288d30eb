// Rust RTSP Server
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::error;
use std::fmt;

/// Errors surfaced to path callers.
///
/// Every request to a path either succeeds or completes with one of these;
/// none is dropped silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The client already has an entry on this path.
    AlreadySubscribed,
    /// Another publisher owns the path, or the path pulls from an external
    /// source.
    AlreadyPublishing(String),
    /// The path has no ready source.
    NotPublishing(String),
    /// Setup requested a track the source does not provide.
    NoSuchTrack(usize),
    /// The source did not become ready within the configured start timeout.
    DescribeTimedOut(String),
    /// The path is shutting down.
    Terminated,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlreadySubscribed => write!(f, "already subscribed"),
            Error::AlreadyPublishing(name) => {
                write!(f, "someone is already publishing to path '{}'", name)
            }
            Error::NotPublishing(name) => write!(f, "no one is publishing to path '{}'", name),
            Error::NoSuchTrack(track_id) => write!(f, "track {} does not exist", track_id),
            Error::DescribeTimedOut(name) => {
                write!(f, "publisher of path '{}' has timed out", name)
            }
            Error::Terminated => write!(f, "terminated"),
        }
    }
}

impl error::Error for Error {}

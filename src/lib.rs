// Rust RTSP Server
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! # RTSP Path Core
//!
//! The path layer of an RTSP server: a *path* is a named rendezvous point
//! (e.g. `/cam1`) through which exactly one source publishes a stream and
//! any number of readers subscribe to it.
//!
//! ## Overview of the components
//!
//! ### `Path`
//!
//! Each path runs as its own cooperative task that owns all of the path's
//! mutable state: the attached clients with their lifecycle states, the
//! current source and its readiness, and the idle timers. [`path::spawn`]
//! starts the task and returns a [`path::Controller`], a cloneable handle
//! whose `async fn`s send a message into the path's event loop and await
//! the reply. All state transitions are serialized by that loop.
//!
//! The path coordinates publisher arrival and departure, readiness
//! propagation to waiting describers, on-demand activation of external
//! source pullers and helper commands, idle-timeout closure, and eviction
//! of readers when the publisher goes away.
//!
//! ### Clients
//!
//! The per-connection protocol handling lives outside this crate. A
//! connection registers itself with a path through a [`client::Handle`]
//! and drains the event queue behind it: describe outcomes arrive as
//! [`client::Event::Describe`] and media as [`client::Event::Frame`].
//!
//! ### Sources
//!
//! A path's source is either a connected publishing client, an external
//! puller fetching from an `rtsp://` or `rtmp://` upstream, or a redirect
//! stub. Pullers are created through a [`source::SourceFactory`] supplied
//! by the application and talk back through the [`source::SourceHandle`]
//! they are given. Frames from the source fan out to readers through a
//! concurrent map without passing through the event loop.
//!
//! ### Manager
//!
//! The collection of paths is owned by the enclosing server, which routes
//! requests to paths by name and consumes [`path::ParentMessage`]
//! notifications: a dynamic path reporting itself removable, or a client
//! whose connection must be terminated.

pub mod client;
pub mod conf;
pub mod error;
pub mod externalcmd;
pub mod path;
pub mod source;
pub mod stats;
pub mod track;

pub use url::Url;

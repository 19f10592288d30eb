use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::prelude::*;
use url::Url;

use crate::client;
use crate::conf::PathConf;
use crate::path::{PathMessage, ReadersMap};
use crate::stats::Stats;
use crate::track::{StreamKind, Tracks};

/// The current origin of a path's stream.
pub(crate) enum Source {
    /// A connected client that announced and records.
    Publisher(client::Id),
    /// An external puller fetching from an upstream URL.
    External(Box<dyn SourceExternal>),
    /// Sentinel for redirect-configured paths.
    Redirect,
}

impl Source {
    pub(crate) fn is_publisher(&self, id: client::Id) -> bool {
        matches!(self, Source::Publisher(publisher) if *publisher == id)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Publisher(id) => f.debug_tuple("Publisher").field(id).finish(),
            Source::External(_) => f.debug_struct("External").finish(),
            Source::Redirect => f.debug_struct("Redirect").finish(),
        }
    }
}

/// Capability of external pullers.
pub trait SourceExternal: Send + 'static {
    /// Ask the puller to stop. Must not block.
    fn close(&mut self);

    /// Wait until the puller has fully stopped.
    fn join(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Creates pullers for `rtsp://` and `rtmp://` sources.
///
/// The concrete pullers live with the protocol implementations outside this
/// crate; a path only ever drives them through [`SourceExternal`] and
/// receives their signals through the [`SourceHandle`] given out here.
pub trait SourceFactory: Send + Sync + 'static {
    fn create(
        &self,
        url: &Url,
        conf: &PathConf,
        path: SourceHandle,
        stats: Arc<Stats>,
    ) -> Box<dyn SourceExternal>;
}

/// Handed to an external puller when it is created.
///
/// Readiness signals go through the path's event loop; frames bypass it and
/// fan out to the current readers directly.
#[derive(Clone)]
pub struct SourceHandle {
    pub(crate) sender: mpsc::Sender<PathMessage>,
    pub(crate) readers: Arc<ReadersMap>,
}

impl SourceHandle {
    /// Report the tracks pulled from upstream; the path becomes ready.
    pub async fn set_ready(&mut self, tracks: Tracks) {
        let _ = self.sender.send(PathMessage::SourceReady { tracks }).await;
    }

    /// Report that the upstream stream is gone.
    pub async fn set_not_ready(&mut self) {
        let _ = self.sender.send(PathMessage::SourceNotReady).await;
    }

    /// Fan a frame out to the current readers without entering the actor.
    pub fn forward_frame(&self, track_id: usize, kind: StreamKind, payload: Bytes) {
        self.readers.forward_frame(track_id, kind, payload);
    }
}

use std::sync::Arc;

use futures::channel::{mpsc, oneshot};
use futures::lock::Mutex;
use futures::prelude::*;

use async_std::task;

use bytes::Bytes;

use crate::client;
use crate::error::Error;
use crate::track::{StreamKind, Tracks};

use super::messages::PathMessage;
use super::readers::ReadersMap;
use super::Id;

/// Handle to a running path.
///
/// Cloneable; all requests are serialized by the path's event loop and each
/// one is answered. Once the path is in teardown every request completes
/// with [`Error::Terminated`].
#[derive(Clone)]
pub struct Controller {
    id: Id,
    name: Arc<String>,
    sender: mpsc::Sender<PathMessage>,
    readers: Arc<ReadersMap>,
    join_handle: Arc<Mutex<Option<task::JoinHandle<()>>>>,
}

impl Controller {
    pub(super) fn new(
        id: Id,
        name: String,
        sender: mpsc::Sender<PathMessage>,
        readers: Arc<ReadersMap>,
        join_handle: task::JoinHandle<()>,
    ) -> Controller {
        Controller {
            id,
            name: Arc::new(name),
            sender,
            readers,
            join_handle: Arc::new(Mutex::new(Some(join_handle))),
        }
    }

    pub fn path_id(&self) -> Id {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request the path's session description.
    ///
    /// An `Ok` reply only acknowledges the request; the SDP, redirect URL
    /// or error arrives on the client's event queue as
    /// [`client::Event::Describe`], at most once.
    pub async fn describe(&mut self, client: client::Handle) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();

        if self
            .sender
            .send(PathMessage::Describe {
                client,
                ret: sender,
            })
            .await
            .is_err()
        {
            return Err(Error::Terminated);
        }

        receiver.await.map_err(|_| Error::Terminated)?
    }

    /// Register the client as the path's publisher.
    pub async fn announce(&mut self, client: client::Handle, tracks: Tracks) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();

        if self
            .sender
            .send(PathMessage::Announce {
                client,
                tracks,
                ret: sender,
            })
            .await
            .is_err()
        {
            return Err(Error::Terminated);
        }

        receiver.await.map_err(|_| Error::Terminated)?
    }

    /// Prepare the client for reading the given track.
    pub async fn setup_play(
        &mut self,
        client: client::Handle,
        track_id: usize,
    ) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();

        if self
            .sender
            .send(PathMessage::SetupPlay {
                client,
                track_id,
                ret: sender,
            })
            .await
            .is_err()
        {
            return Err(Error::Terminated);
        }

        receiver.await.map_err(|_| Error::Terminated)?
    }

    /// Start reading. A no-op unless the client set up before.
    pub async fn play(&mut self, client: client::Id) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();

        if self
            .sender
            .send(PathMessage::Play {
                client,
                ret: sender,
            })
            .await
            .is_err()
        {
            return Err(Error::Terminated);
        }

        receiver.await.map_err(|_| Error::Terminated)
    }

    /// Start publishing. A no-op unless the client announced before.
    pub async fn record(&mut self, client: client::Id) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();

        if self
            .sender
            .send(PathMessage::Record {
                client,
                ret: sender,
            })
            .await
            .is_err()
        {
            return Err(Error::Terminated);
        }

        receiver.await.map_err(|_| Error::Terminated)
    }

    /// Detach the client from the path. Idempotent; acknowledged even for
    /// unknown clients.
    pub async fn remove(&mut self, client: client::Id) -> Result<(), Error> {
        let (sender, receiver) = oneshot::channel();

        if self
            .sender
            .send(PathMessage::Remove {
                client,
                ret: sender,
            })
            .await
            .is_err()
        {
            return Err(Error::Terminated);
        }

        receiver.await.map_err(|_| Error::Terminated)
    }

    /// Fan a frame from the publishing client out to the current readers.
    ///
    /// Bypasses the event loop.
    pub fn forward_frame(&self, track_id: usize, kind: StreamKind, payload: Bytes) {
        self.readers.forward_frame(track_id, kind, payload);
    }

    /// Tear the path down and wait for its task to finish.
    pub async fn close(mut self) {
        let _ = self.sender.send(PathMessage::Quit).await;

        if let Some(join_handle) = self.join_handle.lock().await.take() {
            join_handle.await;
        }
    }
}

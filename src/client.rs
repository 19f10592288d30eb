use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::channel::mpsc;
use log::{trace, warn};
use parking_lot::Mutex;
use url::Url;

use crate::error::Error;
use crate::track::StreamKind;

/// Unique identifier for a specific client
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(uuid::Uuid);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Id {
    pub fn new() -> Self {
        use once_cell::sync::Lazy;
        use std::time;
        use uuid::v1;

        static INIT: Lazy<uuid::v1::Context> = Lazy::new(|| v1::Context::new(0));

        let time = time::SystemTime::now()
            .duration_since(time::UNIX_EPOCH)
            .unwrap();

        let timestamp = v1::Timestamp::from_unix(&*INIT, time.as_secs(), time.subsec_nanos());

        let mut node_id = [0; 6];
        node_id[0..4].copy_from_slice(&std::process::id().to_be_bytes());

        Id(uuid::Uuid::new_v1(timestamp, &node_id).unwrap())
    }
}

/// Outcome of a describe request.
///
/// Exactly one variant is delivered per describe, and at most once.
#[derive(Debug, Clone, PartialEq)]
pub enum DescribeData {
    /// The path is ready; the opaque session description.
    Sdp(Bytes),
    /// The path redirects describers to another server.
    Redirect(Url),
    /// The describe failed.
    Failure(Error),
}

/// Event delivered from a path to the connection owning the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Describe(DescribeData),
    Frame {
        track_id: usize,
        kind: StreamKind,
        payload: Bytes,
    },
}

const EVENT_QUEUE_SIZE: usize = 64;

/// Handle through which a path talks back to a client.
///
/// The per-connection protocol object is outside this crate; it drains the
/// event receiver returned by [`Handle::new`]. Delivery never blocks a path:
/// when the queue is full, frames are dropped (the reader's backpressure
/// policy) and describe outcomes are logged.
#[derive(Clone)]
pub struct Handle {
    id: Id,
    sender: Arc<Mutex<mpsc::Sender<Event>>>,
}

impl Handle {
    pub fn new() -> (Handle, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(EVENT_QUEUE_SIZE);

        (
            Handle {
                id: Id::new(),
                sender: Arc::new(Mutex::new(sender)),
            },
            receiver,
        )
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// Deliver the outcome of a describe.
    pub(crate) fn describe_data(&self, data: DescribeData) {
        let mut sender = self.sender.lock();
        if sender.try_send(Event::Describe(data)).is_err() {
            warn!("Client {}: describe data dropped, event queue unavailable", self.id);
        }
    }

    /// Deliver a media frame.
    pub(crate) fn frame(&self, track_id: usize, kind: StreamKind, payload: Bytes) {
        let mut sender = self.sender.lock();
        if sender
            .try_send(Event::Frame {
                track_id,
                kind,
                payload,
            })
            .is_err()
        {
            trace!("Client {}: frame dropped, event queue full", self.id);
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use futures::prelude::*;

    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(Id::new(), Id::new());
    }

    #[test]
    fn events_arrive_in_order() {
        async_std::task::block_on(async {
            let (handle, mut receiver) = Handle::new();

            handle.describe_data(DescribeData::Failure(Error::Terminated));
            handle.frame(0, StreamKind::Rtp, Bytes::from_static(b"abc"));

            assert_eq!(
                receiver.next().await,
                Some(Event::Describe(DescribeData::Failure(Error::Terminated)))
            );
            assert_eq!(
                receiver.next().await,
                Some(Event::Frame {
                    track_id: 0,
                    kind: StreamKind::Rtp,
                    payload: Bytes::from_static(b"abc"),
                })
            );
        });
    }

    #[test]
    fn full_queue_drops_frames_without_blocking() {
        let (handle, receiver) = Handle::new();

        for i in 0..(EVENT_QUEUE_SIZE + 16) {
            handle.frame(i, StreamKind::Rtp, Bytes::new());
        }

        drop(receiver);
        handle.frame(0, StreamKind::Rtp, Bytes::new());
    }
}

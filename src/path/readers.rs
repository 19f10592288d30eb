use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::client;
use crate::track::StreamKind;

/// Fan-out table from client id to the active reader.
///
/// `forward_frame` is called from the source's frame-delivery path, not
/// through the path's event loop, so the table must tolerate concurrent
/// `add`/`remove`. It never blocks the producer: per-reader delivery uses
/// the client's non-blocking queue.
pub(crate) struct ReadersMap {
    inner: RwLock<HashMap<client::Id, client::Handle>>,
}

impl ReadersMap {
    pub(crate) fn new() -> ReadersMap {
        ReadersMap {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn add(&self, handle: client::Handle) {
        self.inner.write().insert(handle.id(), handle);
    }

    pub(crate) fn remove(&self, id: client::Id) {
        self.inner.write().remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Deliver one frame to every current reader.
    ///
    /// The payload is refcounted, so fan-out does not copy media data.
    pub(crate) fn forward_frame(&self, track_id: usize, kind: StreamKind, payload: Bytes) {
        let readers = self.inner.read();
        for handle in readers.values() {
            handle.frame(track_id, kind, payload.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::prelude::*;

    use crate::client::Event;

    use super::*;

    #[test]
    fn frames_reach_only_current_readers() {
        async_std::task::block_on(async {
            let readers = ReadersMap::new();

            let (reader, mut events) = client::Handle::new();
            let (other, mut other_events) = client::Handle::new();

            readers.add(reader.clone());
            readers.add(other.clone());
            assert_eq!(readers.len(), 2);

            readers.forward_frame(0, StreamKind::Rtp, Bytes::from_static(b"one"));

            assert_eq!(
                events.next().await,
                Some(Event::Frame {
                    track_id: 0,
                    kind: StreamKind::Rtp,
                    payload: Bytes::from_static(b"one"),
                })
            );
            assert_eq!(
                other_events.next().await,
                Some(Event::Frame {
                    track_id: 0,
                    kind: StreamKind::Rtp,
                    payload: Bytes::from_static(b"one"),
                })
            );

            readers.remove(other.id());
            readers.forward_frame(1, StreamKind::Rtcp, Bytes::from_static(b"two"));

            assert_eq!(
                events.next().await,
                Some(Event::Frame {
                    track_id: 1,
                    kind: StreamKind::Rtcp,
                    payload: Bytes::from_static(b"two"),
                })
            );
            assert!(other_events.try_next().is_err());
        });
    }

    #[test]
    fn removing_an_unknown_reader_is_harmless() {
        let readers = ReadersMap::new();
        let (reader, _events) = client::Handle::new();
        readers.remove(reader.id());
        assert_eq!(readers.len(), 0);
    }
}

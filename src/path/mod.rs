use std::fmt;

use futures::channel::mpsc;

use log::warn;

use crate::client;

mod controller;
pub use controller::Controller;

pub(self) mod messages;
pub(crate) use messages::PathMessage;

pub(self) mod readers;
pub(crate) use readers::ReadersMap;

mod task;
pub use task::spawn;

/// Unique identifier for a specific path
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

/// Notifications a path sends up to its manager.
#[derive(Debug)]
pub enum ParentMessage {
    /// The path became removable (dynamic path, no clients, no source);
    /// the manager should drop its handle and [`Controller::close`] it.
    PathClose { id: Id, name: String },
    /// The path evicted this client; the manager must terminate the
    /// connection.
    ClientClose(client::Handle),
}

/// Non-owning back-edge from a path to its manager.
///
/// Notifications are enqueued, never handled inline, so a manager callback
/// can never re-enter the path's event loop.
#[derive(Clone)]
pub struct ParentHandle {
    sender: mpsc::UnboundedSender<ParentMessage>,
}

impl ParentHandle {
    pub fn new() -> (ParentHandle, mpsc::UnboundedReceiver<ParentMessage>) {
        let (sender, receiver) = mpsc::unbounded();
        (ParentHandle { sender }, receiver)
    }

    pub(crate) fn path_close(&self, id: Id, name: &str) {
        if self
            .sender
            .unbounded_send(ParentMessage::PathClose {
                id,
                name: name.to_string(),
            })
            .is_err()
        {
            warn!("Path {}: manager is gone, close notification dropped", name);
        }
    }

    pub(crate) fn client_close(&self, client: client::Handle) {
        let _ = self
            .sender
            .unbounded_send(ParentMessage::ClientClose(client));
    }
}

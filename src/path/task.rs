use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::{mpsc, oneshot};
use futures::prelude::*;

use async_std::task;

use bytes::Bytes;

use log::{debug, info};

use crate::client::{self, DescribeData};
use crate::conf::{self, PathConf};
use crate::error::Error;
use crate::externalcmd::ExternalCmd;
use crate::source::{Source, SourceFactory, SourceHandle};
use crate::stats::Stats;
use crate::track::Tracks;

use super::controller::Controller;
use super::messages::PathMessage;
use super::readers::ReadersMap;
use super::{Id, ParentHandle};

/// Lifecycle state of one client attached to a path.
///
/// `PreRemove` is terminal: the client is out of the logical membership but
/// its entry stays until the client's remove request arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    WaitingDescribe,
    PrePlay,
    Play,
    PreRecord,
    Record,
    PreRemove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    NotReady,
    WaitingDescribe,
    Ready,
}

struct PathTask {
    id: Id,
    name: String,
    conf: Arc<PathConf>,
    source_factory: Arc<dyn SourceFactory>,
    stats: Arc<Stats>,
    parent: ParentHandle,

    /// Self-sender; timers feed their fires back through it.
    sender: mpsc::Sender<PathMessage>,

    clients: HashMap<client::Id, (client::Handle, ClientState)>,
    source: Option<Source>,
    source_state: SourceState,
    /// Only meaningful while the source is ready.
    source_track_count: usize,
    source_sdp: Bytes,
    readers: Arc<ReadersMap>,

    on_init_cmd: Option<ExternalCmd>,
    on_demand_cmd: Option<ExternalCmd>,

    // Arming a timer bumps its generation; a fire carrying a stale
    // generation is ignored. The started flags gate re-arming.
    describe_generation: u64,
    source_close_generation: u64,
    source_close_started: bool,
    run_on_demand_close_generation: u64,
    run_on_demand_close_started: bool,
    close_generation: u64,
    close_started: bool,
}

/// Create a path and spawn its event loop.
///
/// The path runs until the returned controller (or a clone) is
/// [`Controller::close`]d, or, for dynamic paths, until it reports itself
/// removable and the manager closes it.
pub fn spawn(
    conf: Arc<PathConf>,
    name: &str,
    source_factory: Arc<dyn SourceFactory>,
    stats: Arc<Stats>,
    parent: ParentHandle,
) -> Controller {
    let id = Id::new();
    let (sender, receiver) = mpsc::channel(0);
    let readers = Arc::new(ReadersMap::new());

    let pa = PathTask {
        id,
        name: name.to_string(),
        conf,
        source_factory,
        stats,
        parent,
        sender: sender.clone(),
        clients: HashMap::new(),
        source: None,
        source_state: SourceState::NotReady,
        source_track_count: 0,
        source_sdp: Bytes::new(),
        readers: Arc::clone(&readers),
        on_init_cmd: None,
        on_demand_cmd: None,
        describe_generation: 0,
        source_close_generation: 0,
        source_close_started: false,
        run_on_demand_close_generation: 0,
        run_on_demand_close_started: false,
        close_generation: 0,
        close_started: false,
    };

    let join_handle = task::spawn(task_fn(pa, receiver));

    Controller::new(id, name.to_string(), sender, readers, join_handle)
}

async fn task_fn(mut pa: PathTask, mut receiver: mpsc::Receiver<PathMessage>) {
    info!("Path {}: started", pa.name);

    if matches!(pa.conf.source, conf::Source::Redirect) {
        pa.source = Some(Source::Redirect);
    } else if pa.conf.source.is_external() && !pa.conf.source_on_demand {
        pa.start_external_source();
    }

    if let Some(cmdline) = pa.conf.run_on_init.clone() {
        info!("Path {}: on init command started", pa.name);
        pa.on_init_cmd = Some(ExternalCmd::new(
            &cmdline,
            pa.conf.run_on_init_restart,
            &pa.name,
        ));
    }

    let mut notified_close = false;

    loop {
        let msg = match receiver.next().await {
            Some(msg) => msg,
            None => break,
        };

        match msg {
            PathMessage::Describe { client, ret } => pa.on_describe(client, ret),
            PathMessage::Announce {
                client,
                tracks,
                ret,
            } => {
                let _ = ret.send(pa.on_announce(client, tracks));
            }
            PathMessage::SetupPlay {
                client,
                track_id,
                ret,
            } => {
                let _ = ret.send(pa.on_setup_play(client, track_id));
            }
            PathMessage::Play { client, ret } => {
                pa.on_play(client);
                let _ = ret.send(());
            }
            PathMessage::Record { client, ret } => {
                pa.on_record(client);
                let _ = ret.send(());
            }
            PathMessage::Remove { client, ret } => {
                pa.on_remove(client);
                let _ = ret.send(());
            }
            PathMessage::SourceReady { tracks } => {
                pa.source_sdp = tracks.write();
                pa.source_track_count = tracks.len();
                pa.on_source_set_ready();
            }
            PathMessage::SourceNotReady => pa.on_source_set_not_ready(),
            PathMessage::DescribeTimeout { generation } => {
                if generation == pa.describe_generation {
                    pa.on_describe_timeout();
                }
            }
            PathMessage::SourceCloseElapsed { generation } => {
                if pa.source_close_started && generation == pa.source_close_generation {
                    pa.on_source_close_elapsed();
                }
            }
            PathMessage::RunOnDemandCloseElapsed { generation } => {
                if pa.run_on_demand_close_started && generation == pa.run_on_demand_close_generation
                {
                    pa.on_run_on_demand_close_elapsed();
                }
            }
            PathMessage::CloseElapsed { generation } => {
                if pa.close_started && generation == pa.close_generation {
                    debug!("Path {}: idle, asking the manager to close it", pa.name);
                    pa.parent.path_close(pa.id, &pa.name);
                    notified_close = true;
                    break;
                }
            }
            PathMessage::Quit => break,
        }
    }

    // After announcing the close, keep unblocking callers until the
    // manager's quit arrives.
    if notified_close {
        while let Some(msg) = receiver.next().await {
            if let PathMessage::Quit = msg {
                break;
            }
            reply_terminated(msg);
        }
    }

    let name = pa.name.clone();
    pa.teardown(receiver).await;

    info!("Path {}: stopped", name);
}

/// Answer a request on behalf of a path that is going away.
fn reply_terminated(msg: PathMessage) {
    match msg {
        PathMessage::Describe { ret, .. } => {
            let _ = ret.send(Err(Error::Terminated));
        }
        PathMessage::Announce { ret, .. } => {
            let _ = ret.send(Err(Error::Terminated));
        }
        PathMessage::SetupPlay { ret, .. } => {
            let _ = ret.send(Err(Error::Terminated));
        }
        PathMessage::Play { ret, .. }
        | PathMessage::Record { ret, .. }
        | PathMessage::Remove { ret, .. } => {
            let _ = ret.send(());
        }
        _ => (),
    }
}

impl PathTask {
    fn has_external_source(&self) -> bool {
        self.conf.source.is_external()
    }

    fn start_external_source(&mut self) {
        if let Some(url) = self.conf.source.url() {
            debug!("Path {}: external source started", self.name);

            let handle = SourceHandle {
                sender: self.sender.clone(),
                readers: Arc::clone(&self.readers),
            };
            let source = self
                .source_factory
                .create(url, &self.conf, handle, Arc::clone(&self.stats));
            self.source = Some(Source::External(source));
        }
    }

    fn source_is(&self, id: client::Id) -> bool {
        matches!(&self.source, Some(source) if source.is_publisher(id))
    }

    fn has_clients(&self) -> bool {
        self.clients
            .values()
            .any(|(_, state)| *state != ClientState::PreRemove)
    }

    fn has_clients_not_source(&self) -> bool {
        self.clients
            .iter()
            .any(|(id, (_, state))| *state != ClientState::PreRemove && !self.source_is(*id))
    }

    fn add_client(&mut self, handle: client::Handle, state: ClientState) {
        let id = handle.id();
        if self.clients.insert(id, (handle, state)).is_some() {
            panic!("client {} added twice", id);
        }
    }

    /// Take the client out of the logical membership.
    ///
    /// The map entry survives as `PreRemove` until the client's remove
    /// request arrives. If the client was the path's publisher, every
    /// remaining reader is evicted too.
    fn remove_client(&mut self, id: client::Id) {
        let state = match self.clients.get_mut(&id) {
            Some((_, state)) => std::mem::replace(state, ClientState::PreRemove),
            None => return,
        };

        match state {
            ClientState::Play => {
                self.stats.count_readers.fetch_sub(1, Ordering::SeqCst);
                self.readers.remove(id);
            }
            ClientState::Record => {
                self.stats.count_publishers.fetch_sub(1, Ordering::SeqCst);
                self.on_source_set_not_ready();
            }
            _ => (),
        }

        if self.source_is(id) {
            self.source = None;

            // the publisher vanished: evict everyone reading or about to
            let others: Vec<(client::Id, client::Handle)> = self
                .clients
                .iter()
                .filter(|(_, (_, state))| {
                    *state != ClientState::PreRemove && *state != ClientState::WaitingDescribe
                })
                .map(|(id, (handle, _))| (*id, handle.clone()))
                .collect();
            for (other, handle) in others {
                self.remove_client(other);
                self.parent.client_close(handle);
            }
        }

        self.schedule_source_close();
        self.schedule_run_on_demand_close();
        self.schedule_close();
    }

    fn on_source_set_ready(&mut self) {
        if self.source_state == SourceState::WaitingDescribe {
            // cancel the describe timer
            self.describe_generation += 1;
        }

        self.source_state = SourceState::Ready;

        let waiting: Vec<(client::Id, client::Handle)> = self
            .clients
            .iter()
            .filter(|(_, (_, state))| *state == ClientState::WaitingDescribe)
            .map(|(id, (handle, _))| (*id, handle.clone()))
            .collect();
        for (id, handle) in waiting {
            self.remove_client(id);
            handle.describe_data(DescribeData::Sdp(self.source_sdp.clone()));
        }

        self.schedule_source_close();
        self.schedule_run_on_demand_close();
        self.schedule_close();
    }

    fn on_source_set_not_ready(&mut self) {
        self.source_state = SourceState::NotReady;

        // evict everyone reading or waiting to read
        let snapshot: Vec<(client::Id, client::Handle, ClientState)> = self
            .clients
            .iter()
            .map(|(id, (handle, state))| (*id, handle.clone(), *state))
            .collect();
        for (id, handle, state) in snapshot {
            if state == ClientState::WaitingDescribe {
                panic!("a describe cannot be pending while the source becomes unready");
            }
            if state != ClientState::PreRemove && !self.source_is(id) {
                self.remove_client(id);
                self.parent.client_close(handle);
            }
        }
    }

    fn on_describe(&mut self, client: client::Handle, ret: oneshot::Sender<Result<(), Error>>) {
        if self.clients.contains_key(&client.id()) {
            let _ = ret.send(Err(Error::AlreadySubscribed));
            return;
        }

        // acknowledge immediately; the outcome goes out as a client event
        let _ = ret.send(Ok(()));

        debug!("Path {}: describe from client {}", self.name, client.id());

        // a new describer keeps the on-demand source and command alive
        if self.source_close_started {
            self.source_close_started = false;
            self.source_close_generation += 1;
        }
        if self.run_on_demand_close_started {
            self.run_on_demand_close_started = false;
            self.run_on_demand_close_generation += 1;
        }

        if self.has_external_source() && self.source.is_none() {
            self.start_external_source();

            if self.source_state != SourceState::WaitingDescribe {
                self.start_describe_timer(self.conf.source_on_demand_start_timeout);
                self.source_state = SourceState::WaitingDescribe;
            }
        }

        if let Some(cmdline) = self.conf.run_on_demand.clone() {
            if self.on_demand_cmd.is_none() {
                info!("Path {}: on demand command started", self.name);
                self.on_demand_cmd = Some(ExternalCmd::new(
                    &cmdline,
                    self.conf.run_on_demand_restart,
                    &self.name,
                ));

                if self.source_state != SourceState::WaitingDescribe {
                    self.start_describe_timer(self.conf.run_on_demand_start_timeout);
                    self.source_state = SourceState::WaitingDescribe;
                }
            }
        }

        if matches!(self.source, Some(Source::Redirect)) {
            let redirect = match self.conf.source_redirect.clone() {
                Some(redirect) => redirect,
                None => panic!("redirect path '{}' has no redirect target", self.name),
            };

            self.add_client(client.clone(), ClientState::PreRemove);
            self.remove_client(client.id());
            client.describe_data(DescribeData::Redirect(redirect));
            return;
        }

        match self.source_state {
            SourceState::Ready => {
                self.add_client(client.clone(), ClientState::PreRemove);
                self.remove_client(client.id());
                client.describe_data(DescribeData::Sdp(self.source_sdp.clone()));
            }
            SourceState::WaitingDescribe => {
                self.add_client(client, ClientState::WaitingDescribe);
            }
            SourceState::NotReady => {
                self.add_client(client.clone(), ClientState::PreRemove);
                self.remove_client(client.id());
                client.describe_data(DescribeData::Failure(Error::NotPublishing(
                    self.name.clone(),
                )));
            }
        }
    }

    fn on_describe_timeout(&mut self) {
        let waiting: Vec<(client::Id, client::Handle)> = self
            .clients
            .iter()
            .filter(|(_, (_, state))| *state == ClientState::WaitingDescribe)
            .map(|(id, (handle, _))| (*id, handle.clone()))
            .collect();
        for (id, handle) in waiting {
            self.remove_client(id);
            handle.describe_data(DescribeData::Failure(Error::DescribeTimedOut(
                self.name.clone(),
            )));
        }

        // reset after the removals, so the schedule checks run once
        // against the quiescent state
        self.source_state = SourceState::NotReady;

        self.schedule_source_close();
        self.schedule_run_on_demand_close();
        self.schedule_close();
    }

    fn on_setup_play(&mut self, client: client::Handle, track_id: usize) -> Result<(), Error> {
        if self.source_state != SourceState::Ready {
            return Err(Error::NotPublishing(self.name.clone()));
        }

        if track_id >= self.source_track_count {
            return Err(Error::NoSuchTrack(track_id));
        }

        if !self.clients.contains_key(&client.id()) {
            // a new reader keeps the on-demand source and command alive
            if self.source_close_started {
                self.source_close_started = false;
                self.source_close_generation += 1;
            }
            if self.run_on_demand_close_started {
                self.run_on_demand_close_started = false;
                self.run_on_demand_close_generation += 1;
            }

            self.add_client(client, ClientState::PrePlay);
        }

        Ok(())
    }

    fn on_play(&mut self, id: client::Id) {
        if let Some((handle, state)) = self.clients.get_mut(&id) {
            if *state != ClientState::PrePlay {
                return;
            }

            self.stats.count_readers.fetch_add(1, Ordering::SeqCst);
            *state = ClientState::Play;
            self.readers.add(handle.clone());

            debug!("Path {}: client {} is reading", self.name, id);
        }
    }

    fn on_announce(&mut self, client: client::Handle, tracks: Tracks) -> Result<(), Error> {
        if self.clients.contains_key(&client.id()) {
            return Err(Error::AlreadySubscribed);
        }

        if self.source.is_some() || self.has_external_source() {
            return Err(Error::AlreadyPublishing(self.name.clone()));
        }

        debug!(
            "Path {}: client {} announced {} tracks",
            self.name,
            client.id(),
            tracks.len()
        );

        let id = client.id();
        self.add_client(client, ClientState::PreRecord);

        self.source = Some(Source::Publisher(id));
        self.source_track_count = tracks.len();
        self.source_sdp = tracks.write();
        Ok(())
    }

    fn on_record(&mut self, id: client::Id) {
        match self.clients.get_mut(&id) {
            Some((_, state)) if *state == ClientState::PreRecord => {
                self.stats.count_publishers.fetch_add(1, Ordering::SeqCst);
                *state = ClientState::Record;
            }
            _ => return,
        }

        info!("Path {}: client {} is publishing", self.name, id);

        self.on_source_set_ready();
    }

    fn on_remove(&mut self, id: client::Id) {
        let state = match self.clients.get(&id) {
            Some((_, state)) => *state,
            None => return,
        };

        if state != ClientState::PreRemove {
            self.remove_client(id);
        }

        self.clients.remove(&id);

        debug!("Path {}: client {} removed", self.name, id);
    }

    fn on_source_close_elapsed(&mut self) {
        self.source_close_started = false;

        info!("Path {}: external source stopped, path was idle", self.name);

        match self.source.take() {
            Some(Source::External(mut source)) => {
                source.close();
                task::spawn(source.join());
            }
            _ => panic!("idle close fired without an external source"),
        }

        self.schedule_close();
    }

    fn on_run_on_demand_close_elapsed(&mut self) {
        self.run_on_demand_close_started = false;

        info!("Path {}: on demand command stopped", self.name);
        if let Some(mut cmd) = self.on_demand_cmd.take() {
            cmd.close();
        }

        self.schedule_close();
    }

    fn schedule_source_close(&mut self) {
        if !self.has_external_source() || !self.conf.source_on_demand || self.source.is_none() {
            return;
        }

        if self.source_close_started
            || self.source_state == SourceState::WaitingDescribe
            || self.has_clients()
        {
            return;
        }

        self.source_close_generation += 1;
        self.source_close_started = true;
        self.fire_after(
            self.conf.source_on_demand_close_after,
            PathMessage::SourceCloseElapsed {
                generation: self.source_close_generation,
            },
        );
    }

    fn schedule_run_on_demand_close(&mut self) {
        if self.conf.run_on_demand.is_none() || self.on_demand_cmd.is_none() {
            return;
        }

        if self.run_on_demand_close_started
            || self.source_state == SourceState::WaitingDescribe
            || self.has_clients_not_source()
        {
            return;
        }

        self.run_on_demand_close_generation += 1;
        self.run_on_demand_close_started = true;
        self.fire_after(
            self.conf.run_on_demand_close_after,
            PathMessage::RunOnDemandCloseElapsed {
                generation: self.run_on_demand_close_generation,
            },
        );
    }

    fn schedule_close(&mut self) {
        if self.close_started
            || self.conf.regexp.is_none()
            || self.has_clients()
            || self.source.is_some()
        {
            return;
        }

        self.close_generation += 1;
        self.close_started = true;
        // zero duration: the fire still travels through the inbox, so
        // requests already queued in this tick are served first
        self.fire_after(
            Duration::from_secs(0),
            PathMessage::CloseElapsed {
                generation: self.close_generation,
            },
        );
    }

    fn start_describe_timer(&mut self, timeout: Duration) {
        self.describe_generation += 1;
        self.fire_after(
            timeout,
            PathMessage::DescribeTimeout {
                generation: self.describe_generation,
            },
        );
    }

    fn fire_after(&self, after: Duration, msg: PathMessage) {
        let mut sender = self.sender.clone();
        task::spawn(async move {
            task::sleep(after).await;
            let _ = sender.send(msg).await;
        });
    }

    async fn teardown(mut self, mut receiver: mpsc::Receiver<PathMessage>) {
        // render any in-flight timer fire stale
        self.describe_generation += 1;
        self.source_close_generation += 1;
        self.source_close_started = false;
        self.run_on_demand_close_generation += 1;
        self.run_on_demand_close_started = false;
        self.close_generation += 1;
        self.close_started = false;

        if let Some(mut cmd) = self.on_init_cmd.take() {
            info!("Path {}: on init command stopped", self.name);
            cmd.close();
        }

        match self.source.take() {
            Some(Source::External(mut source)) => {
                source.close();
                source.join().await;
            }
            other => self.source = other,
        }

        if let Some(mut cmd) = self.on_demand_cmd.take() {
            info!("Path {}: on demand command stopped", self.name);
            cmd.close();
        }

        // drain the counters of everyone still attached and have the
        // manager terminate their connections
        let snapshot: Vec<(client::Id, client::Handle, ClientState)> = self
            .clients
            .iter()
            .map(|(id, (handle, state))| (*id, handle.clone(), *state))
            .collect();
        for (id, handle, state) in snapshot {
            if state == ClientState::PreRemove {
                continue;
            }

            match state {
                ClientState::Play => {
                    self.stats.count_readers.fetch_sub(1, Ordering::SeqCst);
                    self.readers.remove(id);
                }
                ClientState::Record => {
                    self.stats.count_publishers.fetch_sub(1, Ordering::SeqCst);
                }
                _ => (),
            }

            self.parent.client_close(handle);
        }
        self.clients.clear();

        // unblock every caller still in flight
        receiver.close();
        while let Some(msg) = receiver.next().await {
            reply_terminated(msg);
        }
    }
}

//! Room coordinator: membership registry and broadcast fan-out.
//!
//! A single task owns the membership map and is the only code that ever
//! mutates it. Everything else talks to that task through the three
//! channels behind a cloneable [`Hub`] handle:
//!
//! - register: adds an endpoint and announces the join to everyone,
//!   the newcomer included.
//! - unregister: idempotent removal, closes the endpoint's queue and
//!   announces the leave to the remaining members.
//! - broadcast: stamps the message with the server clock and offers it
//!   to every outbound queue without waiting. A full queue gets its
//!   endpoint evicted so one slow client never stalls the room.

use std::collections::HashMap;
use std::fmt;

use quiver_protocol::constants::BROADCAST_QUEUE_SIZE;
use quiver_protocol::{Clock, Message};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Identity assigned to an endpoint by the acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the Hub needs to track an endpoint.
///
/// `queue` must be the only sender of the endpoint's outbound queue: the Hub
/// closes the queue by dropping it.
#[derive(Debug)]
pub struct Registration {
    pub id: EndpointId,
    pub name: String,
    pub queue: mpsc::Sender<Message>,
}

struct RegisterRequest {
    registration: Registration,
    done: oneshot::Sender<()>,
}

/// Handle to the coordinating task.
///
/// Cheap to clone. The task keeps running while any handle is alive, or
/// until the cancellation token passed to [`Hub::spawn`] fires.
#[derive(Clone)]
pub struct Hub {
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::UnboundedSender<EndpointId>,
    broadcast_tx: mpsc::Sender<Message>,
    members: watch::Receiver<usize>,
}

impl Hub {
    /// Starts the coordinating task.
    pub fn spawn<C: Clock>(clock: C, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (register_tx, register_rx) = mpsc::channel(BROADCAST_QUEUE_SIZE);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_SIZE);
        let (count_tx, count_rx) = watch::channel(0);

        let state = HubState {
            members: HashMap::new(),
            clock: Box::new(clock),
            count: count_tx,
        };
        let task = tokio::spawn(state.run(register_rx, unregister_rx, broadcast_rx, cancel));

        let hub = Self {
            register_tx,
            unregister_tx,
            broadcast_tx,
            members: count_rx,
        };
        (hub, task)
    }

    /// Adds an endpoint to the room.
    ///
    /// Returns once the coordinating task has recorded the member and queued
    /// the join notice, so anything the endpoint broadcasts afterwards is
    /// ordered after its own join.
    pub async fn register(&self, registration: Registration) {
        let id = registration.id;
        let (done, processed) = oneshot::channel();
        let request = RegisterRequest { registration, done };
        if self.register_tx.send(request).await.is_err() {
            debug!(endpoint = %id, "hub stopped, dropping registration");
            return;
        }
        let _ = processed.await;
    }

    /// Removes an endpoint from the room. No-op for non-members.
    ///
    /// Synchronous so it can run from drop guards.
    pub fn unregister(&self, id: EndpointId) {
        if self.unregister_tx.send(id).is_err() {
            debug!(endpoint = %id, "hub stopped, dropping unregistration");
        }
    }

    /// Submits a message for delivery to every member.
    ///
    /// Any timestamp already on the message is replaced with the server
    /// clock when the Hub picks it up.
    pub async fn broadcast(&self, message: Message) {
        if self.broadcast_tx.send(message).await.is_err() {
            debug!("hub stopped, dropping broadcast");
        }
    }

    /// Number of endpoints currently in the room.
    pub fn member_count(&self) -> usize {
        *self.members.borrow()
    }

    /// Read-only view of the membership size, updated by the Hub task.
    pub fn watch_members(&self) -> watch::Receiver<usize> {
        self.members.clone()
    }
}

struct Member {
    name: String,
    queue: mpsc::Sender<Message>,
}

/// State owned by the coordinating task.
struct HubState {
    members: HashMap<EndpointId, Member>,
    clock: Box<dyn Clock>,
    count: watch::Sender<usize>,
}

impl HubState {
    async fn run(
        mut self,
        mut register_rx: mpsc::Receiver<RegisterRequest>,
        mut unregister_rx: mpsc::UnboundedReceiver<EndpointId>,
        mut broadcast_rx: mpsc::Receiver<Message>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("hub cancelled");
                    break;
                }
                Some(request) = register_rx.recv() => {
                    self.register(request.registration);
                    let _ = request.done.send(());
                }
                // Every `Hub` handle owns an unregister sender.
                id = unregister_rx.recv() => match id {
                    Some(id) => self.unregister(id),
                    None => {
                        debug!("all hub handles dropped");
                        break;
                    }
                },
                Some(message) = broadcast_rx.recv() => self.broadcast(message),
            }
        }

        // Dropping the members closes every outbound queue.
        info!(members = self.members.len(), "hub stopped");
        self.members.clear();
        self.publish_count();
    }

    fn register(&mut self, registration: Registration) {
        let Registration { id, name, queue } = registration;
        info!(endpoint = %id, username = %name, "client joined");
        let notice = Message::joined(&name);
        self.members.insert(id, Member { name, queue });
        self.publish_count();
        self.broadcast(notice);
    }

    fn unregister(&mut self, id: EndpointId) {
        let Some(member) = self.members.remove(&id) else {
            trace!(endpoint = %id, "unregister for non-member ignored");
            return;
        };
        info!(endpoint = %id, username = %member.name, "client left");
        let notice = Message::left(&member.name);
        self.publish_count();
        // Closes the endpoint's queue.
        drop(member);
        self.broadcast(notice);
    }

    fn broadcast(&mut self, message: Message) {
        let message = message.stamped(self.clock.now_label());
        let before = self.members.len();

        self.members
            .retain(|id, member| match member.queue.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    info!(endpoint = %id, username = %member.name, "outbound queue full, evicting");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(endpoint = %id, username = %member.name, "writer gone, pruning");
                    false
                }
            });

        if self.members.len() != before {
            self.publish_count();
        }
    }

    fn publish_count(&self) {
        self.count.send_replace(self.members.len());
    }
}

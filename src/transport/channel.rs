/*!
 * Channel Transport
 * In-process transport over flume channels
 *
 * Each call carries its own bounded reply channel; a reply counts as delivered
 * when the caller is still waiting on that channel. Relays are unbounded
 * channels of poll events registered by clients.
 */

use super::traits::{PokeTarget, Transport};
use super::types::{Call, Delivery, Endpoint, Incoming, Poke, PollEvent, Reply, Request};
use crate::core::errors::HandleError;
use crate::core::types::{HandleResult, Pid};
use ahash::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

enum Envelope {
    Call(Call, flume::Sender<Reply>),
    Poke(Poke),
}

type RelayMap = Arc<Mutex<HashMap<Endpoint, flume::Sender<PollEvent>>>>;

/// Server side of the channel transport
pub struct ChannelTransport {
    inbox: flume::Receiver<Envelope>,
    sender: flume::Sender<Envelope>,
    in_flight: HashMap<Endpoint, flume::Sender<Reply>>,
    relays: RelayMap,
    next_endpoint: Arc<AtomicU64>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        let (sender, inbox) = flume::unbounded();
        Self {
            inbox,
            sender,
            in_flight: HashMap::default(),
            relays: Arc::new(Mutex::new(HashMap::default())),
            next_endpoint: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Client stub calling in as `pid`
    pub fn client(&self, pid: Pid) -> ChannelClient {
        ChannelClient {
            pid,
            sender: self.sender.clone(),
            relays: Arc::clone(&self.relays),
            next_endpoint: Arc::clone(&self.next_endpoint),
        }
    }

    /// Calls received but not yet answered
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ChannelTransport {
    fn receive(&mut self) -> HandleResult<Incoming> {
        match self.inbox.recv() {
            Ok(Envelope::Call(call, reply_tx)) => {
                self.in_flight.insert(call.endpoint, reply_tx);
                Ok(Incoming::Call(call))
            }
            Ok(Envelope::Poke(poke)) => Ok(Incoming::Poke(poke)),
            Err(_) => Err(HandleError::Transport("inbox disconnected".into())),
        }
    }

    fn reply(&mut self, endpoint: Endpoint, reply: Reply) -> Delivery {
        match self.in_flight.remove(&endpoint) {
            Some(tx) if tx.send(reply).is_ok() => Delivery::Delivered,
            Some(_) => {
                debug!(%endpoint, "Caller went away before reply");
                Delivery::Failed
            }
            None => Delivery::Failed,
        }
    }

    fn push_event(&mut self, relay: Endpoint, event: PollEvent) -> Delivery {
        let mut relays = self.relays.lock();
        match relays.get(&relay) {
            Some(tx) if tx.send(event).is_ok() => Delivery::Delivered,
            Some(_) => {
                relays.remove(&relay);
                Delivery::Failed
            }
            None => Delivery::Failed,
        }
    }

    fn is_live(&self, endpoint: Endpoint) -> bool {
        self.in_flight
            .get(&endpoint)
            .map(|tx| !tx.is_disconnected())
            .unwrap_or(false)
    }

    fn abandon(&mut self, endpoint: Endpoint) {
        self.in_flight.remove(&endpoint);
    }

    fn poke_target(&self) -> Box<dyn PokeTarget> {
        Box::new(ChannelPokeTarget {
            sender: self.sender.clone(),
        })
    }
}

struct ChannelPokeTarget {
    sender: flume::Sender<Envelope>,
}

impl PokeTarget for ChannelPokeTarget {
    fn deliver(&self, poke: Poke) -> HandleResult<()> {
        self.sender
            .send(Envelope::Poke(poke))
            .map_err(|_| HandleError::Transport("dispatch loop gone".into()))
    }
}

/// Client side of the channel transport
#[derive(Clone)]
pub struct ChannelClient {
    pid: Pid,
    sender: flume::Sender<Envelope>,
    relays: RelayMap,
    next_endpoint: Arc<AtomicU64>,
}

impl ChannelClient {
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Same channels, different caller identity
    pub fn as_pid(&self, pid: Pid) -> ChannelClient {
        ChannelClient {
            pid,
            ..self.clone()
        }
    }

    /// Blocking call; parked calls return once the service answers them
    pub fn call(&self, request: Request) -> HandleResult<Reply> {
        let (tx, rx) = flume::bounded(1);
        let endpoint = self.allocate_endpoint();
        self.sender
            .send(Envelope::Call(Call::new(self.pid, endpoint, request), tx))
            .map_err(|_| HandleError::Transport("service gone".into()))?;
        rx.recv()
            .map_err(|_| HandleError::Transport("call abandoned".into()))
    }

    /// Register an event relay and return its endpoint
    pub fn relay(&self) -> (Endpoint, flume::Receiver<PollEvent>) {
        let (tx, rx) = flume::unbounded();
        let endpoint = self.allocate_endpoint();
        self.relays.lock().insert(endpoint, tx);
        (endpoint, rx)
    }

    fn allocate_endpoint(&self) -> Endpoint {
        Endpoint(self.next_endpoint.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abandoned_call_leaves_in_flight() {
        let mut transport = ChannelTransport::new();
        let client = transport.client(4);
        let caller = std::thread::spawn(move || client.call(Request::Touch { handle: 0 }));

        let call = match transport.receive().unwrap() {
            Incoming::Call(call) => call,
            Incoming::Poke(poke) => panic!("unexpected poke {poke:?}"),
        };
        assert_eq!(transport.in_flight(), 1);
        assert!(transport.is_live(call.endpoint));

        transport.abandon(call.endpoint);
        assert_eq!(transport.in_flight(), 0);
        assert!(!transport.is_live(call.endpoint));
        // Dropping the reply sender releases the caller
        assert!(caller.join().unwrap().is_err());
    }
}

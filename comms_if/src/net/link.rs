//! # Operator link
//!
//! A message on the operator link is a `(topic, payload)` pair of strings. On the wire each
//! message is a two frame zmq multipart, topic first, published on PUB/SUB sockets. The robot
//! binds both sockets so it doesn't depend on the drive station being up.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, atomic::{AtomicBool, Ordering}}
};

use super::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A non-blocking, message based link to the other end.
pub trait Link {
    /// Publish a message. Never blocks, messages to an absent peer are dropped.
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), LinkError>;

    /// Take the next pending message, or `Ok(None)` if there are none right now.
    fn receive(&mut self) -> Result<Option<(String, String)>, LinkError>;

    /// Whether a peer is connected, as far as the transport can tell.
    fn is_connected(&self) -> bool;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// [`Link`] over a pair of zmq PUB/SUB sockets.
pub struct ZmqLink {
    publisher: MonitoredSocket,
    subscriber: MonitoredSocket,
}

/// In-process [`Link`], created in connected pairs. Used to exercise the robot without a network.
#[derive(Clone)]
pub struct MemLink {
    inbox: Arc<Mutex<VecDeque<(String, String)>>>,
    outbox: Arc<Mutex<VecDeque<(String, String)>>>,
    connected: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Which end of the link a [`ZmqLink`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Binds, publishes telemetry and subscribes to commands
    Robot,

    /// Connects, publishes commands and subscribes to telemetry
    Console,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not subscribe to topics: {0}")]
    SubscribeError(zmq::Error),

    #[error("Could not send a message: {0}")]
    SendError(zmq::Error),

    #[error("Could not receive a message: {0}")]
    RecvError(zmq::Error),

    #[error("Expected a two part message but got {0} parts")]
    MalformedMessage(usize),

    #[error("Received a message which was not valid UTF-8")]
    NonUtf8Message,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ZmqLink {
    /// Open the link.
    ///
    /// The `Robot` role binds to the endpoints in `params`. The `Console` role connects to them,
    /// so its endpoints must name the robot's host rather than a wildcard.
    pub fn new(
        ctx: &zmq::Context,
        role: LinkRole,
        params: &NetParams
    ) -> Result<Self, LinkError> {
        let bind = role == LinkRole::Robot;

        let (pub_endpoint, sub_endpoint) = match role {
            LinkRole::Robot => (&params.tm_endpoint, &params.tc_endpoint),
            LinkRole::Console => (&params.tc_endpoint, &params.tm_endpoint),
        };

        let publisher = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            SocketOptions {
                bind,
                linger: 1,
                reconnect_ivl: 250,
                heartbeat_ivl: 500,
                heartbeat_ttl: 1500,
                heartbeat_timeout: 1500,
                ..Default::default()
            },
            pub_endpoint
        )?;

        let subscriber = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            SocketOptions {
                bind,
                linger: 1,
                reconnect_ivl: 250,
                heartbeat_ivl: 500,
                heartbeat_ttl: 1500,
                heartbeat_timeout: 1500,
                ..Default::default()
            },
            sub_endpoint
        )?;

        subscriber.set_subscribe(b"")
            .map_err(LinkError::SubscribeError)?;

        Ok(Self {
            publisher,
            subscriber
        })
    }
}

impl Link for ZmqLink {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), LinkError> {
        match self.publisher.send_multipart(vec![topic.as_bytes(), payload.as_bytes()], zmq::DONTWAIT) {
            Ok(()) => Ok(()),
            // PUB sockets drop rather than block at the high water mark, EAGAIN is not a failure
            Err(zmq::Error::EAGAIN) => Ok(()),
            Err(e) => Err(LinkError::SendError(e))
        }
    }

    fn receive(&mut self) -> Result<Option<(String, String)>, LinkError> {
        let mut parts = match self.subscriber.recv_multipart(zmq::DONTWAIT) {
            Ok(p) => p,
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(LinkError::RecvError(e))
        };

        if parts.len() != 2 {
            return Err(LinkError::MalformedMessage(parts.len()))
        }

        let payload = parts.pop().unwrap_or_default();
        let topic = parts.pop().unwrap_or_default();

        match (String::from_utf8(topic), String::from_utf8(payload)) {
            (Ok(t), Ok(p)) => Ok(Some((t, p))),
            _ => Err(LinkError::NonUtf8Message)
        }
    }

    fn is_connected(&self) -> bool {
        self.subscriber.connected() || self.publisher.connected()
    }
}

impl MemLink {
    /// Create two connected ends of a link.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Mutex::new(VecDeque::new()));
        let b_to_a = Arc::new(Mutex::new(VecDeque::new()));
        let connected = Arc::new(AtomicBool::new(true));

        (
            Self {
                inbox: b_to_a.clone(),
                outbox: a_to_b.clone(),
                connected: connected.clone()
            },
            Self {
                inbox: a_to_b,
                outbox: b_to_a,
                connected
            }
        )
    }

    /// Mark both ends as (dis)connected. Messages published while disconnected are dropped.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Drain every pending inbound message.
    pub fn drain(&mut self) -> Vec<(String, String)> {
        match self.inbox.lock() {
            Ok(mut q) => q.drain(..).collect(),
            Err(_) => Vec::new()
        }
    }
}

impl Link for MemLink {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Ok(())
        }

        if let Ok(mut q) = self.outbox.lock() {
            q.push_back((topic.to_string(), payload.to_string()));
        }

        Ok(())
    }

    fn receive(&mut self) -> Result<Option<(String, String)>, LinkError> {
        Ok(self.inbox.lock().ok().and_then(|mut q| q.pop_front()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

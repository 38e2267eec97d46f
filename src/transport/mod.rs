//! Transport layer for the realtime client
//!
//! A transport owns the byte-level connection to the controller and turns
//! it into an ordered sequence of [`SocketEvent`]s plus an outbound write
//! channel. The TCP implementation reconnects forever with Fibonacci
//! backoff; the mock implementation lets tests inject events directly.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use crate::Result;

mod backoff;
mod mock;
mod socket;

pub use backoff::FibonacciBackoff;
pub use mock::{MockTransport, MockTransportHandle};
pub use socket::{ReconnectingSocket, SocketOptions};

/// Events emitted by a transport, in the order the socket produced them
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connected,
    Reconnecting { attempt: u32, delay: Duration },
    Disconnected { error: Option<String> },
    Data(Vec<u8>),
    TimedOut,
}

impl SocketEvent {
    pub fn is_data(&self) -> bool {
        matches!(self, SocketEvent::Data(_))
    }
}

/// Channels handed out by [`Transport::connect`]
pub struct SocketConnection {
    /// Inbound events; closes when the transport is disconnected
    pub receiver: mpsc::UnboundedReceiver<SocketEvent>,
    /// Outbound writes; best-effort. Only the latest write queued while no
    /// socket is live is sent once one comes up
    pub sender: mpsc::UnboundedSender<Vec<u8>>,
}

/// Connection to the controller that the client supervises
#[async_trait]
pub trait Transport: Send {
    /// Start connecting and return the event/write channels.
    ///
    /// Any session started by a previous call is torn down first.
    async fn connect(&mut self) -> Result<SocketConnection>;

    /// Stop the session and disable reconnecting. Safe to call repeatedly.
    async fn disconnect(&mut self);
}

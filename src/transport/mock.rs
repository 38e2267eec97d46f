//! Mock transport for testing

use super::{SocketConnection, SocketEvent, Transport};
use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// In-memory transport whose events are injected through a [`MockTransportHandle`]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

/// Test-side handle for driving a [`MockTransport`]
#[derive(Clone)]
pub struct MockTransportHandle {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    events: Option<mpsc::UnboundedSender<SocketEvent>>,
    writes: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    written: Vec<Vec<u8>>,
    connects: u32,
    disconnects: u32,
}

impl MockTransport {
    /// Create a new mock transport and the handle that drives it
    pub fn new() -> (Self, MockTransportHandle) {
        let inner = Arc::new(Mutex::new(MockTransportInner::default()));
        (
            Self { inner: Arc::clone(&inner) },
            MockTransportHandle { inner },
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<SocketConnection> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.events = Some(event_tx);
        inner.writes = Some(write_rx);
        inner.connects += 1;

        Ok(SocketConnection {
            receiver: event_rx,
            sender: write_tx,
        })
    }

    async fn disconnect(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.events = None;
        inner.disconnects += 1;
    }
}

impl MockTransportHandle {
    /// Inject an inbound event; returns false when nothing is connected
    pub fn emit(&self, event: SocketEvent) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match &inner.events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    /// Inject a chunk of inbound bytes
    pub fn emit_data(&self, data: &[u8]) -> bool {
        self.emit(SocketEvent::Data(data.to_vec()))
    }

    /// Collect every buffer written through the outbound channel so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut drained = Vec::new();
        if let Some(writes) = inner.writes.as_mut() {
            while let Ok(bytes) = writes.try_recv() {
                drained.push(bytes);
            }
        }
        inner.written.extend(drained);
        inner.written.clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).connects
    }

    pub fn disconnect_count(&self) -> u32 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).disconnects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_flow_after_connect() {
        let (mut transport, handle) = MockTransport::new();
        assert!(!handle.emit(SocketEvent::Connected));

        let mut connection = transport.connect().await.unwrap();
        assert!(handle.emit(SocketEvent::Connected));
        assert!(handle.emit_data(&[9, 9]));

        assert_eq!(connection.receiver.recv().await, Some(SocketEvent::Connected));
        assert_eq!(connection.receiver.recv().await, Some(SocketEvent::Data(vec![9, 9])));
    }

    #[tokio::test]
    async fn test_disconnect_closes_event_channel() {
        let (mut transport, handle) = MockTransport::new();
        let mut connection = transport.connect().await.unwrap();

        transport.disconnect().await;
        transport.disconnect().await;

        assert_eq!(connection.receiver.recv().await, None);
        assert_eq!(handle.disconnect_count(), 2);
        assert!(!handle.emit(SocketEvent::TimedOut));
    }

    #[tokio::test]
    async fn test_written_buffers_are_captured() {
        let (mut transport, handle) = MockTransport::new();
        let connection = transport.connect().await.unwrap();

        connection.sender.send(vec![1]).unwrap();
        connection.sender.send(vec![2, 3]).unwrap();

        assert_eq!(handle.written(), vec![vec![1], vec![2, 3]]);
        assert_eq!(handle.connect_count(), 1);
    }
}

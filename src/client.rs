//! Connection state supervisor
//!
//! [`RealtimeClient`] owns a [`Transport`] and a protocol implementation.
//! A background task forwards every transport event to the protocol in
//! arrival order and folds the non-data events into a debounced three-state
//! connection status. Consumers read one merged [`MessageStream`].

use crate::error::RteError;
use crate::messages::RealtimeMessage;
use crate::transport::{SocketEvent, Transport};
use crate::Result;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Window over which connect/disconnect signals are collapsed
pub const STATE_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Protocol-specific half of a client
///
/// `receive` is called exactly once for every transport event, data and
/// state signals alike, in the order the transport produced them.
pub trait RealtimeProtocol: Send + 'static {
    fn receive(&mut self, event: &SocketEvent, link: &mut ClientLink);

    /// Called after the committed connection state changed
    fn state_changed(&mut self, _state: ConnectionState, _link: &mut ClientLink) {}
}

/// What a protocol can do back to its client
pub struct ClientLink {
    messages: mpsc::UnboundedSender<RealtimeMessage>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl ClientLink {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Commit a state; publishes a state message only on actual change
    pub fn set_state(&mut self, state: ConnectionState) -> bool {
        if self.state() == state {
            return false;
        }

        info!(?state, "connection state changed");
        self.state.send_replace(state);
        self.publish(RealtimeMessage::ConnectionState { state });
        true
    }

    pub fn publish(&mut self, message: RealtimeMessage) {
        // consumer gone; the task keeps running until disconnected
        let _ = self.messages.send(message);
    }
}

/// Public message stream returned by [`RealtimeClient::connect`]
pub struct MessageStream {
    receiver: mpsc::UnboundedReceiver<RealtimeMessage>,
}

impl MessageStream {
    /// Next message; `None` once the client is disconnected and drained
    pub async fn next(&mut self) -> Option<RealtimeMessage> {
        self.receiver.recv().await
    }

    /// Next message if one is already queued
    pub fn try_next(&mut self) -> Option<RealtimeMessage> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for MessageStream {
    type Item = RealtimeMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

type TaskOutput<P> = (P, Box<dyn Transport>);

struct ClientSession<P> {
    shutdown: watch::Sender<bool>,
    writer: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<TaskOutput<P>>,
}

/// Supervised realtime connection
pub struct RealtimeClient<P: RealtimeProtocol> {
    protocol: Option<P>,
    transport: Option<Box<dyn Transport>>,
    state: Arc<watch::Sender<ConnectionState>>,
    session: Option<ClientSession<P>>,
}

impl<P: RealtimeProtocol> RealtimeClient<P> {
    pub fn new(protocol: P, transport: Box<dyn Transport>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            protocol: Some(protocol),
            transport: Some(transport),
            state: Arc::new(state),
            session: None,
        }
    }

    /// Start the transport and return the public message stream.
    ///
    /// Calling this on a connected client tears the old session down first;
    /// the previous stream then ends.
    pub async fn connect(&mut self) -> Result<MessageStream> {
        self.disconnect().await?;

        let (Some(protocol), Some(mut transport)) = (self.protocol.take(), self.transport.take()) else {
            return Err(RteError::Connection("client task did not hand back its transport".to_string()));
        };

        let connection = match transport.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                self.protocol = Some(protocol);
                self.transport = Some(transport);
                return Err(e);
            }
        };

        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let link = ClientLink {
            messages: message_tx,
            state: Arc::clone(&self.state),
        };

        info!("starting realtime client");
        let task = tokio::spawn(supervise(
            protocol,
            transport,
            connection.receiver,
            link,
            shutdown_rx,
        ));

        self.session = Some(ClientSession {
            shutdown: shutdown_tx,
            writer: connection.sender,
            task,
        });

        Ok(MessageStream { receiver: message_rx })
    }

    /// Stop the transport and close the message stream. Safe to call repeatedly.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        info!("stopping realtime client");
        let _ = session.shutdown.send(true);
        let (protocol, transport) = session.task.await?;
        self.protocol = Some(protocol);
        self.transport = Some(transport);
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every committed state
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Queue raw bytes for the controller. Delivery is best-effort.
    pub fn send(&self, bytes: Vec<u8>) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| RteError::Connection("client is not connected".to_string()))?;

        session
            .writer
            .send(bytes)
            .map_err(|_| RteError::Connection("transport write channel closed".to_string()))
    }

    /// Queue a URScript snippet, newline terminated
    pub fn send_script(&self, script: &str) -> Result<()> {
        let mut bytes = script.as_bytes().to_vec();
        if !script.ends_with('\n') {
            bytes.push(b'\n');
        }
        self.send(bytes)
    }

    /// Protocol state, available while no session is running
    pub fn protocol(&self) -> Option<&P> {
        self.protocol.as_ref()
    }
}

impl<P: RealtimeProtocol> Drop for RealtimeClient<P> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }
}

async fn supervise<P: RealtimeProtocol>(
    mut protocol: P,
    mut transport: Box<dyn Transport>,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    mut link: ClientLink,
    mut shutdown: watch::Receiver<bool>,
) -> TaskOutput<P> {
    let mut pending: Option<(ConnectionState, Instant)> = None;

    loop {
        let deadline = pending.map(|(_, at)| at).unwrap_or_else(Instant::now);

        tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    warn!("transport event channel closed");
                    break;
                };

                // data proves the link; commit before anything decoded from it is published
                if event.is_data() {
                    pending = None;
                    commit(ConnectionState::Connected, &mut protocol, &mut link);
                }

                protocol.receive(&event, &mut link);

                match event {
                    SocketEvent::Data(_) => {}
                    SocketEvent::Connected => {
                        pending = Some((ConnectionState::Connecting, Instant::now() + STATE_DEBOUNCE));
                    }
                    signal => {
                        debug!(?signal, "disconnect signal");
                        pending = Some((ConnectionState::Disconnected, Instant::now() + STATE_DEBOUNCE));
                    }
                }
            }
            _ = sleep_until(deadline), if pending.is_some() => {
                if let Some((state, _)) = pending.take() {
                    // data already proved the link; a late connect signal must not step back
                    let downgrade = state == ConnectionState::Connecting
                        && link.state() == ConnectionState::Connected;
                    if !downgrade {
                        commit(state, &mut protocol, &mut link);
                    }
                }
            }
        }
    }

    transport.disconnect().await;
    commit(ConnectionState::Disconnected, &mut protocol, &mut link);

    (protocol, transport)
}

fn commit<P: RealtimeProtocol>(state: ConnectionState, protocol: &mut P, link: &mut ClientLink) {
    if link.set_state(state) {
        protocol.state_changed(state, link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, MockTransportHandle};

    #[derive(Default)]
    struct RecordingProtocol {
        events: Vec<SocketEvent>,
        states: Vec<ConnectionState>,
    }

    impl RealtimeProtocol for RecordingProtocol {
        fn receive(&mut self, event: &SocketEvent, _link: &mut ClientLink) {
            self.events.push(event.clone());
        }

        fn state_changed(&mut self, state: ConnectionState, _link: &mut ClientLink) {
            self.states.push(state);
        }
    }

    fn client() -> (RealtimeClient<RecordingProtocol>, MockTransportHandle) {
        let (transport, handle) = MockTransport::new();
        (
            RealtimeClient::new(RecordingProtocol::default(), Box::new(transport)),
            handle,
        )
    }

    fn drain(stream: &mut MessageStream) -> Vec<RealtimeMessage> {
        std::iter::from_fn(|| stream.try_next()).collect()
    }

    fn state_message(state: ConnectionState) -> RealtimeMessage {
        RealtimeMessage::ConnectionState { state }
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_connects_immediately() {
        let (mut client, handle) = client();
        let mut stream = client.connect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);

        handle.emit_data(&[1]);
        assert_eq!(stream.next().await, Some(state_message(ConnectionState::Connected)));
        assert!(client.is_connected());

        client.disconnect().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_signal_is_debounced() {
        let (mut client, handle) = client();
        let mut stream = client.connect().await.unwrap();

        handle.emit(SocketEvent::Connected);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(drain(&mut stream).is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(drain(&mut stream), vec![state_message(ConnectionState::Connecting)]);
        assert_eq!(client.state(), ConnectionState::Connecting);

        client.disconnect().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flapping_collapses_to_one_transition() {
        let (mut client, handle) = client();
        let mut stream = client.connect().await.unwrap();

        handle.emit_data(&[1]);
        assert_eq!(stream.next().await, Some(state_message(ConnectionState::Connected)));

        handle.emit(SocketEvent::Disconnected { error: None });
        handle.emit(SocketEvent::Connected);
        handle.emit(SocketEvent::Disconnected {
            error: Some("reset".to_string()),
        });
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(drain(&mut stream), vec![state_message(ConnectionState::Disconnected)]);

        client.disconnect().await.unwrap();
        assert!(drain(&mut stream).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_connect_signal_does_not_downgrade() {
        let (mut client, handle) = client();
        let mut stream = client.connect().await.unwrap();

        handle.emit(SocketEvent::Connected);
        handle.emit_data(&[1, 2]);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(drain(&mut stream), vec![state_message(ConnectionState::Connected)]);
        assert_eq!(client.state(), ConnectionState::Connected);

        client.disconnect().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_event_reaches_protocol_in_order() {
        let (mut client, handle) = client();
        let mut stream = client.connect().await.unwrap();

        let sent = vec![
            SocketEvent::Connected,
            SocketEvent::Data(vec![1]),
            SocketEvent::TimedOut,
            SocketEvent::Disconnected { error: None },
            SocketEvent::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(5),
            },
            SocketEvent::Data(vec![2]),
        ];
        for event in &sent {
            handle.emit(event.clone());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        client.disconnect().await.unwrap();
        drain(&mut stream);

        let protocol = client.protocol().unwrap();
        assert_eq!(protocol.events, sent);
        assert_eq!(
            protocol.states,
            vec![ConnectionState::Connected, ConnectionState::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_reconnectable() {
        let (mut client, handle) = client();
        client.disconnect().await.unwrap();

        let mut stream = client.connect().await.unwrap();
        handle.emit_data(&[1]);
        assert_eq!(stream.next().await, Some(state_message(ConnectionState::Connected)));

        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert_eq!(stream.next().await, Some(state_message(ConnectionState::Disconnected)));
        assert_eq!(stream.next().await, None);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let _stream = client.connect().await.unwrap();
        assert_eq!(handle.connect_count(), 2);
        client.disconnect().await.unwrap();
        assert_eq!(handle.disconnect_count(), 2);
    }

    #[tokio::test]
    async fn test_send_requires_session() {
        let (mut client, handle) = client();
        assert!(client.send(vec![1]).is_err());

        let _stream = client.connect().await.unwrap();
        client.send(vec![1, 2]).unwrap();
        client.send_script("textmsg(\"hi\")").unwrap();

        assert_eq!(handle.written(), vec![vec![1, 2], b"textmsg(\"hi\")\n".to_vec()]);
        client.disconnect().await.unwrap();
    }
}

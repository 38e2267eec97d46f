//! Reconnecting TCP transport
//!
//! Keeps exactly one live socket to the controller. When the socket drops,
//! times out, or fails to connect, a new one is attempted after a Fibonacci
//! delay; there is no give-up state. Only an explicit disconnect stops it.

use super::{FibonacciBackoff, SocketConnection, SocketEvent, Transport};
use crate::config::Config;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct SocketOptions {
    pub host: String,
    pub port: u16,
    pub retry_delay: Duration,
    pub max_delay: Duration,
    /// Idle read timeout, also bounds each connect attempt
    pub timeout: Duration,
}

impl SocketOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.controller.host.clone(),
            port: config.controller.port(),
            retry_delay: config.connection.retry_delay(),
            max_delay: config.connection.retry_max_delay(),
            timeout: config.connection.idle_timeout(),
        }
    }
}

/// TCP transport that reconnects until told to stop
pub struct ReconnectingSocket {
    options: SocketOptions,
    session: Option<SocketSession>,
}

struct SocketSession {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum SessionEnd {
    Shutdown,
    Closed(Option<String>),
    TimedOut,
}

impl ReconnectingSocket {
    pub fn new(options: SocketOptions) -> Self {
        info!(host = %options.host, port = options.port, "creating reconnecting socket");
        Self {
            options,
            session: None,
        }
    }
}

#[async_trait]
impl Transport for ReconnectingSocket {
    async fn connect(&mut self) -> Result<SocketConnection> {
        // a fresh session never shares channels with the previous one
        self.disconnect().await;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!("starting socket connection");
        let task = tokio::spawn(run_socket(self.options.clone(), event_tx, write_rx, shutdown_rx));

        self.session = Some(SocketSession {
            shutdown: shutdown_tx,
            task,
        });

        Ok(SocketConnection {
            receiver: event_rx,
            sender: write_tx,
        })
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            info!("disconnecting from reconnecting socket");
            let _ = session.shutdown.send(true);
            if let Err(e) = session.task.await {
                warn!(error = %e, "socket task ended abnormally");
            }
        }
    }
}

impl Drop for ReconnectingSocket {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
    }
}

async fn run_socket(
    options: SocketOptions,
    events: mpsc::UnboundedSender<SocketEvent>,
    mut writes: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = FibonacciBackoff::new(options.retry_delay, options.max_delay);
    let mut attempt: u32 = 0;

    loop {
        let connect = timeout(
            options.timeout,
            TcpStream::connect((options.host.as_str(), options.port)),
        );

        let outcome = tokio::select! {
            _ = shutdown.changed() => return,
            result = connect => result,
        };

        match outcome {
            Ok(Ok(stream)) => {
                info!(host = %options.host, port = options.port, "socket connection established");
                backoff.reset();
                attempt = 0;
                let pending = take_latest_write(&mut writes);

                if events.send(SocketEvent::Connected).is_err() {
                    return;
                }

                match run_session(stream, pending, &options, &events, &mut writes, &mut shutdown).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::TimedOut => {
                        info!("socket request timed out, destroying socket");
                        let _ = events.send(SocketEvent::TimedOut);
                        let _ = events.send(SocketEvent::Disconnected { error: None });
                    }
                    SessionEnd::Closed(error) => {
                        info!(error = ?error, "socket connection closed");
                        let _ = events.send(SocketEvent::Disconnected { error });
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "error occurred in socket");
                let _ = events.send(SocketEvent::Disconnected {
                    error: Some(e.to_string()),
                });
            }
            Err(_) => {
                warn!(timeout_ms = options.timeout.as_millis() as u64, "socket connect timed out");
                let _ = events.send(SocketEvent::Disconnected {
                    error: Some("connect timed out".to_string()),
                });
            }
        }

        attempt = attempt.saturating_add(1);
        let delay = backoff.next_delay();
        info!(attempt, delay_ms = delay.as_millis() as u64, "attempting socket reconnect");

        if events.send(SocketEvent::Reconnecting { attempt, delay }).is_err() {
            return;
        }

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(delay) => {}
        }
    }
}

async fn run_session(
    stream: TcpStream,
    pending: Option<Vec<u8>>,
    options: &SocketOptions,
    events: &mpsc::UnboundedSender<SocketEvent>,
    writes: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut writes_open = true;

    if let Some(bytes) = pending {
        if let Err(e) = writer.write_all(&bytes).await {
            debug!(error = %e, "replayed socket write failed");
        }
    }

    let idle = sleep(options.timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return SessionEnd::Shutdown,
            read = reader.read(&mut buffer) => match read {
                Ok(0) => return SessionEnd::Closed(None),
                Ok(n) => {
                    idle.as_mut().reset(Instant::now() + options.timeout);
                    if events.send(SocketEvent::Data(buffer[..n].to_vec())).is_err() {
                        return SessionEnd::Shutdown;
                    }
                }
                Err(e) => return SessionEnd::Closed(Some(e.to_string())),
            },
            write = writes.recv(), if writes_open => match write {
                Some(bytes) => {
                    idle.as_mut().reset(Instant::now() + options.timeout);
                    // delivery is best-effort; a dead socket surfaces through the read side
                    if let Err(e) = writer.write_all(&bytes).await {
                        debug!(error = %e, "socket write failed");
                    }
                }
                None => writes_open = false,
            },
            _ = &mut idle => return SessionEnd::TimedOut,
        }
    }
}

/// Most recent write queued while no socket was live; older ones are dropped
fn take_latest_write(writes: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Option<Vec<u8>> {
    let mut latest = None;
    let mut dropped = 0usize;
    while let Ok(bytes) = writes.try_recv() {
        if latest.replace(bytes).is_some() {
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!(dropped, "discarded older writes queued while disconnected");
    }
    latest
}

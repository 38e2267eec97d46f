//! RTE protocol client
//!
//! Frames the byte stream, decodes packets with the connection's captured
//! version and folds global variable updates into the data package. The
//! framer and decoder belong to one socket session: a new socket starts a
//! new session, so tail bytes and the version never cross reconnects.

use crate::client::{ClientLink, ConnectionState, RealtimeClient, RealtimeProtocol};
use crate::config::Config;
use crate::data_package::DataPackage;
use crate::framer::{Packet, PacketFramer};
use crate::messages::{DecodedMessage, MessageDecoder, MessageScope, ProgramStateMessage, RealtimeMessage, VersionMessage};
use crate::transport::{ReconnectingSocket, SocketEvent, SocketOptions, Transport};
use crate::variables::TypeTables;
use std::sync::Arc;
use tracing::{debug, warn};

/// Framer and decoder for one socket session
#[derive(Debug)]
struct RteSession {
    framer: PacketFramer,
    decoder: MessageDecoder,
}

impl RteSession {
    fn new(max_packet_len: usize, tables: Arc<TypeTables>) -> Self {
        Self {
            framer: PacketFramer::new(max_packet_len),
            decoder: MessageDecoder::new(tables),
        }
    }
}

/// RTE decoding half of [`RteClient`]
#[derive(Debug)]
pub struct RteProtocol {
    session: Option<RteSession>,
    data_package: DataPackage,
    include_internal: bool,
    max_packet_len: usize,
    tables: Arc<TypeTables>,
}

impl RteProtocol {
    pub fn new(config: &Config) -> Self {
        Self::with_tables(config, TypeTables::standard())
    }

    /// Use custom variable code tables
    pub fn with_tables(config: &Config, tables: Arc<TypeTables>) -> Self {
        Self {
            session: None,
            data_package: DataPackage::new(),
            include_internal: config.monitor.include_internal(),
            max_packet_len: config.connection.max_packet_len(),
            tables,
        }
    }

    pub fn data_package(&self) -> &DataPackage {
        &self.data_package
    }

    /// Version captured on the live socket session, if any
    pub fn version(&self) -> Option<&VersionMessage> {
        self.session.as_ref().and_then(|session| session.decoder.version())
    }

    fn start_session(&mut self) {
        self.session = Some(RteSession::new(self.max_packet_len, Arc::clone(&self.tables)));
    }

    fn on_data(&mut self, chunk: &[u8], link: &mut ClientLink) {
        if self.session.is_none() {
            debug!("data before connect signal, starting session");
            self.start_session();
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let mut packets = Vec::new();
        if let Err(error) = session.framer.push(chunk, |packet| packets.push(packet)) {
            warn!(%error, "dropping rest of stream until reconnect");
        }

        for packet in packets {
            self.on_packet(&packet, link);
        }
    }

    fn on_packet(&mut self, packet: &Packet, link: &mut ClientLink) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let message = match session.decoder.decode(packet) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(error) => {
                warn!(%error, source_type = packet.source_type(), len = packet.len(), "skipping malformed packet");
                return;
            }
        };

        let updated = match &message {
            DecodedMessage::ProgramState(ProgramStateMessage::GlobalVariablesSetup(setup))
                if !setup.names.is_empty() =>
            {
                self.data_package
                    .apply_name_update(setup.start_index as usize, setup.names.clone());
                true
            }
            DecodedMessage::ProgramState(ProgramStateMessage::GlobalVariablesUpdate(update))
                if !update.values.is_empty() =>
            {
                self.data_package
                    .apply_value_update(update.start_index as usize, update.values.clone());
                true
            }
            _ => false,
        };

        if message.scope() == MessageScope::Public || self.include_internal {
            link.publish(RealtimeMessage::from(message));
        }
        if updated {
            link.publish(RealtimeMessage::DataPackage(self.data_package.to_message()));
        }
    }
}

impl RealtimeProtocol for RteProtocol {
    fn receive(&mut self, event: &SocketEvent, link: &mut ClientLink) {
        match event {
            SocketEvent::Connected => {
                // variables never carry over between sockets
                self.data_package.reset();
                self.start_session();
            }
            SocketEvent::Data(chunk) => self.on_data(chunk, link),
            SocketEvent::Disconnected { .. } | SocketEvent::TimedOut => self.session = None,
            SocketEvent::Reconnecting { .. } => {}
        }
    }

    fn state_changed(&mut self, state: ConnectionState, _link: &mut ClientLink) {
        if state == ConnectionState::Disconnected {
            debug!("connection lost, clearing session and data package");
            self.session = None;
            self.data_package.reset();
        }
    }
}

/// Realtime client speaking RTE
pub type RteClient = RealtimeClient<RteProtocol>;

impl RealtimeClient<RteProtocol> {
    /// Client over a reconnecting TCP socket to the configured controller
    pub fn from_config(config: &Config) -> Self {
        let socket = ReconnectingSocket::new(SocketOptions::from_config(config));
        Self::with_transport(config, Box::new(socket))
    }

    /// Client over an externally supplied transport
    pub fn with_transport(config: &Config, transport: Box<dyn Transport>) -> Self {
        RealtimeClient::new(RteProtocol::new(config), transport)
    }
}

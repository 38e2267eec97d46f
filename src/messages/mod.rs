//! Decoded realtime protocol messages
//!
//! The decoder is per connection: it captures the controller version from
//! the first packet and hands it to every version-gated sub-decoder after
//! that. A new connection gets a new decoder.

pub mod program_state;
pub mod robot;
pub mod robot_state;
pub mod version;

pub use program_state::{GlobalVariablesSetup, GlobalVariablesUpdate, ProgramStateMessage};
pub use robot::{
    CommMessage, KeyMessage, ReportLevel, RobotMessage, RobotMessageKind, RuntimeExceptionMessage,
    TextMessage,
};
pub use robot_state::{CartesianInfo, RobotStateMessage};
pub use version::{ProtocolVersion, VersionMessage};

use crate::client::ConnectionState;
use crate::data_package::DataPackageMessage;
use crate::error::DecodeError;
use crate::framer::Packet;
use crate::variables::TypeTables;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Message source type tag (byte 4 of every packet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageSourceType {
    Version,
    ModbusInfo,
    RobotState,
    RobotMessage,
    HmcMessage,
    SafetySetupBroadcast,
    SafetyComplianceTolerances,
    ProgramState,
}

impl MessageSourceType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            3 => Some(Self::Version),
            5 => Some(Self::ModbusInfo),
            16 => Some(Self::RobotState),
            20 => Some(Self::RobotMessage),
            22 => Some(Self::HmcMessage),
            23 => Some(Self::SafetySetupBroadcast),
            24 => Some(Self::SafetyComplianceTolerances),
            25 => Some(Self::ProgramState),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Version => 3,
            Self::ModbusInfo => 5,
            Self::RobotState => 16,
            Self::RobotMessage => 20,
            Self::HmcMessage => 22,
            Self::SafetySetupBroadcast => 23,
            Self::SafetyComplianceTolerances => 24,
            Self::ProgramState => 25,
        }
    }
}

/// Whether a message is meant for library consumers or only feeds the
/// client's own state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageScope {
    Public,
    Internal,
}

/// One decoded packet
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Version(VersionMessage),
    Robot(RobotMessage),
    RobotState(RobotStateMessage),
    ProgramState(ProgramStateMessage),
}

impl DecodedMessage {
    pub fn scope(&self) -> MessageScope {
        match self {
            DecodedMessage::Version(_) | DecodedMessage::Robot(_) => MessageScope::Public,
            DecodedMessage::RobotState(_) | DecodedMessage::ProgramState(_) => MessageScope::Internal,
        }
    }
}

/// Per-connection packet decoder
#[derive(Debug)]
pub struct MessageDecoder {
    tables: Arc<TypeTables>,
    version: Option<VersionMessage>,
}

impl MessageDecoder {
    pub fn new(tables: Arc<TypeTables>) -> Self {
        Self { tables, version: None }
    }

    /// Version captured from this connection's first packet
    pub fn version(&self) -> Option<&VersionMessage> {
        self.version.as_ref()
    }

    /// Decode one complete packet.
    ///
    /// Until a version is captured every packet is read as a version
    /// message, whatever its tag. Afterwards packets dispatch on their tag;
    /// tags and subtypes this client does not model yield `Ok(None)`.
    pub fn decode(&mut self, packet: &Packet) -> Result<Option<DecodedMessage>, DecodeError> {
        if self.version.is_none() {
            let message = VersionMessage::unpack(packet.payload())?;
            info!(
                project = %message.project_name,
                version = %message.version(),
                build = message.build,
                "controller version captured"
            );
            self.version = Some(message.clone());
            return Ok(Some(DecodedMessage::Version(message)));
        }

        let Some(source_type) = MessageSourceType::from_tag(packet.source_type()) else {
            return Ok(None);
        };

        let payload = packet.payload();
        let decoded = match source_type {
            MessageSourceType::RobotMessage => RobotMessage::unpack(payload)?.map(DecodedMessage::Robot),
            MessageSourceType::RobotState => {
                RobotStateMessage::unpack(payload)?.map(DecodedMessage::RobotState)
            }
            MessageSourceType::ProgramState => {
                let version = self.version.as_ref().map(VersionMessage::version);
                ProgramStateMessage::unpack(payload, version.as_ref(), &self.tables)?
                    .map(DecodedMessage::ProgramState)
            }
            _ => None,
        };

        Ok(decoded)
    }
}

/// Everything the client publishes to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum RealtimeMessage {
    ConnectionState { state: ConnectionState },
    Version(VersionMessage),
    Robot(RobotMessage),
    RobotState(RobotStateMessage),
    ProgramState(ProgramStateMessage),
    DataPackage(DataPackageMessage),
}

impl RealtimeMessage {
    pub fn scope(&self) -> MessageScope {
        match self {
            RealtimeMessage::RobotState(_) | RealtimeMessage::ProgramState(_) => MessageScope::Internal,
            _ => MessageScope::Public,
        }
    }
}

impl From<DecodedMessage> for RealtimeMessage {
    fn from(message: DecodedMessage) -> Self {
        match message {
            DecodedMessage::Version(m) => RealtimeMessage::Version(m),
            DecodedMessage::Robot(m) => RealtimeMessage::Robot(m),
            DecodedMessage::RobotState(m) => RealtimeMessage::RobotState(m),
            DecodedMessage::ProgramState(m) => RealtimeMessage::ProgramState(m),
        }
    }
}

//! Controller version message

use crate::error::DecodeError;
use crate::variables::TypeGeneration;
use crate::wire::ByteReader;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// major.minor.patch of the controller software
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: i32,
}

impl ProtocolVersion {
    pub fn new(major: u8, minor: u8, patch: i32) -> Self {
        Self { major, minor, patch }
    }

    /// Variable code table in use: current for `>=3.14 <5.0 || >=5.9`
    pub fn generation(&self) -> TypeGeneration {
        let release = (self.major, self.minor);
        if ((3, 14)..(5, 0)).contains(&release) || release >= (5, 9) {
            TypeGeneration::Current
        } else {
            TypeGeneration::Legacy
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// First packet on every connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionMessage {
    pub timestamp: u64,
    pub source: i8,
    pub source_type: i8,
    pub project_name: String,
    pub major: u8,
    pub minor: u8,
    pub patch: i32,
    pub build: i32,
    pub received_at: DateTime<Utc>,
}

impl VersionMessage {
    /// Unpacks a payload with this format:
    ///
    /// ```text
    /// Type            Bytes     Description
    /// uint64_t        8         unix timestamp
    /// char            1         message source
    /// char            1         message source type
    /// char            1         project name size
    /// charArray       varies    project name
    /// unsigned char   1         major version
    /// unsigned char   1         minor version
    /// int             4         patch version
    /// int             4         build number
    /// ```
    pub fn unpack(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = ByteReader::new(payload);

        let timestamp = reader.u64()?;
        let source = reader.i8()?;
        let source_type = reader.i8()?;
        let name_len = reader.u8()? as usize;
        let project_name = reader.string(name_len)?;
        let major = reader.u8()?;
        let minor = reader.u8()?;
        let patch = reader.i32()?;
        let build = reader.i32()?;

        Ok(Self {
            timestamp,
            source,
            source_type,
            project_name,
            major,
            minor,
            patch,
            build,
            received_at: Utc::now(),
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::new(self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
pub(crate) fn version_payload(project: &str, major: u8, minor: u8, patch: i32, build: i32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&1_700_000_000u64.to_be_bytes());
    payload.push(0xfe);
    payload.push(3);
    payload.push(project.len() as u8);
    payload.extend_from_slice(project.as_bytes());
    payload.push(major);
    payload.push(minor);
    payload.extend_from_slice(&patch.to_be_bytes());
    payload.extend_from_slice(&build.to_be_bytes());
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_variable_length_project_name() {
        let payload = version_payload("URControl", 5, 11, 4, 108_520);
        let message = VersionMessage::unpack(&payload).unwrap();

        assert_eq!(message.timestamp, 1_700_000_000);
        assert_eq!(message.source, -2);
        assert_eq!(message.source_type, 3);
        assert_eq!(message.project_name, "URControl");
        assert_eq!(message.build, 108_520);
        assert_eq!(message.version(), ProtocolVersion::new(5, 11, 4));
        assert_eq!(message.version().to_string(), "5.11.4");
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let payload = version_payload("URControl", 3, 15, 0, 1);
        let result = VersionMessage::unpack(&payload[..payload.len() - 2]);
        assert!(matches!(result, Err(DecodeError::Truncated { .. })));
    }
}

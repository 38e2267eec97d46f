//! Robot messages (source type 20)
//!
//! Text, key, communication and runtime exception messages emitted by the
//! controller. Other robot message subtypes are not modelled and decode to
//! nothing.

use crate::error::DecodeError;
use crate::wire::ByteReader;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const SUBTYPE_TEXT: i8 = 0;
pub const SUBTYPE_POPUP: i8 = 2;
pub const SUBTYPE_SAFETY_MODE: i8 = 5;
pub const SUBTYPE_ROBOT_COMM: i8 = 6;
pub const SUBTYPE_KEY: i8 = 7;
pub const SUBTYPE_REQUEST_VALUE: i8 = 9;
pub const SUBTYPE_RUNTIME_EXCEPTION: i8 = 10;
pub const SUBTYPE_PROGRAM_THREADS: i8 = 14;

/// Severity attached to communication messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportLevel {
    Debug,
    Info,
    Warning,
    Violation,
    Fault,
    Unknown,
}

impl ReportLevel {
    /// Map a raw report level; developer levels (128..=132) fold onto the same scale
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 | 128 => ReportLevel::Debug,
            1 | 129 => ReportLevel::Info,
            2 | 130 => ReportLevel::Warning,
            3 | 131 => ReportLevel::Violation,
            4 | 132 => ReportLevel::Fault,
            _ => ReportLevel::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotMessage {
    pub timestamp: u64,
    pub source: i8,
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RobotMessageKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype")]
pub enum RobotMessageKind {
    Key(KeyMessage),
    Text(TextMessage),
    Comm(CommMessage),
    RuntimeException(RuntimeExceptionMessage),
}

/// Program lifecycle and status keys, e.g. title `PROGRAM_XXX_STARTED`
/// with the program name as message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMessage {
    pub code: i32,
    pub argument: i32,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMessage {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommMessage {
    pub code: i32,
    pub argument: i32,
    pub report_level: i32,
    pub level: ReportLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeExceptionMessage {
    pub line: i32,
    pub column: i32,
    pub message: String,
}

/// Controller error code in the service manual format, `{code}A{argument}`
pub fn error_code(code: i32, argument: i32) -> String {
    format!("{}A{}", code, argument)
}

impl KeyMessage {
    pub fn error_code(&self) -> String {
        error_code(self.code, self.argument)
    }
}

impl CommMessage {
    pub fn error_code(&self) -> String {
        error_code(self.code, self.argument)
    }
}

impl RobotMessage {
    /// Unpacks a payload with this format:
    ///
    /// ```text
    /// Type            Bytes     Description
    /// uint64_t        8         unix timestamp
    /// char            1         message source
    /// char            1         robot message subtype
    /// (the rest varies by subtype)
    /// ```
    pub fn unpack(payload: &[u8]) -> Result<Option<Self>, DecodeError> {
        let mut reader = ByteReader::new(payload);
        let timestamp = reader.u64()?;
        let source = reader.i8()?;
        let subtype = reader.i8()?;

        let kind = match subtype {
            SUBTYPE_KEY => RobotMessageKind::Key(unpack_key(&mut reader)?),
            SUBTYPE_TEXT => RobotMessageKind::Text(TextMessage {
                message: reader.rest_string().trim().to_string(),
            }),
            SUBTYPE_ROBOT_COMM => RobotMessageKind::Comm(unpack_comm(&mut reader)?),
            SUBTYPE_RUNTIME_EXCEPTION => {
                RobotMessageKind::RuntimeException(unpack_runtime_exception(&mut reader)?)
            }
            _ => return Ok(None),
        };

        Ok(Some(Self {
            timestamp,
            source,
            received_at: Utc::now(),
            kind,
        }))
    }
}

fn unpack_key(reader: &mut ByteReader<'_>) -> Result<KeyMessage, DecodeError> {
    let code = reader.i32()?;
    let argument = reader.i32()?;
    let title_len = reader.u8()? as usize;
    let title = reader.string(title_len)?;
    let message = reader.rest_string();

    Ok(KeyMessage {
        code,
        argument,
        title,
        message,
    })
}

fn unpack_comm(reader: &mut ByteReader<'_>) -> Result<CommMessage, DecodeError> {
    let code = reader.i32()?;
    let argument = reader.i32()?;
    let report_level = reader.i32()?;

    Ok(CommMessage {
        code,
        argument,
        report_level,
        level: ReportLevel::from_raw(report_level),
    })
}

fn unpack_runtime_exception(reader: &mut ByteReader<'_>) -> Result<RuntimeExceptionMessage, DecodeError> {
    let line = reader.i32()?;
    let column = reader.i32()?;
    let message = reader.rest_string().trim().to_string();

    Ok(RuntimeExceptionMessage {
        line,
        column,
        message,
    })
}

#[cfg(test)]
pub(crate) fn robot_payload(subtype: i8, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&42u64.to_be_bytes());
    payload.push(7);
    payload.push(subtype as u8);
    payload.extend_from_slice(body);
    payload
}

#[cfg(test)]
pub(crate) fn comm_body(code: i32, argument: i32, level: i32) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&code.to_be_bytes());
    body.extend_from_slice(&argument.to_be_bytes());
    body.extend_from_slice(&level.to_be_bytes());
    body
}

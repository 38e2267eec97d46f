//! Program state messages (source type 25)
//!
//! Carries the running program's global variables: setup messages publish
//! a range of names, update messages a range of typed values. Both address
//! the tables by start index.

use super::ProtocolVersion;
use crate::error::DecodeError;
use crate::variables::{TypeTables, VariableCodec, VariableValue};
use crate::wire::ByteReader;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const SUBTYPE_GLOBAL_VARIABLES_SETUP: i8 = 0;
pub const SUBTYPE_GLOBAL_VARIABLES_UPDATE: i8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "subtype")]
pub enum ProgramStateMessage {
    GlobalVariablesSetup(GlobalVariablesSetup),
    GlobalVariablesUpdate(GlobalVariablesUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalVariablesSetup {
    pub timestamp: u64,
    pub start_index: u16,
    pub names: Vec<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalVariablesUpdate {
    pub timestamp: u64,
    pub start_index: u16,
    pub values: Vec<VariableValue>,
    pub received_at: DateTime<Utc>,
}

impl ProgramStateMessage {
    /// Unpacks a payload with this format:
    ///
    /// ```text
    /// Type            Bytes     Description
    /// uint64_t        8         unix timestamp
    /// char            1         subtype
    /// uint16_t        2         start index
    /// (setup)         varies    newline separated names
    /// (update)        varies    typed values, one separator byte after each
    /// ```
    ///
    /// Updates need the connection's version to pick the variable code
    /// table. A value that fails to decode ends the update early; the
    /// values before it are kept.
    pub fn unpack(
        payload: &[u8],
        version: Option<&ProtocolVersion>,
        tables: &TypeTables,
    ) -> Result<Option<Self>, DecodeError> {
        let mut reader = ByteReader::new(payload);
        let timestamp = reader.u64()?;
        let subtype = reader.i8()?;
        let start_index = reader.u16()?;

        let message = match subtype {
            SUBTYPE_GLOBAL_VARIABLES_SETUP => {
                let text = reader.rest_string();
                let text = text.trim();
                let names = if text.is_empty() {
                    Vec::new()
                } else {
                    text.split('\n').map(str::to_string).collect()
                };

                ProgramStateMessage::GlobalVariablesSetup(GlobalVariablesSetup {
                    timestamp,
                    start_index,
                    names,
                    received_at: Utc::now(),
                })
            }
            SUBTYPE_GLOBAL_VARIABLES_UPDATE => {
                let version = version.ok_or(DecodeError::MissingVersion)?;
                let decoded = VariableCodec::new(tables, version).decode_sequence(reader.rest(), true);

                ProgramStateMessage::GlobalVariablesUpdate(GlobalVariablesUpdate {
                    timestamp,
                    start_index,
                    values: decoded.values,
                    received_at: Utc::now(),
                })
            }
            _ => return Ok(None),
        };

        Ok(Some(message))
    }
}

#[cfg(test)]
pub(crate) fn program_payload(subtype: i8, start_index: u16, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&99u64.to_be_bytes());
    payload.push(subtype as u8);
    payload.extend_from_slice(&start_index.to_be_bytes());
    payload.extend_from_slice(body);
    payload
}

//! Packet framing for the realtime stream
//!
//! Packets on the wire look like:
//!
//! ```text
//! ┌──────────────────┬──────────────┬─────────────────────┐
//! │ Length (4 bytes) │ Source type  │ Payload             │
//! │ Big-endian u32   │ (1 byte)     │ (length - 5 bytes)  │
//! └──────────────────┴──────────────┴─────────────────────┘
//! ```
//!
//! The length counts the whole packet, prefix and tag included. Socket
//! chunks do not respect packet boundaries, so the framer carries any
//! incomplete tail over to the next chunk.

use crate::error::FramingError;
use tracing::error;

/// Length prefix plus source type tag
pub const HEADER_LEN: usize = 5;

const LENGTH_PREFIX_LEN: usize = 4;

/// One complete, length-delimited packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    bytes: Vec<u8>,
}

impl Packet {
    /// Wrap raw packet bytes. Returns `None` if the slice is shorter than
    /// the header or disagrees with its own length prefix.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        (declared == bytes.len()).then_some(Self { bytes })
    }

    /// Build a packet from a source type and payload
    pub fn encode(source_type: u8, payload: &[u8]) -> Self {
        let length = (payload.len() + HEADER_LEN) as u32;
        let mut bytes = Vec::with_capacity(length as usize);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.push(source_type);
        bytes.extend_from_slice(payload);
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Message source type tag (byte 4)
    pub fn source_type(&self) -> u8 {
        self.bytes[LENGTH_PREFIX_LEN]
    }

    /// Everything after the source type tag
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Reassembles packets from arbitrarily split byte chunks.
///
/// Owned by a single connection; a new connection gets a new framer so
/// tail bytes never leak across sockets.
#[derive(Debug)]
pub struct PacketFramer {
    partial: Vec<u8>,
    max_packet_len: usize,
    desynchronized: bool,
}

impl PacketFramer {
    pub fn new(max_packet_len: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_packet_len: max_packet_len.max(HEADER_LEN),
            desynchronized: false,
        }
    }

    /// Feed one chunk, handing every completed packet to `on_packet` in order.
    ///
    /// A length prefix outside `HEADER_LEN..=max_packet_len` cannot be
    /// resynchronized locally: buffered bytes are dropped and every later
    /// chunk is discarded until [`reset`](Self::reset).
    pub fn push<F>(&mut self, chunk: &[u8], mut on_packet: F) -> Result<(), FramingError>
    where
        F: FnMut(Packet),
    {
        if self.desynchronized {
            return Ok(());
        }

        let mut carried = std::mem::take(&mut self.partial);
        let buffer: &[u8] = if carried.is_empty() {
            chunk
        } else {
            carried.extend_from_slice(chunk);
            &carried
        };

        let mut offset = 0;
        while offset < buffer.len() {
            let available = buffer.len() - offset;
            if available < LENGTH_PREFIX_LEN {
                self.partial = buffer[offset..].to_vec();
                break;
            }

            let length = u32::from_be_bytes([
                buffer[offset],
                buffer[offset + 1],
                buffer[offset + 2],
                buffer[offset + 3],
            ]) as usize;

            if !(HEADER_LEN..=self.max_packet_len).contains(&length) {
                error!(offset, length, "packet length out of range, stream desynchronized");
                self.desynchronized = true;
                self.partial.clear();
                return Err(FramingError::InvalidLength {
                    offset,
                    length,
                    max: self.max_packet_len,
                });
            }

            if available < length {
                // packet continues in a later chunk
                self.partial = buffer[offset..].to_vec();
                break;
            }

            on_packet(Packet {
                bytes: buffer[offset..offset + length].to_vec(),
            });
            offset += length;
        }

        Ok(())
    }

    /// Convenience wrapper collecting the completed packets
    pub fn push_collect(&mut self, chunk: &[u8]) -> Result<Vec<Packet>, FramingError> {
        let mut packets = Vec::new();
        self.push(chunk, |packet| packets.push(packet))?;
        Ok(packets)
    }

    /// Bytes carried over waiting for the rest of a packet
    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }

    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    pub fn reset(&mut self) {
        self.partial.clear();
        self.desynchronized = false;
    }
}

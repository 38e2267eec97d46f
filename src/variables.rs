//! Typed global variable codec
//!
//! Every value on the wire is preceded by a one byte type code. What a code
//! means depends on the controller software: Polyscope 3.14+ (CB-series)
//! and 5.9+ (e-series) renumbered the codes and added matrices.
//!
//! ```text
//! code   3.3 .. 3.14 / 5.0 .. 5.9     3.14+ / 5.9+
//! ----   ------------------------     ------------
//!  0     none                         none
//!  3     const string                 const string
//!  4     var string                   var string
//!  5     list                         -
//! 10     pose                         -
//! 12     bool                         pose
//! 13     num                          bool
//! 14     int                          num
//! 15     float                        int
//! 16     -                            float
//! 17     -                            list
//! 18     -                            matrix
//! ```

use crate::error::DecodeError;
use crate::messages::ProtocolVersion;
use crate::wire::ByteReader;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Logical variable type a code resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VariableKind {
    None,
    String,
    Pose,
    Bool,
    Num,
    Int,
    Float,
    List,
    Matrix,
}

impl VariableKind {
    /// Encoded size of the value body, for kinds with a fixed layout
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            VariableKind::None => Some(0),
            VariableKind::Bool => Some(1),
            VariableKind::Num | VariableKind::Int | VariableKind::Float => Some(4),
            VariableKind::Pose => Some(24),
            VariableKind::String | VariableKind::List | VariableKind::Matrix => None,
        }
    }
}

/// Which of the two code tables a controller version uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeGeneration {
    /// Polyscope 3.3 up to 3.14, 5.0 up to 5.9
    Legacy,
    /// Polyscope 3.14 and later CB-series, 5.9 and later e-series
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rx: f32,
    pub ry: f32,
    pub rz: f32,
}

/// A decoded global variable value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VariableValue {
    None,
    String(String),
    Bool(bool),
    Int(u32),
    Float(f32),
    Pose(Pose),
    List(Vec<VariableValue>),
    Matrix(Vec<Vec<VariableValue>>),
}

/// Code to kind lookup for one table generation
#[derive(Debug, Clone)]
pub struct TypeTable {
    kinds: [Option<VariableKind>; 256],
}

impl TypeTable {
    pub fn empty() -> Self {
        Self { kinds: [None; 256] }
    }

    /// Codes used by Polyscope 3.3 .. 3.14 and 5.0 .. 5.9
    pub fn legacy() -> Self {
        Self::empty()
            .with(0, VariableKind::None)
            .with(3, VariableKind::String)
            .with(4, VariableKind::String)
            .with(5, VariableKind::List)
            .with(10, VariableKind::Pose)
            .with(12, VariableKind::Bool)
            .with(13, VariableKind::Num)
            .with(14, VariableKind::Int)
            .with(15, VariableKind::Float)
    }

    /// Codes used by Polyscope 3.14+ and 5.9+
    pub fn current() -> Self {
        Self::empty()
            .with(0, VariableKind::None)
            .with(3, VariableKind::String)
            .with(4, VariableKind::String)
            .with(12, VariableKind::Pose)
            .with(13, VariableKind::Bool)
            .with(14, VariableKind::Num)
            .with(15, VariableKind::Int)
            .with(16, VariableKind::Float)
            .with(17, VariableKind::List)
            .with(18, VariableKind::Matrix)
    }

    pub fn with(mut self, code: u8, kind: VariableKind) -> Self {
        self.kinds[code as usize] = Some(kind);
        self
    }

    pub fn get(&self, code: u8) -> Option<VariableKind> {
        self.kinds[code as usize]
    }
}

/// Both code tables, resolved by controller version.
///
/// The standard tables are built once and shared; callers needing extra
/// codes clone them and register their own.
#[derive(Debug, Clone)]
pub struct TypeTables {
    legacy: TypeTable,
    current: TypeTable,
}

impl TypeTables {
    pub fn new(legacy: TypeTable, current: TypeTable) -> Self {
        Self { legacy, current }
    }

    /// Shared standard tables
    pub fn standard() -> Arc<TypeTables> {
        static STANDARD: OnceLock<Arc<TypeTables>> = OnceLock::new();
        Arc::clone(STANDARD.get_or_init(|| {
            Arc::new(TypeTables::new(TypeTable::legacy(), TypeTable::current()))
        }))
    }

    pub fn table(&self, generation: TypeGeneration) -> &TypeTable {
        match generation {
            TypeGeneration::Legacy => &self.legacy,
            TypeGeneration::Current => &self.current,
        }
    }

    /// Add or override a code in one generation's table
    pub fn register(&mut self, generation: TypeGeneration, code: u8, kind: VariableKind) {
        let table = match generation {
            TypeGeneration::Legacy => &mut self.legacy,
            TypeGeneration::Current => &mut self.current,
        };
        table.kinds[code as usize] = Some(kind);
    }

    pub fn resolve(&self, code: u8, version: &ProtocolVersion) -> Option<VariableKind> {
        self.table(version.generation()).get(code)
    }
}

impl Default for TypeTables {
    fn default() -> Self {
        Self::new(TypeTable::legacy(), TypeTable::current())
    }
}

/// Outcome of decoding a run of variables
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSequence {
    pub values: Vec<VariableValue>,
    /// Set when decoding stopped early; `values` holds what came before
    pub error: Option<DecodeError>,
}

/// Decoder bound to one code table
pub struct VariableCodec<'a> {
    table: &'a TypeTable,
}

impl<'a> VariableCodec<'a> {
    pub fn new(tables: &'a TypeTables, version: &ProtocolVersion) -> Self {
        Self {
            table: tables.table(version.generation()),
        }
    }

    pub fn for_table(table: &'a TypeTable) -> Self {
        Self { table }
    }

    /// Decode one value (type code included) starting at `offset`.
    ///
    /// Returns the value and the exact number of bytes consumed.
    pub fn decode(&self, buffer: &[u8], offset: usize) -> Result<(VariableValue, usize), DecodeError> {
        let mut reader = ByteReader::at(buffer, offset);
        let value = self.decode_value(&mut reader)?;
        Ok((value, reader.offset() - offset))
    }

    /// Decode consecutive values until the buffer is exhausted.
    ///
    /// With `delimited`, each value is followed by one separator byte, as
    /// in global variable update messages. Decoding stops at the first
    /// fault, keeping every value decoded before it.
    pub fn decode_sequence(&self, buffer: &[u8], delimited: bool) -> DecodedSequence {
        let mut values = Vec::new();
        let error = self.decode_range(buffer, delimited, &mut values).err();

        if let Some(error) = &error {
            warn!(%error, decoded = values.len(), "aborting variable decoding");
        }

        DecodedSequence { values, error }
    }

    fn decode_range(
        &self,
        buffer: &[u8],
        delimited: bool,
        out: &mut Vec<VariableValue>,
    ) -> Result<(), DecodeError> {
        let mut reader = ByteReader::new(buffer);

        while reader.remaining() > 0 {
            out.push(self.decode_value(&mut reader)?);

            if delimited && reader.remaining() > 0 {
                reader.skip(1)?;
            }
        }

        Ok(())
    }

    fn decode_value(&self, reader: &mut ByteReader<'_>) -> Result<VariableValue, DecodeError> {
        let code = reader.u8()?;
        let kind = self
            .table
            .get(code)
            .ok_or(DecodeError::UnknownVariableType { code })?;

        self.decode_body(kind, reader)
    }

    fn decode_body(&self, kind: VariableKind, reader: &mut ByteReader<'_>) -> Result<VariableValue, DecodeError> {
        let value = match kind {
            VariableKind::None => VariableValue::None,
            VariableKind::String => {
                let length = reader.u16()? as usize;
                VariableValue::String(reader.string(length)?)
            }
            VariableKind::Bool => VariableValue::Bool(reader.u8()? == 1),
            VariableKind::Num | VariableKind::Float => VariableValue::Float(reader.f32()?),
            VariableKind::Int => VariableValue::Int(reader.u32()?),
            VariableKind::Pose => VariableValue::Pose(Pose {
                x: reader.f32()?,
                y: reader.f32()?,
                z: reader.f32()?,
                rx: reader.f32()?,
                ry: reader.f32()?,
                rz: reader.f32()?,
            }),
            VariableKind::List => {
                let count = reader.u16()? as usize;
                VariableValue::List(self.decode_list_body(count, reader)?)
            }
            VariableKind::Matrix => {
                let rows = reader.u16()? as usize;
                let columns = reader.u16()? as usize;
                if columns == 0 {
                    return Ok(VariableValue::Matrix(vec![Vec::new(); rows]));
                }

                let row_len = self.list_byte_len(columns, reader)?;
                let mut matrix = Vec::with_capacity(rows);
                for _ in 0..rows {
                    let row = reader.take(row_len)?;
                    let mut values = Vec::with_capacity(columns);
                    self.decode_range(row, false, &mut values)?;
                    matrix.push(values);
                }
                VariableValue::Matrix(matrix)
            }
        };

        Ok(value)
    }

    fn decode_list_body(&self, count: usize, reader: &mut ByteReader<'_>) -> Result<Vec<VariableValue>, DecodeError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let byte_len = self.list_byte_len(count, reader)?;
        let body = reader.take(byte_len)?;
        let mut values = Vec::with_capacity(count);
        self.decode_range(body, false, &mut values)?;
        Ok(values)
    }

    /// Byte length of `count` homogeneous elements, each with its code byte.
    /// The element type is taken from the first element without consuming it.
    fn list_byte_len(&self, count: usize, reader: &ByteReader<'_>) -> Result<usize, DecodeError> {
        let code = reader.peek_u8()?;
        let size = self
            .table
            .get(code)
            .ok_or(DecodeError::UnknownVariableType { code })?
            .fixed_size()
            .ok_or(DecodeError::UnsizedListElement { code })?;

        Ok((size + 1) * count)
    }
}

/// Decode one value with the standard tables for `version`
pub fn decode_variable(
    buffer: &[u8],
    offset: usize,
    version: &ProtocolVersion,
) -> Result<(VariableValue, usize), DecodeError> {
    let tables = TypeTables::standard();
    VariableCodec::new(&tables, version).decode(buffer, offset)
}

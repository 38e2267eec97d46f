//! Bounds-checked big-endian reads over a packet slice

use crate::error::DecodeError;

/// Running-offset reader over a borrowed byte slice.
///
/// Every read is checked against the slice length and advances the
/// offset only on success.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    pub fn at(buffer: &'a [u8], offset: usize) -> Self {
        Self { buffer, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.buffer.len())
            .ok_or(DecodeError::Truncated {
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            })?;
        let bytes = &self.buffer[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    /// Everything from the current offset to the end
    pub fn rest(&mut self) -> &'a [u8] {
        let start = self.offset.min(self.buffer.len());
        self.offset = self.buffer.len();
        &self.buffer[start..]
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.take(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }

    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.buffer.get(self.offset).copied().ok_or(DecodeError::Truncated {
            offset: self.offset,
            needed: 1,
            available: 0,
        })
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i8(&mut self) -> Result<i8, DecodeError> {
        Ok(i8::from_be_bytes(self.array()?))
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_be_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_be_bytes(self.array()?))
    }

    /// Read `len` bytes as UTF-8, replacing invalid sequences
    pub fn string(&mut self, len: usize) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    /// Read the remainder of the buffer as UTF-8
    pub fn rest_string(&mut self) -> String {
        String::from_utf8_lossy(self.rest()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let data = [0x01, 0x00, 0x02, 0xff, 0xff, 0xff, 0xfe, b'h', b'i'];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.u8().unwrap(), 1);
        assert_eq!(reader.u16().unwrap(), 2);
        assert_eq!(reader.i32().unwrap(), -2);
        assert_eq!(reader.rest_string(), "hi");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_short_read_reports_truncation_without_advancing() {
        let data = [0x00, 0x01];
        let mut reader = ByteReader::new(&data);

        assert_eq!(
            reader.u32(),
            Err(DecodeError::Truncated {
                offset: 0,
                needed: 4,
                available: 2
            })
        );
        assert_eq!(reader.offset(), 0);
        assert_eq!(reader.u16().unwrap(), 1);
    }

    #[test]
    fn test_floats_are_big_endian() {
        let mut data = Vec::new();
        data.extend_from_slice(&1.5f32.to_be_bytes());
        data.extend_from_slice(&(-0.25f64).to_be_bytes());
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.f32().unwrap(), 1.5);
        assert_eq!(reader.f64().unwrap(), -0.25);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let data = [7u8, 8];
        let reader = ByteReader::at(&data, 1);
        assert_eq!(reader.peek_u8().unwrap(), 8);
        assert_eq!(reader.offset(), 1);
    }
}

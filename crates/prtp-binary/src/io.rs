use crate::error::{BinaryError, BinaryResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Cursor over an immutable byte buffer with big-endian accessors.
#[derive(Debug, Clone)]
pub struct BinaryReader {
    buffer: Bytes,
}

impl BinaryReader {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    fn ensure(&self, needed: usize) -> BinaryResult<()> {
        if self.buffer.remaining() < needed {
            return Err(BinaryError::UnexpectedEof {
                needed,
                remaining: self.buffer.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> BinaryResult<u8> {
        self.ensure(1)?;
        Ok(self.buffer.get_u8())
    }

    pub fn read_u16_be(&mut self) -> BinaryResult<u16> {
        self.ensure(2)?;
        Ok(self.buffer.get_u16())
    }

    pub fn read_u32_be(&mut self) -> BinaryResult<u32> {
        self.ensure(4)?;
        Ok(self.buffer.get_u32())
    }

    /// Splits off the next `len` bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> BinaryResult<Bytes> {
        self.ensure(len)?;
        Ok(self.buffer.split_to(len))
    }
}

/// Growable byte buffer with big-endian accessors. Writes cannot fail.
#[derive(Debug, Clone, Default)]
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn write_u16_be(&mut self, value: u16) {
        self.buffer.put_u16(value);
    }

    pub fn write_u32_be(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.put_slice(bytes);
    }

    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }
}

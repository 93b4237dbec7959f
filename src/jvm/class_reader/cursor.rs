use crate::jvm::Error;
use byteorder::{BigEndian, ByteOrder};

/// Big-endian reader over a class file, tracking its position
///
/// Every read is bounds checked and fails with [`Error::UnexpectedEof`] instead of panicking, so
/// truncated input surfaces as an ordinary error.
#[derive(Copy, Clone, Debug)]
pub struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Cursor<'a> {
        Cursor { data, offset: 0 }
    }

    /// Cursor over the same data, positioned at `offset`
    pub fn at(data: &'a [u8], offset: usize) -> Cursor<'a> {
        Cursor { data, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes left after the current position
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(Error::UnexpectedEof {
                offset: self.offset,
                needed: len,
            })?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(BigEndian::read_i16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(BigEndian::read_i32(self.read_bytes(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(BigEndian::read_i64(self.read_bytes(8)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(BigEndian::read_u64(self.read_bytes(8)?))
    }

    /// Skip `attributes_count` and the attributes that follow
    pub fn skip_attributes(&mut self) -> Result<(), Error> {
        let count = self.read_u16()?;
        for _ in 0..count {
            self.skip(2)?;
            let len = self.read_u32()? as usize;
            self.skip(len)?;
        }
        Ok(())
    }
}

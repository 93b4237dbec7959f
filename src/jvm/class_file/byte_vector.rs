use crate::jvm::Error;
use byteorder::{BigEndian, ByteOrder};
use std::io::{Result as IoResult, Write};

/// Growable, append-only byte buffer backing every serialized structure
///
/// Writes append at the end; the only way to modify earlier bytes is to backpatch a length or
/// offset field with [`ByteVector::put_u16_at`] / [`ByteVector::put_u32_at`], which never changes
/// the length. Capacity grows geometrically, so appends are amortized `O(1)`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteVector {
    data: Vec<u8>,
}

impl ByteVector {
    pub fn new() -> ByteVector {
        ByteVector { data: Vec::new() }
    }

    /// Pre-allocate room for `capacity` bytes (used once the final size is known)
    pub fn with_capacity(capacity: usize) -> ByteVector {
        ByteVector {
            data: Vec::with_capacity(capacity),
        }
    }

    fn reserve(&mut self, additional: usize) {
        let needed = self.data.len() + additional;
        if needed > self.data.capacity() {
            let doubled = (self.data.capacity() * 2).max(64);
            self.data.reserve_exact(doubled.max(needed) - self.data.len());
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.reserve(1);
        self.data.push(value);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.put_u8(value as u8);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_be_bytes());
    }

    pub fn put_i16(&mut self, value: i16) {
        self.put_u16(value as u16);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_be_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.put_u32(value as u32);
    }

    pub fn put_u64(&mut self, value: u64) {
        self.put_bytes(&value.to_be_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.put_u64(value as u64);
    }

    /// Write a `u16` byte length followed by the modified UTF-8 encoding of a string
    pub fn put_utf8(&mut self, value: &str) -> Result<(), Error> {
        let encoded = cesu8::to_java_cesu8(value);
        let len = u16::try_from(encoded.len()).map_err(|_| Error::StringTooLong(encoded.len()))?;
        self.put_u16(len);
        self.put_bytes(&encoded);
        Ok(())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    pub fn put_byte_vector(&mut self, other: &ByteVector) {
        self.put_bytes(&other.data);
    }

    /// Overwrite a previously written byte
    pub fn put_u8_at(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Overwrite a previously written `u16` (eg. to backpatch a count)
    pub fn put_u16_at(&mut self, offset: usize, value: u16) {
        BigEndian::write_u16(&mut self.data[offset..offset + 2], value);
    }

    /// Overwrite a previously written `u32` (eg. to backpatch an attribute length)
    pub fn put_u32_at(&mut self, offset: usize, value: u32) {
        BigEndian::write_u32(&mut self.data[offset..offset + 4], value);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl Write for ByteVector {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.put_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ByteVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteVector({} bytes)", self.data.len())
    }
}

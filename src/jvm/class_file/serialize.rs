use super::ByteVector;
use crate::jvm::Error;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Error as IoError, ErrorKind, Result};

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Structures whose serialized length is known before they are written
///
/// The class writer sums these up to allocate its output once; [`put_sized`] then checks that
/// the bytes actually written agree.
pub trait ByteSize {
    fn byte_size(&self) -> usize;
}

/// Serialize a sized structure, failing if it writes a different number of bytes than declared
pub fn put_sized<T: ByteSize + Serialize>(
    value: &T,
    out: &mut ByteVector,
    what: &'static str,
) -> std::result::Result<(), Error> {
    let declared = value.byte_size();
    let start = out.len();
    value.serialize(out)?;
    let written = out.len() - start;
    if written != declared {
        return Err(Error::SizeMismatch {
            what,
            declared,
            written,
        });
    }
    Ok(())
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(*self)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(*self)
    }
}

impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let len = u16::try_from(self.len()).map_err(|_| {
            let msg = format!("sequence of {} elements has no u16 length", self.len());
            IoError::new(ErrorKind::InvalidData, msg)
        })?;
        len.serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: ByteSize> ByteSize for Vec<A> {
    fn byte_size(&self) -> usize {
        2 + self.iter().map(ByteSize::byte_size).sum::<usize>()
    }
}

impl ByteSize for u16 {
    fn byte_size(&self) -> usize {
        2
    }
}

use super::{AttributeWriter, ByteSize, Serialize, Utf8ConstantIndex};
use crate::jvm::MethodAccessFlags;
use byteorder::WriteBytesExt;

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<AttributeWriter>,
}

impl ByteSize for Method {
    fn byte_size(&self) -> usize {
        6 + self.attributes.byte_size()
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{put_sized, AttributeBody, ByteVector, ConstantPool};

    #[test]
    fn method_record_layout() {
        let mut pool = ConstantPool::new();
        let name_index = pool.new_utf8("run").unwrap();
        let descriptor_index = pool.new_utf8("()V").unwrap();
        let signature = pool.new_utf8("()V").unwrap();
        let method = Method {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            name_index,
            descriptor_index,
            attributes: vec![
                AttributeWriter::new(&mut pool, AttributeBody::Signature(signature)).unwrap(),
            ],
        };
        let mut out = ByteVector::new();
        put_sized(&method, &mut out, "method").unwrap();
        assert_eq!(
            out.as_slice(),
            &[0, 9, 0, 1, 0, 2, 0, 1, 0, 3, 0, 0, 0, 2, 0, 2]
        );
    }
}

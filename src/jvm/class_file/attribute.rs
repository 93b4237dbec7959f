use super::{
    put_sized, Annotation, BootstrapMethod, ByteSize, ByteVector, ClassConstantIndex,
    ConstantIndex, ConstantPool, NameAndTypeConstantIndex, Serialize, Utf8ConstantIndex,
};
use crate::jvm::verifier::VerificationType;
use crate::jvm::{Error, InnerClassAccessFlags};
use byteorder::WriteBytesExt;
use std::io::{Error as IoError, ErrorKind};

/// Attributes (used in classes, fields, methods, and on the `Code` attribute)
///
/// The set of attributes the writer knows how to produce is closed: each kind is a variant of
/// [`AttributeBody`], and anything else is carried through as [`AttributeBody::Raw`]. Every
/// variant knows its exact serialized size up front, which is what lets the class writer size
/// its output before writing a single byte.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug)]
pub struct AttributeWriter {
    pub name_index: Utf8ConstantIndex,
    pub body: AttributeBody,
}

impl AttributeWriter {
    /// Wrap an attribute body, interning its name
    pub fn new(pool: &mut ConstantPool, body: AttributeBody) -> Result<AttributeWriter, Error> {
        let name_index = pool.new_utf8(body.name())?;
        Ok(AttributeWriter { name_index, body })
    }

    /// Serialize, checking that exactly [`ByteSize::byte_size`] bytes were written
    pub fn put(&self, out: &mut ByteVector) -> Result<(), Error> {
        put_sized(self, out, "attribute")
    }
}

/// Name index (2 bytes), attribute length (4 bytes), then the body
impl ByteSize for AttributeWriter {
    fn byte_size(&self) -> usize {
        6 + self.body.byte_size()
    }
}

impl Serialize for AttributeWriter {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;
        let len = u32::try_from(self.body.byte_size())
            .map_err(|_| IoError::new(ErrorKind::InvalidData, "attribute longer than 4GB"))?;
        len.serialize(writer)?;
        self.body.serialize(writer)
    }
}

#[derive(Debug)]
pub enum AttributeBody {
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.9
    Signature(Utf8ConstantIndex),

    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.10
    SourceFile(Utf8ConstantIndex),

    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.28
    NestHost(ClassConstantIndex),

    /// Initial value of a static field
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.2
    ConstantValue(ConstantIndex),

    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.29
    NestMembers(Vec<ClassConstantIndex>),

    /// Innermost class (and method) around a local or anonymous class
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.7
    EnclosingMethod {
        class: ClassConstantIndex,
        method: Option<NameAndTypeConstantIndex>,
    },

    /// Checked exceptions a method may throw
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.5
    Exceptions(Vec<ClassConstantIndex>),

    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
    LineNumberTable(Vec<LineNumber>),

    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.13
    LocalVariableTable(Vec<LocalVariable>),

    /// Every inner class referenced in a class' constant pool must be included in the inner
    /// classes attribute on the class.
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.6
    InnerClasses(Vec<InnerClass>),

    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.23
    BootstrapMethods(Vec<BootstrapMethod>),

    /// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
    StackMapTable(Vec<StackMapFrame>),

    /// `RuntimeVisibleAnnotations` or `RuntimeInvisibleAnnotations`, with the annotations
    /// already encoded against the pool
    Annotations {
        visible: bool,
        count: u16,
        encoded: ByteVector,
    },

    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
    Code(CodeAttribute),

    /// Attribute the writer does not interpret, copied through byte for byte
    Raw { name: String, data: Vec<u8> },
}

impl AttributeBody {
    pub fn name(&self) -> &str {
        match self {
            AttributeBody::Signature(_) => "Signature",
            AttributeBody::SourceFile(_) => "SourceFile",
            AttributeBody::NestHost(_) => "NestHost",
            AttributeBody::ConstantValue(_) => "ConstantValue",
            AttributeBody::NestMembers(_) => "NestMembers",
            AttributeBody::EnclosingMethod { .. } => "EnclosingMethod",
            AttributeBody::Exceptions(_) => "Exceptions",
            AttributeBody::LineNumberTable(_) => "LineNumberTable",
            AttributeBody::LocalVariableTable(_) => "LocalVariableTable",
            AttributeBody::InnerClasses(_) => "InnerClasses",
            AttributeBody::BootstrapMethods(_) => "BootstrapMethods",
            AttributeBody::StackMapTable(_) => "StackMapTable",
            AttributeBody::Annotations { visible: true, .. } => "RuntimeVisibleAnnotations",
            AttributeBody::Annotations { visible: false, .. } => "RuntimeInvisibleAnnotations",
            AttributeBody::Code(_) => "Code",
            AttributeBody::Raw { name, .. } => name,
        }
    }

    /// Encode the annotations with the given visibility (`None` if there are none)
    pub fn annotations(
        pool: &mut ConstantPool,
        annotations: &[(Annotation, bool)],
        visible: bool,
    ) -> Result<Option<AttributeBody>, Error> {
        let mut encoded = ByteVector::new();
        let mut count: u16 = 0;
        for (annotation, _) in annotations.iter().filter(|(_, vis)| *vis == visible) {
            annotation.put(pool, &mut encoded)?;
            count = count.checked_add(1).ok_or(Error::TooManyEntries {
                what: "annotations",
                count: count as usize + 1,
            })?;
        }
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(AttributeBody::Annotations {
            visible,
            count,
            encoded,
        }))
    }
}

impl ByteSize for AttributeBody {
    fn byte_size(&self) -> usize {
        match self {
            AttributeBody::Signature(_)
            | AttributeBody::SourceFile(_)
            | AttributeBody::NestHost(_)
            | AttributeBody::ConstantValue(_) => 2,
            AttributeBody::EnclosingMethod { .. } => 4,
            AttributeBody::NestMembers(classes) | AttributeBody::Exceptions(classes) => {
                classes.byte_size()
            }
            AttributeBody::LineNumberTable(lines) => 2 + 4 * lines.len(),
            AttributeBody::LocalVariableTable(locals) => 2 + 10 * locals.len(),
            AttributeBody::InnerClasses(classes) => 2 + 8 * classes.len(),
            AttributeBody::BootstrapMethods(methods) => {
                2 + methods
                    .iter()
                    .map(|method| 4 + 2 * method.arguments.len())
                    .sum::<usize>()
            }
            AttributeBody::StackMapTable(frames) => frames.byte_size(),
            AttributeBody::Annotations { encoded, .. } => 2 + encoded.len(),
            AttributeBody::Code(code) => code.byte_size(),
            AttributeBody::Raw { data, .. } => data.len(),
        }
    }
}

impl Serialize for AttributeBody {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            AttributeBody::Signature(index) | AttributeBody::SourceFile(index) => {
                index.serialize(writer)
            }
            AttributeBody::NestHost(class) => class.serialize(writer),
            AttributeBody::ConstantValue(value) => value.serialize(writer),
            AttributeBody::EnclosingMethod { class, method } => {
                class.serialize(writer)?;
                method
                    .unwrap_or(NameAndTypeConstantIndex(ConstantIndex::ZERO))
                    .serialize(writer)
            }
            AttributeBody::NestMembers(classes) | AttributeBody::Exceptions(classes) => {
                classes.serialize(writer)
            }
            AttributeBody::LineNumberTable(lines) => lines.serialize(writer),
            AttributeBody::LocalVariableTable(locals) => locals.serialize(writer),
            AttributeBody::InnerClasses(classes) => classes.serialize(writer),
            AttributeBody::BootstrapMethods(methods) => methods.serialize(writer),
            AttributeBody::StackMapTable(frames) => frames.serialize(writer),
            AttributeBody::Annotations { count, encoded, .. } => {
                count.serialize(writer)?;
                writer.write_all(encoded.as_slice())
            }
            AttributeBody::Code(code) => code.serialize(writer),
            AttributeBody::Raw { data, .. } => writer.write_all(data),
        }
    }
}

/// Bytecode of a method, along with everything needed to verify and debug it
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: ByteVector,

    /// Serialized exception table, including its `u16` count
    pub exception_table: ByteVector,
    pub attributes: Vec<AttributeWriter>,
}

impl ByteSize for CodeAttribute {
    fn byte_size(&self) -> usize {
        2 + 2 + 4 + self.code.len() + self.exception_table.len() + self.attributes.byte_size()
    }
}

impl Serialize for CodeAttribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (self.code.len() as u32).serialize(writer)?;
        writer.write_all(self.code.as_slice())?;
        writer.write_all(self.exception_table.as_slice())?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)?;
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)?;
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct InnerClass {
    pub inner_class: ClassConstantIndex,

    /// Zero when the class is not a member (eg. local or anonymous classes)
    pub outer_class: ClassConstantIndex,

    /// Zero for anonymous classes
    pub inner_name: Utf8ConstantIndex,
    pub access_flags: InnerClassAccessFlags,
}

impl Serialize for InnerClass {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.inner_class.serialize(writer)?;
        self.outer_class.serialize(writer)?;
        self.inner_name.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        Ok(())
    }
}

/// One entry of a `StackMapTable`, relative to the frame before it
///
/// Only frames over pool indices and `u16` offsets can be written out. Other entry types are
/// useful to pick the encoding of a frame before resolving its classes.
#[derive(Clone, PartialEq, Debug)]
pub enum StackMapFrame<T = VerificationType<ClassConstantIndex, u16>> {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack { offset_delta: u16, stack: T },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack { offset_delta: u16, locals: Vec<T> },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<T>,
        stack: Vec<T>,
    },
}

impl<T> StackMapFrame<T> {
    /// Convert every entry of the frame, keeping its shape
    pub fn try_map<U, E>(
        &self,
        mut map: impl FnMut(&T) -> Result<U, E>,
    ) -> Result<StackMapFrame<U>, E> {
        Ok(match self {
            StackMapFrame::SameLocalsNoStack { offset_delta } => StackMapFrame::SameLocalsNoStack {
                offset_delta: *offset_delta,
            },
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => StackMapFrame::SameLocalsOneStack {
                offset_delta: *offset_delta,
                stack: map(stack)?,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => StackMapFrame::ChopLocalsNoStack {
                offset_delta: *offset_delta,
                chopped_k: *chopped_k,
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => StackMapFrame::AppendLocalsNoStack {
                offset_delta: *offset_delta,
                locals: locals.iter().map(&mut map).collect::<Result<_, _>>()?,
            },
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => StackMapFrame::Full {
                offset_delta: *offset_delta,
                locals: locals.iter().map(&mut map).collect::<Result<_, _>>()?,
                stack: stack.iter().map(&mut map).collect::<Result<_, _>>()?,
            },
        })
    }
}

impl ByteSize for StackMapFrame {
    fn byte_size(&self) -> usize {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    1
                } else {
                    3
                }
            }
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                let tag = if *offset_delta <= 63 { 1 } else { 3 };
                tag + stack.byte_size()
            }
            StackMapFrame::ChopLocalsNoStack { .. } => 3,
            StackMapFrame::AppendLocalsNoStack { locals, .. } => {
                3 + locals.iter().map(ByteSize::byte_size).sum::<usize>()
            }
            StackMapFrame::Full { locals, stack, .. } => 3 + locals.byte_size() + stack.byte_size(),
        }
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                if !(1..=3).contains(chopped_k) {
                    let msg = format!("chop frame removes {} locals (must be 1-3)", chopped_k);
                    return Err(IoError::new(ErrorKind::InvalidData, msg));
                }
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                let added_k = locals.len();
                if !(1..=3).contains(&added_k) {
                    let msg = format!("append frame adds {} locals (must be 1-3)", added_k);
                    return Err(IoError::new(ErrorKind::InvalidData, msg));
                }
                (251 + added_k as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

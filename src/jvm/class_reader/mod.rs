//! Decoding of class files into visitor events
//!
//! [`ClassReader::new`] checks the header and decodes the constant pool up front. Everything
//! else is decoded lazily by [`ClassReader::accept`], which walks the class once and reports it
//! to a [`ClassVisitor`].

mod annotations;
mod cursor;
mod instructions;
mod stack_map;

pub use cursor::*;

use super::class_file::{
    Annotation, BootstrapMethod, ClassConstantIndex, Constant, ConstantDynamic, ConstantIndex,
    ConstantPool, ConstantValue, Handle, HandleKind, NameAndTypeConstantIndex, Utf8ConstantIndex,
    Version, MAGIC,
};
use super::visitor::{Attribute, ClassVisitor};
use super::{
    ClassAccessFlags, Error, FieldAccessFlags, InnerClassAccessFlags, MethodAccessFlags,
    ReaderFlags,
};
use crate::util::{Offset, OffsetVec};

/// Parsed view of a class file
///
/// The reader borrows the input bytes. Only the constant pool (and the bootstrap methods that
/// pool entries point into) is decoded eagerly; offsets of the other sections are recorded so
/// they can be decoded on demand.
#[derive(Debug)]
pub struct ClassReader<'a> {
    data: &'a [u8],
    version: Version,

    /// Pool entries by index (`long` and `double` take up two indices)
    constants: OffsetVec<Constant>,
    bootstrap_methods: Vec<BootstrapMethod>,

    /// Offset of `access_flags`, right after the constant pool
    header_start: usize,
    fields_start: usize,
    methods_start: usize,
    attributes_start: usize,
}

/// Attribute located in the input, but not yet decoded
#[derive(Copy, Clone, Debug)]
pub(crate) struct RawAttribute<'r> {
    pub name: &'r str,

    /// Offset of the attribute body in the class file
    pub offset: usize,
    pub data: &'r [u8],
}

/// Class, field, or method attributes that every member kind shares
#[derive(Default)]
struct MemberAttributes<'r> {
    signature: Option<&'r str>,
    visible_annotations: Option<RawAttribute<'r>>,
    invisible_annotations: Option<RawAttribute<'r>>,
    others: Vec<RawAttribute<'r>>,
}

impl<'a> ClassReader<'a> {
    /// Check the header and decode the constant pool
    pub fn new(data: &'a [u8]) -> Result<ClassReader<'a>, Error> {
        let mut cursor = Cursor::new(data);
        let magic = cursor.read_u32()?;
        if magic != MAGIC {
            return Err(Error::InvalidMagic(magic));
        }
        let minor_version = cursor.read_u16()?;
        let major_version = cursor.read_u16()?;
        if !(Version::OLDEST_MAJOR..=Version::LATEST.major_version).contains(&major_version) {
            return Err(Error::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }
        let version = Version {
            major_version,
            minor_version,
        };

        let constants = read_constant_pool(&mut cursor)?;
        let header_start = cursor.offset();

        cursor.skip(6)?;
        let interfaces_count = cursor.read_u16()? as usize;
        cursor.skip(2 * interfaces_count)?;
        let fields_start = cursor.offset();
        skip_members(&mut cursor)?;
        let methods_start = cursor.offset();
        skip_members(&mut cursor)?;
        let attributes_start = cursor.offset();

        let mut reader = ClassReader {
            data,
            version,
            constants,
            bootstrap_methods: vec![],
            header_start,
            fields_start,
            methods_start,
            attributes_start,
        };
        let mut attributes = Cursor::at(data, attributes_start);
        let bootstrap_methods = match reader
            .read_attributes(&mut attributes)?
            .into_iter()
            .find(|attribute| attribute.name == "BootstrapMethods")
        {
            Some(attribute) => reader.read_bootstrap_methods(attribute)?,
            None => vec![],
        };
        reader.bootstrap_methods = bootstrap_methods;
        log::debug!(
            "Read class file version {}.{} with {} constants",
            major_version,
            minor_version,
            reader.constants.len()
        );
        Ok(reader)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn access_flags(&self) -> Result<ClassAccessFlags, Error> {
        let flags = Cursor::at(self.data, self.header_start).read_u16()?;
        Ok(ClassAccessFlags::decode(flags))
    }

    /// Internal name of the class
    pub fn class_name(&self) -> Result<&str, Error> {
        let index = Cursor::at(self.data, self.header_start + 2).read_u16()?;
        self.class(index)
    }

    /// Internal name of the superclass (absent only for `java/lang/Object`)
    pub fn super_name(&self) -> Result<Option<&str>, Error> {
        let index = Cursor::at(self.data, self.header_start + 4).read_u16()?;
        self.optional_class(index)
    }

    pub fn interfaces(&self) -> Result<Vec<&str>, Error> {
        let mut cursor = Cursor::at(self.data, self.header_start + 6);
        let count = cursor.read_u16()?;
        (0..count)
            .map(|_| self.class(cursor.read_u16()?))
            .collect()
    }

    /// Constant pool entry at an index
    pub fn constant(&self, index: u16) -> Result<&Constant, Error> {
        self.constants
            .get_offset(Offset(index as usize))
            .ok()
            .ok_or(Error::InvalidConstantIndex(index))
    }

    pub fn utf8(&self, index: u16) -> Result<&str, Error> {
        match self.constant(index)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Error::UnexpectedConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Internal name in a `Class` entry
    pub fn class(&self, index: u16) -> Result<&str, Error> {
        match self.constant(index)? {
            Constant::Class(name) => self.utf8(name.0 .0),
            _ => Err(Error::UnexpectedConstant {
                index,
                expected: "Class",
            }),
        }
    }

    /// Like [`ClassReader::class`], but with index 0 meaning "none"
    pub fn optional_class(&self, index: u16) -> Result<Option<&str>, Error> {
        if index == 0 {
            Ok(None)
        } else {
            self.class(index).map(Some)
        }
    }

    fn optional_utf8(&self, index: u16) -> Result<Option<&str>, Error> {
        if index == 0 {
            Ok(None)
        } else {
            self.utf8(index).map(Some)
        }
    }

    /// Name and descriptor in a `NameAndType` entry
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), Error> {
        match self.constant(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(name.0 .0)?, self.utf8(descriptor.0 .0)?))
            }
            _ => Err(Error::UnexpectedConstant {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Owner, name, descriptor, and interface-ness of a field or method reference
    pub fn member_ref(&self, index: u16) -> Result<(&str, &str, &str, bool), Error> {
        let (class, name_and_type, is_interface) = match self.constant(index)? {
            Constant::FieldRef(class, name_and_type) => (class, name_and_type, false),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => (class, name_and_type, *is_interface),
            _ => {
                return Err(Error::UnexpectedConstant {
                    index,
                    expected: "Fieldref or Methodref",
                })
            }
        };
        let owner = self.class(class.0 .0)?;
        let (name, descriptor) = self.name_and_type(name_and_type.0 .0)?;
        Ok((owner, name, descriptor, is_interface))
    }

    pub fn handle(&self, index: u16) -> Result<Handle, Error> {
        match self.constant(index)? {
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                let (owner, name, descriptor, is_interface) = self.member_ref(member.0)?;
                Ok(Handle {
                    kind: *handle_kind,
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                    is_interface,
                })
            }
            _ => Err(Error::UnexpectedConstant {
                index,
                expected: "MethodHandle",
            }),
        }
    }

    /// Loadable constant (operand of `ldc`, a bootstrap argument, or a `ConstantValue`)
    pub fn constant_value(&self, index: u16) -> Result<ConstantValue, Error> {
        Ok(match self.constant(index)? {
            Constant::Integer(value) => ConstantValue::Integer(*value),
            Constant::Float(bits) => ConstantValue::Float(f32::from_bits(*bits)),
            Constant::Long(value) => ConstantValue::Long(*value),
            Constant::Double(bits) => ConstantValue::Double(f64::from_bits(*bits)),
            Constant::String(utf8) => ConstantValue::String(self.utf8(utf8.0 .0)?.to_owned()),
            Constant::Class(name) => ConstantValue::Class(self.utf8(name.0 .0)?.to_owned()),
            Constant::MethodType { descriptor } => {
                ConstantValue::MethodType(self.utf8(descriptor.0 .0)?.to_owned())
            }
            Constant::MethodHandle { .. } => ConstantValue::MethodHandle(self.handle(index)?),
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                let (name, descriptor) = self.name_and_type(name_and_type.0 .0)?;
                let (bootstrap_method, arguments) = self.bootstrap_method(*bootstrap_method)?;
                ConstantValue::Dynamic(ConstantDynamic {
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                    bootstrap_method,
                    arguments,
                })
            }
            _ => {
                return Err(Error::UnexpectedConstant {
                    index,
                    expected: "loadable constant",
                })
            }
        })
    }

    /// Bootstrap method handle and static arguments of an entry in `BootstrapMethods`
    pub fn bootstrap_method(
        &self,
        position: u16,
    ) -> Result<(Handle, Vec<ConstantValue>), Error> {
        let bootstrap_method = self
            .bootstrap_methods
            .get(position as usize)
            .ok_or_else(|| Error::MalformedAttribute {
                name: String::from("BootstrapMethods"),
                reason: format!("no bootstrap method at position {}", position),
            })?;
        let handle = self.handle(bootstrap_method.method.0)?;
        let arguments = bootstrap_method
            .arguments
            .iter()
            .map(|argument| self.constant_value(argument.0))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((handle, arguments))
    }

    /// Serialized constant pool entries, exactly as they appear in the input
    pub fn raw_constant_pool(&self) -> &'a [u8] {
        &self.data[10..self.header_start]
    }

    /// Decoded pool entries with their indices
    pub fn constants(&self) -> impl Iterator<Item = (u16, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, _, constant)| (offset.0 as u16, constant))
    }

    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        &self.bootstrap_methods
    }

    /// Walk the whole class, reporting it to `visitor`
    pub fn accept(&self, visitor: &mut dyn ClassVisitor, flags: ReaderFlags) -> Result<(), Error> {
        let skip_debug = flags.contains(ReaderFlags::SKIP_DEBUG);
        let interfaces: Vec<String> = self
            .interfaces()?
            .into_iter()
            .map(str::to_owned)
            .collect();

        let mut source_file = None;
        let mut nest_host = None;
        let mut enclosing_method = None;
        let mut nest_members = None;
        let mut inner_classes = None;
        let mut member_attributes = MemberAttributes::default();
        let mut cursor = Cursor::at(self.data, self.attributes_start);
        for attribute in self.read_attributes(&mut cursor)? {
            match attribute.name {
                "SourceFile" => source_file = Some(attribute),
                "NestHost" => nest_host = Some(attribute),
                "EnclosingMethod" => enclosing_method = Some(attribute),
                "NestMembers" => nest_members = Some(attribute),
                "InnerClasses" => inner_classes = Some(attribute),
                "BootstrapMethods" => (),
                _ => member_attributes.add(self, attribute)?,
            }
        }

        visitor.visit(
            self.version,
            self.access_flags()?,
            self.class_name()?,
            member_attributes.signature,
            self.super_name()?,
            &interfaces,
        )?;
        if let (Some(attribute), false) = (source_file, skip_debug) {
            let index = attribute.cursor(self.data).read_u16()?;
            visitor.visit_source(self.utf8(index)?)?;
        }
        if let Some(attribute) = nest_host {
            let index = attribute.cursor(self.data).read_u16()?;
            visitor.visit_nest_host(self.class(index)?)?;
        }
        if let Some(attribute) = enclosing_method {
            let mut cursor = attribute.cursor(self.data);
            let owner = self.class(cursor.read_u16()?)?;
            let method = match cursor.read_u16()? {
                0 => None,
                index => Some(self.name_and_type(index)?),
            };
            visitor.visit_outer_class(
                owner,
                method.map(|(name, _)| name),
                method.map(|(_, descriptor)| descriptor),
            )?;
        }
        for (annotation, visible) in member_attributes.annotations(self)? {
            visitor.visit_annotation(&annotation, visible)?;
        }
        for attribute in &member_attributes.others {
            visitor.visit_attribute(&attribute.to_owned_attribute())?;
        }
        if let Some(attribute) = nest_members {
            let mut cursor = attribute.cursor(self.data);
            let count = cursor.read_u16()?;
            for _ in 0..count {
                visitor.visit_nest_member(self.class(cursor.read_u16()?)?)?;
            }
        }
        if let Some(attribute) = inner_classes {
            let mut cursor = attribute.cursor(self.data);
            let count = cursor.read_u16()?;
            for _ in 0..count {
                let name = self.class(cursor.read_u16()?)?;
                let outer_name = self.optional_class(cursor.read_u16()?)?;
                let inner_name = self.optional_utf8(cursor.read_u16()?)?;
                let access_flags = InnerClassAccessFlags::decode(cursor.read_u16()?);
                visitor.visit_inner_class(name, outer_name, inner_name, access_flags)?;
            }
        }

        let mut cursor = Cursor::at(self.data, self.fields_start);
        let fields_count = cursor.read_u16()?;
        for _ in 0..fields_count {
            self.read_field(&mut cursor, visitor)?;
        }

        let mut cursor = Cursor::at(self.data, self.methods_start);
        let methods_count = cursor.read_u16()?;
        for _ in 0..methods_count {
            self.read_method(&mut cursor, visitor, flags)?;
        }

        visitor.visit_end()
    }

    fn read_field(
        &self,
        cursor: &mut Cursor<'a>,
        visitor: &mut dyn ClassVisitor,
    ) -> Result<(), Error> {
        let access_flags = FieldAccessFlags::decode(cursor.read_u16()?);
        let name = self.utf8(cursor.read_u16()?)?;
        let descriptor = self.utf8(cursor.read_u16()?)?;

        let mut value = None;
        let mut member_attributes = MemberAttributes::default();
        for attribute in self.read_attributes(cursor)? {
            if attribute.name == "ConstantValue" {
                let index = attribute.cursor(self.data).read_u16()?;
                value = Some(self.constant_value(index)?);
            } else {
                member_attributes.add(self, attribute)?;
            }
        }

        let field_visitor = visitor.visit_field(
            access_flags,
            name,
            descriptor,
            member_attributes.signature,
            value.as_ref(),
        )?;
        if let Some(mut field_visitor) = field_visitor {
            for (annotation, visible) in member_attributes.annotations(self)? {
                field_visitor.visit_annotation(&annotation, visible)?;
            }
            for attribute in &member_attributes.others {
                field_visitor.visit_attribute(&attribute.to_owned_attribute())?;
            }
            field_visitor.visit_end()?;
        }
        Ok(())
    }

    fn read_method(
        &self,
        cursor: &mut Cursor<'a>,
        visitor: &mut dyn ClassVisitor,
        flags: ReaderFlags,
    ) -> Result<(), Error> {
        let access_flags = MethodAccessFlags::decode(cursor.read_u16()?);
        let name = self.utf8(cursor.read_u16()?)?;
        let descriptor = self.utf8(cursor.read_u16()?)?;

        let mut code = None;
        let mut exceptions = vec![];
        let mut member_attributes = MemberAttributes::default();
        for attribute in self.read_attributes(cursor)? {
            match attribute.name {
                "Code" => code = Some(attribute),
                "Exceptions" => {
                    let mut cursor = attribute.cursor(self.data);
                    let count = cursor.read_u16()?;
                    for _ in 0..count {
                        exceptions.push(self.class(cursor.read_u16()?)?.to_owned());
                    }
                }
                _ => member_attributes.add(self, attribute)?,
            }
        }

        let method_visitor = visitor.visit_method(
            access_flags,
            name,
            descriptor,
            member_attributes.signature,
            &exceptions,
        )?;
        if let Some(mut method_visitor) = method_visitor {
            for (annotation, visible) in member_attributes.annotations(self)? {
                method_visitor.visit_annotation(&annotation, visible)?;
            }
            for attribute in &member_attributes.others {
                method_visitor.visit_attribute(&attribute.to_owned_attribute())?;
            }
            if let (Some(code), false) = (code, flags.contains(ReaderFlags::SKIP_CODE)) {
                self.read_code(
                    code,
                    (access_flags, name, descriptor),
                    method_visitor.as_mut(),
                    flags,
                )?;
            }
            method_visitor.visit_end()?;
        }
        Ok(())
    }

    /// Locate the attributes at the cursor (starting with their count)
    pub(crate) fn read_attributes(
        &self,
        cursor: &mut Cursor<'a>,
    ) -> Result<Vec<RawAttribute<'_>>, Error> {
        let count = cursor.read_u16()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self.utf8(cursor.read_u16()?)?;
            let len = cursor.read_u32()? as usize;
            let offset = cursor.offset();
            let data = cursor.read_bytes(len)?;
            attributes.push(RawAttribute { name, offset, data });
        }
        Ok(attributes)
    }

    fn read_bootstrap_methods(
        &self,
        attribute: RawAttribute<'_>,
    ) -> Result<Vec<BootstrapMethod>, Error> {
        let mut cursor = attribute.cursor(self.data);
        let count = cursor.read_u16()?;
        let mut bootstrap_methods = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let method = ConstantIndex(cursor.read_u16()?);
            let arguments_count = cursor.read_u16()?;
            let arguments = (0..arguments_count)
                .map(|_| cursor.read_u16().map(ConstantIndex))
                .collect::<Result<Vec<_>, _>>()?;
            bootstrap_methods.push(BootstrapMethod { method, arguments });
        }
        Ok(bootstrap_methods)
    }
}

impl<'r> RawAttribute<'r> {
    pub fn cursor<'a>(&self, data: &'a [u8]) -> Cursor<'a> {
        Cursor::at(data, self.offset)
    }

    /// End of the attribute body in the class file
    pub fn end(&self) -> usize {
        self.offset + self.data.len()
    }

    fn to_owned_attribute(self) -> Attribute {
        Attribute {
            name: self.name.to_owned(),
            data: self.data.to_vec(),
        }
    }
}

impl<'r> MemberAttributes<'r> {
    fn add(&mut self, reader: &'r ClassReader<'_>, attribute: RawAttribute<'r>) -> Result<(), Error> {
        match attribute.name {
            "Signature" => {
                let index = attribute.cursor(reader.data).read_u16()?;
                self.signature = Some(reader.utf8(index)?);
            }
            "RuntimeVisibleAnnotations" => self.visible_annotations = Some(attribute),
            "RuntimeInvisibleAnnotations" => self.invisible_annotations = Some(attribute),
            _ => self.others.push(attribute),
        }
        Ok(())
    }

    /// Decoded annotations, visible ones first
    fn annotations(
        &self,
        reader: &ClassReader<'_>,
    ) -> Result<Vec<(Annotation, bool)>, Error> {
        let mut annotations = vec![];
        for (attribute, visible) in [
            (self.visible_annotations, true),
            (self.invisible_annotations, false),
        ] {
            if let Some(attribute) = attribute {
                let mut cursor = attribute.cursor(reader.data);
                for annotation in reader.read_annotations(&mut cursor)? {
                    annotations.push((annotation, visible));
                }
            }
        }
        Ok(annotations)
    }
}

impl ConstantPool {
    /// Pool that starts as a copy of the pool of a class being read
    ///
    /// Unchanged constants keep their indices, so attributes that are copied through without
    /// being decoded stay valid, and a class re-encoded without changes comes out byte for byte
    /// identical.
    pub fn from_reader(reader: &ClassReader<'_>) -> Result<ConstantPool, Error> {
        ConstantPool::from_existing(
            reader.raw_constant_pool(),
            reader
                .constants()
                .map(|(index, constant)| (index, constant.clone())),
            reader.bootstrap_methods().to_vec(),
        )
    }
}

fn read_constant_pool(cursor: &mut Cursor<'_>) -> Result<OffsetVec<Constant>, Error> {
    let count = cursor.read_u16()?;
    let mut constants = OffsetVec::new_starting_at(Offset(1));
    let mut index: u16 = 1;
    while index < count {
        constants.push(read_constant(cursor, index)?);
        index = u16::try_from(constants.offset_len().0)
            .map_err(|_| Error::InvalidConstantIndex(count))?;
    }
    Ok(constants)
}

fn utf8_index(cursor: &mut Cursor<'_>) -> Result<Utf8ConstantIndex, Error> {
    Ok(Utf8ConstantIndex(ConstantIndex(cursor.read_u16()?)))
}

fn class_index(cursor: &mut Cursor<'_>) -> Result<ClassConstantIndex, Error> {
    Ok(ClassConstantIndex(ConstantIndex(cursor.read_u16()?)))
}

fn name_and_type_index(cursor: &mut Cursor<'_>) -> Result<NameAndTypeConstantIndex, Error> {
    Ok(NameAndTypeConstantIndex(ConstantIndex(cursor.read_u16()?)))
}

fn read_constant(cursor: &mut Cursor<'_>, index: u16) -> Result<Constant, Error> {
    let tag = cursor.read_u8()?;
    Ok(match tag {
        Constant::UTF8 => {
            let len = cursor.read_u16()? as usize;
            let bytes = cursor.read_bytes(len)?;
            let string = cesu8::from_java_cesu8(bytes).map_err(|_| Error::MalformedUtf8(index))?;
            Constant::Utf8(string.into_owned())
        }
        Constant::INTEGER => Constant::Integer(cursor.read_i32()?),
        Constant::FLOAT => Constant::Float(cursor.read_u32()?),
        Constant::LONG => Constant::Long(cursor.read_i64()?),
        Constant::DOUBLE => Constant::Double(cursor.read_u64()?),
        Constant::CLASS => Constant::Class(utf8_index(cursor)?),
        Constant::STRING => Constant::String(utf8_index(cursor)?),
        Constant::FIELD_REF => Constant::FieldRef(class_index(cursor)?, name_and_type_index(cursor)?),
        Constant::METHOD_REF | Constant::INTERFACE_METHOD_REF => Constant::MethodRef {
            class: class_index(cursor)?,
            name_and_type: name_and_type_index(cursor)?,
            is_interface: tag == Constant::INTERFACE_METHOD_REF,
        },
        Constant::NAME_AND_TYPE => Constant::NameAndType {
            name: utf8_index(cursor)?,
            descriptor: utf8_index(cursor)?,
        },
        Constant::METHOD_HANDLE => {
            let kind = cursor.read_u8()?;
            let handle_kind =
                HandleKind::from_u8(kind).ok_or(Error::InvalidHandleKind { kind, index })?;
            Constant::MethodHandle {
                handle_kind,
                member: ConstantIndex(cursor.read_u16()?),
            }
        }
        Constant::METHOD_TYPE => Constant::MethodType {
            descriptor: utf8_index(cursor)?,
        },
        Constant::DYNAMIC => Constant::Dynamic {
            bootstrap_method: cursor.read_u16()?,
            name_and_type: name_and_type_index(cursor)?,
        },
        Constant::INVOKE_DYNAMIC => Constant::InvokeDynamic {
            bootstrap_method: cursor.read_u16()?,
            name_and_type: name_and_type_index(cursor)?,
        },
        Constant::MODULE => Constant::Module(utf8_index(cursor)?),
        Constant::PACKAGE => Constant::Package(utf8_index(cursor)?),
        _ => return Err(Error::InvalidConstantTag { tag, index }),
    })
}

/// Skip a `fields` or `methods` table (starting with its count)
fn skip_members(cursor: &mut Cursor<'_>) -> Result<(), Error> {
    let count = cursor.read_u16()?;
    for _ in 0..count {
        cursor.skip(6)?;
        cursor.skip_attributes()?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::jvm::class_file::{ConstantPool, Serialize};

    /// Class file with the given pool and no members (the header refers to no constants)
    pub fn class_with_pool(pool: &ConstantPool) -> Vec<u8> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        pool.serialize(&mut bytes).unwrap();
        bytes.extend_from_slice(&[0; 14]);
        bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Minimal class `A extends java/lang/Object` with a `long` in its pool
    fn minimal_class() -> Vec<u8> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        bytes.extend_from_slice(&[0, 7]); // constant_pool_count
        bytes.extend_from_slice(&[1, 0, 1, b'A']); // #1 Utf8 "A"
        bytes.extend_from_slice(&[7, 0, 1]); // #2 Class #1
        bytes.extend_from_slice(&[1, 0, 16]); // #3 Utf8 "java/lang/Object"
        bytes.extend_from_slice(b"java/lang/Object");
        bytes.extend_from_slice(&[7, 0, 3]); // #4 Class #3
        bytes.extend_from_slice(&[5, 0, 0, 0, 0, 0, 0, 0, 9]); // #5 Long 9 (and #6)
        bytes.extend_from_slice(&[0, 0x21, 0, 2, 0, 4]); // access, this, super
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]); // no interfaces/fields/methods/attrs
        bytes
    }

    #[test]
    fn header_and_pool() {
        let bytes = minimal_class();
        let reader = ClassReader::new(&bytes).unwrap();
        assert_eq!(reader.version(), Version::JAVA8);
        assert_eq!(
            reader.access_flags().unwrap(),
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER
        );
        assert_eq!(reader.class_name().unwrap(), "A");
        assert_eq!(reader.super_name().unwrap(), Some("java/lang/Object"));
        assert!(reader.interfaces().unwrap().is_empty());
        assert_eq!(reader.constant(5).unwrap(), &Constant::Long(9));
        assert!(matches!(
            reader.constant(6),
            Err(Error::InvalidConstantIndex(6))
        ));
        assert!(matches!(
            reader.utf8(2),
            Err(Error::UnexpectedConstant {
                index: 2,
                expected: "Utf8"
            })
        ));
        assert_eq!(reader.constants().count(), 5);
    }

    #[test]
    fn copied_pool_keeps_indices() {
        let bytes = minimal_class();
        let reader = ClassReader::new(&bytes).unwrap();
        let mut pool = ConstantPool::from_reader(&reader).unwrap();
        assert_eq!(pool.count(), 7);
        assert_eq!(pool.new_class("java/lang/Object").unwrap().0 .0, 4);
        assert_eq!(pool.new_long(9).unwrap().0, 5);
        assert_eq!(pool.new_utf8("B").unwrap().0 .0, 7);
    }

    #[test]
    fn bad_input_is_rejected() {
        let mut bytes = minimal_class();
        bytes[0] = 0xCB;
        assert!(matches!(
            ClassReader::new(&bytes),
            Err(Error::InvalidMagic(0xCBFEBABE))
        ));

        let mut bytes = minimal_class();
        bytes[7] = 70;
        assert!(matches!(
            ClassReader::new(&bytes),
            Err(Error::UnsupportedVersion { major: 70, minor: 0 })
        ));

        let bytes = minimal_class();
        assert!(matches!(
            ClassReader::new(&bytes[..bytes.len() - 3]),
            Err(Error::UnexpectedEof { .. })
        ));

        let mut bytes = minimal_class();
        bytes[10] = 2;
        assert!(matches!(
            ClassReader::new(&bytes),
            Err(Error::InvalidConstantTag { tag: 2, index: 1 })
        ));
    }
}

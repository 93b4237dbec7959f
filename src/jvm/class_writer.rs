use super::class_file::{
    put_sized, AttributeBody, AttributeWriter, ByteSize, ByteVector, ClassConstantIndex,
    ConstantIndex, ConstantPool, ConstantValue, Field, InnerClass, Method,
    NameAndTypeConstantIndex, Serialize, Utf8ConstantIndex, Version, MAGIC,
};
use super::code::MethodWriter;
use super::verifier::{ObjectHierarchy, TypeHierarchy};
use super::visitor::{Attribute, ClassVisitor, FieldVisitor, MethodVisitor};
use super::{
    Annotation, BinaryName, ClassAccessFlags, ClassReader, Error, FieldAccessFlags, FieldType,
    InnerClassAccessFlags, MethodAccessFlags, ParseDescriptor, WriterFlags,
};

/// Class visitor that assembles a class file
///
/// Events are encoded as they arrive, so the writer can be fed by a [`ClassReader`] (to
/// transform an existing class) or driven directly (to generate one). Once `visit_end` has been
/// called, [`ClassWriter::to_bytes`] produces the class file.
///
/// A writer made with [`ClassWriter::from_reader`] starts from a copy of the input's constant
/// pool. Untouched constants then keep their indices, so raw attributes that refer to the pool
/// stay valid and an unmodified class is written back byte for byte. Raw attributes are refused
/// by a writer with a fresh pool.
pub struct ClassWriter {
    flags: WriterFlags,
    pool: ConstantPool,

    /// Was the pool seeded from an existing class?
    copied_pool: bool,
    hierarchy: Box<dyn TypeHierarchy + Send>,

    header: Option<Header>,
    source_file: Option<Utf8ConstantIndex>,
    nest_host: Option<ClassConstantIndex>,
    enclosing_method: Option<(ClassConstantIndex, Option<NameAndTypeConstantIndex>)>,
    nest_members: Vec<ClassConstantIndex>,
    inner_classes: Vec<InnerClass>,
    annotations: Vec<(Annotation, bool)>,
    attributes: Vec<Attribute>,
    fields: Vec<Field>,
    methods: Vec<Method>,
}

/// Everything given to `visit`
struct Header {
    version: Version,
    access_flags: ClassAccessFlags,
    name: BinaryName,
    this_class: ClassConstantIndex,

    /// Zero for `java/lang/Object` (and `module-info`)
    super_class: ClassConstantIndex,
    interfaces: Vec<ClassConstantIndex>,
    signature: Option<Utf8ConstantIndex>,
}

impl ClassWriter {
    /// Writer with an empty constant pool
    pub fn new(flags: WriterFlags) -> ClassWriter {
        ClassWriter::with_pool(flags, ConstantPool::new(), false)
    }

    /// Writer whose constant pool starts as a copy of the pool of `reader`
    pub fn from_reader(reader: &ClassReader<'_>, flags: WriterFlags) -> Result<ClassWriter, Error> {
        let pool = ConstantPool::from_reader(reader)?;
        Ok(ClassWriter::with_pool(flags, pool, true))
    }

    fn with_pool(flags: WriterFlags, pool: ConstantPool, copied_pool: bool) -> ClassWriter {
        ClassWriter {
            flags,
            pool,
            copied_pool,
            hierarchy: Box::new(ObjectHierarchy),
            header: None,
            source_file: None,
            nest_host: None,
            enclosing_method: None,
            nest_members: vec![],
            inner_classes: vec![],
            annotations: vec![],
            attributes: vec![],
            fields: vec![],
            methods: vec![],
        }
    }

    /// Use `hierarchy` to find common superclasses when computing frames
    pub fn with_hierarchy(mut self, hierarchy: impl TypeHierarchy + Send + 'static) -> ClassWriter {
        self.hierarchy = Box::new(hierarchy);
        self
    }

    /// Flags in effect (`COMPUTE_FRAMES` is dropped for classes too old to have frames)
    pub fn flags(&self) -> WriterFlags {
        self.flags
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.pool
    }

    fn header(&self) -> Result<&Header, Error> {
        self.header.as_ref().ok_or(Error::MissingClassHeader)
    }

    /// Start a field
    pub fn add_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Result<FieldWriter<'_>, Error> {
        self.header()?;
        FieldWriter::new(
            &mut self.pool,
            &mut self.fields,
            self.copied_pool,
            access_flags,
            name,
            descriptor,
            signature,
            value,
        )
    }

    /// Start a method
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[String],
    ) -> Result<MethodWriter<'_>, Error> {
        let this_class = self.header()?.name.clone();
        MethodWriter::new(
            &mut self.pool,
            &mut self.methods,
            &*self.hierarchy,
            self.flags,
            self.copied_pool,
            this_class,
            access_flags,
            name,
            descriptor,
            signature,
            exceptions,
        )
    }

    /// Encode the class file
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let attributes = self.class_attributes()?;
        let header = self.header()?;

        let size = 4
            + 4
            + self.pool.byte_size()
            + 6
            + header.interfaces.byte_size()
            + self.fields.byte_size()
            + self.methods.byte_size()
            + attributes.byte_size();
        let mut out = ByteVector::with_capacity(size);
        MAGIC.serialize(&mut out)?;
        header.version.serialize(&mut out)?;
        put_sized(&self.pool, &mut out, "constant pool")?;
        header.access_flags.serialize(&mut out)?;
        header.this_class.serialize(&mut out)?;
        header.super_class.serialize(&mut out)?;
        put_sized(&header.interfaces, &mut out, "interfaces")?;
        put_sized(&self.fields, &mut out, "fields")?;
        put_sized(&self.methods, &mut out, "methods")?;
        put_sized(&attributes, &mut out, "class attributes")?;
        if out.len() != size {
            return Err(Error::SizeMismatch {
                what: "class",
                declared: size,
                written: out.len(),
            });
        }

        log::debug!(
            "Wrote class {} ({} bytes, {} constants)",
            header.name,
            size,
            self.pool.count()
        );
        Ok(out.into_vec())
    }

    /// `BootstrapMethods` comes last: encoding the others may still add bootstrap methods
    fn class_attributes(&mut self) -> Result<Vec<AttributeWriter>, Error> {
        let signature = self.header()?.signature;
        let mut attributes = vec![];
        if let Some(source_file) = self.source_file {
            attributes.push(AttributeWriter::new(
                &mut self.pool,
                AttributeBody::SourceFile(source_file),
            )?);
        }
        if let Some(signature) = signature {
            attributes.push(AttributeWriter::new(
                &mut self.pool,
                AttributeBody::Signature(signature),
            )?);
        }
        if let Some((class, method)) = self.enclosing_method {
            attributes.push(AttributeWriter::new(
                &mut self.pool,
                AttributeBody::EnclosingMethod { class, method },
            )?);
        }
        if let Some(nest_host) = self.nest_host {
            attributes.push(AttributeWriter::new(
                &mut self.pool,
                AttributeBody::NestHost(nest_host),
            )?);
        }
        if !self.nest_members.is_empty() {
            attributes.push(AttributeWriter::new(
                &mut self.pool,
                AttributeBody::NestMembers(self.nest_members.clone()),
            )?);
        }
        if !self.inner_classes.is_empty() {
            attributes.push(AttributeWriter::new(
                &mut self.pool,
                AttributeBody::InnerClasses(self.inner_classes.clone()),
            )?);
        }
        for visible in [true, false] {
            let body = AttributeBody::annotations(&mut self.pool, &self.annotations, visible)?;
            if let Some(body) = body {
                attributes.push(AttributeWriter::new(&mut self.pool, body)?);
            }
        }
        for attribute in &self.attributes {
            attributes.push(AttributeWriter::new(
                &mut self.pool,
                AttributeBody::Raw {
                    name: attribute.name.clone(),
                    data: attribute.data.clone(),
                },
            )?);
        }
        if !self.pool.bootstrap_methods().is_empty() {
            let bootstrap_methods = self.pool.bootstrap_methods().to_vec();
            attributes.push(AttributeWriter::new(
                &mut self.pool,
                AttributeBody::BootstrapMethods(bootstrap_methods),
            )?);
        }
        checked_count(attributes.len(), "class attributes")?;
        Ok(attributes)
    }
}

impl ClassVisitor for ClassWriter {
    fn visit(
        &mut self,
        version: Version,
        access_flags: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[String],
    ) -> Result<(), Error> {
        if self.flags.computes_frames() && !version.needs_stack_map_frames() {
            log::debug!(
                "Class {} has version {}, computing maximums but no frames",
                name,
                version.major_version
            );
            self.flags.remove(WriterFlags::COMPUTE_FRAMES);
            self.flags.insert(WriterFlags::COMPUTE_MAXS);
        }

        let this_class = self.pool.new_class(name)?;
        let super_class = match super_name {
            Some(super_name) => self.pool.new_class(super_name)?,
            None => ClassConstantIndex(ConstantIndex::ZERO),
        };
        let interfaces = interfaces
            .iter()
            .map(|interface| self.pool.new_class(interface))
            .collect::<Result<Vec<_>, _>>()?;
        checked_count(interfaces.len(), "interfaces")?;
        let signature = signature
            .map(|signature| self.pool.new_utf8(signature))
            .transpose()?;

        self.header = Some(Header {
            version,
            access_flags,
            name: BinaryName::parse(name)?,
            this_class,
            super_class,
            interfaces,
            signature,
        });
        Ok(())
    }

    fn visit_source(&mut self, source_file: &str) -> Result<(), Error> {
        self.source_file = Some(self.pool.new_utf8(source_file)?);
        Ok(())
    }

    fn visit_nest_host(&mut self, nest_host: &str) -> Result<(), Error> {
        self.nest_host = Some(self.pool.new_class(nest_host)?);
        Ok(())
    }

    fn visit_outer_class(
        &mut self,
        owner: &str,
        name: Option<&str>,
        descriptor: Option<&str>,
    ) -> Result<(), Error> {
        let class = self.pool.new_class(owner)?;
        let method = match (name, descriptor) {
            (Some(name), Some(descriptor)) => Some(self.pool.new_name_and_type(name, descriptor)?),
            (None, None) => None,
            _ => {
                return Err(Error::MalformedAttribute {
                    name: String::from("EnclosingMethod"),
                    reason: format!("method of {} needs both a name and a descriptor", owner),
                })
            }
        };
        self.enclosing_method = Some((class, method));
        Ok(())
    }

    fn visit_annotation(&mut self, annotation: &Annotation, visible: bool) -> Result<(), Error> {
        self.annotations.push((annotation.clone(), visible));
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        check_raw_attribute(self.copied_pool, attribute)?;
        self.attributes.push(attribute.clone());
        Ok(())
    }

    fn visit_nest_member(&mut self, nest_member: &str) -> Result<(), Error> {
        let member = self.pool.new_class(nest_member)?;
        self.nest_members.push(member);
        checked_count(self.nest_members.len(), "nest members")?;
        Ok(())
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access_flags: InnerClassAccessFlags,
    ) -> Result<(), Error> {
        let inner_class = self.pool.new_class(name)?;
        if self
            .inner_classes
            .iter()
            .any(|existing| existing.inner_class == inner_class)
        {
            return Ok(());
        }
        let outer_class = match outer_name {
            Some(outer_name) => self.pool.new_class(outer_name)?,
            None => ClassConstantIndex(ConstantIndex::ZERO),
        };
        let inner_name = match inner_name {
            Some(inner_name) => self.pool.new_utf8(inner_name)?,
            None => Utf8ConstantIndex(ConstantIndex::ZERO),
        };
        self.inner_classes.push(InnerClass {
            inner_class,
            outer_class,
            inner_name,
            access_flags,
        });
        checked_count(self.inner_classes.len(), "inner classes")?;
        Ok(())
    }

    fn visit_field<'a>(
        &'a mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Result<Option<Box<dyn FieldVisitor + 'a>>, Error> {
        let writer = self.add_field(access_flags, name, descriptor, signature, value)?;
        Ok(Some(Box::new(writer)))
    }

    fn visit_method<'a>(
        &'a mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[String],
    ) -> Result<Option<Box<dyn MethodVisitor + 'a>>, Error> {
        let writer = self.add_method(access_flags, name, descriptor, signature, exceptions)?;
        Ok(Some(Box::new(writer)))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.header()?;
        checked_count(self.fields.len(), "fields")?;
        checked_count(self.methods.len(), "methods")?;
        Ok(())
    }
}

/// Writer for one field, handed out by [`ClassWriter::add_field`]
///
/// The field is added to the class in `visit_end`.
pub struct FieldWriter<'a> {
    pool: &'a mut ConstantPool,
    fields: &'a mut Vec<Field>,
    copied_pool: bool,
    access_flags: FieldAccessFlags,
    name_index: Utf8ConstantIndex,
    descriptor_index: Utf8ConstantIndex,
    signature: Option<Utf8ConstantIndex>,
    value: Option<ConstantIndex>,
    annotations: Vec<(Annotation, bool)>,
    attributes: Vec<Attribute>,
}

impl<'a> FieldWriter<'a> {
    fn new(
        pool: &'a mut ConstantPool,
        fields: &'a mut Vec<Field>,
        copied_pool: bool,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Result<FieldWriter<'a>, Error> {
        FieldType::<BinaryName>::parse(descriptor)?;
        let name_index = pool.new_utf8(name)?;
        let descriptor_index = pool.new_utf8(descriptor)?;
        let signature = signature
            .map(|signature| pool.new_utf8(signature))
            .transpose()?;
        let value = match value {
            None => None,
            Some(
                value @ (ConstantValue::Integer(_)
                | ConstantValue::Float(_)
                | ConstantValue::Long(_)
                | ConstantValue::Double(_)
                | ConstantValue::String(_)),
            ) => Some(pool.new_constant(value)?),
            Some(other) => {
                return Err(Error::MalformedAttribute {
                    name: String::from("ConstantValue"),
                    reason: format!("{:?} cannot initialize field {}", other, name),
                })
            }
        };

        Ok(FieldWriter {
            pool,
            fields,
            copied_pool,
            access_flags,
            name_index,
            descriptor_index,
            signature,
            value,
            annotations: vec![],
            attributes: vec![],
        })
    }
}

impl<'a> FieldVisitor for FieldWriter<'a> {
    fn visit_annotation(&mut self, annotation: &Annotation, visible: bool) -> Result<(), Error> {
        self.annotations.push((annotation.clone(), visible));
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        check_raw_attribute(self.copied_pool, attribute)?;
        self.attributes.push(attribute.clone());
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        let mut attributes = vec![];
        if let Some(value) = self.value {
            attributes.push(AttributeWriter::new(
                self.pool,
                AttributeBody::ConstantValue(value),
            )?);
        }
        if let Some(signature) = self.signature {
            attributes.push(AttributeWriter::new(
                self.pool,
                AttributeBody::Signature(signature),
            )?);
        }
        for visible in [true, false] {
            if let Some(body) = AttributeBody::annotations(self.pool, &self.annotations, visible)? {
                attributes.push(AttributeWriter::new(self.pool, body)?);
            }
        }
        for attribute in self.attributes.drain(..) {
            attributes.push(AttributeWriter::new(
                self.pool,
                AttributeBody::Raw {
                    name: attribute.name,
                    data: attribute.data,
                },
            )?);
        }
        checked_count(attributes.len(), "field attributes")?;

        self.fields.push(Field {
            access_flags: self.access_flags,
            name_index: self.name_index,
            descriptor_index: self.descriptor_index,
            attributes,
        });
        Ok(())
    }
}

fn checked_count(len: usize, what: &'static str) -> Result<u16, Error> {
    u16::try_from(len).map_err(|_| Error::TooManyEntries { what, count: len })
}

/// Raw attributes refer to constants by index, which only hold in a copy of the input's pool
pub(crate) fn check_raw_attribute(copied_pool: bool, attribute: &Attribute) -> Result<(), Error> {
    if copied_pool {
        Ok(())
    } else {
        Err(Error::RawAttributeNeedsCopiedPool(attribute.name.clone()))
    }
}

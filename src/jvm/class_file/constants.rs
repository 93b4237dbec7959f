use super::{BootstrapMethod, ByteSize, ByteVector, ConstantValue, Handle, HandleKind, Serialize};
use crate::jvm::Error;
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Constant pool with structural sharing
///
/// Every constant is interned: requesting a constant that is already in the pool returns its
/// existing index, so equal constants always share one entry. Entries are stored as `Item`s in an
/// arena and found through open hash chaining (each bucket holds the head of a chain, each item
/// links to the next item in its bucket). Entries are serialized into `bytes` as soon as they
/// are allocated, so the pool can be written out in allocation order without revisiting them.
///
/// Index 0 is never allocated, and indices are never reused or renumbered.
#[derive(Debug)]
pub struct ConstantPool {
    /// Head of the chain for each bucket (always a power of two in length)
    buckets: Vec<Option<usize>>,

    /// Interned constants, in allocation order
    items: Vec<Item>,

    /// Serialized entries, in allocation order
    bytes: ByteVector,

    /// Index of the next constant to be allocated
    next_index: u16,

    /// Entries of the `BootstrapMethods` attribute, referred to by `invokedynamic` and dynamic
    /// constants
    bootstrap_methods: Vec<BootstrapMethod>,
    bootstrap_method_indices: HashMap<BootstrapMethod, u16>,
}

/// Interned constant pool entry
#[derive(Debug)]
struct Item {
    index: u16,
    constant: Constant,
    hash: u64,

    /// Next item in the same bucket
    next: Option<usize>,
}

const INITIAL_BUCKETS: usize = 64;

impl ConstantPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            buckets: vec![None; INITIAL_BUCKETS],
            items: vec![],
            bytes: ByteVector::new(),
            next_index: 1,
            bootstrap_methods: vec![],
            bootstrap_method_indices: HashMap::new(),
        }
    }

    /// Make a pool which starts out as an exact copy of an existing pool
    ///
    /// The entries are copied byte for byte (including any duplicates), and are registered so that
    /// later requests for the same constants reuse the existing indices.
    pub fn from_existing(
        raw_entries: &[u8],
        entries: impl IntoIterator<Item = (u16, Constant)>,
        bootstrap_methods: Vec<BootstrapMethod>,
    ) -> Result<ConstantPool, Error> {
        let mut pool = ConstantPool::new();
        pool.bytes.put_bytes(raw_entries);
        for (index, constant) in entries {
            let width = constant.width() as u16;
            let hash = hash_constant(&constant);
            if pool.lookup(&constant, hash).is_none() {
                pool.link(index, constant, hash);
            }
            pool.next_index = index
                .checked_add(width)
                .ok_or(Error::ConstantPoolOverflow(index as usize + width as usize))?;
        }
        for (position, bootstrap_method) in bootstrap_methods.into_iter().enumerate() {
            let position = position as u16;
            pool.bootstrap_method_indices
                .entry(bootstrap_method.clone())
                .or_insert(position);
            pool.bootstrap_methods.push(bootstrap_method);
        }
        log::debug!(
            "Seeded constant pool with {} entries and {} bootstrap methods",
            pool.items.len(),
            pool.bootstrap_methods.len()
        );
        Ok(pool)
    }

    /// Number of indices used so far (this is the `constant_pool_count` of the class file)
    pub fn count(&self) -> u16 {
        self.next_index
    }

    /// Look up the constant at an index
    pub fn get(&self, index: ConstantIndex) -> Option<&Constant> {
        self.items
            .binary_search_by_key(&index.0, |item| item.index)
            .ok()
            .map(|found| &self.items[found].constant)
    }

    /// Bootstrap methods referenced so far
    pub fn bootstrap_methods(&self) -> &[BootstrapMethod] {
        &self.bootstrap_methods
    }

    fn lookup(&self, constant: &Constant, hash: u64) -> Option<u16> {
        let mut cursor = self.buckets[self.bucket(hash)];
        while let Some(item_idx) = cursor {
            let item = &self.items[item_idx];
            if item.hash == hash && &item.constant == constant {
                return Some(item.index);
            }
            cursor = item.next;
        }
        None
    }

    fn bucket(&self, hash: u64) -> usize {
        (hash as usize) & (self.buckets.len() - 1)
    }

    /// Add an item to the front of its bucket chain, growing the table if it is too full
    fn link(&mut self, index: u16, constant: Constant, hash: u64) {
        let bucket = self.bucket(hash);
        let item_idx = self.items.len();
        self.items.push(Item {
            index,
            constant,
            hash,
            next: self.buckets[bucket],
        });
        self.buckets[bucket] = Some(item_idx);

        if self.items.len() > self.buckets.len() * 3 / 4 {
            self.rehash();
        }
    }

    fn rehash(&mut self) {
        let new_len = self.buckets.len() * 2;
        self.buckets = vec![None; new_len];
        for item_idx in 0..self.items.len() {
            let bucket = self.bucket(self.items[item_idx].hash);
            self.items[item_idx].next = self.buckets[bucket];
            self.buckets[bucket] = Some(item_idx);
        }
    }

    /// Get the index of a constant, allocating a new entry if it is not already in the pool
    fn intern(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let hash = hash_constant(&constant);
        if let Some(index) = self.lookup(&constant, hash) {
            return Ok(ConstantIndex(index));
        }

        let index = self.next_index;
        let width = constant.width();
        let next_index = index
            .checked_add(width as u16)
            .ok_or(Error::ConstantPoolOverflow(index as usize + width))?;
        constant.serialize(&mut self.bytes)?;
        self.next_index = next_index;
        self.link(index, constant, hash);
        Ok(ConstantIndex(index))
    }

    pub fn new_utf8(&mut self, value: impl AsRef<str>) -> Result<Utf8ConstantIndex, Error> {
        let value = value.as_ref();
        let encoded_len = cesu8::to_java_cesu8(value).len();
        if encoded_len > u16::MAX as usize {
            return Err(Error::StringTooLong(encoded_len));
        }
        self.intern(Constant::Utf8(value.to_owned()))
            .map(Utf8ConstantIndex)
    }

    pub fn new_integer(&mut self, value: i32) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Integer(value))
    }

    /// Intern a float, keyed on its exact bit pattern (so `-0.0` and `0.0` are distinct)
    pub fn new_float(&mut self, value: f32) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Float(value.to_bits()))
    }

    pub fn new_long(&mut self, value: i64) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Long(value))
    }

    /// Intern a double, keyed on its exact bit pattern (so `-0.0` and `0.0` are distinct)
    pub fn new_double(&mut self, value: f64) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Double(value.to_bits()))
    }

    /// Intern a class reference (array classes use their descriptor as the name)
    pub fn new_class(&mut self, internal_name: &str) -> Result<ClassConstantIndex, Error> {
        let name = self.new_utf8(internal_name)?;
        self.intern(Constant::Class(name)).map(ClassConstantIndex)
    }

    pub fn new_string(&mut self, value: &str) -> Result<ConstantIndex, Error> {
        let utf8 = self.new_utf8(value)?;
        self.intern(Constant::String(utf8))
    }

    pub fn new_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name = self.new_utf8(name)?;
        let descriptor = self.new_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeConstantIndex)
    }

    pub fn new_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let class = self.new_class(owner)?;
        let name_and_type = self.new_name_and_type(name, descriptor)?;
        self.intern(Constant::FieldRef(class, name_and_type))
    }

    pub fn new_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<ConstantIndex, Error> {
        let class = self.new_class(owner)?;
        let name_and_type = self.new_name_and_type(name, descriptor)?;
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })
    }

    pub fn new_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, Error> {
        let descriptor = self.new_utf8(descriptor)?;
        self.intern(Constant::MethodType { descriptor })
    }

    pub fn new_method_handle(&mut self, handle: &Handle) -> Result<ConstantIndex, Error> {
        let member = match handle.kind {
            HandleKind::GetField
            | HandleKind::GetStatic
            | HandleKind::PutField
            | HandleKind::PutStatic => {
                self.new_field_ref(&handle.owner, &handle.name, &handle.descriptor)?
            }
            _ => self.new_method_ref(
                &handle.owner,
                &handle.name,
                &handle.descriptor,
                handle.is_interface,
            )?,
        };
        self.intern(Constant::MethodHandle {
            handle_kind: handle.kind,
            member,
        })
    }

    pub fn new_module(&mut self, name: &str) -> Result<ConstantIndex, Error> {
        let name = self.new_utf8(name)?;
        self.intern(Constant::Module(name))
    }

    pub fn new_package(&mut self, name: &str) -> Result<ConstantIndex, Error> {
        let name = self.new_utf8(name)?;
        self.intern(Constant::Package(name))
    }

    /// Register a bootstrap method and its static arguments, returning its position in the
    /// `BootstrapMethods` attribute
    pub fn new_bootstrap_method(
        &mut self,
        method: &Handle,
        arguments: &[ConstantValue],
    ) -> Result<u16, Error> {
        let method = self.new_method_handle(method)?;
        let arguments = arguments
            .iter()
            .map(|argument| self.new_constant(argument))
            .collect::<Result<Vec<_>, _>>()?;
        let bootstrap_method = BootstrapMethod { method, arguments };

        if let Some(position) = self.bootstrap_method_indices.get(&bootstrap_method) {
            return Ok(*position);
        }
        let position = u16::try_from(self.bootstrap_methods.len()).map_err(|_| {
            Error::TooManyEntries {
                what: "BootstrapMethods",
                count: self.bootstrap_methods.len() + 1,
            }
        })?;
        self.bootstrap_method_indices
            .insert(bootstrap_method.clone(), position);
        self.bootstrap_methods.push(bootstrap_method);
        Ok(position)
    }

    pub fn new_invoke_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &Handle,
        arguments: &[ConstantValue],
    ) -> Result<ConstantIndex, Error> {
        let bootstrap_method = self.new_bootstrap_method(bootstrap_method, arguments)?;
        let name_and_type = self.new_name_and_type(name, descriptor)?;
        self.intern(Constant::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        })
    }

    pub fn new_constant_dynamic(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &Handle,
        arguments: &[ConstantValue],
    ) -> Result<ConstantIndex, Error> {
        let bootstrap_method = self.new_bootstrap_method(bootstrap_method, arguments)?;
        let name_and_type = self.new_name_and_type(name, descriptor)?;
        self.intern(Constant::Dynamic {
            bootstrap_method,
            name_and_type,
        })
    }

    /// Intern a loadable constant (as used by `ldc`, bootstrap arguments, or `ConstantValue`)
    pub fn new_constant(&mut self, value: &ConstantValue) -> Result<ConstantIndex, Error> {
        match value {
            ConstantValue::Integer(i) => self.new_integer(*i),
            ConstantValue::Float(f) => self.new_float(*f),
            ConstantValue::Long(l) => self.new_long(*l),
            ConstantValue::Double(d) => self.new_double(*d),
            ConstantValue::String(s) => self.new_string(s),
            ConstantValue::Class(name) => self.new_class(name).map(|idx| idx.0),
            ConstantValue::MethodType(descriptor) => self.new_method_type(descriptor),
            ConstantValue::MethodHandle(handle) => self.new_method_handle(handle),
            ConstantValue::Dynamic(dynamic) => self.new_constant_dynamic(
                &dynamic.name,
                &dynamic.descriptor,
                &dynamic.bootstrap_method,
                &dynamic.arguments,
            ),
        }
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

/// The pool section of a class file: the `u16` count followed by every entry
impl ByteSize for ConstantPool {
    fn byte_size(&self) -> usize {
        2 + self.bytes.len()
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.next_index.serialize(writer)?;
        writer.write_all(self.bytes.as_slice())
    }
}

fn hash_constant(constant: &Constant) -> u64 {
    let mut hasher = DefaultHasher::new();
    constant.hash(&mut hasher);
    hasher.finish()
}

/// Constant pool entry, with references to other entries given as indices
///
/// `float` and `double` values are kept as their raw bits, so two constants are equal exactly
/// when their encodings are equal.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float` (raw bits)
    Float(u32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double` (raw bits)
    Double(u64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),

    Package(Utf8ConstantIndex),
}

impl Constant {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;

    /// Human readable kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Constant::Class(_) => "Class",
            Constant::FieldRef(_, _) => "Fieldref",
            Constant::MethodRef { .. } => "Methodref",
            Constant::String(_) => "String",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::Utf8(_) => "Utf8",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType { .. } => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module(_) => "Module",
            Constant::Package(_) => "Package",
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                Constant::UTF8.serialize(writer)?;
                let buffer = cesu8::to_java_cesu8(string);
                let len = u16::try_from(buffer.len()).map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "UTF8 constant too long")
                })?;
                len.serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                Constant::INTEGER.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(bits) => {
                Constant::FLOAT.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Long(long) => {
                Constant::LONG.serialize(writer)?;
                writer.write_i64::<byteorder::BigEndian>(*long)?;
            }
            Constant::Double(bits) => {
                Constant::DOUBLE.serialize(writer)?;
                writer.write_u64::<byteorder::BigEndian>(*bits)?;
            }
            Constant::Class(name) => {
                Constant::CLASS.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                Constant::STRING.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                Constant::FIELD_REF.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let tag = if *is_interface {
                    Constant::INTERFACE_METHOD_REF
                } else {
                    Constant::METHOD_REF
                };
                tag.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                Constant::NAME_AND_TYPE.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                Constant::METHOD_HANDLE.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                Constant::METHOD_TYPE.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                Constant::DYNAMIC.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                Constant::INVOKE_DYNAMIC.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                Constant::MODULE.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                Constant::PACKAGE.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

impl ConstantIndex {
    /// Placeholder index (eg. "any" catch type, or no superclass)
    pub const ZERO: ConstantIndex = ConstantIndex(0);
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

impl From<Utf8ConstantIndex> for ConstantIndex {
    fn from(index: Utf8ConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl From<ClassConstantIndex> for ConstantIndex {
    fn from(index: ClassConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl From<NameAndTypeConstantIndex> for ConstantIndex {
    fn from(index: NameAndTypeConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for Utf8ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for ClassConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for NameAndTypeConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl ByteSize for ConstantIndex {
    fn byte_size(&self) -> usize {
        2
    }
}

impl ByteSize for ClassConstantIndex {
    fn byte_size(&self) -> usize {
        2
    }
}

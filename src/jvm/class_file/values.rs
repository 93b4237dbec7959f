use super::{ByteVector, ConstantIndex, ConstantPool, Serialize};
use crate::jvm::Error;
use byteorder::WriteBytesExt;

/// Value that can be loaded with `ldc`, passed as a bootstrap argument, or used to initialize a
/// static field
#[derive(Clone, PartialEq, Debug)]
pub enum ConstantValue {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),

    /// Class literal (internal name, or descriptor for array classes)
    Class(String),

    /// Method type, given by its method descriptor
    MethodType(String),

    MethodHandle(Handle),

    Dynamic(ConstantDynamic),
}

impl ConstantValue {
    /// Does this value take up two stack slots?
    pub fn is_wide(&self) -> bool {
        match self {
            ConstantValue::Long(_) | ConstantValue::Double(_) => true,
            ConstantValue::Dynamic(dynamic) => {
                dynamic.descriptor == "J" || dynamic.descriptor == "D"
            }
            _ => false,
        }
    }
}

/// Symbolic reference to a field or method, used by method handle constants
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Handle {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,

    /// Is `owner` an interface?
    pub is_interface: bool,
}

/// Dynamically computed constant (`CONSTANT_Dynamic`)
#[derive(Clone, PartialEq, Debug)]
pub struct ConstantDynamic {
    pub name: String,
    pub descriptor: String,
    pub bootstrap_method: Handle,
    pub arguments: Vec<ConstantValue>,
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    pub fn from_u8(kind: u8) -> Option<HandleKind> {
        Some(match kind {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        }
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.to_u8().serialize(writer)
    }
}

/// Entry in the `BootstrapMethods` attribute
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.23
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BootstrapMethod {
    /// `MethodHandle` constant
    pub method: ConstantIndex,
    pub arguments: Vec<ConstantIndex>,
}

impl Serialize for BootstrapMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.method.serialize(writer)?;
        self.arguments.serialize(writer)?;
        Ok(())
    }
}

/// Annotation on a class, field, or method
#[derive(Clone, PartialEq, Debug)]
pub struct Annotation {
    /// Field descriptor of the annotation interface
    pub descriptor: String,

    /// Element name and value pairs, in declaration order
    pub values: Vec<(String, ElementValue)>,
}

/// Value of an annotation element
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16.1
#[derive(Clone, PartialEq, Debug)]
pub enum ElementValue {
    Byte(i8),
    Char(u16),
    Short(i16),
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum { descriptor: String, name: String },

    /// Class literal, given by its return descriptor (eg. `V` or `Ljava/lang/String;`)
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Encode the annotation (interning every constant it refers to)
    pub fn put(&self, pool: &mut ConstantPool, out: &mut ByteVector) -> Result<(), Error> {
        out.put_u16(pool.new_utf8(&self.descriptor)?.0 .0);
        out.put_u16(count(self.values.len(), "annotation elements")?);
        for (name, value) in &self.values {
            out.put_u16(pool.new_utf8(name)?.0 .0);
            value.put(pool, out)?;
        }
        Ok(())
    }
}

impl ElementValue {
    fn put(&self, pool: &mut ConstantPool, out: &mut ByteVector) -> Result<(), Error> {
        match self {
            ElementValue::Byte(b) => {
                out.put_u8(b'B');
                out.put_u16(pool.new_integer(*b as i32)?.0);
            }
            ElementValue::Char(c) => {
                out.put_u8(b'C');
                out.put_u16(pool.new_integer(*c as i32)?.0);
            }
            ElementValue::Short(s) => {
                out.put_u8(b'S');
                out.put_u16(pool.new_integer(*s as i32)?.0);
            }
            ElementValue::Boolean(z) => {
                out.put_u8(b'Z');
                out.put_u16(pool.new_integer(*z as i32)?.0);
            }
            ElementValue::Int(i) => {
                out.put_u8(b'I');
                out.put_u16(pool.new_integer(*i)?.0);
            }
            ElementValue::Long(j) => {
                out.put_u8(b'J');
                out.put_u16(pool.new_long(*j)?.0);
            }
            ElementValue::Float(f) => {
                out.put_u8(b'F');
                out.put_u16(pool.new_float(*f)?.0);
            }
            ElementValue::Double(d) => {
                out.put_u8(b'D');
                out.put_u16(pool.new_double(*d)?.0);
            }
            ElementValue::String(s) => {
                out.put_u8(b's');
                out.put_u16(pool.new_utf8(s)?.0 .0);
            }
            ElementValue::Enum { descriptor, name } => {
                out.put_u8(b'e');
                out.put_u16(pool.new_utf8(descriptor)?.0 .0);
                out.put_u16(pool.new_utf8(name)?.0 .0);
            }
            ElementValue::Class(descriptor) => {
                out.put_u8(b'c');
                out.put_u16(pool.new_utf8(descriptor)?.0 .0);
            }
            ElementValue::Annotation(annotation) => {
                out.put_u8(b'@');
                annotation.put(pool, out)?;
            }
            ElementValue::Array(values) => {
                out.put_u8(b'[');
                out.put_u16(count(values.len(), "annotation array elements")?);
                for value in values {
                    value.put(pool, out)?;
                }
            }
        }
        Ok(())
    }
}

fn count(len: usize, what: &'static str) -> Result<u16, Error> {
    u16::try_from(len).map_err(|_| Error::TooManyEntries { what, count: len })
}

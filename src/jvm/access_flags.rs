use super::class_file::Serialize;
use bitflags::bitflags;
use byteorder::WriteBytesExt;
use std::fmt;
use std::io::Result;

/// Declare a `u16` flag set as it appears in the class file, along with its serialization
///
/// Bits not named in the set are dropped when decoding. The JVM ignores unassigned bits and
/// the writer never needs to reproduce them.
macro_rules! access_flags {
    (
        $(#[$outer:meta])*
        $name:ident { $($flag:ident = $bit:expr,)* }
    ) => {
        bitflags! {
            $(#[$outer])*
            pub struct $name: u16 {
                $(const $flag = $bit;)*
            }
        }

        impl $name {
            /// Decode flags read out of a class file
            pub fn decode(raw: u16) -> $name {
                let decoded = $name::from_bits_truncate(raw);
                if decoded.bits() != raw {
                    log::trace!(
                        "Ignoring unassigned {} bits {:#06x}",
                        stringify!($name),
                        raw & !decoded.bits()
                    );
                }
                decoded
            }
        }

        impl Serialize for $name {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                self.bits().serialize(writer)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#06x}", self.bits())
            }
        }
    };
}

access_flags! {
    /// Flags in the `access_flags` item of the class header
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-E.1
    ClassAccessFlags {
        PUBLIC = 0x0001,
        FINAL = 0x0010,
        SUPER = 0x0020,
        INTERFACE = 0x0200,
        ABSTRACT = 0x0400,
        SYNTHETIC = 0x1000,
        ANNOTATION = 0x2000,
        ENUM = 0x4000,
        MODULE = 0x8000,
    }
}

access_flags! {
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6-200-A.1
    MethodAccessFlags {
        PUBLIC = 0x0001,
        PRIVATE = 0x0002,
        PROTECTED = 0x0004,
        STATIC = 0x0008,
        FINAL = 0x0010,
        SYNCHRONIZED = 0x0020,
        BRIDGE = 0x0040,
        VARARGS = 0x0080,
        NATIVE = 0x0100,
        ABSTRACT = 0x0400,
        STRICT = 0x0800,
        SYNTHETIC = 0x1000,
    }
}

access_flags! {
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5-200-A.1
    FieldAccessFlags {
        PUBLIC = 0x0001,
        PRIVATE = 0x0002,
        PROTECTED = 0x0004,
        STATIC = 0x0008,
        FINAL = 0x0010,
        VOLATILE = 0x0040,
        TRANSIENT = 0x0080,
        SYNTHETIC = 0x1000,
        ENUM = 0x4000,
    }
}

access_flags! {
    /// Flags on one entry of the `InnerClasses` attribute
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.6-300-D.1-D.1
    InnerClassAccessFlags {
        PUBLIC = 0x0001,
        PRIVATE = 0x0002,
        PROTECTED = 0x0004,
        STATIC = 0x0008,
        FINAL = 0x0010,
        INTERFACE = 0x0200,
        ABSTRACT = 0x0400,
        SYNTHETIC = 0x1000,
        ANNOTATION = 0x2000,
        ENUM = 0x4000,
    }
}

impl MethodAccessFlags {
    /// Whether the method receives `this` in local 0
    pub fn has_receiver(&self) -> bool {
        !self.contains(MethodAccessFlags::STATIC)
    }
}

use super::Serialize;
use byteorder::WriteBytesExt;
use std::io::Result;

/// First four bytes of every class file
pub const MAGIC: u32 = 0xCAFEBABE;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 6 (first with `StackMapTable`)
    pub const JAVA6: Version = Version {
        minor_version: 0,
        major_version: 50,
    };

    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };

    /// JVM class file version corresponding to Java SE 11 (released September 2018)
    pub const JAVA11: Version = Version {
        minor_version: 0,
        major_version: 55,
    };

    /// JVM class file version corresponding to Java SE 17 (released September 2021)
    pub const JAVA17: Version = Version {
        minor_version: 0,
        major_version: 61,
    };

    /// JVM class file version corresponding to Java SE 21 (released September 2023)
    pub const JAVA21: Version = Version {
        minor_version: 0,
        major_version: 65,
    };

    /// Newest version the reader accepts
    pub const LATEST: Version = Version::JAVA21;

    /// Oldest version the reader accepts (JDK 1.0.2)
    pub const OLDEST_MAJOR: u16 = 45;

    /// Does this version require stack map frames for verification?
    pub fn needs_stack_map_frames(&self) -> bool {
        self.major_version >= Version::JAVA6.major_version
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

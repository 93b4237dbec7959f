use super::Error;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Internal (slash separated) name of a class or interface
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str;

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(format!("Binary name '{}' is empty", name));
        }
        for segment in name.split('/') {
            if segment.is_empty() {
                return Err(format!("Binary name '{}' has an empty segment", name));
            } else if segment.contains(&['.', ';', '['][..]) {
                return Err(format!(
                    "Binary name '{}' contains an illegal character",
                    name
                ));
            }
        }
        Ok(())
    }

    fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(BinaryName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl BinaryName {
    /// Parse a name, reporting failures as codec errors
    pub fn parse(name: &str) -> Result<BinaryName, Error> {
        BinaryName::from_string(name.to_owned()).map_err(|_| Error::BadName(name.to_owned()))
    }

    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // JDK types the codec needs to reason about frames
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
    pub const METHOD_TYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const METHOD_HANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(BinaryName::check_valid("java/lang/Object").is_ok());
        assert!(BinaryName::check_valid("Foo$Bar").is_ok());
        assert!(BinaryName::check_valid("module-info").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(BinaryName::check_valid("").is_err());
        assert!(BinaryName::check_valid("java.lang.Object").is_err());
        assert!(BinaryName::check_valid("[I").is_err(), "array types are not class names");
        assert!(BinaryName::check_valid("java//Object").is_err());
        assert!(matches!(BinaryName::parse("a;b"), Err(Error::BadName(_))));
    }
}

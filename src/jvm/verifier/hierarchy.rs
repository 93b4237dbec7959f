use crate::jvm::{BinaryName, ClassReader, Error};
use std::collections::HashMap;

/// Oracle for class relationships, used when two object types meet at a control flow merge
///
/// The codec never loads classes, so whatever knows the class hierarchy (a class path, a
/// build tool, a test) has to supply it.
pub trait TypeHierarchy {
    /// Most specific class that both classes extend
    fn common_super_class(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName;
}

/// Hierarchy that knows nothing: distinct classes only share `java/lang/Object`
///
/// Frames computed this way can be too weak when a merged value is later used as a specific
/// class (eg. passed to a parameter of type `java/lang/Number`).
#[derive(Copy, Clone, Default, Debug)]
pub struct ObjectHierarchy;

impl TypeHierarchy for ObjectHierarchy {
    fn common_super_class(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName {
        if class1 == class2 {
            class1.clone()
        } else {
            BinaryName::OBJECT
        }
    }
}

/// Hierarchy given by an explicit superclass map
///
/// Classes missing from the map are assumed to extend `java/lang/Object` directly.
#[derive(Clone, Default, Debug)]
pub struct ClassHierarchy {
    superclasses: HashMap<BinaryName, BinaryName>,
}

impl ClassHierarchy {
    pub fn new() -> ClassHierarchy {
        ClassHierarchy::default()
    }

    /// Record the superclass of a class
    pub fn add_class(&mut self, class: BinaryName, superclass: BinaryName) {
        self.superclasses.insert(class, superclass);
    }

    /// Record the superclass named in the header of a class file
    pub fn add_class_file(&mut self, class_bytes: &[u8]) -> Result<(), Error> {
        let reader = ClassReader::new(class_bytes)?;
        if let Some(superclass) = reader.super_name()? {
            let class = BinaryName::parse(reader.class_name()?)?;
            log::trace!("{} extends {}", class, superclass);
            self.add_class(class, BinaryName::parse(superclass)?);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.superclasses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.superclasses.is_empty()
    }

    /// The class followed by all of its superclasses, ending in `java/lang/Object`
    fn ancestors(&self, class: &BinaryName) -> Vec<BinaryName> {
        let mut chain = vec![class.clone()];
        let mut current = class;
        while let Some(superclass) = self.superclasses.get(current) {
            // Cyclic maps are a caller bug; stop instead of looping forever
            if chain.contains(superclass) {
                break;
            }
            chain.push(superclass.clone());
            current = superclass;
        }
        if chain.last() != Some(&BinaryName::OBJECT) {
            chain.push(BinaryName::OBJECT);
        }
        chain
    }
}

impl TypeHierarchy for ClassHierarchy {
    fn common_super_class(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName {
        let ancestors2 = self.ancestors(class2);
        self.ancestors(class1)
            .into_iter()
            .find(|ancestor| ancestors2.contains(ancestor))
            .unwrap_or(BinaryName::OBJECT)
    }
}

/// Hierarchy for joining the types an exception handler catches
///
/// Everything that can be thrown is a `java/lang/Throwable`, so a join that would only find
/// `java/lang/Object` stops at `java/lang/Throwable` instead.
pub struct CaughtHierarchy<'a>(pub &'a dyn TypeHierarchy);

impl<'a> TypeHierarchy for CaughtHierarchy<'a> {
    fn common_super_class(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName {
        match self.0.common_super_class(class1, class2) {
            joined if joined == BinaryName::OBJECT => BinaryName::THROWABLE,
            joined => joined,
        }
    }
}

impl<'a, H: TypeHierarchy + ?Sized> TypeHierarchy for &'a H {
    fn common_super_class(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName {
        (**self).common_super_class(class1, class2)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn name(s: &str) -> BinaryName {
        BinaryName::parse(s).unwrap()
    }

    #[test]
    fn object_hierarchy() {
        let hierarchy = ObjectHierarchy;
        assert_eq!(
            hierarchy.common_super_class(&BinaryName::STRING, &BinaryName::STRING),
            BinaryName::STRING
        );
        assert_eq!(
            hierarchy.common_super_class(&BinaryName::STRING, &BinaryName::CLASS),
            BinaryName::OBJECT
        );
    }

    #[test]
    fn class_hierarchy() {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_class(name("Dog"), name("Animal"));
        hierarchy.add_class(name("Cat"), name("Animal"));
        hierarchy.add_class(name("Puppy"), name("Dog"));
        hierarchy.add_class(name("Animal"), BinaryName::OBJECT);

        assert_eq!(
            hierarchy.common_super_class(&name("Puppy"), &name("Cat")),
            name("Animal")
        );
        assert_eq!(
            hierarchy.common_super_class(&name("Puppy"), &name("Dog")),
            name("Dog")
        );
        assert_eq!(
            hierarchy.common_super_class(&name("Dog"), &name("Unknown")),
            BinaryName::OBJECT
        );
    }

    #[test]
    fn caught_types_stop_at_throwable() {
        let io = name("java/io/IOException");
        let eof = name("java/io/EOFException");
        let missing = name("java/io/FileNotFoundException");

        let caught = CaughtHierarchy(&ObjectHierarchy);
        assert_eq!(caught.common_super_class(&eof, &missing), BinaryName::THROWABLE);
        assert_eq!(caught.common_super_class(&eof, &eof), eof);

        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add_class(eof.clone(), io.clone());
        hierarchy.add_class(missing.clone(), io.clone());
        let caught = CaughtHierarchy(&hierarchy);
        assert_eq!(caught.common_super_class(&eof, &missing), io);
    }

    #[test]
    fn superclasses_from_class_files() {
        use crate::jvm::class_file::Version;
        use crate::jvm::visitor::ClassVisitor;
        use crate::jvm::{ClassAccessFlags, ClassWriter, WriterFlags};

        let class_file = |class: &str, superclass: Option<&str>| {
            let mut writer = ClassWriter::new(WriterFlags::empty());
            writer
                .visit(
                    Version::JAVA8,
                    ClassAccessFlags::PUBLIC,
                    class,
                    None,
                    superclass,
                    &[],
                )
                .unwrap();
            writer.visit_end().unwrap();
            writer.to_bytes().unwrap()
        };

        let mut hierarchy = ClassHierarchy::new();
        hierarchy
            .add_class_file(&class_file("me/Dog", Some("me/Animal")))
            .unwrap();
        hierarchy
            .add_class_file(&class_file("me/Cat", Some("me/Animal")))
            .unwrap();
        hierarchy
            .add_class_file(&class_file("java/lang/Object", None))
            .unwrap();
        assert_eq!(hierarchy.len(), 2);
        assert_eq!(
            hierarchy.common_super_class(&name("me/Dog"), &name("me/Cat")),
            name("me/Animal")
        );
        assert!(hierarchy.add_class_file(&[0xCA, 0xFE]).is_err());
    }
}

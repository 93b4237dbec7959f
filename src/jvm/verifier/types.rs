use super::TypeHierarchy;
use crate::jvm::class_file::{ByteSize, ClassConstantIndex, ConstantPool, Serialize};
use crate::jvm::{ArrayType, BaseType, BinaryName, Error, FieldType, RefType};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::convert::Infallible;

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot: never written, the upper half of a `long`/`double`, or the join of
    /// incompatible types
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called by `<init>` has not been called
    ///
    ///   - while computing frames, we use [`UninitializedType`] for `U`, tracking the type the
    ///     object will have and the offset of the `new` instruction
    ///   - when serializing into a classfile, we use `u16` for `U`, corresponding to the offset of
    ///     the `new` instruction from the start of the method body
    Uninitialized(U),
}

/// Type of an object between its `new` and its `<init>` call
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct UninitializedType {
    /// Offset of the `new` instruction in the code
    pub offset: u32,

    /// Class the object will have once initialized
    pub class: BinaryName,
}

/// Verification type used while computing frames
pub type VType = VerificationType<RefType<BinaryName>, UninitializedType>;

/// Verification type with classes given by name and uninitialized types by the offset of their
/// `new` instruction
pub type NamedType = VerificationType<String, u32>;

impl<Cls, U> VerificationType<Cls, U> {
    /// Whether the type can be the receiver of `monitorenter`, `athrow` and the like
    pub fn is_reference(&self) -> bool {
        self.tag() >= 5
    }

    /// Convert the class and uninitialized payloads, leaving the other variants as is
    pub fn try_map<C2, U2, E>(
        &self,
        map_class: impl FnOnce(&Cls) -> Result<C2, E>,
        map_uninitialized: impl FnOnce(&U) -> Result<U2, E>,
    ) -> Result<VerificationType<C2, U2>, E> {
        use VerificationType::*;
        Ok(match self {
            Top => Top,
            Integer => Integer,
            Float => Float,
            Long => Long,
            Double => Double,
            Null => Null,
            UninitializedThis => UninitializedThis,
            Object(cls) => Object(map_class(cls)?),
            Uninitialized(uninit) => Uninitialized(map_uninitialized(uninit)?),
        })
    }

    /// Infallible form of [`Self::try_map`]
    pub fn map<C2, U2>(
        &self,
        map_class: impl FnOnce(&Cls) -> C2,
        map_uninitialized: impl FnOnce(&U) -> U2,
    ) -> VerificationType<C2, U2> {
        let mapped = self.try_map(
            |cls| Ok::<_, Infallible>(map_class(cls)),
            |uninit| Ok(map_uninitialized(uninit)),
        );
        match mapped {
            Ok(mapped) => mapped,
            Err(never) => match never {},
        }
    }

    /// `verification_type_info` tag
    pub fn tag(&self) -> u8 {
        use VerificationType::*;
        match self {
            Top => 0,
            Integer => 1,
            Float => 2,
            Double => 3,
            Long => 4,
            Null => 5,
            UninitializedThis => 6,
            Object(_) => 7,
            Uninitialized(_) => 8,
        }
    }
}

/// Sub-`int` types are widened to `Integer` on the operand stack and in locals
impl<C, U> From<FieldType<C>> for VerificationType<RefType<C>, U> {
    fn from(field_type: FieldType<C>) -> Self {
        let base_type = match field_type {
            FieldType::Ref(ref_type) => return VerificationType::Object(ref_type),
            FieldType::Base(base_type) => base_type,
        };
        match base_type {
            BaseType::Float => VerificationType::Float,
            BaseType::Long => VerificationType::Long,
            BaseType::Double => VerificationType::Double,
            BaseType::Int | BaseType::Char | BaseType::Short | BaseType::Byte | BaseType::Boolean => {
                VerificationType::Integer
            }
        }
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            VerificationType::Object(cls) => cls.serialize(writer),
            VerificationType::Uninitialized(offset) => offset.serialize(writer),
            _ => Ok(()),
        }
    }
}

impl ByteSize for VerificationType<ClassConstantIndex, u16> {
    fn byte_size(&self) -> usize {
        match self {
            VerificationType::Object(_) | VerificationType::Uninitialized(_) => 3,
            _ => 1,
        }
    }
}

impl<Cls, A> Width for VerificationType<Cls, A> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

impl VType {
    pub fn object(class: BinaryName) -> VType {
        VerificationType::Object(RefType::Object(class))
    }

    /// Most specific type that both types can be used as, if there is one
    ///
    /// Joining is commutative. `None` means the types have nothing in common: a local variable
    /// holding such a merge becomes `Top`, while a stack entry is a hard error.
    pub fn join(&self, other: &VType, hierarchy: &dyn TypeHierarchy) -> Option<VType> {
        if self == other {
            return Some(self.clone());
        }
        match (self, other) {
            (VerificationType::Null, VerificationType::Object(_)) => Some(other.clone()),
            (VerificationType::Object(_), VerificationType::Null) => Some(self.clone()),
            (VerificationType::Object(ref1), VerificationType::Object(ref2)) => Some(
                VerificationType::Object(join_ref_types(ref1, ref2, hierarchy)),
            ),
            _ => None,
        }
    }

    /// Resolve class names to pool entries and `new` offsets to their `u16` form
    pub fn into_serializable(
        &self,
        pool: &mut ConstantPool,
    ) -> Result<VerificationType<ClassConstantIndex, u16>, Error> {
        self.into_named().resolve(pool)
    }

    pub fn into_named(&self) -> NamedType {
        self.map(RefType::internal_name, |uninitialized| uninitialized.offset)
    }
}

impl NamedType {
    /// Intern the class name, narrowing a `new` offset to `u16`
    pub fn resolve(
        &self,
        pool: &mut ConstantPool,
    ) -> Result<VerificationType<ClassConstantIndex, u16>, Error> {
        self.try_map(
            |name| pool.new_class(name),
            |offset| u16::try_from(*offset).map_err(|_| Error::MethodCodeOverflow(*offset as usize)),
        )
    }
}

/// Join two reference types
///
/// Classes meet at their common superclass and object arrays of the same dimension meet
/// element-wise. Anything else (mixed dimensions, primitive arrays) only shares `Object`.
fn join_ref_types(
    ref1: &RefType<BinaryName>,
    ref2: &RefType<BinaryName>,
    hierarchy: &dyn TypeHierarchy,
) -> RefType<BinaryName> {
    match (ref1, ref2) {
        (RefType::Object(cls1), RefType::Object(cls2)) => {
            RefType::Object(hierarchy.common_super_class(cls1, cls2))
        }
        (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
            if arr1.additional_dimensions == arr2.additional_dimensions =>
        {
            RefType::ObjectArray(ArrayType {
                additional_dimensions: arr1.additional_dimensions,
                element_type: hierarchy.common_super_class(&arr1.element_type, &arr2.element_type),
            })
        }
        (ref1, ref2) if ref1 == ref2 => ref1.clone(),
        _ => RefType::Object(BinaryName::OBJECT),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::verifier::{ClassHierarchy, ObjectHierarchy};
    use crate::jvm::ParseDescriptor;

    fn ref_type(descriptor: &str) -> VType {
        VerificationType::Object(RefType::parse(descriptor).unwrap())
    }

    #[test]
    fn primitive_joins() {
        let hierarchy = ObjectHierarchy;
        assert_eq!(
            VType::Integer.join(&VType::Integer, &hierarchy),
            Some(VType::Integer)
        );
        assert_eq!(VType::Integer.join(&VType::Long, &hierarchy), None);
        assert_eq!(VType::Long.join(&VType::Integer, &hierarchy), None);
        assert_eq!(VType::Float.join(&VType::Null, &hierarchy), None);
    }

    #[test]
    fn reference_joins() {
        let mut hierarchy = ClassHierarchy::new();
        let name = |s: &str| BinaryName::parse(s).unwrap();
        hierarchy.add_class(name("B"), name("A"));
        hierarchy.add_class(name("C"), name("A"));

        let b = ref_type("LB;");
        let c = ref_type("LC;");
        assert_eq!(b.join(&c, &hierarchy), Some(ref_type("LA;")));
        assert_eq!(c.join(&b, &hierarchy), Some(ref_type("LA;")));
        assert_eq!(VType::Null.join(&b, &hierarchy), Some(b.clone()));
        assert_eq!(b.join(&VType::Null, &hierarchy), Some(b.clone()));

        assert_eq!(
            ref_type("[LB;").join(&ref_type("[LC;"), &hierarchy),
            Some(ref_type("[LA;"))
        );
        assert_eq!(
            ref_type("[I").join(&ref_type("[F"), &hierarchy),
            Some(ref_type("Ljava/lang/Object;"))
        );
        assert_eq!(
            ref_type("[[LB;").join(&ref_type("[LB;"), &hierarchy),
            Some(ref_type("Ljava/lang/Object;"))
        );
    }

    #[test]
    fn uninitialized_types_do_not_join() {
        let hierarchy = ObjectHierarchy;
        let fresh = VType::Uninitialized(UninitializedType {
            offset: 4,
            class: BinaryName::STRING,
        });
        let other = VType::Uninitialized(UninitializedType {
            offset: 9,
            class: BinaryName::STRING,
        });
        assert_eq!(fresh.join(&fresh, &hierarchy), Some(fresh.clone()));
        assert_eq!(fresh.join(&other, &hierarchy), None);
        assert_eq!(fresh.join(&VType::Null, &hierarchy), None);
        assert_eq!(
            VType::UninitializedThis.join(&VType::object(BinaryName::OBJECT), &hierarchy),
            None
        );
    }

    #[test]
    fn serializable_form() {
        let mut pool = ConstantPool::new();
        let string = VType::object(BinaryName::STRING)
            .into_serializable(&mut pool)
            .unwrap();
        assert_eq!(
            string,
            VerificationType::Object(pool.new_class("java/lang/String").unwrap())
        );
        let array = ref_type("[I").into_serializable(&mut pool).unwrap();
        assert_eq!(
            array,
            VerificationType::Object(pool.new_class("[I").unwrap())
        );
    }
}

use super::{BinaryName, Error, Name};
use crate::util::Width;

/// Position inside a descriptor string being parsed
///
/// Descriptors are ASCII apart from class names, so the cursor walks bytes and only slices out
/// class names as `str`.
pub struct DescriptorCursor<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> DescriptorCursor<'a> {
    fn new(source: &'a str) -> DescriptorCursor<'a> {
        DescriptorCursor {
            source,
            position: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.position).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let next = self.peek()?;
        self.position += 1;
        Some(next)
    }

    fn eat(&mut self, expected: u8) -> bool {
        let matches = self.peek() == Some(expected);
        if matches {
            self.position += 1;
        }
        matches
    }

    /// Consume everything up to (and including) `terminator`, returning what came before it
    fn take_until(&mut self, terminator: u8) -> Option<&'a str> {
        let rest = &self.source[self.position..];
        let length = rest.bytes().position(|b| b == terminator)?;
        self.position += length + 1;
        Some(&rest[..length])
    }

    fn unexpected(&self, what: &str) -> String {
        match self.source[self.position..].chars().next() {
            Some(c) => format!("{} at offset {}, found '{}'", what, self.position, c),
            None => format!("{} at offset {}, found end of input", what, self.position),
        }
    }
}

/// Conversion of descriptor types into their string form
pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    fn render_to(&self, write_to: &mut String);
}

/// Conversion of strings into descriptor types
pub trait ParseDescriptor: Sized {
    /// Parse a full descriptor, rejecting trailing input
    fn parse(source: &str) -> Result<Self, Error> {
        let bad = |reason| Error::BadDescriptor {
            descriptor: source.to_owned(),
            reason,
        };
        let mut cursor = DescriptorCursor::new(source);
        let parsed = Self::parse_from(&mut cursor).map_err(bad)?;
        if cursor.peek().is_some() {
            return Err(bad(cursor.unexpected("Expected end of descriptor")));
        }
        Ok(parsed)
    }

    fn parse_from(cursor: &mut DescriptorCursor<'_>) -> Result<Self, String>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// Every base type along with its descriptor character and `newarray` code
    const TABLE: [(BaseType, u8, u8); 8] = [
        (BaseType::Boolean, b'Z', 4),
        (BaseType::Char, b'C', 5),
        (BaseType::Float, b'F', 6),
        (BaseType::Double, b'D', 7),
        (BaseType::Byte, b'B', 8),
        (BaseType::Short, b'S', 9),
        (BaseType::Int, b'I', 10),
        (BaseType::Long, b'J', 11),
    ];

    fn entry(self) -> (BaseType, u8, u8) {
        BaseType::TABLE
            .iter()
            .copied()
            .find(|(typ, _, _)| *typ == self)
            .unwrap_or(BaseType::TABLE[0])
    }

    pub fn from_descriptor_char(c: u8) -> Option<BaseType> {
        BaseType::TABLE
            .iter()
            .find(|(_, tag, _)| *tag == c)
            .map(|(typ, _, _)| *typ)
    }

    pub fn descriptor_char(self) -> char {
        self.entry().1 as char
    }

    /// Element type of a `newarray` instruction's `atype` operand
    pub fn from_array_code(atype: u8) -> Option<BaseType> {
        BaseType::TABLE
            .iter()
            .find(|(_, _, code)| *code == atype)
            .map(|(typ, _, _)| *typ)
    }

    pub fn array_code(self) -> u8 {
        self.entry().2
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        write_to.push(self.descriptor_char());
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(cursor: &mut DescriptorCursor<'_>) -> Result<Self, String> {
        match cursor.peek().and_then(BaseType::from_descriptor_char) {
            Some(typ) => {
                cursor.bump();
                Ok(typ)
            }
            None => Err(cursor.unexpected("Expected a base type")),
        }
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(cursor: &mut DescriptorCursor<'_>) -> Result<Self, String> {
        if !cursor.eat(b'L') {
            return Err(cursor.unexpected("Expected 'L'"));
        }
        let start = cursor.position;
        let class_name = cursor
            .take_until(b';')
            .ok_or_else(|| format!("Class name at offset {} has no terminating ';'", start))?;
        BinaryName::from_string(class_name.to_owned())
    }
}

/// Array type, stored as its innermost element plus a count of the extra `[`
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// `A[]` has 0 additional dimensions, `A[][][][]` has 3
    pub additional_dimensions: usize,

    /// `A` is the element type of both `A[]` and `A[][]`
    pub element_type: T,
}

impl<T> ArrayType<T> {
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }

    fn wrapped(self) -> ArrayType<T> {
        ArrayType {
            additional_dimensions: self.additional_dimensions + 1,
            element_type: self.element_type,
        }
    }

    /// Array with one dimension fewer, or the bare element type if this is one dimensional
    fn unwrapped(self) -> Result<ArrayType<T>, T> {
        match self.additional_dimensions.checked_sub(1) {
            Some(additional_dimensions) => Ok(ArrayType {
                additional_dimensions,
                element_type: self.element_type,
            }),
            None => Err(self.element_type),
        }
    }

    const fn of(element_type: T) -> ArrayType<T> {
        ArrayType {
            additional_dimensions: 0,
            element_type,
        }
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        write_to.extend(std::iter::repeat('[').take(self.dimensions()));
        self.element_type.render_to(write_to);
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

impl<C> RefType<C> {
    /// Array whose elements have the given type
    pub fn array(field_type: FieldType<C>) -> RefType<C> {
        match field_type {
            FieldType::Base(base) => RefType::PrimitiveArray(ArrayType::of(base)),
            FieldType::Ref(RefType::Object(class)) => RefType::ObjectArray(ArrayType::of(class)),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(arr.wrapped()),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(arr.wrapped()),
        }
    }

    /// Type of the elements of an array type (`None` for non-arrays)
    pub fn element_type(self) -> Option<FieldType<C>> {
        Some(match self {
            RefType::Object(_) => return None,
            RefType::PrimitiveArray(arr) => match arr.unwrapped() {
                Ok(inner) => FieldType::Ref(RefType::PrimitiveArray(inner)),
                Err(base) => FieldType::Base(base),
            },
            RefType::ObjectArray(arr) => match arr.unwrapped() {
                Ok(inner) => FieldType::Ref(RefType::ObjectArray(inner)),
                Err(class) => FieldType::object(class),
            },
        })
    }
}

impl RefType<BinaryName> {
    /// Parse the name used by `CONSTANT_Class` entries: an internal name for classes, but a full
    /// descriptor for array types
    pub fn from_internal_name(name: &str) -> Result<RefType<BinaryName>, Error> {
        if name.starts_with('[') {
            RefType::parse(name)
        } else {
            BinaryName::parse(name).map(RefType::Object)
        }
    }

    /// Name to use in a `CONSTANT_Class` entry
    pub fn internal_name(&self) -> String {
        match self {
            RefType::Object(cls) => cls.as_str().to_owned(),
            other => other.render(),
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn parse_from(cursor: &mut DescriptorCursor<'_>) -> Result<Self, String> {
        let mut dimensions = 0;
        while cursor.eat(b'[') {
            dimensions += 1;
        }
        if dimensions > 255 {
            return Err(format!("Array type has {} dimensions (max 255)", dimensions));
        }

        if cursor.peek() == Some(b'L') {
            let class = C::parse_from(cursor)?;
            Ok(match dimensions {
                0 => RefType::Object(class),
                n => RefType::ObjectArray(ArrayType {
                    additional_dimensions: n - 1,
                    element_type: class,
                }),
            })
        } else if dimensions > 0 {
            Ok(RefType::PrimitiveArray(ArrayType {
                additional_dimensions: dimensions - 1,
                element_type: BaseType::parse_from(cursor)?,
            }))
        } else {
            Err(cursor.unexpected("Expected a reference type"))
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub fn array(field_type: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(field_type))
    }

    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(cursor: &mut DescriptorCursor<'_>) -> Result<Self, String> {
        match cursor.peek() {
            Some(b'L' | b'[') => RefType::parse_from(cursor).map(FieldType::Ref),
            _ => BaseType::parse_from(cursor)
                .map(FieldType::Base)
                .map_err(|_| cursor.unexpected("Expected a field type")),
        }
    }
}

/// Parameter and return types of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,

    /// `None` for `void`
    pub return_type: Option<FieldType<Class>>,
}

impl<C> MethodDescriptor<C> {
    /// Slots taken by the arguments, counting the receiver if there is one
    ///
    /// This is also the initial `max_locals` of a method.
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let arguments: usize = self.parameters.iter().map(Width::width).sum();
        arguments + usize::from(has_this_param)
    }

    /// Slots taken by the return value on the stack
    pub fn return_length(&self) -> usize {
        self.return_type.as_ref().map_or(0, Width::width)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(cursor: &mut DescriptorCursor<'_>) -> Result<Self, String> {
        if !cursor.eat(b'(') {
            return Err(cursor.unexpected("Expected '('"));
        }

        let mut parameters = vec![];
        while !cursor.eat(b')') {
            if cursor.peek().is_none() {
                return Err(cursor.unexpected("Expected ')'"));
            }
            parameters.push(FieldType::parse_from(cursor)?);
        }

        let return_type = if cursor.eat(b'V') {
            None
        } else {
            Some(FieldType::parse_from(cursor)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}
